//! In-process server for client tests: the real services over the in-memory
//! store, with a switch to simulate losing the connection.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::NaiveDate;

use kiradopay_catalog::{Event, NewEvent, NewItem};
use kiradopay_core::{DomainError, EventCode, ItemCode, ReceiptId, UserId};
use kiradopay_infra::{CatalogService, InMemoryPosStore, ReceiptLedger};
use kiradopay_ledger::{Receipt, ReceiptInput};

use crate::gateway::{GatewayError, LedgerGateway};

pub const EXPO_CALCULATOR: &str =
    "return (state.A?.count ?? 0) * 500 + (state.B?.count ?? 0) * 300;";

pub fn code(s: &str) -> ItemCode {
    ItemCode::parse(s).unwrap()
}

pub fn event() -> EventCode {
    EventCode::parse("EXPO24").unwrap()
}

pub struct LocalGateway {
    catalog: CatalogService<Arc<InMemoryPosStore>>,
    ledger: ReceiptLedger<Arc<InMemoryPosStore>>,
    user: UserId,
    online: AtomicBool,
}

impl LocalGateway {
    pub fn new() -> Self {
        let store = Arc::new(InMemoryPosStore::new());
        Self {
            catalog: CatalogService::new(store.clone()),
            ledger: ReceiptLedger::new(store),
            user: UserId::new("cashier-1"),
            online: AtomicBool::new(true),
        }
    }

    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }

    pub async fn set_display(&self, event: &EventCode, items: Vec<ItemCode>) {
        self.catalog.set_display(event, items).await.unwrap();
    }

    fn reachable(&self) -> Result<(), GatewayError> {
        if self.online.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(GatewayError::Transient("connection refused".to_string()))
        }
    }
}

fn to_gateway(err: DomainError) -> GatewayError {
    match err {
        DomainError::Validation(m) | DomainError::InvalidId(m) => GatewayError::Validation(m),
        DomainError::Unauthorized(message) => GatewayError::Auth { status: 401, message },
        DomainError::NotFound(m) => GatewayError::NotFound(m),
        DomainError::Conflict(m) => GatewayError::Conflict(m),
        DomainError::Transient(m) => GatewayError::Transient(m),
        DomainError::Calculation(m) | DomainError::Unknown(m) => GatewayError::Unknown(m),
    }
}

#[async_trait::async_trait]
impl LedgerGateway for LocalGateway {
    async fn list_events(&self) -> Result<Vec<Event>, GatewayError> {
        self.reachable()?;
        self.catalog.list_events().await.map_err(to_gateway)
    }

    async fn get_event(&self, code: &EventCode) -> Result<Event, GatewayError> {
        self.reachable()?;
        self.catalog.get_event(code).await.map_err(to_gateway)
    }

    async fn list_receipts(&self, event: &EventCode) -> Result<Vec<Receipt>, GatewayError> {
        self.reachable()?;
        self.ledger.list_receipts(event).await.map_err(to_gateway)
    }

    async fn create_receipts(
        &self,
        event: &EventCode,
        inputs: &[ReceiptInput],
    ) -> Result<Vec<Receipt>, GatewayError> {
        self.reachable()?;
        self.ledger
            .create_receipts(event, &self.user, inputs.to_vec())
            .await
            .map_err(to_gateway)
    }

    async fn delete_receipts(
        &self,
        event: &EventCode,
        ids: &[ReceiptId],
    ) -> Result<u64, GatewayError> {
        self.reachable()?;
        self.ledger
            .delete_receipts(event, ids)
            .await
            .map_err(to_gateway)
    }
}

/// Items `A`, `B` and event `EXPO24` displaying both.
pub async fn seed_expo(gateway: &LocalGateway) {
    for (item, name) in [("A", "Guidebook"), ("B", "Poster")] {
        gateway
            .catalog
            .create_item(NewItem {
                code: code(item),
                name: name.to_string(),
                picture: String::new(),
            })
            .await
            .unwrap();
    }
    gateway
        .catalog
        .create_event(NewEvent {
            code: event(),
            name: "Expo 2024".to_string(),
            date: NaiveDate::from_ymd_opt(2024, 11, 3).unwrap(),
            calculator: Some(EXPO_CALCULATOR.to_string()),
        })
        .await
        .unwrap();
    gateway.set_display(&event(), vec![code("A"), code("B")]).await;
}
