//! Integration tests for the ledger and display policy over a shared store.
//!
//! Tests: CatalogService → PosStore ← ReceiptLedger
//!
//! Verifies:
//! - Receipts are indexed in submission order and priced by the event calculator
//! - Batches are all-or-nothing
//! - Display changes never orphan sold items
//! - Deletes are scoped to one event

use std::sync::Arc;

use chrono::NaiveDate;

use kiradopay_catalog::{EventUpdate, NewEvent, NewItem};
use kiradopay_core::{DomainError, EventCode, ItemCode, LocalReceiptId, ReceiptId, UserId};
use kiradopay_ledger::{ReceiptInput, RecordInput};

use crate::catalog::CatalogService;
use crate::ledger::ReceiptLedger;
use crate::store::InMemoryPosStore;

const BUNDLE: &str = r#"
    const a = state.A?.count ?? 0;
    const b = state.B?.count ?? 0;
    return a * 500 + b * 300;
"#;

fn code(s: &str) -> ItemCode {
    ItemCode::parse(s).unwrap()
}

fn cashier() -> UserId {
    UserId::new("cashier-1")
}

fn line(item: &str, count: i64) -> RecordInput {
    RecordInput {
        item_code: code(item),
        count,
        dedication: false,
    }
}

fn setup() -> (
    CatalogService<Arc<InMemoryPosStore>>,
    ReceiptLedger<Arc<InMemoryPosStore>>,
) {
    let store = Arc::new(InMemoryPosStore::new());
    (CatalogService::new(store.clone()), ReceiptLedger::new(store))
}

async fn create_event(catalog: &CatalogService<Arc<InMemoryPosStore>>, event: &str, items: &[&str]) -> EventCode {
    for item in items {
        let input = NewItem {
            code: code(item),
            name: format!("Item {item}"),
            picture: String::new(),
        };
        // Items are catalog-wide; a second event may reuse them.
        let _ = catalog.create_item(input).await;
    }
    let created = catalog
        .create_event(NewEvent {
            code: EventCode::parse(event).unwrap(),
            name: format!("Event {event}"),
            date: NaiveDate::from_ymd_opt(2024, 11, 3).unwrap(),
            calculator: Some(BUNDLE.to_string()),
        })
        .await
        .unwrap();
    catalog
        .set_display(&created.code, items.iter().map(|i| code(i)).collect())
        .await
        .unwrap();
    created.code
}

/// Price lines with the event's calculator, as a register would.
async fn priced(
    catalog: &CatalogService<Arc<InMemoryPosStore>>,
    event: &EventCode,
    records: Vec<RecordInput>,
) -> ReceiptInput {
    let mut input = ReceiptInput {
        total: 0,
        client_id: None,
        records,
    };
    let calculator = catalog.get_event(event).await.unwrap().calculator().unwrap();
    input.total = calculator.evaluate(&input.calculator_state()).unwrap().round() as i64;
    input
}

#[tokio::test]
async fn expo_receipt_keeps_line_order_and_calculated_total() {
    let (catalog, ledger) = setup();
    let event = create_event(&catalog, "EXPO24", &["A", "B"]).await;

    let input = priced(&catalog, &event, vec![line("A", 2), line("B", 1)]).await;
    let created = ledger
        .create_receipts(&event, &cashier(), vec![input])
        .await
        .unwrap();

    assert_eq!(created.len(), 1);
    let receipt = &created[0];
    assert_eq!(receipt.total, 1300);
    assert_eq!(receipt.user_id, cashier());
    assert_eq!(receipt.records.len(), 2);
    assert_eq!((receipt.records[0].item_code.as_str(), receipt.records[0].count, receipt.records[0].index), ("A", 2, 0));
    assert_eq!((receipt.records[1].item_code.as_str(), receipt.records[1].count, receipt.records[1].index), ("B", 1, 1));

    let listed = ledger.list_receipts(&event).await.unwrap();
    assert_eq!(listed, created);
}

#[tokio::test]
async fn batch_with_undisplayed_item_persists_nothing() {
    let (catalog, ledger) = setup();
    let event = create_event(&catalog, "EXPO24", &["A", "B"]).await;

    let good = priced(&catalog, &event, vec![line("A", 1)]).await;
    let bad = ReceiptInput {
        total: 0,
        client_id: None,
        records: vec![line("Z", 1)],
    };
    let err = ledger
        .create_receipts(&event, &cashier(), vec![good, bad])
        .await
        .unwrap_err();
    match err {
        DomainError::Conflict(msg) => assert!(msg.contains("Z")),
        other => panic!("Expected Conflict error, got {other:?}"),
    }
    assert!(ledger.list_receipts(&event).await.unwrap().is_empty());
}

#[tokio::test]
async fn delete_counts_only_existing_receipts_of_the_event() {
    let (catalog, ledger) = setup();
    let expo = create_event(&catalog, "EXPO24", &["A"]).await;
    let fair = create_event(&catalog, "FAIR24", &["A"]).await;

    let batch = vec![
        priced(&catalog, &expo, vec![line("A", 1)]).await,
        priced(&catalog, &expo, vec![line("A", 2)]).await,
    ];
    let created = ledger.create_receipts(&expo, &cashier(), batch).await.unwrap();
    let other = ledger
        .create_receipts(&fair, &cashier(), vec![priced(&catalog, &fair, vec![line("A", 3)]).await])
        .await
        .unwrap();

    let ids = [created[0].id, created[1].id, ReceiptId::new()];
    assert_eq!(ledger.delete_receipts(&expo, &ids).await.unwrap(), 2);
    assert!(ledger.list_receipts(&expo).await.unwrap().is_empty());

    // Ids of another event are ignored, not errored.
    assert_eq!(ledger.delete_receipts(&expo, &[other[0].id]).await.unwrap(), 0);
    assert_eq!(ledger.list_receipts(&fair).await.unwrap(), other);
    assert_eq!(ledger.delete_receipts(&expo, &[]).await.unwrap(), 0);
}

#[tokio::test]
async fn set_display_twice_is_a_noop() {
    let (catalog, _) = setup();
    let event = create_event(&catalog, "EXPO24", &["A", "B"]).await;

    let first = catalog.get_event(&event).await.unwrap();
    let second = catalog
        .set_display(&event, vec![code("A"), code("B")])
        .await
        .unwrap();
    assert_eq!(first, second);
}

#[tokio::test]
async fn removing_a_sold_item_conflicts_and_keeps_display() {
    let (catalog, ledger) = setup();
    let event = create_event(&catalog, "EXPO24", &["A", "B"]).await;
    let input = priced(&catalog, &event, vec![line("B", 1)]).await;
    ledger.create_receipts(&event, &cashier(), vec![input]).await.unwrap();

    let err = catalog.set_display(&event, vec![code("A")]).await.unwrap_err();
    match err {
        DomainError::Conflict(msg) => assert_eq!(msg, "item already sold: B"),
        other => panic!("Expected Conflict error, got {other:?}"),
    }
    let event = catalog.get_event(&event).await.unwrap();
    assert_eq!(event.item_codes(), vec![code("A"), code("B")]);

    // Unsold items can still be removed.
    let updated = catalog.set_display(&event.code, vec![code("B")]).await.unwrap();
    assert_eq!(updated.item_codes(), vec![code("B")]);
}

#[tokio::test]
async fn duplicate_client_id_is_a_conflict() {
    let (catalog, ledger) = setup();
    let event = create_event(&catalog, "EXPO24", &["A"]).await;

    let mut input = priced(&catalog, &event, vec![line("A", 1)]).await;
    input.client_id = Some(LocalReceiptId::new());
    ledger
        .create_receipts(&event, &cashier(), vec![input.clone()])
        .await
        .unwrap();

    let err = ledger
        .create_receipts(&event, &cashier(), vec![input])
        .await
        .unwrap_err();
    match err {
        DomainError::Conflict(msg) => assert_eq!(msg, "receipt already submitted"),
        other => panic!("Expected Conflict error, got {other:?}"),
    }
    assert_eq!(ledger.list_receipts(&event).await.unwrap().len(), 1);
}

#[tokio::test]
async fn renaming_an_event_carries_receipts_and_display() {
    let (catalog, ledger) = setup();
    let event = create_event(&catalog, "EXPO24", &["A"]).await;
    create_event(&catalog, "FAIR24", &["A"]).await;
    let input = priced(&catalog, &event, vec![line("A", 1)]).await;
    ledger.create_receipts(&event, &cashier(), vec![input]).await.unwrap();

    let taken = EventUpdate {
        code: Some(EventCode::parse("FAIR24").unwrap()),
        ..EventUpdate::default()
    };
    match catalog.update_event(&event, taken).await.unwrap_err() {
        DomainError::Conflict(msg) => assert_eq!(msg, "code already in use"),
        other => panic!("Expected Conflict error, got {other:?}"),
    }

    let renamed = EventCode::parse("EXPO25").unwrap();
    let update = EventUpdate {
        code: Some(renamed.clone()),
        ..EventUpdate::default()
    };
    let updated = catalog.update_event(&event, update).await.unwrap();
    assert_eq!(updated.code, renamed);
    assert_eq!(updated.item_codes(), vec![code("A")]);
    assert_eq!(ledger.list_receipts(&renamed).await.unwrap().len(), 1);
    assert!(matches!(
        ledger.list_receipts(&event).await,
        Err(DomainError::NotFound(_))
    ));
}

#[tokio::test]
async fn receipts_are_listed_in_creation_order() {
    let (catalog, ledger) = setup();
    let event = create_event(&catalog, "EXPO24", &["A", "B"]).await;

    let mut created = Vec::new();
    for count in 1..=3 {
        let input = priced(&catalog, &event, vec![line("B", count), line("A", 1)]).await;
        created.extend(ledger.create_receipts(&event, &cashier(), vec![input]).await.unwrap());
    }

    let listed = ledger.list_receipts(&event).await.unwrap();
    let listed_ids: Vec<_> = listed.iter().map(|r| r.id).collect();
    let created_ids: Vec<_> = created.iter().map(|r| r.id).collect();
    assert_eq!(listed_ids, created_ids);
    assert!(listed.iter().all(|r| r.records[0].item_code == code("B")));
}
