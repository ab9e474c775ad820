//! Receipt ledger service.
//!
//! Orchestrates a batch write against any [`PosStore`]:
//!
//! ```text
//! [ReceiptInput...]
//!   ↓
//! 1. Validate the whole batch (no storage access)
//!   ↓
//! 2. Stamp: server id, acting user, server timestamp, record indices
//!   ↓
//! 3. Insert atomically (store checks event, display and client ids)
//!   ↓
//! 4. Classify storage failures into DomainError
//! ```
//!
//! Validation failures never touch storage. Storage failures are lifted through
//! [`StorageError::classify`]; only `Transient` results are eligible for the
//! client's offline buffer.

use chrono::{SubsecRound, Utc};
use tracing::{error, info, warn};

use kiradopay_core::{DomainError, DomainResult, ErrorClass, EventCode, ReceiptId, UserId};
use kiradopay_ledger::{validate_batch, Receipt, ReceiptInput};

use crate::store::{PosStore, StorageError};

/// Create, list and delete receipts of an event.
#[derive(Debug, Clone)]
pub struct ReceiptLedger<S> {
    store: S,
}

impl<S: PosStore> ReceiptLedger<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Receipts of an event ordered by `(created_at, id)`.
    pub async fn list_receipts(&self, event: &EventCode) -> DomainResult<Vec<Receipt>> {
        self.store
            .list_receipts(event)
            .await
            .map_err(|e| lift(e, "list_receipts", event))
    }

    /// Persist a batch of receipts, all or nothing.
    ///
    /// Records are indexed in submission order and every receipt is stamped
    /// with `user` and the server clock. Receipts of one batch share a
    /// timestamp and keep their batch order through time-ordered ids.
    pub async fn create_receipts(
        &self,
        event: &EventCode,
        user: &UserId,
        inputs: Vec<ReceiptInput>,
    ) -> DomainResult<Vec<Receipt>> {
        if inputs.is_empty() {
            return Ok(Vec::new());
        }
        validate_batch(&inputs)?;

        // Postgres keeps microseconds; truncate so stored and returned values agree.
        let created_at = Utc::now().trunc_subsecs(6);
        let receipts = inputs
            .into_iter()
            .map(|input| input.into_receipt(ReceiptId::new(), event.clone(), user.clone(), created_at))
            .collect::<DomainResult<Vec<_>>>()?;

        let created = self
            .store
            .insert_receipts(event, receipts)
            .await
            .map_err(|e| lift(e, "create_receipts", event))?;

        info!(
            event_code = %event,
            user_id = %user,
            receipt_count = created.len(),
            "receipts created"
        );
        Ok(created)
    }

    /// Delete receipts of an event. Unknown ids and ids of other events only reduce the count.
    pub async fn delete_receipts(&self, event: &EventCode, ids: &[ReceiptId]) -> DomainResult<u64> {
        if ids.is_empty() {
            return Ok(0);
        }
        let deleted = self
            .store
            .delete_receipts(event, ids)
            .await
            .map_err(|e| lift(e, "delete_receipts", event))?;

        info!(event_code = %event, requested = ids.len(), deleted, "receipts deleted");
        Ok(deleted)
    }
}

/// Classify a storage failure, log it, and phrase it for the caller.
fn lift(err: StorageError, operation: &str, event: &EventCode) -> DomainError {
    let class = err.classify();
    let message = match &err {
        StorageError::UniqueViolation(_) => "receipt already submitted".to_string(),
        StorageError::RowNotFound(_) => format!("event not found: {event}"),
        other => other.message().to_string(),
    };

    match class {
        ErrorClass::Unknown => error!(operation, event_code = %event, error = %err, "storage failure"),
        ErrorClass::Conflict | ErrorClass::Transient => {
            warn!(operation, event_code = %event, class = %class, error = %err, "receipt write rejected")
        }
        ErrorClass::NotFound => {}
    }

    DomainError::from_class(class, message)
}
