use std::sync::Arc;

use thiserror::Error;

use kiradopay_catalog::{Event, EventUpdate, Item};
use kiradopay_core::{DomainError, ErrorClass, EventCode, ReceiptId};
use kiradopay_ledger::Receipt;

/// Storage operation error.
///
/// A tagged result at the storage boundary: every backend maps its native
/// failures onto these variants so callers can handle them exhaustively via
/// [`StorageError::classify`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StorageError {
    /// A uniqueness constraint was violated (duplicate code, duplicate client id).
    #[error("unique violation: {0}")]
    UniqueViolation(String),

    /// A referential constraint was violated (undisplayed item, sold item).
    #[error("foreign key violation: {0}")]
    ForeignKeyViolation(String),

    /// A concurrent writer won (serialization failure or deadlock).
    #[error("serialization failure: {0}")]
    SerializationFailure(String),

    /// The target row does not exist.
    #[error("row not found: {0}")]
    RowNotFound(String),

    /// Connectivity, timeout, pool exhaustion or server shutdown.
    #[error("storage unavailable: {0}")]
    Unavailable(String),

    #[error("storage error: {0}")]
    Other(String),
}

impl StorageError {
    /// Classify a failure into the categories callers act on.
    ///
    /// Only [`ErrorClass::Transient`] is eligible for offline buffering.
    pub fn classify(&self) -> ErrorClass {
        match self {
            StorageError::UniqueViolation(_)
            | StorageError::ForeignKeyViolation(_)
            | StorageError::SerializationFailure(_) => ErrorClass::Conflict,
            StorageError::RowNotFound(_) => ErrorClass::NotFound,
            StorageError::Unavailable(_) => ErrorClass::Transient,
            StorageError::Other(_) => ErrorClass::Unknown,
        }
    }

    /// Map a Postgres SQLSTATE code to a storage error.
    ///
    /// | SQLSTATE | Meaning | Variant |
    /// |----------|---------|---------|
    /// | `23505` | unique violation | `UniqueViolation` |
    /// | `23503` | foreign key violation | `ForeignKeyViolation` |
    /// | `40001`, `40P01` | serialization failure, deadlock | `SerializationFailure` |
    /// | `08xxx` | connection exception | `Unavailable` |
    /// | `57P01`..`57P03` | admin/crash shutdown, cannot connect now | `Unavailable` |
    /// | other | | `Other` |
    pub fn from_sqlstate(code: &str, message: impl Into<String>) -> Self {
        let message = message.into();
        match code {
            "23505" => StorageError::UniqueViolation(message),
            "23503" => StorageError::ForeignKeyViolation(message),
            "40001" | "40P01" => StorageError::SerializationFailure(message),
            "57P01" | "57P02" | "57P03" => StorageError::Unavailable(message),
            c if c.starts_with("08") => StorageError::Unavailable(message),
            _ => StorageError::Other(message),
        }
    }

    pub fn message(&self) -> &str {
        match self {
            StorageError::UniqueViolation(m)
            | StorageError::ForeignKeyViolation(m)
            | StorageError::SerializationFailure(m)
            | StorageError::RowNotFound(m)
            | StorageError::Unavailable(m)
            | StorageError::Other(m) => m,
        }
    }
}

impl From<StorageError> for DomainError {
    fn from(value: StorageError) -> Self {
        DomainError::from_class(value.classify(), value.message())
    }
}

/// Persistence boundary for the catalog, event displays and receipts.
///
/// ## Atomicity
///
/// Every method is a single atomic unit: either all of its writes commit or
/// none do. Implementations run all checks before any write (in-memory) or
/// run inside one transaction that locks the event row first (Postgres), so
/// concurrent writers to the same event are serialized.
///
/// ## Error contract
///
/// - Missing event: `RowNotFound`
/// - Duplicate item/event code or duplicate receipt `client_id`: `UniqueViolation`
/// - Receipt line for an item not displayed by the event, display addition of an
///   item not in the catalog, or display removal of an item already sold:
///   `ForeignKeyViolation`
#[async_trait::async_trait]
pub trait PosStore: Send + Sync {
    /// Catalog items ordered by code.
    async fn list_items(&self) -> Result<Vec<Item>, StorageError>;

    async fn insert_item(&self, item: Item) -> Result<Item, StorageError>;

    /// Events ordered by date (newest first), then code.
    async fn list_events(&self) -> Result<Vec<Event>, StorageError>;

    async fn get_event(&self, code: &EventCode) -> Result<Option<Event>, StorageError>;

    /// Insert a new event. Its `items` are ignored; new events display nothing.
    async fn insert_event(&self, event: Event) -> Result<Event, StorageError>;

    /// Apply a validated partial update, including display replacement, atomically.
    async fn update_event(&self, code: &EventCode, update: &EventUpdate) -> Result<Event, StorageError>;

    /// Receipts of an event ordered by `(created_at, id)`, records by index.
    async fn list_receipts(&self, event: &EventCode) -> Result<Vec<Receipt>, StorageError>;

    /// Insert a batch of stamped receipts for one event, all or nothing.
    async fn insert_receipts(
        &self,
        event: &EventCode,
        receipts: Vec<Receipt>,
    ) -> Result<Vec<Receipt>, StorageError>;

    /// Delete receipts (and their records) of one event; ids of other events are ignored.
    async fn delete_receipts(&self, event: &EventCode, ids: &[ReceiptId]) -> Result<u64, StorageError>;
}

#[async_trait::async_trait]
impl<S> PosStore for Arc<S>
where
    S: PosStore + ?Sized,
{
    async fn list_items(&self) -> Result<Vec<Item>, StorageError> {
        (**self).list_items().await
    }

    async fn insert_item(&self, item: Item) -> Result<Item, StorageError> {
        (**self).insert_item(item).await
    }

    async fn list_events(&self) -> Result<Vec<Event>, StorageError> {
        (**self).list_events().await
    }

    async fn get_event(&self, code: &EventCode) -> Result<Option<Event>, StorageError> {
        (**self).get_event(code).await
    }

    async fn insert_event(&self, event: Event) -> Result<Event, StorageError> {
        (**self).insert_event(event).await
    }

    async fn update_event(&self, code: &EventCode, update: &EventUpdate) -> Result<Event, StorageError> {
        (**self).update_event(code, update).await
    }

    async fn list_receipts(&self, event: &EventCode) -> Result<Vec<Receipt>, StorageError> {
        (**self).list_receipts(event).await
    }

    async fn insert_receipts(
        &self,
        event: &EventCode,
        receipts: Vec<Receipt>,
    ) -> Result<Vec<Receipt>, StorageError> {
        (**self).insert_receipts(event, receipts).await
    }

    async fn delete_receipts(&self, event: &EventCode, ids: &[ReceiptId]) -> Result<u64, StorageError> {
        (**self).delete_receipts(event, ids).await
    }
}
