//! Local buffer for receipts the server could not be reached for.
//!
//! Entries are scoped by event code and keep a client-generated
//! [`LocalReceiptId`] that is also sent as the receipt's `client_id`, so a
//! later sync can tell which entries the server already holds.

mod in_memory;
mod sqlite;

pub use in_memory::InMemoryReceiptBuffer;
pub use sqlite::SqliteReceiptBuffer;

use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use kiradopay_core::{DomainError, EventCode, LocalReceiptId};
use kiradopay_ledger::ReceiptInput;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BufferError {
    #[error("receipt {0} is already buffered")]
    Duplicate(LocalReceiptId),
    #[error("buffer storage failed: {0}")]
    Storage(String),
    #[error("buffered entry is corrupt: {0}")]
    Corrupt(String),
}

impl From<sqlx::Error> for BufferError {
    fn from(err: sqlx::Error) -> Self {
        BufferError::Storage(err.to_string())
    }
}

impl From<BufferError> for DomainError {
    fn from(err: BufferError) -> Self {
        DomainError::unknown(err.to_string())
    }
}

/// A sale recorded locally while the server was unreachable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BufferedReceipt {
    pub local_id: LocalReceiptId,
    pub event_code: EventCode,
    /// When the sale was rung up on this register.
    pub created_at: DateTime<Utc>,
    /// Submitted as-is on sync; `client_id` always equals `local_id`.
    pub input: ReceiptInput,
}

impl BufferedReceipt {
    /// Wrap an input, reusing its `client_id` or assigning a fresh one.
    pub fn new(event_code: EventCode, mut input: ReceiptInput) -> Self {
        let local_id = *input.client_id.get_or_insert_with(LocalReceiptId::new);
        Self {
            local_id,
            event_code,
            created_at: Utc::now().trunc_subsecs(6),
            input,
        }
    }
}

/// Per-event store of unsynced receipts.
#[async_trait::async_trait]
pub trait ReceiptBuffer: Send + Sync {
    /// Fails with [`BufferError::Duplicate`] if the local id is already buffered.
    async fn append(&self, receipt: BufferedReceipt) -> Result<(), BufferError>;

    /// Buffered receipts of `event`, in append order.
    async fn list_local(&self, event: &EventCode) -> Result<Vec<BufferedReceipt>, BufferError>;

    /// Evict entries; unknown ids are ignored. Returns how many were removed.
    async fn remove(&self, event: &EventCode, ids: &[LocalReceiptId]) -> Result<u64, BufferError>;
}

#[async_trait::async_trait]
impl<B> ReceiptBuffer for std::sync::Arc<B>
where
    B: ReceiptBuffer + ?Sized,
{
    async fn append(&self, receipt: BufferedReceipt) -> Result<(), BufferError> {
        (**self).append(receipt).await
    }

    async fn list_local(&self, event: &EventCode) -> Result<Vec<BufferedReceipt>, BufferError> {
        (**self).list_local(event).await
    }

    async fn remove(&self, event: &EventCode, ids: &[LocalReceiptId]) -> Result<u64, BufferError> {
        (**self).remove(event, ids).await
    }
}

#[cfg(test)]
pub(crate) mod contract {
    //! Behaviour every buffer implementation must share.

    use super::*;
    use kiradopay_core::ItemCode;
    use kiradopay_ledger::RecordInput;

    pub fn event(code: &str) -> EventCode {
        EventCode::parse(code).unwrap()
    }

    pub fn sale(event_code: &str, item: &str, count: i64) -> BufferedReceipt {
        BufferedReceipt::new(
            event(event_code),
            ReceiptInput {
                total: count * 100,
                client_id: None,
                records: vec![RecordInput {
                    item_code: ItemCode::parse(item).unwrap(),
                    count,
                    dedication: false,
                }],
            },
        )
    }

    pub async fn keeps_append_order_per_event(buffer: &impl ReceiptBuffer) {
        let first = sale("EXPO24", "A", 1);
        let second = sale("EXPO24", "B", 2);
        let other = sale("FAIR24", "A", 3);
        buffer.append(first.clone()).await.unwrap();
        buffer.append(other.clone()).await.unwrap();
        buffer.append(second.clone()).await.unwrap();

        assert_eq!(
            buffer.list_local(&event("EXPO24")).await.unwrap(),
            vec![first, second]
        );
        assert_eq!(buffer.list_local(&event("FAIR24")).await.unwrap(), vec![other]);
        assert!(buffer.list_local(&event("NONE")).await.unwrap().is_empty());
    }

    pub async fn rejects_duplicate_local_ids(buffer: &impl ReceiptBuffer) {
        let entry = sale("EXPO24", "A", 1);
        buffer.append(entry.clone()).await.unwrap();

        match buffer.append(entry.clone()).await.unwrap_err() {
            BufferError::Duplicate(id) => assert_eq!(id, entry.local_id),
            other => panic!("Expected Duplicate error, got {other:?}"),
        }
        assert_eq!(buffer.list_local(&event("EXPO24")).await.unwrap().len(), 1);
    }

    pub async fn removes_only_within_event(buffer: &impl ReceiptBuffer) {
        let a = sale("EXPO24", "A", 1);
        let b = sale("EXPO24", "B", 1);
        let c = sale("FAIR24", "A", 1);
        for entry in [&a, &b, &c] {
            buffer.append(entry.clone()).await.unwrap();
        }

        let removed = buffer
            .remove(&event("EXPO24"), &[a.local_id, c.local_id, LocalReceiptId::new()])
            .await
            .unwrap();
        assert_eq!(removed, 1);
        assert_eq!(buffer.list_local(&event("EXPO24")).await.unwrap(), vec![b]);
        assert_eq!(buffer.list_local(&event("FAIR24")).await.unwrap(), vec![c]);
        assert_eq!(buffer.remove(&event("EXPO24"), &[]).await.unwrap(), 0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_entry_carries_its_local_id_as_client_id() {
        let entry = contract::sale("EXPO24", "A", 1);
        assert_eq!(entry.input.client_id, Some(entry.local_id));

        let fixed = LocalReceiptId::new();
        let mut input = entry.input.clone();
        input.client_id = Some(fixed);
        let entry = BufferedReceipt::new(contract::event("EXPO24"), input);
        assert_eq!(entry.local_id, fixed);
    }
}
