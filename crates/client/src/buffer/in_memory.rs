use std::collections::HashMap;
use std::sync::RwLock;

use kiradopay_core::{EventCode, LocalReceiptId};

use super::{BufferError, BufferedReceipt, ReceiptBuffer};

/// Buffer kept in process memory (tests and sessions that need no durability).
#[derive(Debug, Default)]
pub struct InMemoryReceiptBuffer {
    events: RwLock<HashMap<EventCode, Vec<BufferedReceipt>>>,
}

impl InMemoryReceiptBuffer {
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned<T>(_: T) -> BufferError {
    BufferError::Storage("lock poisoned".to_string())
}

#[async_trait::async_trait]
impl ReceiptBuffer for InMemoryReceiptBuffer {
    async fn append(&self, receipt: BufferedReceipt) -> Result<(), BufferError> {
        let mut events = self.events.write().map_err(poisoned)?;
        let entries = events.entry(receipt.event_code.clone()).or_default();
        if entries.iter().any(|e| e.local_id == receipt.local_id) {
            return Err(BufferError::Duplicate(receipt.local_id));
        }
        entries.push(receipt);
        Ok(())
    }

    async fn list_local(&self, event: &EventCode) -> Result<Vec<BufferedReceipt>, BufferError> {
        let events = self.events.read().map_err(poisoned)?;
        Ok(events.get(event).cloned().unwrap_or_default())
    }

    async fn remove(&self, event: &EventCode, ids: &[LocalReceiptId]) -> Result<u64, BufferError> {
        let mut events = self.events.write().map_err(poisoned)?;
        let Some(entries) = events.get_mut(event) else {
            return Ok(0);
        };
        let before = entries.len();
        entries.retain(|e| !ids.contains(&e.local_id));
        let removed = (before - entries.len()) as u64;
        if entries.is_empty() {
            events.remove(event);
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::contract;

    #[tokio::test]
    async fn keeps_append_order_per_event() {
        contract::keeps_append_order_per_event(&InMemoryReceiptBuffer::new()).await;
    }

    #[tokio::test]
    async fn rejects_duplicate_local_ids() {
        contract::rejects_duplicate_local_ids(&InMemoryReceiptBuffer::new()).await;
    }

    #[tokio::test]
    async fn removes_only_within_event() {
        contract::removes_only_within_event(&InMemoryReceiptBuffer::new()).await;
    }
}
