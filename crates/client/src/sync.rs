//! Submitting sales and pushing buffered receipts to the server.
//!
//! ```text
//! submit ──create_receipts──► server ─ ok ──► Confirmed
//!                               │
//!                               └ transient ──► buffer.append ──► Buffered
//!
//! sync_event:
//!   list_receipts ─► evict entries the server already holds
//!   for each chunk of the buffer (append order):
//!       ok         ─► evict chunk
//!       transient  ─► stop, keep the rest
//!       conflict   ─► resubmit one by one; keep and report the rejects
//! ```

use serde::Serialize;
use thiserror::Error;
use tracing::{info, instrument, warn};

use kiradopay_core::{DomainError, EventCode, LocalReceiptId};
use kiradopay_ledger::{Receipt, ReceiptInput};

use crate::buffer::{BufferError, BufferedReceipt, ReceiptBuffer};
use crate::gateway::{GatewayError, LedgerGateway};
use crate::merge::{FlaggedReceipt, confirmed_local_ids, merge};

pub const DEFAULT_BATCH_SIZE: usize = 50;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SyncError {
    #[error(transparent)]
    Gateway(#[from] GatewayError),
    #[error(transparent)]
    Buffer(#[from] BufferError),
}

impl From<SyncError> for DomainError {
    fn from(err: SyncError) -> Self {
        match err {
            SyncError::Gateway(e) => e.into(),
            SyncError::Buffer(e) => e.into(),
        }
    }
}

/// Outcome of submitting one sale.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Submission {
    /// The server stored the receipt.
    Confirmed(Receipt),
    /// The server was unreachable; the sale waits in the buffer.
    Buffered(LocalReceiptId),
}

impl Submission {
    pub fn local_id(&self) -> Option<LocalReceiptId> {
        match self {
            Submission::Confirmed(receipt) => receipt.client_id,
            Submission::Buffered(id) => Some(*id),
        }
    }
}

/// A buffered receipt the server refused; it stays buffered until resolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RejectedReceipt {
    pub local_id: LocalReceiptId,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub event_code: EventCode,
    /// Entries now held by the server (including ones found already synced).
    pub confirmed: Vec<LocalReceiptId>,
    pub rejected: Vec<RejectedReceipt>,
    /// Entries still buffered after this sync.
    pub remaining: usize,
    /// The server became unreachable during the sync.
    pub offline: bool,
}

impl SyncReport {
    fn new(event_code: EventCode) -> Self {
        Self {
            event_code,
            confirmed: Vec::new(),
            rejected: Vec::new(),
            remaining: 0,
            offline: false,
        }
    }
}

/// Owns the path from a register to the server, with the buffer as fallback.
#[derive(Debug, Clone)]
pub struct SyncManager<G, B> {
    gateway: G,
    buffer: B,
    batch_size: usize,
}

impl<G: LedgerGateway, B: ReceiptBuffer> SyncManager<G, B> {
    pub fn new(gateway: G, buffer: B) -> Self {
        Self {
            gateway,
            buffer,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    /// Receipts per create call while syncing (at least one).
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn gateway(&self) -> &G {
        &self.gateway
    }

    pub fn buffer(&self) -> &B {
        &self.buffer
    }

    /// Send one sale to the server, buffering it only if the server is unreachable.
    ///
    /// Conflicts and every other rejection are returned to the caller and
    /// nothing is buffered.
    pub async fn submit(
        &self,
        event: &EventCode,
        input: ReceiptInput,
    ) -> Result<Submission, SyncError> {
        let entry = BufferedReceipt::new(event.clone(), input);

        match self
            .gateway
            .create_receipts(event, std::slice::from_ref(&entry.input))
            .await
        {
            Ok(mut created) => match created.pop() {
                Some(receipt) => Ok(Submission::Confirmed(receipt)),
                None => Err(GatewayError::Unknown("server returned no receipt".to_string()).into()),
            },
            Err(err) if err.is_transient() => {
                warn!(event_code = %event, local_id = %entry.local_id, error = %err, "server unreachable; buffering receipt");
                let local_id = entry.local_id;
                self.buffer.append(entry).await?;
                Ok(Submission::Buffered(local_id))
            }
            Err(err) => {
                warn!(event_code = %event, error = %err, "receipt rejected");
                Err(err.into())
            }
        }
    }

    /// Server receipts and still-buffered entries, each exactly once.
    ///
    /// When the server is unreachable only buffered entries are returned.
    pub async fn view(&self, event: &EventCode) -> Result<Vec<FlaggedReceipt>, SyncError> {
        let local = self.buffer.list_local(event).await?;
        let server = match self.gateway.list_receipts(event).await {
            Ok(server) => server,
            Err(err) if err.is_transient() => {
                warn!(event_code = %event, error = %err, "server unreachable; showing buffered receipts only");
                Vec::new()
            }
            Err(err) => return Err(err.into()),
        };

        let confirmed = confirmed_local_ids(&server, &local);
        if !confirmed.is_empty() {
            self.buffer.remove(event, &confirmed).await?;
        }
        Ok(merge(&server, &local))
    }

    /// Push buffered receipts of `event` to the server.
    #[instrument(skip_all, fields(event_code = %event), err)]
    pub async fn sync_event(&self, event: &EventCode) -> Result<SyncReport, SyncError> {
        let mut report = SyncReport::new(event.clone());

        let local = self.buffer.list_local(event).await?;
        if local.is_empty() {
            return Ok(report);
        }

        let server = match self.gateway.list_receipts(event).await {
            Ok(server) => server,
            Err(err) if err.is_transient() => {
                report.offline = true;
                report.remaining = local.len();
                return Ok(report);
            }
            Err(err) => return Err(err.into()),
        };

        // A previous sync may have succeeded without us seeing the response.
        let already = confirmed_local_ids(&server, &local);
        if !already.is_empty() {
            self.buffer.remove(event, &already).await?;
            report.confirmed.extend(already.iter().copied());
        }

        let pending: Vec<_> = local
            .into_iter()
            .filter(|e| !already.contains(&e.local_id))
            .collect();

        for chunk in pending.chunks(self.batch_size) {
            if !self.push_chunk(event, chunk, &mut report).await? {
                break;
            }
        }

        report.remaining = self.buffer.list_local(event).await?.len();
        info!(
            confirmed = report.confirmed.len(),
            rejected = report.rejected.len(),
            remaining = report.remaining,
            offline = report.offline,
            "sync finished"
        );
        Ok(report)
    }

    /// Returns `false` when the sync must stop (server unreachable).
    async fn push_chunk(
        &self,
        event: &EventCode,
        chunk: &[BufferedReceipt],
        report: &mut SyncReport,
    ) -> Result<bool, SyncError> {
        let inputs: Vec<_> = chunk.iter().map(|e| e.input.clone()).collect();

        match self.gateway.create_receipts(event, &inputs).await {
            Ok(_) => {
                self.evict(event, chunk.iter().map(|e| e.local_id).collect(), report)
                    .await?;
                Ok(true)
            }
            Err(err) if err.is_transient() => {
                report.offline = true;
                Ok(false)
            }
            Err(err) if rejects_single_receipt(&err) => {
                warn!(size = chunk.len(), error = %err, "batch rejected; retrying one by one");
                for entry in chunk {
                    match self
                        .gateway
                        .create_receipts(event, std::slice::from_ref(&entry.input))
                        .await
                    {
                        Ok(_) => self.evict(event, vec![entry.local_id], report).await?,
                        Err(err) if err.is_transient() => {
                            report.offline = true;
                            return Ok(false);
                        }
                        Err(err) if rejects_single_receipt(&err) => {
                            warn!(local_id = %entry.local_id, error = %err, "buffered receipt rejected");
                            report.rejected.push(RejectedReceipt {
                                local_id: entry.local_id,
                                reason: err.to_string(),
                            });
                        }
                        Err(err) => return Err(err.into()),
                    }
                }
                Ok(true)
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn evict(
        &self,
        event: &EventCode,
        ids: Vec<LocalReceiptId>,
        report: &mut SyncReport,
    ) -> Result<(), SyncError> {
        self.buffer.remove(event, &ids).await?;
        report.confirmed.extend(ids);
        Ok(())
    }
}

/// Failures caused by the content of a receipt rather than the connection.
fn rejects_single_receipt(err: &GatewayError) -> bool {
    matches!(err, GatewayError::Conflict(_) | GatewayError::Validation(_))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use kiradopay_core::ItemCode;
    use kiradopay_ledger::RecordInput;

    use crate::buffer::InMemoryReceiptBuffer;
    use crate::testing::{LocalGateway, code, event, seed_expo};

    type Manager = SyncManager<Arc<LocalGateway>, Arc<InMemoryReceiptBuffer>>;

    fn sale(item: &str, count: i64) -> ReceiptInput {
        ReceiptInput {
            total: count * 500,
            client_id: None,
            records: vec![RecordInput {
                item_code: ItemCode::parse(item).unwrap(),
                count,
                dedication: false,
            }],
        }
    }

    async fn manager() -> (Manager, Arc<LocalGateway>, Arc<InMemoryReceiptBuffer>) {
        let gateway = Arc::new(LocalGateway::new());
        seed_expo(&gateway).await;
        let buffer = Arc::new(InMemoryReceiptBuffer::new());
        let manager = SyncManager::new(gateway.clone(), buffer.clone()).with_batch_size(2);
        (manager, gateway, buffer)
    }

    #[tokio::test]
    async fn online_submit_is_confirmed_and_not_buffered() {
        let (manager, _, buffer) = manager().await;

        let submission = manager.submit(&event(), sale("A", 1)).await.unwrap();
        match &submission {
            Submission::Confirmed(receipt) => assert_eq!(receipt.total, 500),
            other => panic!("Expected Confirmed, got {other:?}"),
        }
        assert!(submission.local_id().is_some());
        assert!(buffer.list_local(&event()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn conflicting_submit_is_returned_not_buffered() {
        let (manager, _, buffer) = manager().await;

        let err = manager.submit(&event(), sale("Z", 1)).await.unwrap_err();
        match err {
            SyncError::Gateway(GatewayError::Conflict(msg)) => assert!(msg.contains('Z')),
            other => panic!("Expected Conflict error, got {other:?}"),
        }
        assert!(buffer.list_local(&event()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn buffered_receipt_moves_to_server_after_sync() {
        let (manager, gateway, buffer) = manager().await;

        gateway.set_online(false);
        let local_id = match manager.submit(&event(), sale("A", 2)).await.unwrap() {
            Submission::Buffered(id) => id,
            other => panic!("Expected Buffered, got {other:?}"),
        };

        let view = manager.view(&event()).await.unwrap();
        assert_eq!(view.len(), 1);
        assert!(!view[0].on_server);

        let report = manager.sync_event(&event()).await.unwrap();
        assert!(report.offline);
        assert_eq!(report.remaining, 1);

        gateway.set_online(true);
        let report = manager.sync_event(&event()).await.unwrap();
        assert_eq!(report.confirmed, vec![local_id]);
        assert_eq!(report.remaining, 0);
        assert!(!report.offline);
        assert!(buffer.list_local(&event()).await.unwrap().is_empty());

        let view = manager.view(&event()).await.unwrap();
        assert_eq!(view.len(), 1);
        assert!(view[0].on_server);
        assert_eq!(view[0].local_id, Some(local_id));
    }

    #[tokio::test]
    async fn entry_confirmed_by_a_lost_response_is_evicted_not_resent() {
        let (manager, gateway, buffer) = manager().await;

        let entry = BufferedReceipt::new(event(), sale("A", 1));
        buffer.append(entry.clone()).await.unwrap();
        // The server stored it but the register never heard back.
        gateway
            .create_receipts(&event(), std::slice::from_ref(&entry.input))
            .await
            .unwrap();

        let report = manager.sync_event(&event()).await.unwrap();
        assert_eq!(report.confirmed, vec![entry.local_id]);
        assert_eq!(report.remaining, 0);
        assert_eq!(gateway.list_receipts(&event()).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn conflicting_entry_stays_buffered_while_the_rest_sync() {
        let (manager, gateway, buffer) = manager().await;

        gateway.set_online(false);
        let good = manager.submit(&event(), sale("A", 1)).await.unwrap();
        let bad = manager.submit(&event(), sale("B", 1)).await.unwrap();
        let later = manager.submit(&event(), sale("A", 3)).await.unwrap();
        gateway.set_online(true);

        // Taking B off display makes the buffered B sale unsellable.
        gateway.set_display(&event(), vec![code("A")]).await;

        let report = manager.sync_event(&event()).await.unwrap();
        assert_eq!(
            report.confirmed,
            vec![good.local_id().unwrap(), later.local_id().unwrap()]
        );
        assert_eq!(report.rejected.len(), 1);
        assert_eq!(report.rejected[0].local_id, bad.local_id().unwrap());
        assert_eq!(report.remaining, 1);

        let left = buffer.list_local(&event()).await.unwrap();
        assert_eq!(left[0].local_id, bad.local_id().unwrap());
        assert_eq!(gateway.list_receipts(&event()).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn missing_event_fails_the_sync_and_keeps_the_buffer() {
        let (manager, _, buffer) = manager().await;
        let unknown = EventCode::parse("GONE").unwrap();
        buffer
            .append(BufferedReceipt::new(unknown.clone(), sale("A", 1)))
            .await
            .unwrap();

        match manager.sync_event(&unknown).await.unwrap_err() {
            SyncError::Gateway(GatewayError::NotFound(_)) => {}
            other => panic!("Expected NotFound error, got {other:?}"),
        }
        assert_eq!(buffer.list_local(&unknown).await.unwrap().len(), 1);
    }
}
