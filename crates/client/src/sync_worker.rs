//! Background worker that periodically syncs buffered receipts.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Notify, RwLock};
use tokio::task::JoinHandle;

use kiradopay_core::EventCode;

use crate::buffer::ReceiptBuffer;
use crate::gateway::LedgerGateway;
use crate::sync::SyncManager;

const MAX_BACKOFF: Duration = Duration::from_secs(300);

/// Stops a running [`SyncWorker`].
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    shutdown: Arc<Notify>,
}

impl ShutdownHandle {
    pub fn shutdown(&self) {
        self.shutdown.notify_one();
    }
}

pub struct SyncWorker<G, B> {
    manager: Arc<SyncManager<G, B>>,
    events: Arc<RwLock<Vec<EventCode>>>,
    interval: Duration,
    shutdown: Arc<Notify>,
}

impl<G, B> SyncWorker<G, B>
where
    G: LedgerGateway + 'static,
    B: ReceiptBuffer + 'static,
{
    pub fn new(manager: Arc<SyncManager<G, B>>, interval: Duration) -> Self {
        Self {
            manager,
            events: Arc::new(RwLock::new(Vec::new())),
            interval,
            shutdown: Arc::new(Notify::new()),
        }
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            shutdown: self.shutdown.clone(),
        }
    }

    /// Add an event whose buffer should be synced.
    pub async fn watch(&self, event: EventCode) {
        let mut events = self.events.write().await;
        if !events.contains(&event) {
            tracing::info!(event_code = %event, "watching event for sync");
            events.push(event);
        }
    }

    pub async fn unwatch(&self, event: &EventCode) {
        self.events.write().await.retain(|e| e != event);
    }

    /// Spawn the sync loop. It runs until the shutdown handle fires.
    ///
    /// An event that fails to sync (or finds the server offline) delays the
    /// next round with exponential backoff, capped at five minutes.
    pub fn start(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            tracing::info!(interval = ?self.interval, "sync worker started");

            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            let mut consecutive_failures = 0u32;

            loop {
                tokio::select! {
                    _ = self.shutdown.notified() => break,
                    _ = ticker.tick() => {}
                }

                let events = self.events.read().await.clone();
                let mut failed = false;
                for event in &events {
                    match self.manager.sync_event(event).await {
                        Ok(report) if report.offline => failed = true,
                        Ok(_) => {}
                        Err(err) => {
                            tracing::warn!(event_code = %event, error = %err, "sync failed");
                            failed = true;
                        }
                    }
                }

                if !failed {
                    consecutive_failures = 0;
                    continue;
                }

                consecutive_failures += 1;
                let backoff = backoff(self.interval, consecutive_failures);
                tracing::debug!(consecutive_failures, ?backoff, "backing off before next sync");
                tokio::select! {
                    _ = self.shutdown.notified() => break,
                    _ = tokio::time::sleep(backoff) => {}
                }
            }

            tracing::info!("sync worker stopped");
        })
    }
}

/// Extra wait after `failures` failed rounds in a row.
fn backoff(interval: Duration, failures: u32) -> Duration {
    let factor = 1u32 << failures.min(5);
    interval.saturating_mul(factor).min(MAX_BACKOFF)
}
