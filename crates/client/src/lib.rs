//! `kiradopay-client`
//!
//! **Responsibility:** the register side of the point of sale.
//!
//! This crate provides:
//! - Access to the server ledger over HTTP ([`HttpLedgerGateway`])
//! - A per-event buffer for sales made while the server is unreachable
//! - A merged view of confirmed and buffered receipts
//! - Sync of buffered receipts, on demand or from a background worker
//! - The cashier's in-progress sale ([`Register`])
//!
//! The server stays the authority: only connectivity failures are buffered,
//! every other rejection goes back to the cashier.

pub mod buffer;
pub mod config;
pub mod gateway;
pub mod merge;
pub mod register;
pub mod sync;
pub mod sync_worker;

#[cfg(test)]
mod testing;

pub use buffer::{BufferError, BufferedReceipt, InMemoryReceiptBuffer, ReceiptBuffer, SqliteReceiptBuffer};
pub use config::{ClientConfig, ConfigError};
pub use gateway::{GatewayError, HttpLedgerGateway, LedgerGateway};
pub use merge::{FlaggedReceipt, merge};
pub use register::Register;
pub use sync::{RejectedReceipt, Submission, SyncError, SyncManager, SyncReport};
pub use sync_worker::{ShutdownHandle, SyncWorker};
