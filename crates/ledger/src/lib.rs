//! Receipt ledger domain module.
//!
//! Receipts and their records as persisted by the server, plus the input
//! shape a register submits. Pure domain logic: validation and record
//! indexing (no IO, no HTTP, no storage).

pub mod receipt;

pub use receipt::{
    validate_batch, Receipt, ReceiptInput, Record, RecordInput, MAX_RECORDS_PER_RECEIPT,
};
