//! Infrastructure layer: storage backends and the services built on them.

pub mod catalog;
pub mod ledger;
pub mod store;

#[cfg(test)]
mod integration_tests;

pub use catalog::CatalogService;
pub use ledger::ReceiptLedger;
pub use store::{InMemoryPosStore, PosStore, PostgresPosStore, StorageError};
