//! Storage boundary for the catalog, displays and receipts.
//!
//! Backends are interchangeable behind [`PosStore`]; each call is one atomic
//! unit and reports failures as a tagged [`StorageError`].

pub mod in_memory;
pub mod postgres;
pub mod r#trait;

pub use in_memory::InMemoryPosStore;
pub use postgres::PostgresPosStore;
pub use r#trait::{PosStore, StorageError};
