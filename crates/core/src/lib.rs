//! `kiradopay-core`: domain foundation building blocks.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns):
//! validated codes, identifiers, and the error taxonomy shared by every layer.

pub mod code;
pub mod entity;
pub mod error;
pub mod id;

pub use code::{EventCode, ItemCode};
pub use entity::Entity;
pub use error::{DomainError, DomainResult, ErrorClass};
pub use id::{LocalReceiptId, ReceiptId, UserId};
