//! Domain error model.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Domain-level error.
///
/// Every layer (ledger, display policy, calculator, sync) eventually reports one
/// of these variants so callers can handle failures exhaustively. Only
/// `Transient` is eligible for offline buffering and retry.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Malformed input, rejected before any write.
    #[error("validation failed: {0}")]
    Validation(String),

    /// An identifier was invalid (e.g. parse failure).
    #[error("invalid identifier: {0}")]
    InvalidId(String),

    /// Missing or insufficient credentials.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// A requested resource was not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// Uniqueness or referential violation, or a lost concurrent write.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Storage or network temporarily unavailable.
    #[error("temporarily unavailable: {0}")]
    Transient(String),

    /// The pricing function failed or returned a non-numeric value.
    #[error("calculation failed: {0}")]
    Calculation(String),

    /// Anything uncategorized.
    #[error("operation failed: {0}")]
    Unknown(String),
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }

    pub fn unauthorized(msg: impl Into<String>) -> Self {
        Self::Unauthorized(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn transient(msg: impl Into<String>) -> Self {
        Self::Transient(msg.into())
    }

    pub fn calculation(msg: impl Into<String>) -> Self {
        Self::Calculation(msg.into())
    }

    pub fn unknown(msg: impl Into<String>) -> Self {
        Self::Unknown(msg.into())
    }

    /// Whether the failed operation may be buffered locally and retried later.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }

    /// Lift a classified storage/transport failure into the domain taxonomy.
    pub fn from_class(class: ErrorClass, msg: impl Into<String>) -> Self {
        match class {
            ErrorClass::Conflict => Self::Conflict(msg.into()),
            ErrorClass::NotFound => Self::NotFound(msg.into()),
            ErrorClass::Transient => Self::Transient(msg.into()),
            ErrorClass::Unknown => Self::Unknown(msg.into()),
        }
    }
}

/// Outcome of classifying a storage-layer or transport failure.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    Conflict,
    NotFound,
    Transient,
    Unknown,
}

impl ErrorClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorClass::Conflict => "conflict",
            ErrorClass::NotFound => "not_found",
            ErrorClass::Transient => "transient",
            ErrorClass::Unknown => "unknown",
        }
    }
}

impl core::fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}
