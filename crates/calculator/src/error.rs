use thiserror::Error;

use kiradopay_core::DomainError;

/// Line/column of a token in calculator source (1-based).
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Position {
    pub line: u32,
    pub column: u32,
}

impl core::fmt::Display for Position {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// Why a calculator source was rejected.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CompileError {
    #[error("{at}: {message}")]
    Lex { at: Position, message: String },

    #[error("{at}: {message}")]
    Syntax { at: Position, message: String },

    /// Free identifier other than the state parameter (no ambient globals).
    #[error("unknown identifier '{0}'")]
    UnknownIdentifier(String),

    #[error("cannot assign to '{0}'")]
    AssignToConstant(String),

    #[error("'{0}' is already declared in this block")]
    Redeclared(String),

    #[error("'{0}' is reserved")]
    ReservedName(String),

    #[error("'{0}' is not a callable built-in")]
    UnsupportedCall(String),

    #[error("source exceeds {0} bytes")]
    TooLong(usize),

    #[error("expression nesting exceeds {0} levels")]
    TooDeep(usize),
}

/// Why a compiled calculator failed to produce a total.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum CalculationError {
    #[error("calculator does not compile: {0}")]
    Compile(#[from] CompileError),

    /// Runtime type error (e.g. reading a property of `undefined`).
    #[error("type error: {0}")]
    Type(String),

    #[error("calculator returned {0}, expected a number")]
    NonNumeric(&'static str),

    #[error("calculator returned non-finite number {0}")]
    NonFinite(f64),

    #[error("calculator exceeded {0} evaluation steps")]
    StepLimitExceeded(u64),
}

impl From<CalculationError> for DomainError {
    fn from(value: CalculationError) -> Self {
        match value {
            CalculationError::Compile(e) => DomainError::validation(format!("invalid calculator: {e}")),
            other => DomainError::calculation(other.to_string()),
        }
    }
}

impl From<CompileError> for DomainError {
    fn from(value: CompileError) -> Self {
        DomainError::validation(format!("invalid calculator: {value}"))
    }
}
