//! `kiradopay-calculator`: event pricing functions.
//!
//! An event owner writes the body of `function calculate(state) { ... }` in a
//! small, pure JavaScript subset. [`Calculator::compile`] validates it once
//! (syntax *and* name resolution) and [`Calculator::evaluate`] runs it against a
//! [`CalculatorState`] to produce the sale total.
//!
//! - No IO
//! - No ambient globals: only `state` and a fixed set of `Math` built-ins
//! - Bounded: source length, nesting depth and evaluation steps are capped
//!
//! ```
//! use kiradopay_calculator::{Calculator, CalculatorState, RecordState};
//! use kiradopay_core::ItemCode;
//!
//! let calc = Calculator::compile("return state.A.count * 500;").unwrap();
//! let state: CalculatorState = [(ItemCode::parse("A").unwrap(), RecordState::new(3))]
//!     .into_iter()
//!     .collect();
//! assert_eq!(calc.evaluate(&state).unwrap(), 1500.0);
//! ```

mod ast;
mod error;
mod eval;
mod lexer;
mod parser;
mod playground;
mod resolve;
mod state;

use std::sync::Arc;

pub use error::{CalculationError, CompileError, Position};
pub use eval::DEFAULT_STEP_LIMIT;
pub use parser::MAX_DEPTH;
pub use playground::state_shape;
pub use state::{CalculatorState, RecordState};

use ast::Program;
use eval::{Interpreter, Value};

/// Maximum accepted source length in bytes.
pub const MAX_SOURCE_LEN: usize = 64 * 1024;

/// A compiled pricing function.
///
/// Cheap to clone and safe to share between threads. A calculator built from
/// blank (or absent) source always returns zero.
#[derive(Debug, Clone)]
pub struct Calculator {
    program: Option<Arc<Program>>,
    step_limit: u64,
}

impl Calculator {
    /// The calculator of an event that has none configured.
    pub fn zero() -> Self {
        Self {
            program: None,
            step_limit: DEFAULT_STEP_LIMIT,
        }
    }

    pub fn compile(source: &str) -> Result<Self, CompileError> {
        if source.len() > MAX_SOURCE_LEN {
            return Err(CompileError::TooLong(MAX_SOURCE_LEN));
        }
        if source.trim().is_empty() {
            return Ok(Self::zero());
        }

        let tokens = lexer::Lexer::new(source).tokenize()?;
        let program = parser::Parser::new(tokens).parse_program()?;
        resolve::Resolver::resolve(&program)?;

        Ok(Self {
            program: Some(Arc::new(program)),
            step_limit: DEFAULT_STEP_LIMIT,
        })
    }

    /// Compile an event's optional calculator source.
    pub fn from_optional(source: Option<&str>) -> Result<Self, CompileError> {
        match source {
            Some(source) => Self::compile(source),
            None => Ok(Self::zero()),
        }
    }

    pub fn with_step_limit(mut self, step_limit: u64) -> Self {
        self.step_limit = step_limit;
        self
    }

    /// Whether this is the constant-zero calculator.
    pub fn is_zero(&self) -> bool {
        self.program.is_none()
    }

    /// Price a sale.
    ///
    /// Fails if the program throws, runs out of steps, or returns anything
    /// other than a finite number. A failure is never reported as zero.
    pub fn evaluate(&self, state: &CalculatorState) -> Result<f64, CalculationError> {
        let Some(program) = &self.program else {
            return Ok(0.0);
        };

        let result = Interpreter::new(state.to_value(), self.step_limit).run(program);
        let total = match result {
            Ok(Value::Number(n)) if n.is_finite() => Ok(n),
            Ok(Value::Number(n)) => Err(CalculationError::NonFinite(n)),
            Ok(other) => Err(CalculationError::NonNumeric(other.type_of())),
            Err(e) => Err(e),
        };
        if let Err(e) = &total {
            tracing::debug!(error = %e, items = state.len(), "calculator evaluation failed");
        }
        total
    }
}

impl Default for Calculator {
    fn default() -> Self {
        Self::zero()
    }
}

/// Whether `source` is an acceptable calculator body.
///
/// Accepts exactly what [`evaluate`] can run.
pub fn compile(source: &str) -> bool {
    Calculator::compile(source).is_ok()
}

/// Compile and run `source` against `state` in one step.
pub fn evaluate(source: &str, state: &CalculatorState) -> Result<f64, CalculationError> {
    Ok(Calculator::compile(source)?.evaluate(state)?)
}
