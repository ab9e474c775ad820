//! Human-readable codes identifying events and catalog items.
//!
//! Codes appear in URLs and in pricing functions (`state.A.count`), so they are
//! restricted to a small, URL-safe alphabet and validated on construction.

use core::str::FromStr;
use serde::{Deserialize, Serialize};

use crate::error::DomainError;

/// Maximum length of an event or item code.
pub const MAX_CODE_LEN: usize = 32;

/// Code of an event (e.g. `EXPO24`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct EventCode(String);

/// Code of a catalog item (e.g. `A`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ItemCode(String);

fn validate_code(kind: &str, value: &str) -> Result<(), DomainError> {
    if value.is_empty() {
        return Err(DomainError::validation(format!("{kind} must not be empty")));
    }
    if value.len() > MAX_CODE_LEN {
        return Err(DomainError::validation(format!(
            "{kind} must be at most {MAX_CODE_LEN} characters"
        )));
    }
    if let Some(c) = value
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || *c == '_' || *c == '-'))
    {
        return Err(DomainError::validation(format!(
            "{kind} contains invalid character {c:?}"
        )));
    }
    Ok(())
}

macro_rules! impl_code_newtype {
    ($t:ident, $kind:literal) => {
        impl $t {
            pub fn parse(value: impl Into<String>) -> Result<Self, DomainError> {
                let value = value.into();
                validate_code($kind, &value)?;
                Ok(Self(value))
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl core::fmt::Display for $t {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl FromStr for $t {
            type Err = DomainError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::parse(s)
            }
        }

        impl TryFrom<String> for $t {
            type Error = DomainError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                Self::parse(value)
            }
        }

        impl From<$t> for String {
            fn from(value: $t) -> Self {
                value.0
            }
        }

        impl AsRef<str> for $t {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

impl_code_newtype!(EventCode, "event code");
impl_code_newtype!(ItemCode, "item code");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_url_safe_codes() {
        assert_eq!(EventCode::parse("EXPO24").unwrap().as_str(), "EXPO24");
        assert!(ItemCode::parse("book-01_b").is_ok());
    }

    #[test]
    fn rejects_empty_long_and_unsafe_codes() {
        assert!(matches!(
            EventCode::parse(""),
            Err(DomainError::Validation(_))
        ));
        assert!(matches!(
            ItemCode::parse("x".repeat(MAX_CODE_LEN + 1)),
            Err(DomainError::Validation(_))
        ));
        match ItemCode::parse("a/b") {
            Err(DomainError::Validation(msg)) if msg.contains("invalid character") => {}
            other => panic!("Expected Validation, got {other:?}"),
        }
    }

    #[test]
    fn deserialization_validates() {
        let ok: ItemCode = serde_json::from_str("\"A\"").unwrap();
        assert_eq!(ok.as_str(), "A");
        assert!(serde_json::from_str::<ItemCode>("\"a b\"").is_err());
    }
}
