use std::borrow::Cow;

use serde::{Deserialize, Serialize};

/// Scope granted to a token.
///
/// Scopes are opaque strings; the core only ever asks for [`Scope::READ`] or
/// [`Scope::WRITE`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Scope(Cow<'static, str>);

impl Scope {
    /// Read events, items and receipts.
    pub const READ: Scope = Scope(Cow::Borrowed("read"));
    /// Create/delete receipts and edit events.
    pub const WRITE: Scope = Scope(Cow::Borrowed("write"));

    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for Scope {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}
