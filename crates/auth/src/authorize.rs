use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use kiradopay_core::{DomainError, UserId};

use crate::{JwtValidator, Scope, TokenValidationError};

/// A verified token: who is acting and what they may do.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    pub user_id: UserId,
    pub name: Option<String>,
    pub email: Option<String>,
    pub scopes: Vec<Scope>,
}

impl Token {
    pub fn has_scope(&self, scope: &Scope) -> bool {
        self.scopes.iter().any(|s| s == scope)
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("missing bearer token")]
    MissingToken,

    #[error("invalid token: {0}")]
    InvalidToken(String),

    #[error("token rejected: {0}")]
    Claims(#[from] TokenValidationError),

    #[error("forbidden: missing scope '{0}'")]
    Forbidden(String),
}

impl AuthError {
    /// Whether the caller failed to authenticate at all (as opposed to lacking a scope).
    pub fn is_unauthenticated(&self) -> bool {
        !matches!(self, AuthError::Forbidden(_))
    }
}

impl From<AuthError> for DomainError {
    fn from(value: AuthError) -> Self {
        DomainError::unauthorized(value.to_string())
    }
}

/// Check that a verified token carries every required scope.
///
/// - No IO
/// - No panics
pub fn authorize(token: &Token, required: &[Scope]) -> Result<(), AuthError> {
    match required.iter().find(|scope| !token.has_scope(scope)) {
        Some(missing) => Err(AuthError::Forbidden(missing.as_str().to_string())),
        None => Ok(()),
    }
}

/// Verify a bearer token and its scopes.
///
/// `bearer` is the raw token extracted from the request (if any). Returns the
/// verified [`Token`] or the reason it was rejected; nothing downstream runs on
/// a rejected request.
pub fn verify(
    validator: &dyn JwtValidator,
    bearer: Option<&str>,
    required: &[Scope],
    now: DateTime<Utc>,
) -> Result<Token, AuthError> {
    let raw = bearer
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or(AuthError::MissingToken)?;

    let claims = validator.validate(raw, now)?;
    let token = Token {
        user_id: claims.sub,
        name: claims.name,
        email: claims.email,
        scopes: claims.scopes,
    };

    authorize(&token, required)?;
    Ok(token)
}
