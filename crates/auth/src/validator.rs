//! Signature verification for bearer tokens.

use chrono::{DateTime, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};

use crate::{validate_claims, AuthError, JwtClaims};

/// Decodes a raw bearer token into validated claims.
pub trait JwtValidator: Send + Sync {
    fn validate(&self, token: &str, now: DateTime<Utc>) -> Result<JwtClaims, AuthError>;
}

/// HS256 shared-secret validator.
#[derive(Clone)]
pub struct Hs256JwtValidator {
    secret: Vec<u8>,
}

impl Hs256JwtValidator {
    pub fn new(secret: Vec<u8>) -> Self {
        Self { secret }
    }

    /// Sign claims with the shared secret (used by dev tooling and tests).
    pub fn issue(&self, claims: &JwtClaims) -> Result<String, AuthError> {
        jsonwebtoken::encode(
            &Header::new(Algorithm::HS256),
            claims,
            &EncodingKey::from_secret(&self.secret),
        )
        .map_err(|e| AuthError::InvalidToken(e.to_string()))
    }
}

impl core::fmt::Debug for Hs256JwtValidator {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Hs256JwtValidator").finish_non_exhaustive()
    }
}

impl JwtValidator for Hs256JwtValidator {
    fn validate(&self, token: &str, now: DateTime<Utc>) -> Result<JwtClaims, AuthError> {
        // Time-window checks happen in `validate_claims` against the caller's clock.
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        validation.required_spec_claims.clear();

        let data = jsonwebtoken::decode::<JwtClaims>(
            token,
            &DecodingKey::from_secret(&self.secret),
            &validation,
        )
        .map_err(|e| AuthError::InvalidToken(e.to_string()))?;

        validate_claims(&data.claims, now)?;
        Ok(data.claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Scope, TokenValidationError};
    use chrono::Duration;
    use kiradopay_core::UserId;

    #[test]
    fn expired_tokens_fail_claim_validation() {
        let validator = Hs256JwtValidator::new(b"secret".to_vec());
        let now = Utc::now();
        let raw = validator
            .issue(&JwtClaims {
                sub: UserId::new("u"),
                name: None,
                email: None,
                scopes: vec![Scope::READ],
                issued_at: now - Duration::hours(2),
                expires_at: now - Duration::hours(1),
            })
            .unwrap();

        let err = validator.validate(&raw, now).unwrap_err();
        assert_eq!(err, AuthError::Claims(TokenValidationError::Expired));
    }

    #[test]
    fn garbage_is_invalid() {
        let validator = Hs256JwtValidator::new(b"secret".to_vec());
        assert!(matches!(
            validator.validate("not.a.jwt", Utc::now()),
            Err(AuthError::InvalidToken(_))
        ));
    }
}
