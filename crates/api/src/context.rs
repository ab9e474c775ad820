use kiradopay_auth::Token;
use kiradopay_core::UserId;

/// Verified caller of a request, inserted by the auth middleware.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthContext {
    token: Token,
}

impl AuthContext {
    pub fn new(token: Token) -> Self {
        Self { token }
    }

    pub fn user_id(&self) -> &UserId {
        &self.token.user_id
    }

    pub fn token(&self) -> &Token {
        &self.token
    }
}
