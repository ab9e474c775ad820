//! `kiradopay-auth`: the authentication collaborator boundary.
//!
//! Sessions are issued elsewhere; this crate only verifies bearer tokens and
//! checks scopes. It is intentionally decoupled from HTTP and storage.

pub mod authorize;
pub mod claims;
pub mod scopes;
pub mod validator;

pub use authorize::{authorize, verify, AuthError, Token};
pub use claims::{JwtClaims, TokenValidationError, validate_claims};
pub use scopes::Scope;
pub use validator::{Hs256JwtValidator, JwtValidator};
