use std::sync::Arc;

use axum::{
    extract::State,
    http::{HeaderMap, Method},
    middleware::Next,
    response::Response,
};
use chrono::Utc;
use tracing::warn;

use kiradopay_auth::{JwtValidator, Scope, verify};

use crate::app::errors;
use crate::context::AuthContext;

#[derive(Clone)]
pub struct AuthState {
    pub jwt: Arc<dyn JwtValidator>,
}

/// Scope a request needs: reads need `read`, everything else `write`.
pub fn required_scope(method: &Method) -> Scope {
    if method == Method::GET || method == Method::HEAD {
        Scope::READ
    } else {
        Scope::WRITE
    }
}

pub async fn auth_middleware(
    State(state): State<AuthState>,
    mut req: axum::http::Request<axum::body::Body>,
    next: Next,
) -> Response {
    let scope = required_scope(req.method());
    let bearer = extract_bearer(req.headers());

    let token = match verify(state.jwt.as_ref(), bearer, &[scope], Utc::now()) {
        Ok(token) => token,
        Err(err) => {
            warn!(path = %req.uri().path(), error = %err, "request rejected");
            return errors::auth_error_to_response(&err);
        }
    };

    req.extensions_mut().insert(AuthContext::new(token));
    next.run(req).await
}

fn extract_bearer(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(axum::http::header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn reads_need_read_scope_and_writes_need_write() {
        assert_eq!(required_scope(&Method::GET), Scope::READ);
        assert_eq!(required_scope(&Method::POST), Scope::WRITE);
        assert_eq!(required_scope(&Method::PATCH), Scope::WRITE);
    }

    #[test]
    fn bearer_prefix_is_required() {
        let mut headers = HeaderMap::new();
        assert_eq!(extract_bearer(&headers), None);

        headers.insert(
            axum::http::header::AUTHORIZATION,
            HeaderValue::from_static("Basic abc"),
        );
        assert_eq!(extract_bearer(&headers), None);

        headers.insert(
            axum::http::header::AUTHORIZATION,
            HeaderValue::from_static("Bearer abc.def"),
        );
        assert_eq!(extract_bearer(&headers), Some("abc.def"));
    }
}
