use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use kiradopay_auth::AuthError;
use kiradopay_core::DomainError;

/// Status and machine-readable code for each error class.
pub fn status_for(err: &DomainError) -> (StatusCode, &'static str) {
    match err {
        DomainError::Validation(_) | DomainError::InvalidId(_) => {
            (StatusCode::BAD_REQUEST, "validation_error")
        }
        DomainError::Unauthorized(_) => (StatusCode::UNAUTHORIZED, "unauthorized"),
        DomainError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
        DomainError::Conflict(_) => (StatusCode::CONFLICT, "conflict"),
        DomainError::Calculation(_) => (StatusCode::UNPROCESSABLE_ENTITY, "calculation_error"),
        DomainError::Transient(_) => (StatusCode::SERVICE_UNAVAILABLE, "unavailable"),
        DomainError::Unknown(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
    }
}

pub fn domain_error_to_response(err: DomainError) -> axum::response::Response {
    let (status, code) = status_for(&err);
    let message = match err {
        DomainError::Validation(m)
        | DomainError::InvalidId(m)
        | DomainError::Unauthorized(m)
        | DomainError::NotFound(m)
        | DomainError::Conflict(m)
        | DomainError::Calculation(m) => m,
        // Operational details stay in the logs.
        DomainError::Transient(_) => "temporarily unavailable, retry later".to_string(),
        DomainError::Unknown(_) => "operation failed".to_string(),
    };
    json_error(status, code, message)
}

pub fn auth_error_to_response(err: &AuthError) -> axum::response::Response {
    if err.is_unauthenticated() {
        json_error(StatusCode::UNAUTHORIZED, "unauthorized", err.to_string())
    } else {
        json_error(StatusCode::FORBIDDEN, "forbidden", err.to_string())
    }
}

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}

/// Turn a handler result into a response with `status` on success.
pub fn respond<T: serde::Serialize>(
    result: Result<T, DomainError>,
    status: StatusCode,
) -> axum::response::Response {
    match result {
        Ok(body) => (status, axum::Json(body)).into_response(),
        Err(e) => domain_error_to_response(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_class_has_a_distinct_status() {
        let cases = [
            (DomainError::validation("x"), StatusCode::BAD_REQUEST),
            (DomainError::unauthorized("x"), StatusCode::UNAUTHORIZED),
            (DomainError::not_found("x"), StatusCode::NOT_FOUND),
            (DomainError::conflict("x"), StatusCode::CONFLICT),
            (DomainError::calculation("x"), StatusCode::UNPROCESSABLE_ENTITY),
            (DomainError::transient("x"), StatusCode::SERVICE_UNAVAILABLE),
            (DomainError::unknown("x"), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, status) in cases {
            assert_eq!(status_for(&err).0, status, "{err}");
        }
    }

    #[test]
    fn missing_scope_is_forbidden() {
        let res = auth_error_to_response(&AuthError::Forbidden("write".to_string()));
        assert_eq!(res.status(), StatusCode::FORBIDDEN);
        let res = auth_error_to_response(&AuthError::MissingToken);
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    }
}
