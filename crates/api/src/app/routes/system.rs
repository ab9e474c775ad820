use axum::{Json, extract::Extension, response::IntoResponse};

use crate::context::AuthContext;

/// The verified token of the caller.
pub async fn me(Extension(auth): Extension<AuthContext>) -> impl IntoResponse {
    Json(auth.token().clone())
}
