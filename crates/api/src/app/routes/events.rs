use std::sync::Arc;

use axum::{
    Json,
    extract::{Extension, Path, rejection::JsonRejection},
    http::StatusCode,
};

use kiradopay_catalog::{EventUpdate, NewEvent};

use crate::app::AppServices;
use crate::app::errors;
use crate::app::routes::{body, event_code};

pub async fn list_events(Extension(services): Extension<Arc<AppServices>>) -> axum::response::Response {
    errors::respond(services.catalog.list_events().await, StatusCode::OK)
}

pub async fn create_event(
    Extension(services): Extension<Arc<AppServices>>,
    payload: Result<Json<NewEvent>, JsonRejection>,
) -> axum::response::Response {
    let input = match body(payload) {
        Ok(input) => input,
        Err(e) => return errors::domain_error_to_response(e),
    };
    errors::respond(services.catalog.create_event(input).await, StatusCode::CREATED)
}

pub async fn get_event(
    Extension(services): Extension<Arc<AppServices>>,
    Path(code): Path<String>,
) -> axum::response::Response {
    let code = match event_code(code) {
        Ok(code) => code,
        Err(e) => return errors::domain_error_to_response(e),
    };
    errors::respond(services.catalog.get_event(&code).await, StatusCode::OK)
}

/// Partial update: any of `code`, `name`, `date`, `calculator`, `items`.
pub async fn update_event(
    Extension(services): Extension<Arc<AppServices>>,
    Path(code): Path<String>,
    payload: Result<Json<EventUpdate>, JsonRejection>,
) -> axum::response::Response {
    let parsed = event_code(code).and_then(|code| Ok((code, body(payload)?)));
    let (code, update) = match parsed {
        Ok(parsed) => parsed,
        Err(e) => return errors::domain_error_to_response(e),
    };
    errors::respond(services.catalog.update_event(&code, update).await, StatusCode::OK)
}
