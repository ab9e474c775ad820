use std::sync::Arc;

use axum::{
    Json,
    extract::{Extension, rejection::JsonRejection},
    http::StatusCode,
};

use kiradopay_catalog::NewItem;

use crate::app::AppServices;
use crate::app::errors;
use crate::app::routes::body;

pub async fn list_items(Extension(services): Extension<Arc<AppServices>>) -> axum::response::Response {
    errors::respond(services.catalog.list_items().await, StatusCode::OK)
}

pub async fn create_item(
    Extension(services): Extension<Arc<AppServices>>,
    payload: Result<Json<NewItem>, JsonRejection>,
) -> axum::response::Response {
    let input = match body(payload) {
        Ok(input) => input,
        Err(e) => return errors::domain_error_to_response(e),
    };
    errors::respond(services.catalog.create_item(input).await, StatusCode::CREATED)
}
