use axum::{
    Json, Router,
    extract::rejection::JsonRejection,
    routing::{get, post},
};

use kiradopay_core::{DomainError, EventCode};

pub mod events;
pub mod items;
pub mod receipts;
pub mod system;

/// Router for all authenticated endpoints.
pub fn router() -> Router {
    Router::new()
        .route("/users/me", get(system::me))
        .route("/items", get(items::list_items).post(items::create_item))
        .route("/events", get(events::list_events).post(events::create_event))
        .route("/events/:code", get(events::get_event).patch(events::update_event))
        .route(
            "/events/:code/receipts",
            get(receipts::list_receipts).post(receipts::create_receipts),
        )
        .route("/events/:code/receipts/delete", post(receipts::delete_receipts))
}

/// Parse an event code taken from the path.
pub(crate) fn event_code(raw: String) -> Result<EventCode, DomainError> {
    EventCode::parse(raw)
}

/// Unwrap a JSON body, reporting malformed input as a validation error.
pub(crate) fn body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, DomainError> {
    payload
        .map(|Json(body)| body)
        .map_err(|rejection| DomainError::validation(rejection.body_text()))
}
