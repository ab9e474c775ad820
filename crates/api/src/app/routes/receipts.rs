use std::sync::Arc;

use axum::{
    Json,
    extract::{Extension, Path, rejection::JsonRejection},
    http::StatusCode,
};
use serde::{Deserialize, Serialize};

use kiradopay_core::ReceiptId;
use kiradopay_ledger::ReceiptInput;

use crate::app::AppServices;
use crate::app::errors;
use crate::app::routes::{body, event_code};
use crate::context::AuthContext;

/// Response body of a batch delete.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteReceiptsResponse {
    pub deleted: u64,
}

pub async fn list_receipts(
    Extension(services): Extension<Arc<AppServices>>,
    Path(code): Path<String>,
) -> axum::response::Response {
    let code = match event_code(code) {
        Ok(code) => code,
        Err(e) => return errors::domain_error_to_response(e),
    };
    errors::respond(services.ledger.list_receipts(&code).await, StatusCode::OK)
}

/// Create a batch of receipts stamped with the caller's identity.
pub async fn create_receipts(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(auth): Extension<AuthContext>,
    Path(code): Path<String>,
    payload: Result<Json<Vec<ReceiptInput>>, JsonRejection>,
) -> axum::response::Response {
    let parsed = event_code(code).and_then(|code| Ok((code, body(payload)?)));
    let (code, inputs) = match parsed {
        Ok(parsed) => parsed,
        Err(e) => return errors::domain_error_to_response(e),
    };
    let result = services
        .ledger
        .create_receipts(&code, auth.user_id(), inputs)
        .await;
    errors::respond(result, StatusCode::CREATED)
}

pub async fn delete_receipts(
    Extension(services): Extension<Arc<AppServices>>,
    Path(code): Path<String>,
    payload: Result<Json<Vec<ReceiptId>>, JsonRejection>,
) -> axum::response::Response {
    let parsed = event_code(code).and_then(|code| Ok((code, body(payload)?)));
    let (code, ids) = match parsed {
        Ok(parsed) => parsed,
        Err(e) => return errors::domain_error_to_response(e),
    };
    let result = services
        .ledger
        .delete_receipts(&code, &ids)
        .await
        .map(|deleted| DeleteReceiptsResponse { deleted });
    errors::respond(result, StatusCode::OK)
}
