//! Access to the server-side ledger from a register.
//!
//! Every failure is classified into a [`GatewayError`] so callers can decide
//! what to do without inspecting HTTP details:
//!
//! | Outcome                                   | Class        |
//! |-------------------------------------------|--------------|
//! | 409                                       | `Conflict`   |
//! | 404                                       | `NotFound`   |
//! | connect error, timeout, 502 / 503 / 504   | `Transient`  |
//! | 400                                       | `Validation` |
//! | 401 / 403                                 | `Auth`       |
//! | anything else                             | `Unknown`    |
//!
//! Only `Transient` failures are buffered for a later sync.

use std::time::Duration;

use serde::Deserialize;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::debug;

use kiradopay_catalog::Event;
use kiradopay_core::{DomainError, EventCode, ReceiptId};
use kiradopay_ledger::{Receipt, ReceiptInput};

use crate::config::ClientConfig;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GatewayError {
    #[error("rejected: {0}")]
    Validation(String),
    #[error("not authorized ({status}): {message}")]
    Auth { status: u16, message: String },
    #[error("not found: {0}")]
    NotFound(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("server unreachable: {0}")]
    Transient(String),
    #[error("request failed: {0}")]
    Unknown(String),
}

impl GatewayError {
    /// Classify a non-success response.
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        match status {
            400 => Self::Validation(message),
            401 | 403 => Self::Auth { status, message },
            404 => Self::NotFound(message),
            409 => Self::Conflict(message),
            502..=504 => Self::Transient(message),
            _ => Self::Unknown(format!("HTTP {status}: {message}")),
        }
    }

    /// Classify a transport failure (no usable response).
    pub fn from_transport(err: &reqwest::Error) -> Self {
        if err.is_connect() || err.is_timeout() || err.is_request() || err.is_body() {
            Self::Transient(err.to_string())
        } else {
            Self::Unknown(err.to_string())
        }
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }
}

impl From<GatewayError> for DomainError {
    fn from(err: GatewayError) -> Self {
        match err {
            GatewayError::Validation(m) => DomainError::Validation(m),
            GatewayError::Auth { message, .. } => DomainError::Unauthorized(message),
            GatewayError::NotFound(m) => DomainError::NotFound(m),
            GatewayError::Conflict(m) => DomainError::Conflict(m),
            GatewayError::Transient(m) => DomainError::Transient(m),
            GatewayError::Unknown(m) => DomainError::Unknown(m),
        }
    }
}

/// The ledger and event operations a register needs from the server.
#[async_trait::async_trait]
pub trait LedgerGateway: Send + Sync {
    async fn list_events(&self) -> Result<Vec<Event>, GatewayError>;

    async fn get_event(&self, code: &EventCode) -> Result<Event, GatewayError>;

    async fn list_receipts(&self, event: &EventCode) -> Result<Vec<Receipt>, GatewayError>;

    /// All-or-nothing: either every input becomes a receipt or none does.
    async fn create_receipts(
        &self,
        event: &EventCode,
        inputs: &[ReceiptInput],
    ) -> Result<Vec<Receipt>, GatewayError>;

    async fn delete_receipts(
        &self,
        event: &EventCode,
        ids: &[ReceiptId],
    ) -> Result<u64, GatewayError>;
}

#[async_trait::async_trait]
impl<G> LedgerGateway for std::sync::Arc<G>
where
    G: LedgerGateway + ?Sized,
{
    async fn list_events(&self) -> Result<Vec<Event>, GatewayError> {
        (**self).list_events().await
    }

    async fn get_event(&self, code: &EventCode) -> Result<Event, GatewayError> {
        (**self).get_event(code).await
    }

    async fn list_receipts(&self, event: &EventCode) -> Result<Vec<Receipt>, GatewayError> {
        (**self).list_receipts(event).await
    }

    async fn create_receipts(
        &self,
        event: &EventCode,
        inputs: &[ReceiptInput],
    ) -> Result<Vec<Receipt>, GatewayError> {
        (**self).create_receipts(event, inputs).await
    }

    async fn delete_receipts(
        &self,
        event: &EventCode,
        ids: &[ReceiptId],
    ) -> Result<u64, GatewayError> {
        (**self).delete_receipts(event, ids).await
    }
}

/// Error body returned by the API.
#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct DeleteResponse {
    deleted: u64,
}

/// [`LedgerGateway`] over the JSON HTTP API.
#[derive(Debug, Clone)]
pub struct HttpLedgerGateway {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl HttpLedgerGateway {
    pub fn new(
        base_url: impl Into<String>,
        token: Option<String>,
        timeout: Duration,
    ) -> Result<Self, GatewayError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| GatewayError::Unknown(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token,
        })
    }

    pub fn from_config(config: &ClientConfig) -> Result<Self, GatewayError> {
        Self::new(config.api_url.clone(), config.token.clone(), config.http_timeout())
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn send<T: DeserializeOwned>(
        &self,
        req: reqwest::RequestBuilder,
    ) -> Result<T, GatewayError> {
        let req = match &self.token {
            Some(token) => req.bearer_auth(token),
            None => req,
        };

        let resp = req
            .send()
            .await
            .map_err(|e| GatewayError::from_transport(&e))?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ErrorBody>(&text)
                .map(|body| body.message)
                .unwrap_or(text);
            debug!(status = status.as_u16(), %message, "request rejected");
            return Err(GatewayError::from_status(status.as_u16(), message));
        }

        resp.json::<T>().await.map_err(|e| {
            if e.is_decode() {
                GatewayError::Unknown(format!("unexpected response body: {e}"))
            } else {
                GatewayError::from_transport(&e)
            }
        })
    }
}

#[async_trait::async_trait]
impl LedgerGateway for HttpLedgerGateway {
    async fn list_events(&self) -> Result<Vec<Event>, GatewayError> {
        self.send(self.client.get(self.url("/events"))).await
    }

    async fn get_event(&self, code: &EventCode) -> Result<Event, GatewayError> {
        self.send(self.client.get(self.url(&format!("/events/{code}"))))
            .await
    }

    async fn list_receipts(&self, event: &EventCode) -> Result<Vec<Receipt>, GatewayError> {
        self.send(self.client.get(self.url(&format!("/events/{event}/receipts"))))
            .await
    }

    async fn create_receipts(
        &self,
        event: &EventCode,
        inputs: &[ReceiptInput],
    ) -> Result<Vec<Receipt>, GatewayError> {
        let req = self
            .client
            .post(self.url(&format!("/events/{event}/receipts")))
            .json(inputs);
        self.send(req).await
    }

    async fn delete_receipts(
        &self,
        event: &EventCode,
        ids: &[ReceiptId],
    ) -> Result<u64, GatewayError> {
        let req = self
            .client
            .post(self.url(&format!("/events/{event}/receipts/delete")))
            .json(ids);
        let resp: DeleteResponse = self.send(req).await?;
        Ok(resp.deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statuses_classify_by_class() {
        assert!(matches!(GatewayError::from_status(400, "bad"), GatewayError::Validation(_)));
        assert!(matches!(
            GatewayError::from_status(401, "who"),
            GatewayError::Auth { status: 401, .. }
        ));
        assert!(matches!(
            GatewayError::from_status(403, "no"),
            GatewayError::Auth { status: 403, .. }
        ));
        assert!(matches!(GatewayError::from_status(404, "gone"), GatewayError::NotFound(_)));
        assert!(GatewayError::from_status(409, "item already sold: B").is_conflict());
        for status in [502, 503, 504] {
            assert!(GatewayError::from_status(status, "down").is_transient());
        }
        for status in [418, 422, 500] {
            assert!(matches!(
                GatewayError::from_status(status, "?"),
                GatewayError::Unknown(_)
            ));
        }
    }

    #[test]
    fn lifts_into_domain_errors() {
        match DomainError::from(GatewayError::from_status(409, "receipt already submitted")) {
            DomainError::Conflict(msg) => assert_eq!(msg, "receipt already submitted"),
            other => panic!("Expected Conflict error, got {other:?}"),
        }
        assert!(DomainError::from(GatewayError::Transient("down".into())).is_transient());
    }

    #[tokio::test]
    async fn unreachable_server_is_transient() {
        // Nothing listens on the discard port of localhost in test environments.
        let gateway =
            HttpLedgerGateway::new("http://127.0.0.1:9", None, Duration::from_secs(2)).unwrap();
        let err = gateway.list_events().await.unwrap_err();
        assert!(err.is_transient(), "got {err:?}");
    }
}
