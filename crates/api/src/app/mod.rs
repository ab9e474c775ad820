use std::sync::Arc;

use axum::{Extension, Router, http::StatusCode, routing::get};
use tower::ServiceBuilder;
use tracing::{info, warn};

use kiradopay_auth::{Hs256JwtValidator, JwtValidator};
use kiradopay_infra::{CatalogService, InMemoryPosStore, PosStore, PostgresPosStore, ReceiptLedger};

use crate::config::ApiConfig;

pub mod errors;
pub mod routes;

/// Shared handle to whichever store backs this process.
pub type SharedStore = Arc<dyn PosStore>;

/// Services shared by every handler.
#[derive(Clone)]
pub struct AppServices {
    pub catalog: CatalogService<SharedStore>,
    pub ledger: ReceiptLedger<SharedStore>,
}

impl AppServices {
    pub fn new(store: SharedStore) -> Self {
        Self {
            catalog: CatalogService::new(store.clone()),
            ledger: ReceiptLedger::new(store),
        }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(InMemoryPosStore::new()))
    }
}

/// Pick the store from configuration: Postgres when `DATABASE_URL` is set.
pub async fn build_services(config: &ApiConfig) -> anyhow::Result<AppServices> {
    let Some(url) = config.database_url.as_deref() else {
        warn!("DATABASE_URL not set; using in-memory store");
        return Ok(AppServices::in_memory());
    };

    let store = PostgresPosStore::connect(url, config.db_max_connections).await?;
    store.migrate().await?;
    info!(max_connections = config.db_max_connections, "connected to postgres");
    Ok(AppServices::new(Arc::new(store)))
}

pub fn build_app(services: AppServices, jwt: Arc<dyn JwtValidator>) -> Router {
    let auth_state = crate::middleware::AuthState { jwt };

    // Protected routes: require a verified token with the scope for the method.
    let protected = routes::router().layer(
        ServiceBuilder::new()
            .layer(axum::middleware::from_fn_with_state(
                auth_state,
                crate::middleware::auth_middleware,
            ))
            .layer(Extension(Arc::new(services))),
    );

    Router::new().route("/health", get(health)).merge(protected)
}

/// Router over the in-memory store with an HS256 secret (dev and tests).
pub fn build_dev_app(jwt_secret: &str) -> Router {
    build_app(
        AppServices::in_memory(),
        Arc::new(Hs256JwtValidator::new(jwt_secret.as_bytes().to_vec())),
    )
}

async fn health() -> StatusCode {
    StatusCode::OK
}
