use std::sync::Arc;

use anyhow::Context;

use kiradopay_api::app::{build_app, build_services};
use kiradopay_api::config::ApiConfig;
use kiradopay_auth::Hs256JwtValidator;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    kiradopay_observability::init();

    let config = ApiConfig::from_env().context("failed to load configuration")?;
    let services = build_services(&config)
        .await
        .context("failed to initialize storage")?;
    let jwt = Arc::new(Hs256JwtValidator::new(config.jwt_secret.clone().into_bytes()));
    let app = build_app(services, jwt);

    let listener = tokio::net::TcpListener::bind(config.bind)
        .await
        .with_context(|| format!("failed to bind {}", config.bind))?;

    tracing::info!("listening on {}", listener.local_addr()?);

    axum::serve(listener, app).await?;
    Ok(())
}
