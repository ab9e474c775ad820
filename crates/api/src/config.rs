//! Server configuration from environment variables.

use std::net::SocketAddr;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

pub const DEFAULT_BIND: &str = "0.0.0.0:8080";
pub const DEFAULT_DB_MAX_CONNECTIONS: u32 = 5;
const DEV_JWT_SECRET: &str = "dev-secret";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value for {key}: {value:?} ({reason})")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiConfig {
    /// `KIRADOPAY_BIND`
    pub bind: SocketAddr,
    /// `JWT_SECRET`
    #[serde(skip_serializing)]
    pub jwt_secret: String,
    /// `DATABASE_URL`; the in-memory store is used when unset.
    #[serde(skip_serializing)]
    pub database_url: Option<String>,
    /// `KIRADOPAY_DB_MAX_CONNECTIONS`
    pub db_max_connections: u32,
}

impl ApiConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup (the process environment in production).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let bind_raw = lookup("KIRADOPAY_BIND").unwrap_or_else(|| DEFAULT_BIND.to_string());
        let bind = bind_raw.parse().map_err(|e: std::net::AddrParseError| ConfigError::Invalid {
            key: "KIRADOPAY_BIND",
            value: bind_raw.clone(),
            reason: e.to_string(),
        })?;

        let jwt_secret = lookup("JWT_SECRET").unwrap_or_else(|| {
            warn!("JWT_SECRET not set; using insecure dev default");
            DEV_JWT_SECRET.to_string()
        });

        let database_url = lookup("DATABASE_URL").filter(|url| !url.trim().is_empty());

        let db_max_connections = match lookup("KIRADOPAY_DB_MAX_CONNECTIONS") {
            None => DEFAULT_DB_MAX_CONNECTIONS,
            Some(raw) => match raw.parse::<u32>() {
                Ok(n) if n > 0 => n,
                Ok(_) => {
                    return Err(ConfigError::Invalid {
                        key: "KIRADOPAY_DB_MAX_CONNECTIONS",
                        value: raw,
                        reason: "must be positive".to_string(),
                    });
                }
                Err(e) => {
                    return Err(ConfigError::Invalid {
                        key: "KIRADOPAY_DB_MAX_CONNECTIONS",
                        value: raw,
                        reason: e.to_string(),
                    });
                }
            },
        };

        Ok(Self {
            bind,
            jwt_secret,
            database_url,
            db_max_connections,
        })
    }
}
