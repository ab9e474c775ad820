//! Register configuration from environment variables.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DEFAULT_API_URL: &str = "http://localhost:8080";
pub const DEFAULT_SYNC_BATCH: usize = 50;
pub const DEFAULT_SYNC_INTERVAL_SECS: u64 = 30;
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value for {key}: {value:?} ({reason})")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
    #[error("no data directory available; set KIRADOPAY_BUFFER_PATH")]
    NoDataDir,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// `KIRADOPAY_API_URL`, without a trailing slash.
    pub api_url: String,
    /// `KIRADOPAY_TOKEN`
    #[serde(skip_serializing)]
    pub token: Option<String>,
    /// `KIRADOPAY_BUFFER_PATH`: SQLite file holding unsynced receipts.
    pub buffer_path: PathBuf,
    /// `KIRADOPAY_SYNC_BATCH`: receipts per create call while syncing.
    pub sync_batch: usize,
    /// `KIRADOPAY_SYNC_INTERVAL_SECS`
    pub sync_interval_secs: u64,
    /// `KIRADOPAY_HTTP_TIMEOUT_SECS`
    pub http_timeout_secs: u64,
}

impl ClientConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let api_url = lookup("KIRADOPAY_API_URL")
            .filter(|url| !url.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_API_URL.to_string())
            .trim_end_matches('/')
            .to_string();
        if !(api_url.starts_with("http://") || api_url.starts_with("https://")) {
            return Err(ConfigError::Invalid {
                key: "KIRADOPAY_API_URL",
                value: api_url,
                reason: "must be an http(s) URL".to_string(),
            });
        }

        let token = lookup("KIRADOPAY_TOKEN").filter(|t| !t.trim().is_empty());

        let buffer_path = match lookup("KIRADOPAY_BUFFER_PATH").filter(|p| !p.trim().is_empty()) {
            Some(path) => PathBuf::from(path),
            None => default_buffer_path()?,
        };

        Ok(Self {
            api_url,
            token,
            buffer_path,
            sync_batch: positive(&lookup, "KIRADOPAY_SYNC_BATCH", DEFAULT_SYNC_BATCH)?,
            sync_interval_secs: positive(
                &lookup,
                "KIRADOPAY_SYNC_INTERVAL_SECS",
                DEFAULT_SYNC_INTERVAL_SECS,
            )?,
            http_timeout_secs: positive(
                &lookup,
                "KIRADOPAY_HTTP_TIMEOUT_SECS",
                DEFAULT_HTTP_TIMEOUT_SECS,
            )?,
        })
    }

    pub fn sync_interval(&self) -> Duration {
        Duration::from_secs(self.sync_interval_secs)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }
}

fn default_buffer_path() -> Result<PathBuf, ConfigError> {
    let dir = dirs::data_local_dir().ok_or(ConfigError::NoDataDir)?;
    Ok(dir.join("kiradopay").join("buffer.db"))
}

fn positive<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    default: T,
) -> Result<T, ConfigError>
where
    T: std::str::FromStr + PartialOrd + Default,
    T::Err: std::fmt::Display,
{
    let Some(raw) = lookup(key) else {
        return Ok(default);
    };
    match raw.parse::<T>() {
        Ok(n) if n > T::default() => Ok(n),
        Ok(_) => Err(ConfigError::Invalid {
            key,
            value: raw,
            reason: "must be positive".to_string(),
        }),
        Err(e) => Err(ConfigError::Invalid {
            key,
            value: raw,
            reason: e.to_string(),
        }),
    }
}
