//! Process configuration loaded from environment variables.

use std::net::SocketAddr;
use std::time::Duration;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),

    #[error("invalid value for {key}: {value:?} ({reason})")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

/// Endpoint and credentials for one upstream service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpstreamConfig {
    pub base_url: String,
    pub token: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub bind_addr: SocketAddr,
    pub shop: UpstreamConfig,
    pub image_service: UpstreamConfig,
    pub marketplace: UpstreamConfig,
    /// Request timeout applied to every upstream HTTP client.
    pub http_timeout: Duration,
    /// How long terminal jobs stay pollable.
    pub job_retention: Duration,
    pub sweep_interval: Duration,
    /// Postgres catalog store; the in-memory store is used when unset.
    pub database_url: Option<String>,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &'static str| lookup(key).filter(|v| !v.trim().is_empty());
        let required = |key: &'static str| get(key).ok_or(ConfigError::Missing(key));
        let upstream = |url_key: &'static str, token_key: &'static str| -> Result<UpstreamConfig, ConfigError> {
            let base_url = required(url_key)?;
            if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
                return Err(ConfigError::Invalid {
                    key: url_key,
                    value: base_url,
                    reason: "expected an http(s) URL".to_string(),
                });
            }
            let token = get(token_key).unwrap_or_else(|| {
                tracing::warn!(key = token_key, "credential not set; requests will be unauthenticated");
                String::new()
            });
            Ok(UpstreamConfig { base_url, token })
        };

        let bind_addr = match get("CATALOGSYNC_BIND") {
            Some(raw) => raw.parse().map_err(|e: std::net::AddrParseError| ConfigError::Invalid {
                key: "CATALOGSYNC_BIND",
                value: raw.clone(),
                reason: e.to_string(),
            })?,
            None => SocketAddr::from(([0, 0, 0, 0], 8080)),
        };

        Ok(Self {
            bind_addr,
            shop: upstream("SHOP_API_URL", "SHOP_API_TOKEN")?,
            image_service: upstream("IMAGE_SERVICE_URL", "IMAGE_SERVICE_KEY")?,
            marketplace: upstream("MARKETPLACE_API_URL", "MARKETPLACE_API_TOKEN")?,
            http_timeout: seconds(&get, "HTTP_TIMEOUT_SECS", 30)?,
            job_retention: seconds(&get, "JOB_RETENTION_SECS", 600)?,
            sweep_interval: seconds(&get, "JOB_SWEEP_INTERVAL_SECS", 60)?,
            database_url: get("DATABASE_URL"),
        })
    }
}

fn seconds(
    get: &impl Fn(&'static str) -> Option<String>,
    key: &'static str,
    default: u64,
) -> Result<Duration, ConfigError> {
    let Some(raw) = get(key) else {
        return Ok(Duration::from_secs(default));
    };
    match raw.trim().parse::<u64>() {
        Ok(0) => Err(ConfigError::Invalid {
            key,
            value: raw,
            reason: "must be at least 1".to_string(),
        }),
        Ok(secs) => Ok(Duration::from_secs(secs)),
        Err(e) => Err(ConfigError::Invalid {
            key,
            value: raw,
            reason: e.to_string(),
        }),
    }
}
