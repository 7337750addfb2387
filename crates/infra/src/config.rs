//! Process configuration from environment variables.

use std::net::SocketAddr;
use std::time::Duration;

use thiserror::Error;
use tracing::warn;

pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";
pub const DEFAULT_JWT_SECRET: &str = "dev-secret";
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 2000;
pub const DEFAULT_ENRICHMENT_CONCURRENCY: usize = 8;

/// More lookups in flight than wallets on a page buys nothing.
pub const MAX_ENRICHMENT_CONCURRENCY: usize = crate::wallet_service::MAX_PAGE_SIZE;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

#[derive(Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub bind_addr: SocketAddr,
    pub jwt_secret: String,
    /// Postgres adapters are used when set; in-memory otherwise.
    pub database_url: Option<String>,
    pub request_timeout: Duration,
    pub enrichment_concurrency: usize,
}

impl core::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("AppConfig")
            .field("bind_addr", &self.bind_addr)
            .field("jwt_secret", &"<redacted>")
            .field("database_url", &self.database_url.as_ref().map(|_| "<redacted>"))
            .field("request_timeout", &self.request_timeout)
            .field("enrichment_concurrency", &self.enrichment_concurrency)
            .finish()
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup (tests pass a map).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let bind_addr = lookup("WALLETD_BIND_ADDR").unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string());
        let bind_addr = bind_addr.parse().map_err(|e| ConfigError::Invalid {
            key: "WALLETD_BIND_ADDR",
            reason: format!("{e}"),
        })?;

        let jwt_secret = match lookup("JWT_SECRET").filter(|s| !s.is_empty()) {
            Some(secret) => secret,
            None => {
                warn!("JWT_SECRET not set; using insecure dev default");
                DEFAULT_JWT_SECRET.to_string()
            }
        };

        let database_url = lookup("DATABASE_URL").filter(|s| !s.trim().is_empty());

        let timeout_ms = positive(
            "WALLETD_REQUEST_TIMEOUT_MS",
            lookup("WALLETD_REQUEST_TIMEOUT_MS"),
            DEFAULT_REQUEST_TIMEOUT_MS,
        )?;
        let enrichment_concurrency = positive(
            "WALLETD_ENRICHMENT_CONCURRENCY",
            lookup("WALLETD_ENRICHMENT_CONCURRENCY"),
            DEFAULT_ENRICHMENT_CONCURRENCY as u64,
        )?;
        let enrichment_concurrency = usize::try_from(enrichment_concurrency)
            .ok()
            .filter(|n| *n <= MAX_ENRICHMENT_CONCURRENCY)
            .ok_or_else(|| ConfigError::Invalid {
                key: "WALLETD_ENRICHMENT_CONCURRENCY",
                reason: format!("must be at most {MAX_ENRICHMENT_CONCURRENCY}"),
            })?;

        Ok(Self {
            bind_addr,
            jwt_secret,
            database_url,
            request_timeout: Duration::from_millis(timeout_ms),
            enrichment_concurrency,
        })
    }
}

fn positive(key: &'static str, raw: Option<String>, default: u64) -> Result<u64, ConfigError> {
    let Some(raw) = raw else {
        return Ok(default);
    };
    let value: u64 = raw.trim().parse().map_err(|e| ConfigError::Invalid {
        key,
        reason: format!("{raw:?}: {e}"),
    })?;
    if value == 0 {
        return Err(ConfigError::Invalid {
            key,
            reason: "must be greater than zero".to_string(),
        });
    }
    Ok(value)
}
