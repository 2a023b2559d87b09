//! Plugin configuration.
//!
//! Loaded from environment variables with defaults suited to the live
//! backend, or from a TOML file.

use psnsync_client::endpoints::{DEFAULT_PAGE_LIMIT, MAX_TITLE_IDS_PER_REQUEST};
use psnsync_client::TransportConfig;
use psnsync_core::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Seven days.
pub const DEFAULT_TITLE_INFO_TTL_SECS: i64 = 7 * 24 * 60 * 60;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PluginConfig {
    /// Per-request timeout in seconds.
    pub request_timeout_secs: u64,

    /// Idle connections kept per host.
    pub connection_limit: usize,

    /// Page size of paginated listings.
    pub page_limit: usize,

    /// Game ids per trophy-title-info request. At most 5.
    pub title_batch_size: usize,

    /// Lifetime of a resolved trophy-title-info entry.
    pub title_info_ttl_secs: i64,
}

impl Default for PluginConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: 30,
            connection_limit: 20,
            page_limit: DEFAULT_PAGE_LIMIT,
            title_batch_size: MAX_TITLE_IDS_PER_REQUEST,
            title_info_ttl_secs: DEFAULT_TITLE_INFO_TTL_SECS,
        }
    }
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(default)
}

impl PluginConfig {
    /// Create PluginConfig from environment variables.
    ///
    /// Environment variables:
    /// - `PSNSYNC_REQUEST_TIMEOUT_SECS` (default: 30)
    /// - `PSNSYNC_CONNECTION_LIMIT` (default: 20)
    /// - `PSNSYNC_PAGE_LIMIT` (default: 100)
    /// - `PSNSYNC_TITLE_BATCH_SIZE` (default: 5)
    /// - `PSNSYNC_TITLE_INFO_TTL_SECS` (default: 604800)
    ///
    /// Unparseable values fall back to the default.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            request_timeout_secs: env_or("PSNSYNC_REQUEST_TIMEOUT_SECS", defaults.request_timeout_secs),
            connection_limit: env_or("PSNSYNC_CONNECTION_LIMIT", defaults.connection_limit),
            page_limit: env_or("PSNSYNC_PAGE_LIMIT", defaults.page_limit),
            title_batch_size: env_or("PSNSYNC_TITLE_BATCH_SIZE", defaults.title_batch_size),
            title_info_ttl_secs: env_or("PSNSYNC_TITLE_INFO_TTL_SECS", defaults.title_info_ttl_secs),
        }
    }

    /// Load and validate a TOML file. Missing keys take their defaults.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            reason: format!("{}: {}", path.display(), e),
        })?;
        let config: Self = toml::from_str(&raw).map_err(|e| ConfigError::Parse {
            reason: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |field: &str, value: String, reason: &str| ConfigError::InvalidValue {
            field: field.to_string(),
            value,
            reason: reason.to_string(),
        };

        if self.request_timeout_secs == 0 {
            return Err(invalid("request_timeout_secs", "0".into(), "must be positive"));
        }
        if self.connection_limit == 0 {
            return Err(invalid("connection_limit", "0".into(), "must be positive"));
        }
        if self.page_limit == 0 {
            return Err(invalid("page_limit", "0".into(), "must be positive"));
        }
        if !(1..=MAX_TITLE_IDS_PER_REQUEST).contains(&self.title_batch_size) {
            return Err(invalid(
                "title_batch_size",
                self.title_batch_size.to_string(),
                "must be between 1 and 5",
            ));
        }
        if self.title_info_ttl_secs <= 0 {
            return Err(invalid(
                "title_info_ttl_secs",
                self.title_info_ttl_secs.to_string(),
                "must be positive",
            ));
        }
        Ok(())
    }

    pub fn transport_config(&self) -> TransportConfig {
        TransportConfig {
            request_timeout: Duration::from_secs(self.request_timeout_secs),
            connection_limit: self.connection_limit,
        }
    }
}
