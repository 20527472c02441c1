use std::{env, time::Duration};

use url::Url;

/// Storage key the identity client persists its session under. Contains
/// `auth` on purpose so the sweeper's key predicate covers it.
pub const DEFAULT_STORAGE_KEY: &str = "courtside-auth-token";

/// How often a valid session is re-checked against the health endpoint.
pub const DEFAULT_HEALTH_INTERVAL: Duration = Duration::from_secs(300);
/// How often the near-expiry refresh scan runs.
pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(60);
/// Quiet period applied to bursts of credential-store events.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(100);
/// Hard ceiling on a single health probe request.
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(3);

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    MissingEnv(&'static str),
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Connection settings for the identity provider API.
#[derive(Debug, Clone)]
pub struct IdentityConfig {
    pub base_url: Url,
    pub api_key: String,
    pub storage_key: String,
}

impl IdentityConfig {
    pub fn new(base_url: Url, api_key: impl Into<String>) -> Self {
        Self {
            base_url,
            api_key: api_key.into(),
            storage_key: DEFAULT_STORAGE_KEY.to_owned(),
        }
    }

    /// Read `COURTSIDE_AUTH_URL`, `COURTSIDE_AUTH_KEY`, and the optional
    /// `COURTSIDE_AUTH_STORAGE_KEY` from the environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        let raw = env::var("COURTSIDE_AUTH_URL")
            .map_err(|_| ConfigError::MissingEnv("COURTSIDE_AUTH_URL"))?;
        let base_url = Url::parse(&raw)
            .map_err(|_| ConfigError::InvalidConfig(format!("invalid auth url `{raw}`")))?;
        let api_key = env::var("COURTSIDE_AUTH_KEY")
            .map_err(|_| ConfigError::MissingEnv("COURTSIDE_AUTH_KEY"))?;
        let storage_key = env::var("COURTSIDE_AUTH_STORAGE_KEY")
            .unwrap_or_else(|_| DEFAULT_STORAGE_KEY.to_owned());
        Ok(Self {
            base_url,
            api_key,
            storage_key,
        })
    }

    pub fn with_storage_key(mut self, key: impl Into<String>) -> Self {
        self.storage_key = key.into();
        self
    }
}

/// Timing knobs for the keeper's background work.
#[derive(Debug, Clone)]
pub struct KeeperConfig {
    /// Cadence of unconditional health re-validation.
    pub health_interval: Duration,
    /// Cadence of the near-expiry refresh scan.
    pub refresh_interval: Duration,
    /// Settle time between a store event and the re-validation it triggers.
    pub debounce: Duration,
}

impl Default for KeeperConfig {
    fn default() -> Self {
        Self {
            health_interval: DEFAULT_HEALTH_INTERVAL,
            refresh_interval: DEFAULT_REFRESH_INTERVAL,
            debounce: DEFAULT_DEBOUNCE,
        }
    }
}

impl KeeperConfig {
    pub fn with_health_interval(mut self, value: Duration) -> Self {
        self.health_interval = value;
        self
    }

    pub fn with_refresh_interval(mut self, value: Duration) -> Self {
        self.refresh_interval = value;
        self
    }

    pub fn with_debounce(mut self, value: Duration) -> Self {
        self.debounce = value;
        self
    }
}
