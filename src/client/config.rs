//! Client configuration
//!
//! Settings are layered: built-in defaults, then an optional TOML file
//! (`$CONFIG_DIR/cheffin/client.toml` unless a path is given), then
//! environment variables. The result is validated before use.
//!
//! ```toml
//! server_url = "https://api.cheffin.app"
//! sync_mode = "push"
//! poll_interval_secs = 10
//!
//! [fetch_retry]
//! max_attempts = 5
//! base_delay_ms = 500
//! backoff = "exponential"
//! ```

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::client::offline::retry::{BackoffStrategy, RetryPolicy};
use crate::shared::config::{AppConfig, ConfigError, DEFAULT_SERVER_URL};

/// Environment variable overriding the server URL
pub const ENV_API_URL: &str = "CHEFFIN_API_URL";
/// Older name still honoured for the server URL
pub const ENV_API_URL_LEGACY: &str = "CLIENT_API_URL";
pub const ENV_SYNC_MODE: &str = "CHEFFIN_SYNC_MODE";
pub const ENV_POLL_INTERVAL: &str = "CHEFFIN_POLL_INTERVAL_SECS";

/// Upper bound for a single exponential backoff delay
const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// How the client learns about new messages
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncMode {
    #[default]
    Polling,
    Push,
}

impl FromStr for SyncMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "polling" | "poll" => Ok(Self::Polling),
            "push" | "sse" => Ok(Self::Push),
            other => Err(ConfigError::InvalidValue {
                field: "sync_mode",
                message: format!("expected 'polling' or 'push', got '{}'", other),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackoffKind {
    Fixed,
    Linear,
    Exponential,
}

/// Serializable form of a [`RetryPolicy`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetrySettings {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub backoff: BackoffKind,
}

impl RetrySettings {
    pub fn policy(&self) -> RetryPolicy {
        let strategy = match self.backoff {
            BackoffKind::Fixed => BackoffStrategy::Fixed,
            BackoffKind::Linear => BackoffStrategy::Linear,
            BackoffKind::Exponential => BackoffStrategy::Exponential { max_delay: MAX_BACKOFF },
        };
        RetryPolicy::new(self.max_attempts, Duration::from_millis(self.base_delay_ms), strategy)
    }

    fn validate(&self, field: &'static str) -> Result<(), ConfigError> {
        if self.max_attempts == 0 {
            return Err(ConfigError::InvalidValue {
                field,
                message: "max_attempts must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}

impl From<&RetryPolicy> for RetrySettings {
    fn from(policy: &RetryPolicy) -> Self {
        let backoff = match policy.strategy {
            BackoffStrategy::Fixed => BackoffKind::Fixed,
            BackoffStrategy::Linear => BackoffKind::Linear,
            BackoffStrategy::Exponential { .. } => BackoffKind::Exponential,
        };
        Self {
            max_attempts: policy.max_attempts,
            base_delay_ms: policy.base_delay.as_millis() as u64,
            backoff,
        }
    }
}

/// Chat client configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub server_url: String,
    pub request_timeout_secs: u64,
    pub sync_mode: SyncMode,
    pub poll_interval_secs: u64,
    /// Consecutive push failures before falling back to polling
    pub push_reconnect_threshold: u32,
    /// Characters kept in a conversation's last-message preview
    pub preview_len: usize,
    pub fetch_retry: RetrySettings,
    pub id_resolution_retry: RetrySettings,
    pub identity_retry: RetrySettings,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_url: DEFAULT_SERVER_URL.to_string(),
            request_timeout_secs: 30,
            sync_mode: SyncMode::Polling,
            poll_interval_secs: 15,
            push_reconnect_threshold: 5,
            preview_len: 60,
            fetch_retry: (&RetryPolicy::fetch_default()).into(),
            id_resolution_retry: (&RetryPolicy::id_resolution_default()).into(),
            identity_retry: (&RetryPolicy::identity_default()).into(),
        }
    }
}

impl ClientConfig {
    /// Defaults, the user config file if present, then the environment
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(None)
    }

    /// Like [`load`](Self::load) with an explicit file. An explicit path
    /// must exist; the default location is optional.
    pub fn load_from(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => match Self::default_path() {
                Some(path) if path.exists() => Self::from_file(&path)?,
                _ => Self::default(),
            },
        };
        config.apply_env()?;
        config.validate()?;
        Ok(config)
    }

    /// `$CONFIG_DIR/cheffin/client.toml`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("cheffin").join("client.toml"))
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        tracing::debug!("Loading client config from {}", path.display());
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Apply environment overrides on top of the current values
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        if let Some(url) = env_value(ENV_API_URL).or_else(|| env_value(ENV_API_URL_LEGACY)) {
            self.server_url = url;
        }
        if let Some(mode) = env_value(ENV_SYNC_MODE) {
            self.sync_mode = mode.parse()?;
        }
        if let Some(interval) = env_value(ENV_POLL_INTERVAL) {
            self.poll_interval_secs = interval.parse().map_err(|_| ConfigError::InvalidValue {
                field: "poll_interval_secs",
                message: format!("'{}' is not a number of seconds", interval),
            })?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.app_config()?;
        if self.poll_interval_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "poll_interval_secs",
                message: "must be greater than zero".to_string(),
            });
        }
        if self.push_reconnect_threshold == 0 {
            return Err(ConfigError::InvalidValue {
                field: "push_reconnect_threshold",
                message: "must be at least 1".to_string(),
            });
        }
        if self.preview_len < 4 {
            return Err(ConfigError::InvalidValue {
                field: "preview_len",
                message: "must be at least 4 characters".to_string(),
            });
        }
        self.fetch_retry.validate("fetch_retry")?;
        self.id_resolution_retry.validate("id_resolution_retry")?;
        self.identity_retry.validate("identity_retry")?;
        Ok(())
    }

    /// Connection settings for the transport
    pub fn app_config(&self) -> Result<AppConfig, ConfigError> {
        AppConfig::builder()
            .server_url(self.server_url.clone())
            .request_timeout(Duration::from_secs(self.request_timeout_secs))
            .build()
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}

fn env_value(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}
