//! Client configuration loaded from TOML.
//!
//! ```toml
//! log = "info"
//! [server]
//! base_url = "http://localhost:8000"
//! [channel]
//! backoff_ms = [1000, 2000, 4000, 8000, 16000]
//! queue_capacity = 256
//! [api]
//! timeout_secs = 120
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use hubsync_core::backoff::DEFAULT_BACKOFF_MS;
use serde::Deserialize;
use url::Url;

/// Env var that overrides `server.base_url`.
pub const SERVER_ENV: &str = "HUBSYNC_SERVER";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid server url {url:?}: {reason}")]
    InvalidUrl { url: String, reason: String },
    #[error("channel.backoff_ms must not be empty")]
    EmptyBackoff,
    #[error("channel.queue_capacity must be at least 1")]
    ZeroQueueCapacity,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Default tracing filter when neither HUBSYNC_LOG nor RUST_LOG is set.
    pub log: Option<String>,
    pub server: ServerConfig,
    pub channel: ChannelConfig,
    pub api: ApiConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub base_url: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ChannelConfig {
    pub backoff_ms: Vec<u64>,
    /// Capacity of the inbound event queue and the outbound frame queue.
    pub queue_capacity: usize,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            backoff_ms: DEFAULT_BACKOFF_MS.to_vec(),
            queue_capacity: 256,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub timeout_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self { timeout_secs: 120 }
    }
}

impl Config {
    pub fn from_toml(s: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from `path`. A missing file yields the defaults; any other read
    /// failure is an error.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(s) => Self::from_toml(&s),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "config file not found, using defaults");
                Ok(Self::default())
            }
            Err(source) => Err(ConfigError::Io {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    /// Replace the server URL, e.g. from `--server` or `HUBSYNC_SERVER`.
    pub fn with_server(mut self, base_url: impl Into<String>) -> Result<Self, ConfigError> {
        self.server.base_url = base_url.into();
        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.base_url()?;
        if self.channel.backoff_ms.is_empty() {
            return Err(ConfigError::EmptyBackoff);
        }
        if self.channel.queue_capacity == 0 {
            return Err(ConfigError::ZeroQueueCapacity);
        }
        Ok(())
    }

    /// Base URL of the HTTP API. Only `http` and `https` are accepted.
    pub fn base_url(&self) -> Result<Url, ConfigError> {
        let raw = &self.server.base_url;
        let url = Url::parse(raw).map_err(|e| ConfigError::InvalidUrl {
            url: raw.clone(),
            reason: e.to_string(),
        })?;
        match url.scheme() {
            "http" | "https" => Ok(url),
            other => Err(ConfigError::InvalidUrl {
                url: raw.clone(),
                reason: format!("unsupported scheme {other:?}"),
            }),
        }
    }

    /// Push channel endpoint: same host, `ws`/`wss` mirroring `http`/`https`,
    /// path `/ws`.
    pub fn channel_url(&self) -> Result<Url, ConfigError> {
        let mut url = self.base_url()?;
        let scheme = if url.scheme() == "https" { "wss" } else { "ws" };
        url.set_scheme(scheme).map_err(|()| ConfigError::InvalidUrl {
            url: self.server.base_url.clone(),
            reason: "cannot derive websocket scheme".to_string(),
        })?;
        url.set_path("/ws");
        url.set_query(None);
        url.set_fragment(None);
        Ok(url)
    }

    pub fn backoff_schedule(&self) -> Vec<Duration> {
        self.channel
            .backoff_ms
            .iter()
            .map(|ms| Duration::from_millis(*ms))
            .collect()
    }

    pub fn api_timeout(&self) -> Duration {
        Duration::from_secs(self.api.timeout_secs)
    }
}

/// `$XDG_CONFIG_HOME/hubsync/config.toml`, else `~/.config/hubsync/config.toml`.
pub fn default_config_path() -> PathBuf {
    if let Ok(dir) = std::env::var("XDG_CONFIG_HOME") {
        if !dir.is_empty() {
            return PathBuf::from(dir).join("hubsync/config.toml");
        }
    }
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    PathBuf::from(home).join(".config/hubsync/config.toml")
}
