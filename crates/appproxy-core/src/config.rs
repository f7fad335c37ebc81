//! Proxy selection and socket bridge settings.
//!
//! ```yaml
//! kind: socket
//! bind_addr: 127.0.0.1:1338
//! client_addr: 127.0.0.1:1339
//! timeout_ms: 1000
//! retry:
//!   max_attempts: 5
//!   initial_delay_ms: 50
//! ```

use crate::error::{ProxyError, Result};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

/// Which proxy implementation the engine should use.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProxyConfig {
    /// Application handlers run in the engine's process.
    #[default]
    Inmem,
    /// Application runs behind a socket bridge.
    Socket(SocketConfig),
}

impl ProxyConfig {
    /// Parses and validates a YAML document.
    pub fn from_yaml_str(content: &str) -> Result<Self> {
        let config: ProxyConfig =
            serde_yaml::from_str(content).map_err(|e| ProxyError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Parses and validates a JSON document.
    pub fn from_json_str(content: &str) -> Result<Self> {
        let config: ProxyConfig =
            serde_json::from_str(content).map_err(|e| ProxyError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Loads configuration from a YAML file.
    pub fn load_yaml(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ProxyError::Config(format!("failed to read file: {}", e)))?;
        Self::from_yaml_str(&content)
    }

    /// Loads configuration from a JSON file.
    pub fn load_json(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ProxyError::Config(format!("failed to read file: {}", e)))?;
        Self::from_json_str(&content)
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<()> {
        match self {
            ProxyConfig::Inmem => Ok(()),
            ProxyConfig::Socket(socket) => socket.validate(),
        }
    }
}

fn default_timeout_ms() -> u64 {
    1_000
}

/// Connection attempt timeout used when none is configured, capped by the
/// per-call timeout.
const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 500;

/// Settings for either half of the socket bridge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SocketConfig {
    /// Address this side listens on.
    pub bind_addr: SocketAddr,

    /// Address of the other side.
    pub client_addr: SocketAddr,

    /// Per-call timeout in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Timeout for a single connection attempt in milliseconds. Defaults to
    /// 500 or `timeout_ms`, whichever is smaller.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connect_timeout_ms: Option<u64>,

    /// Reconnection backoff.
    #[serde(default)]
    pub retry: RetryConfig,
}

impl SocketConfig {
    /// Creates a configuration with default timeouts.
    pub fn new(bind_addr: SocketAddr, client_addr: SocketAddr) -> Self {
        Self {
            bind_addr,
            client_addr,
            timeout_ms: default_timeout_ms(),
            connect_timeout_ms: None,
            retry: RetryConfig::default(),
        }
    }

    /// Sets the per-call timeout, rounded up to whole milliseconds.
    ///
    /// An explicit connect timeout above the new value is lowered to it.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        let ms = timeout.as_micros().div_ceil(1_000);
        self.timeout_ms = u64::try_from(ms).unwrap_or(u64::MAX);
        if let Some(connect) = self.connect_timeout_ms {
            self.connect_timeout_ms = Some(connect.min(self.timeout_ms));
        }
        self
    }

    /// Per-call timeout.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Single connection attempt timeout.
    pub fn connect_timeout(&self) -> Duration {
        let ms = self
            .connect_timeout_ms
            .unwrap_or_else(|| DEFAULT_CONNECT_TIMEOUT_MS.min(self.timeout_ms));
        Duration::from_millis(ms)
    }

    /// Validates timeouts and retry policy.
    pub fn validate(&self) -> Result<()> {
        if self.timeout_ms == 0 {
            return Err(ProxyError::Config("timeout_ms must be greater than zero".into()));
        }
        match self.connect_timeout_ms {
            Some(0) => {
                return Err(ProxyError::Config(
                    "connect_timeout_ms must be greater than zero".into(),
                ));
            }
            Some(connect) if connect > self.timeout_ms => {
                return Err(ProxyError::Config(format!(
                    "connect_timeout_ms ({connect}) exceeds timeout_ms ({})",
                    self.timeout_ms
                )));
            }
            _ => {}
        }
        self.retry.validate()
    }
}

/// Exponential backoff for reconnection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Maximum connection attempts per call.
    pub max_attempts: u32,

    /// Delay before the second attempt, in milliseconds.
    pub initial_delay_ms: u64,

    /// Upper bound on the delay, in milliseconds.
    pub max_delay_ms: u64,

    /// Growth factor between attempts.
    pub multiplier: f64,

    /// Add up to 25% random jitter.
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay_ms: 50,
            max_delay_ms: 2_000,
            multiplier: 2.0,
            jitter: true,
        }
    }
}

impl RetryConfig {
    /// Delay before the second attempt.
    pub fn initial_delay(&self) -> Duration {
        Duration::from_millis(self.initial_delay_ms)
    }

    /// Upper bound on the delay.
    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }

    /// Validates the policy.
    pub fn validate(&self) -> Result<()> {
        if self.max_attempts == 0 {
            return Err(ProxyError::Config("retry.max_attempts must be at least 1".into()));
        }
        if !(self.multiplier.is_finite() && self.multiplier >= 1.0) {
            return Err(ProxyError::Config(format!(
                "retry.multiplier must be a finite number >= 1.0, got {}",
                self.multiplier
            )));
        }
        if self.initial_delay_ms > self.max_delay_ms {
            return Err(ProxyError::Config(
                "retry.initial_delay_ms exceeds retry.max_delay_ms".into(),
            ));
        }
        Ok(())
    }
}
