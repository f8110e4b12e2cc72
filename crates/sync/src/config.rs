// SPDX-License-Identifier: MIT
// Copyright (c) 2026 PulseLink Health

//! Engine configuration.
//!
//! Every field has a default, so a config can be built in code with
//! `SyncConfig::default()` or loaded from a TOML file where deployments only
//! override what they need.

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Error type for configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// TOML parse error.
    #[error("config parse error: {0}")]
    Parse(#[from] toml::de::Error),

    /// Semantically invalid configuration.
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Configuration for the sync engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// WebSocket URL of the realtime endpoint (`ws://` or `wss://`).
    #[serde(default = "default_url")]
    pub url: String,

    /// Initial reconnect backoff delay in milliseconds (default: 1000).
    #[serde(default = "default_reconnect_initial_delay_ms")]
    pub reconnect_initial_delay_ms: u64,

    /// Per-attempt backoff ceiling in seconds (default: 5).
    #[serde(default = "default_reconnect_max_delay_secs")]
    pub reconnect_max_delay_secs: u64,

    /// Connect attempts per reconnection episode before giving up
    /// (default: 10). A manual `connect` call starts a fresh episode.
    #[serde(default = "default_reconnect_max_attempts")]
    pub reconnect_max_attempts: u32,

    /// Per-mutation execution timeout in seconds (default: 30).
    #[serde(default = "default_exec_timeout_secs")]
    pub exec_timeout_secs: u64,

    /// Default retry budget for enqueued mutations (default: 3).
    #[serde(default = "default_max_retries")]
    pub default_max_retries: u32,
}

fn default_url() -> String {
    "ws://localhost:9430/realtime".to_string()
}

fn default_reconnect_initial_delay_ms() -> u64 {
    1000
}

fn default_reconnect_max_delay_secs() -> u64 {
    5
}

fn default_reconnect_max_attempts() -> u32 {
    10
}

fn default_exec_timeout_secs() -> u64 {
    30
}

fn default_max_retries() -> u32 {
    3
}

impl Default for SyncConfig {
    fn default() -> Self {
        SyncConfig {
            url: default_url(),
            reconnect_initial_delay_ms: default_reconnect_initial_delay_ms(),
            reconnect_max_delay_secs: default_reconnect_max_delay_secs(),
            reconnect_max_attempts: default_reconnect_max_attempts(),
            exec_timeout_secs: default_exec_timeout_secs(),
            default_max_retries: default_max_retries(),
        }
    }
}

impl SyncConfig {
    /// Loads and validates a config from a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path)?;
        let config: SyncConfig = toml::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks the config for values the engine cannot operate with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.url.starts_with("ws://") && !self.url.starts_with("wss://") {
            return Err(ConfigError::Invalid(format!(
                "url must be ws:// or wss://, got '{}'",
                self.url
            )));
        }
        if self.reconnect_max_attempts == 0 {
            return Err(ConfigError::Invalid(
                "reconnect_max_attempts must be at least 1".to_string(),
            ));
        }
        if self.reconnect_initial_delay_ms == 0 {
            return Err(ConfigError::Invalid(
                "reconnect_initial_delay_ms must be nonzero".to_string(),
            ));
        }
        if self.exec_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "exec_timeout_secs must be nonzero".to_string(),
            ));
        }
        Ok(())
    }

    /// Initial reconnect backoff delay.
    pub fn initial_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_initial_delay_ms)
    }

    /// Per-attempt backoff ceiling.
    pub fn max_delay(&self) -> Duration {
        Duration::from_secs(self.reconnect_max_delay_secs)
    }

    /// Per-mutation execution timeout.
    pub fn exec_timeout(&self) -> Duration {
        Duration::from_secs(self.exec_timeout_secs)
    }
}
