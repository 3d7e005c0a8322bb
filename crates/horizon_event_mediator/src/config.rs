//! Configuration management for the event mediator.
//!
//! Settings are loaded from a TOML file; a missing file is created with
//! the defaults so operators have a template to edit.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::{info, warn};

/// Root configuration for a mediator instance.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MediatorConfig {
    #[serde(default)]
    pub sync: SyncSettings,
    #[serde(default)]
    pub dispatch: DispatchSettings,
    #[serde(default)]
    pub logging: LoggingSettings,
}

/// Synchronization engine settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncSettings {
    /// How long an occupant may hold a bucket before the timeout sweep
    /// promotes the next waiter past it
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Interval of the periodic sweep in milliseconds
    #[serde(default = "default_sweep_interval_ms")]
    pub sweep_interval_ms: u64,
}

fn default_timeout_secs() -> u64 {
    15
}

fn default_sweep_interval_ms() -> u64 {
    50 // one server tick
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            sweep_interval_ms: default_sweep_interval_ms(),
        }
    }
}

impl SyncSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms)
    }

    /// Copy with unusable zero values replaced: a zero timeout falls back
    /// to the default and the sweep interval is at least 1 ms.
    pub fn normalized(&self) -> Self {
        Self {
            timeout_secs: if self.timeout_secs == 0 {
                default_timeout_secs()
            } else {
                self.timeout_secs
            },
            sweep_interval_ms: self.sweep_interval_ms.max(1),
        }
    }
}

/// Dispatch engine settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispatchSettings {
    /// Listeners running longer than this are reported at warn level
    /// (0 disables the check)
    #[serde(default = "default_slow_listener_ms")]
    pub slow_listener_warn_ms: u64,
}

fn default_slow_listener_ms() -> u64 {
    50
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            slow_listener_warn_ms: default_slow_listener_ms(),
        }
    }
}

impl DispatchSettings {
    pub fn slow_listener_threshold(&self) -> Option<Duration> {
        (self.slow_listener_warn_ms > 0).then(|| Duration::from_millis(self.slow_listener_warn_ms))
    }
}

/// Logging system configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// Log level filter (trace, debug, info, warn, error)
    pub level: String,
    /// Whether to output logs in JSON format
    pub json_format: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
        }
    }
}

impl MediatorConfig {
    /// Loads configuration from a TOML file, writing the defaults to `path`
    /// when the file does not exist yet.
    pub async fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let io_error = |source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        };

        if !path.exists() {
            warn!("Configuration file not found: {}, using defaults", path.display());
            let config = Self::default();
            let content = toml::to_string_pretty(&config)?;
            tokio::fs::write(path, content).await.map_err(io_error)?;
            info!("Created default configuration file: {}", path.display());
            return Ok(config);
        }

        let content = tokio::fs::read_to_string(path).await.map_err(io_error)?;
        let config: Self = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks the configuration for values the engines cannot work with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut issues = Vec::new();

        if self.sync.timeout_secs == 0 {
            issues.push("sync.timeout_secs must be greater than zero".to_string());
        }
        if self.sync.sweep_interval_ms == 0 {
            issues.push("sync.sweep_interval_ms must be greater than zero".to_string());
        }
        if !matches!(
            self.logging.level.as_str(),
            "trace" | "debug" | "info" | "warn" | "error"
        ) {
            issues.push(format!("unknown logging.level '{}'", self.logging.level));
        }

        if issues.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Invalid(issues.join("; ")))
        }
    }
}
