//! Configuration management for the limiter and its load driver.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::info;

use crate::error::{LimiterError, Result};

/// Prefix for environment overrides, e.g. `QUANTUM_RATE__LIMITER__QUANTUM_MS`.
const ENV_PREFIX: &str = "QUANTUM_RATE";

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Limiter configuration
    #[serde(default)]
    pub limiter: LimiterConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Limiter configuration.
///
/// Only the quantum is part of the limiter's contract. The sweep settings
/// and mailbox depth are internal knobs exposed for tuning and tests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LimiterConfig {
    /// Time budget per task within any trailing window of the same length
    #[serde(default = "default_quantum_ms")]
    pub quantum_ms: u64,

    /// Interval between sweep passes in milliseconds
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,

    /// Maximum number of ledger entries inspected per sweep pass
    #[serde(default = "default_sweep_batch")]
    pub sweep_batch: usize,

    /// Depth of the actor's request mailbox
    #[serde(default = "default_mailbox_capacity")]
    pub mailbox_capacity: usize,
}

impl Default for LimiterConfig {
    fn default() -> Self {
        Self {
            quantum_ms: default_quantum_ms(),
            tick_interval_ms: default_tick_interval_ms(),
            sweep_batch: default_sweep_batch(),
            mailbox_capacity: default_mailbox_capacity(),
        }
    }
}

fn default_quantum_ms() -> u64 {
    30_000
}

fn default_tick_interval_ms() -> u64 {
    3_000
}

fn default_sweep_batch() -> usize {
    10
}

fn default_mailbox_capacity() -> usize {
    64
}

impl LimiterConfig {
    /// Default configuration with the given quantum.
    pub fn with_quantum(quantum: Duration) -> Self {
        Self {
            quantum_ms: u64::try_from(quantum.as_millis()).unwrap_or(u64::MAX),
            ..Self::default()
        }
    }

    /// The quantum as a duration.
    pub fn quantum(&self) -> Duration {
        Duration::from_millis(self.quantum_ms)
    }

    /// The sweep interval as a duration.
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    /// Reject settings the actor cannot run with.
    ///
    /// A zero quantum is allowed: it denies every non-empty slice.
    pub fn validate(&self) -> Result<()> {
        if self.tick_interval_ms == 0 {
            return Err(LimiterError::Config(
                "tick_interval_ms must be greater than 0".to_string(),
            ));
        }
        if self.sweep_batch == 0 {
            return Err(LimiterError::Config(
                "sweep_batch must be greater than 0".to_string(),
            ));
        }
        if self.mailbox_capacity == 0 {
            return Err(LimiterError::Config(
                "mailbox_capacity must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive when `RUST_LOG` is unset
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON formatted log lines
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl AppConfig {
    /// Load configuration from a YAML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "Loading configuration");

        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Load configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: AppConfig = serde_yaml::from_str(yaml)
            .map_err(|e| LimiterError::Config(format!("Failed to parse configuration: {}", e)))?;
        config.limiter.validate()?;
        Ok(config)
    }

    /// Load configuration from an optional YAML file layered under
    /// `QUANTUM_RATE__*` environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            info!(path = %path.display(), "Loading configuration");
            let name = path.to_str().ok_or_else(|| {
                LimiterError::Config(format!("non UTF-8 config path: {}", path.display()))
            })?;
            builder = builder.add_source(config::File::new(name, config::FileFormat::Yaml));
        }

        let config: AppConfig = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|e| LimiterError::Config(e.to_string()))?;

        config.limiter.validate()?;
        Ok(config)
    }
}
