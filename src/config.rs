//! Configuration management for Turnstile.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{Result, TurnstileError};
use crate::ratelimit::{FailMode, LimitPolicy};

/// Prefix for environment overrides, e.g. `TURNSTILE__LIMITER__LIMIT=10`.
pub const ENV_PREFIX: &str = "TURNSTILE";

/// Main configuration for Turnstile.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TurnstileConfig {
    /// Limit policy configuration
    #[serde(default)]
    pub limiter: LimiterConfig,

    /// Idle record eviction
    #[serde(default)]
    pub housekeeping: HousekeepingConfig,
}

/// Limit policy configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimiterConfig {
    /// Maximum admitted requests per window
    #[serde(default = "default_limit")]
    pub limit: u64,

    /// Window length in seconds
    #[serde(default = "default_duration_secs")]
    pub duration_secs: u64,

    /// Decision to take when the record store is unreachable
    #[serde(default)]
    pub on_store_unavailable: FailMode,
}

impl Default for LimiterConfig {
    fn default() -> Self {
        Self {
            limit: default_limit(),
            duration_secs: default_duration_secs(),
            on_store_unavailable: FailMode::default(),
        }
    }
}

fn default_limit() -> u64 {
    5
}

fn default_duration_secs() -> u64 {
    60
}

/// Idle record eviction configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HousekeepingConfig {
    #[serde(default)]
    pub enabled: bool,

    /// Seconds between eviction passes
    #[serde(default = "default_interval")]
    pub interval_secs: u64,

    /// Records whose window started this many seconds ago are evicted
    #[serde(default = "default_idle")]
    pub idle_secs: u64,
}

impl Default for HousekeepingConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            interval_secs: default_interval(),
            idle_secs: default_idle(),
        }
    }
}

fn default_interval() -> u64 {
    60
}

fn default_idle() -> u64 {
    3600
}

impl HousekeepingConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn idle_for(&self) -> Duration {
        Duration::from_secs(self.idle_secs)
    }
}

impl TurnstileConfig {
    /// Load configuration from an optional YAML file, layered with
    /// `TURNSTILE__*` environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();

        if let Some(path) = path {
            info!(path = %path.display(), "Loading configuration");
            builder = builder.add_source(config::File::from(path).format(config::FileFormat::Yaml));
        }

        let config: TurnstileConfig = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: TurnstileConfig = serde_yaml::from_str(yaml)
            .map_err(|e| TurnstileError::Config(format!("Failed to parse configuration: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Check every value, without building anything long-lived.
    pub fn validate(&self) -> Result<()> {
        self.policy()?;

        if self.housekeeping.enabled {
            if self.housekeeping.interval_secs == 0 {
                return Err(TurnstileError::Config(
                    "housekeeping.interval_secs must be greater than zero".to_string(),
                ));
            }
            // Evicting a record whose window is still open would reset its count
            if self.housekeeping.idle_secs < self.limiter.duration_secs {
                return Err(TurnstileError::Config(format!(
                    "housekeeping.idle_secs ({}) must be at least limiter.duration_secs ({})",
                    self.housekeeping.idle_secs, self.limiter.duration_secs
                )));
            }
        }
        Ok(())
    }

    /// The limit policy described by the `limiter` section.
    pub fn policy(&self) -> Result<LimitPolicy> {
        LimitPolicy::per_secs(self.limiter.limit, self.limiter.duration_secs)
            .map_err(|e| TurnstileError::Config(format!("limiter: {}", e)))
    }
}
