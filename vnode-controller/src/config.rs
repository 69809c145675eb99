//! Controller tuning knobs, loadable from YAML.

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use vnode_queue::{RateLimitSettings, DEFAULT_MAX_RETRIES};

use crate::error::ConfigError;

/// Slowest overall requeue rate accepted: one token every 1000 seconds.
pub const MIN_QPS: f64 = 0.001;

pub const SYNC_QUEUE_NAME: &str = "syncPodsFromKubernetes";
pub const STATUS_QUEUE_NAME: &str = "syncPodStatusFromProvider";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    pub base_delay_ms: u64,
    pub max_delay_secs: u64,
    pub qps: f64,
    pub burst: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: 5,
            max_delay_secs: 1000,
            qps: 10.0,
            burst: 100,
        }
    }
}

impl From<&RateLimitConfig> for RateLimitSettings {
    fn from(cfg: &RateLimitConfig) -> Self {
        RateLimitSettings {
            base_delay: Duration::from_millis(cfg.base_delay_ms),
            max_delay: Duration::from_secs(cfg.max_delay_secs),
            qps: cfg.qps,
            burst: cfg.burst,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    /// Requeues per key before it is dropped.
    pub max_retries: u32,
    pub rate_limit: RateLimitConfig,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            rate_limit: RateLimitConfig::default(),
        }
    }
}

impl ControllerConfig {
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        let config: ControllerConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml_str(&raw)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.rate_limit.qps >= MIN_QPS) || !self.rate_limit.qps.is_finite() {
            return Err(ConfigError::Invalid(format!(
                "rate_limit.qps must be a finite number of at least {MIN_QPS}"
            )));
        }
        Ok(())
    }

    pub fn rate_limit_settings(&self) -> RateLimitSettings {
        RateLimitSettings::from(&self.rate_limit)
    }
}
