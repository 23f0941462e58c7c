// ABOUTME: Engine-wide runtime configuration, loadable from replication-config.toml
// ABOUTME: CLI flags override file values; file values override these built-in defaults

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Recognized runtime configuration options plus the rate limiter's
/// adaptive-throttle knobs. Every field has a built-in default so a caller
/// can construct `EngineConfig::default()` and get sensible behavior
/// without a config file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub batch_size: u32,
    pub bulk_insert_size: u32,
    pub checkpoint_interval: u32,
    pub max_retries: u32,
    pub retry_delay_ms: u64,
    pub job_timeout_secs: u64,
    pub batch_timeout_secs: u64,
    pub rate_limit: RateLimitConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            batch_size: 100,
            bulk_insert_size: 50,
            checkpoint_interval: 50,
            max_retries: 3,
            retry_delay_ms: 2000,
            job_timeout_secs: 2 * 60 * 60,
            batch_timeout_secs: 2 * 60,
            rate_limit: RateLimitConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    pub max_ops_per_second: f64,
    pub max_bytes_per_second: f64,
    pub burst_multiplier: f64,
    pub slow_response_threshold_ms: u64,
    pub fast_response_threshold_ms: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        RateLimitConfig {
            max_ops_per_second: 750.0,
            max_bytes_per_second: 50.0 * 1024.0 * 1024.0,
            burst_multiplier: 1.5,
            slow_response_threshold_ms: 500,
            fast_response_threshold_ms: 100,
        }
    }
}

impl EngineConfig {
    /// Load configuration from a `replication-config.toml` file, falling
    /// back to built-in defaults for any field the file omits.
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file at {}", path.display()))?;
        let cfg: EngineConfig = toml::from_str(&contents)
            .with_context(|| format!("failed to parse config file at {}", path.display()))?;
        Ok(cfg)
    }

    /// Load from `path` if it exists, otherwise fall back to defaults.
    /// This is the shape the CLI uses: a `--config` flag is optional.
    pub fn load_from_file_or_default(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if path.exists() {
            Self::load_from_file(path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn job_timeout(&self) -> Duration {
        Duration::from_secs(self.job_timeout_secs)
    }

    pub fn batch_timeout(&self) -> Duration {
        Duration::from_secs(self.batch_timeout_secs)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_matches_spec_defaults() {
        let cfg = EngineConfig::default();
        assert_eq!(cfg.batch_size, 100);
        assert_eq!(cfg.bulk_insert_size, 50);
        assert_eq!(cfg.checkpoint_interval, 50);
        assert_eq!(cfg.max_retries, 3);
        assert_eq!(cfg.job_timeout_secs, 7200);
        assert_eq!(cfg.rate_limit.burst_multiplier, 1.5);
        assert_eq!(cfg.rate_limit.slow_response_threshold_ms, 500);
        assert_eq!(cfg.rate_limit.fast_response_threshold_ms, 100);
    }

    #[test]
    fn partial_toml_falls_back_to_defaults_for_missing_fields() {
        let toml_str = "batch_size = 200\n";
        let cfg: EngineConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(cfg.batch_size, 200);
        assert_eq!(cfg.bulk_insert_size, 50);
        assert_eq!(cfg.rate_limit.max_ops_per_second, 750.0);
    }

    #[test]
    fn load_from_missing_file_falls_back_to_default() {
        let cfg = EngineConfig::load_from_file_or_default("/nonexistent/replication-config.toml")
            .unwrap();
        assert_eq!(cfg.batch_size, 100);
    }
}
