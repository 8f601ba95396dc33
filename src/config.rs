//! Scheduler configuration.
//!
//! [`BatchProcessorConfig`] is immutable once a scheduler is built. It can be
//! assembled with `with_*` methods, loaded from YAML, or overridden from the
//! environment:
//!
//! - `ANALYSIS_SCHEDULER_MAX_BATCH_SIZE`
//! - `ANALYSIS_SCHEDULER_MAX_WAIT_SECONDS`
//! - `ANALYSIS_SCHEDULER_WORKER_COUNT`
//! - `ANALYSIS_SCHEDULER_CACHE_RESULTS` (`1`/`true` or `0`/`false`)
//! - `ANALYSIS_SCHEDULER_MAX_CACHE_SIZE`
//! - `ANALYSIS_SCHEDULER_BATCH_TIMEOUT_SECONDS`
//! - `ANALYSIS_SCHEDULER_TICK_INTERVAL_MS`

use crate::{Error, ErrorContext, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

const ENV_PREFIX: &str = "ANALYSIS_SCHEDULER_";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchProcessorConfig {
    pub max_batch_size: usize,
    pub max_wait_seconds: f64,
    pub worker_count: usize,
    pub cache_results: bool,
    pub max_cache_size: usize,
    /// Processing budget of one batch before it is failed with a timeout.
    pub batch_timeout_seconds: f64,
    /// Upper bound on how long the deadline ticker sleeps between sweeps.
    pub tick_interval_ms: u64,
    pub max_inputs_per_submission: usize,
    /// Number of recent batch durations kept for the `estimated_time` heuristic.
    pub duration_window: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_ttl_seconds: Option<u64>,
}

impl Default for BatchProcessorConfig {
    fn default() -> Self {
        Self {
            max_batch_size: 32,
            max_wait_seconds: 2.0,
            worker_count: 4,
            cache_results: true,
            max_cache_size: 1000,
            batch_timeout_seconds: 60.0,
            tick_interval_ms: 50,
            max_inputs_per_submission: 1000,
            duration_window: 100,
            cache_ttl_seconds: None,
        }
    }
}

impl BatchProcessorConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_batch_size(mut self, n: usize) -> Self {
        self.max_batch_size = n;
        self
    }

    pub fn with_max_wait(mut self, wait: Duration) -> Self {
        self.max_wait_seconds = wait.as_secs_f64();
        self
    }

    pub fn with_worker_count(mut self, n: usize) -> Self {
        self.worker_count = n;
        self
    }

    pub fn with_cache_results(mut self, enabled: bool) -> Self {
        self.cache_results = enabled;
        self
    }

    pub fn with_max_cache_size(mut self, n: usize) -> Self {
        self.max_cache_size = n;
        self
    }

    pub fn with_batch_timeout(mut self, timeout: Duration) -> Self {
        self.batch_timeout_seconds = timeout.as_secs_f64();
        self
    }

    pub fn with_tick_interval(mut self, tick: Duration) -> Self {
        self.tick_interval_ms = tick.as_millis() as u64;
        self
    }

    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl_seconds = Some(ttl.as_secs());
        self
    }

    pub fn max_wait(&self) -> Duration {
        Duration::from_secs_f64(self.max_wait_seconds.max(0.0))
    }

    pub fn batch_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.batch_timeout_seconds.max(0.0))
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms.max(1))
    }

    pub fn cache_ttl(&self) -> Option<Duration> {
        self.cache_ttl_seconds.map(Duration::from_secs)
    }

    /// Parse a YAML document; missing keys fall back to defaults.
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let cfg: Self = serde_yaml::from_str(yaml)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&raw)
    }

    /// Defaults overridden by any `ANALYSIS_SCHEDULER_*` variables present.
    pub fn from_env() -> Result<Self> {
        Self::default().with_env_overrides()
    }

    pub fn with_env_overrides(self) -> Result<Self> {
        self.with_overrides(|key| std::env::var(format!("{ENV_PREFIX}{key}")).ok())
    }

    fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        if let Some(v) = parse_var(&lookup, "MAX_BATCH_SIZE")? {
            self.max_batch_size = v;
        }
        if let Some(v) = parse_var(&lookup, "MAX_WAIT_SECONDS")? {
            self.max_wait_seconds = v;
        }
        if let Some(v) = parse_var(&lookup, "WORKER_COUNT")? {
            self.worker_count = v;
        }
        if let Some(raw) = lookup("CACHE_RESULTS") {
            self.cache_results = match raw.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" => true,
                "0" | "false" | "no" => false,
                other => {
                    return Err(Error::configuration_with_context(
                        format!("invalid boolean '{}'", other),
                        ErrorContext::new().with_field_path(format!("{ENV_PREFIX}CACHE_RESULTS")),
                    ))
                }
            };
        }
        if let Some(v) = parse_var(&lookup, "MAX_CACHE_SIZE")? {
            self.max_cache_size = v;
        }
        if let Some(v) = parse_var(&lookup, "BATCH_TIMEOUT_SECONDS")? {
            self.batch_timeout_seconds = v;
        }
        if let Some(v) = parse_var(&lookup, "TICK_INTERVAL_MS")? {
            self.tick_interval_ms = v;
        }
        if let Some(v) = parse_var(&lookup, "MAX_INPUTS_PER_SUBMISSION")? {
            self.max_inputs_per_submission = v;
        }
        if let Some(v) = parse_var(&lookup, "DURATION_WINDOW")? {
            self.duration_window = v;
        }
        if let Some(v) = parse_var(&lookup, "CACHE_TTL_SECONDS")? {
            self.cache_ttl_seconds = Some(v);
        }
        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<()> {
        fn invalid(field: &str, details: String) -> Error {
            Error::configuration_with_context(
                format!("invalid value for {}", field),
                ErrorContext::new()
                    .with_field_path(format!("config.{}", field))
                    .with_details(details),
            )
        }

        if self.max_batch_size == 0 {
            return Err(invalid("max_batch_size", "must be at least 1".into()));
        }
        if self.worker_count == 0 {
            return Err(invalid("worker_count", "must be at least 1".into()));
        }
        if !self.max_wait_seconds.is_finite() || self.max_wait_seconds < 0.0 {
            return Err(invalid(
                "max_wait_seconds",
                format!("must be a non-negative number, got {}", self.max_wait_seconds),
            ));
        }
        if !self.batch_timeout_seconds.is_finite() || self.batch_timeout_seconds <= 0.0 {
            return Err(invalid(
                "batch_timeout_seconds",
                format!("must be positive, got {}", self.batch_timeout_seconds),
            ));
        }
        if self.max_inputs_per_submission == 0 {
            return Err(invalid("max_inputs_per_submission", "must be at least 1".into()));
        }
        if self.duration_window == 0 {
            return Err(invalid("duration_window", "must be at least 1".into()));
        }
        Ok(())
    }
}

fn parse_var<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> Result<Option<T>> {
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw.trim().parse::<T>().map(Some).map_err(|_| {
            Error::configuration_with_context(
                format!("cannot parse '{}'", raw),
                ErrorContext::new().with_field_path(format!("{ENV_PREFIX}{key}")),
            )
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let cfg = BatchProcessorConfig::default();
        assert_eq!(cfg.max_batch_size, 32);
        assert_eq!(cfg.max_wait(), Duration::from_secs(2));
        assert_eq!(cfg.worker_count, 4);
        assert!(cfg.cache_results);
        assert_eq!(cfg.max_cache_size, 1000);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_builder() {
        let cfg = BatchProcessorConfig::new()
            .with_max_batch_size(8)
            .with_max_wait(Duration::from_millis(250))
            .with_worker_count(2)
            .with_cache_results(false);
        assert_eq!(cfg.max_batch_size, 8);
        assert_eq!(cfg.max_wait(), Duration::from_millis(250));
        assert_eq!(cfg.worker_count, 2);
        assert!(!cfg.cache_results);
    }

    #[test]
    fn test_yaml_partial_document() {
        let cfg = BatchProcessorConfig::from_yaml_str(
            "max_batch_size: 16\nmax_wait_seconds: 0.5\ncache_ttl_seconds: 600\n",
        )
        .unwrap();
        assert_eq!(cfg.max_batch_size, 16);
        assert_eq!(cfg.max_wait(), Duration::from_millis(500));
        assert_eq!(cfg.worker_count, 4);
        assert_eq!(cfg.cache_ttl(), Some(Duration::from_secs(600)));
    }

    #[test]
    fn test_yaml_rejects_zero_workers() {
        let err = BatchProcessorConfig::from_yaml_str("worker_count: 0").unwrap_err();
        assert!(matches!(err, Error::Configuration { .. }));
        assert!(err.to_string().contains("config.worker_count"));
    }

    #[test]
    fn test_overrides_from_lookup() {
        let vars: HashMap<&str, &str> = [
            ("MAX_BATCH_SIZE", "64"),
            ("CACHE_RESULTS", "false"),
            ("MAX_WAIT_SECONDS", "1.5"),
        ]
        .into_iter()
        .collect();
        let cfg = BatchProcessorConfig::default()
            .with_overrides(|k| vars.get(k).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(cfg.max_batch_size, 64);
        assert!(!cfg.cache_results);
        assert_eq!(cfg.max_wait(), Duration::from_millis(1500));
    }

    #[test]
    fn test_override_parse_failure() {
        let err = BatchProcessorConfig::default()
            .with_overrides(|k| (k == "WORKER_COUNT").then(|| "many".to_string()))
            .unwrap_err();
        assert!(err.to_string().contains("ANALYSIS_SCHEDULER_WORKER_COUNT"));
    }

    #[test]
    fn test_negative_wait_rejected() {
        let mut cfg = BatchProcessorConfig::default();
        cfg.max_wait_seconds = -1.0;
        assert!(cfg.validate().is_err());
    }
}
