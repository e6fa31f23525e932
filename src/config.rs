//! Configuration for the stressmap engine.

use crate::core::hotspot::DEFAULT_HOTSPOT_THRESHOLD;
use crate::core::range::EstimatorConfig;
use crate::core::rules::ClassifierConfig;
use crate::error::PipelineError;
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Main configuration for the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Time between scoring passes
    #[serde(with = "duration_serde")]
    pub poll_interval: Duration,

    /// Time between hotspot flushes into the archive
    #[serde(with = "duration_serde")]
    pub flush_interval: Duration,

    /// Root directory of the file store and statistics
    pub data_path: PathBuf,

    /// IANA timezone used for hotspot day/hour buckets (system local time if unset)
    pub timezone: Option<String>,

    /// Seed for the estimator's random draws (entropy if unset)
    pub seed: Option<u64>,

    pub estimator: EstimatorConfig,

    pub classifier: ClassifierConfig,

    /// Stress score a record must exceed to count towards a hotspot
    pub hotspot_threshold: f64,

    pub retry: RetryConfig,
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("stressmap-engine");

        Self {
            poll_interval: Duration::from_secs(30),
            flush_interval: Duration::from_secs(3600),
            data_path: data_dir,
            timezone: None,
            seed: None,
            estimator: EstimatorConfig::default(),
            classifier: ClassifierConfig::default(),
            hotspot_threshold: DEFAULT_HOTSPOT_THRESHOLD,
            retry: RetryConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from the default location.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::config_path())
    }

    /// Load configuration from `path`, falling back to defaults when it does not exist.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&content).map_err(ConfigError::Parse)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to the default location.
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&Self::config_path())
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(self).map_err(ConfigError::Serialize)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Get the path to the configuration file.
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("stressmap-engine")
            .join("config.json")
    }

    /// Path of the persisted run statistics.
    pub fn stats_path(&self) -> PathBuf {
        self.data_path.join("stats.json")
    }

    /// Parse the configured timezone name.
    pub fn parsed_timezone(&self) -> Result<Option<Tz>, PipelineError> {
        self.timezone
            .as_deref()
            .map(|name| {
                name.parse::<Tz>()
                    .map_err(|_| PipelineError::InvalidTimezone(name.to_string()))
            })
            .transpose()
    }

    /// Check every parameter the pipeline relies on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.estimator.validate()?;
        self.classifier.validate()?;
        self.parsed_timezone()?;
        if !(0.0..=1.0).contains(&self.hotspot_threshold) {
            return Err(ConfigError::Invalid(format!(
                "hotspot_threshold must lie in [0, 1], got {}",
                self.hotspot_threshold
            )));
        }
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::Invalid(
                "retry.max_attempts must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Bounded retry for polls that find no new data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff_ms: 1_000,
            max_backoff_ms: 30_000,
        }
    }
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Parse error: {0}")]
    Parse(serde_json::Error),
    #[error("Serialize error: {0}")]
    Serialize(serde_json::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
    #[error(transparent)]
    Pipeline(#[from] PipelineError),
}

/// Serde support for Duration.
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_secs().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.poll_interval, Duration::from_secs(30));
        assert_eq!(config.flush_interval, Duration::from_secs(3600));
        assert_eq!(config.estimator.warmup_len, 120);
        assert_eq!(config.classifier.window_len, 30);
        assert_eq!(config.hotspot_threshold, 0.6);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let config: Config =
            serde_json::from_str(r#"{"poll_interval": 5, "estimator": {"k": 0.5}}"#).unwrap();
        assert_eq!(config.poll_interval, Duration::from_secs(5));
        assert_eq!(config.estimator.k, 0.5);
        assert_eq!(config.estimator.alpha_prior, 0.01);
        assert_eq!(config.classifier.weights.eda_trend, 0.4);
    }

    #[test]
    fn test_timezone_validation() {
        let mut config = Config {
            timezone: Some("Europe/Rome".to_string()),
            ..Config::default()
        };
        assert_eq!(config.parsed_timezone().unwrap(), Some(chrono_tz::Europe::Rome));

        config.timezone = Some("Mars/Olympus".to_string());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");
        let config = Config {
            seed: Some(7),
            data_path: dir.path().to_path_buf(),
            ..Config::default()
        };
        config.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded.seed, Some(7));
        assert_eq!(loaded.data_path, dir.path());
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_from(&dir.path().join("absent.json")).unwrap();
        assert_eq!(config.retry, RetryConfig::default());
    }
}
