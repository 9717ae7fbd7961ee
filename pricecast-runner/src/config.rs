//! Pipeline configuration, loaded from TOML.
//!
//! Every field has a default, so an empty file (or no file) yields the
//! production setup:
//! - short path: 30 days of hourly data, SARIMA (1,1,1)(1,0,1,24)
//! - long path: 730 days of daily data, trend-season with a stiff trend

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use pricecast_core::domain::Horizon;
use pricecast_core::models::{ModelSpec, SarimaParams, TrendSeasonParams};
use pricecast_core::split::SplitPolicy;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Where the long path gets its daily bars.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DailySource {
    /// Roll up the hourly window.
    #[default]
    AggregateHourly,
    /// Read the daily price table directly.
    DailyTable,
}

/// Settings for one forecasting path. In a config file, `model` and `split`
/// tables replace the whole value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HorizonConfig {
    /// Trailing window of history read from the price store.
    pub window_days: i64,
    pub model: ModelSpec,
    pub split: SplitPolicy,
    /// Model name written to metrics rows.
    pub metrics_model_name: String,
}

impl HorizonConfig {
    pub fn short_term() -> Self {
        Self {
            window_days: 30,
            model: ModelSpec::Sarima(SarimaParams::short_term()),
            split: SplitPolicy::short_term(),
            metrics_model_name: "sarima_short_term".into(),
        }
    }

    pub fn long_term() -> Self {
        Self {
            window_days: 730,
            model: ModelSpec::TrendSeason(TrendSeasonParams::default()),
            split: SplitPolicy::long_term(),
            metrics_model_name: "prophet_long_term".into(),
        }
    }
}

/// A horizon table as written in the file.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct HorizonOverrides {
    window_days: Option<i64>,
    model: Option<ModelSpec>,
    split: Option<SplitPolicy>,
    metrics_model_name: Option<String>,
}

impl HorizonOverrides {
    fn resolve(self, base: HorizonConfig) -> HorizonConfig {
        HorizonConfig {
            window_days: self.window_days.unwrap_or(base.window_days),
            model: self.model.unwrap_or(base.model),
            split: self.split.unwrap_or(base.split),
            metrics_model_name: self.metrics_model_name.unwrap_or(base.metrics_model_name),
        }
    }
}

/// The config file before defaults are filled in.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct ConfigFile {
    default_ticker: Option<String>,
    short: HorizonOverrides,
    long: HorizonOverrides,
    daily_source: Option<DailySource>,
    confidence: Option<f64>,
    worker_threads: Option<usize>,
    unit_timeout_secs: Option<u64>,
    read_retries: Option<u32>,
    retry_base_delay_ms: Option<u64>,
    seed: Option<u64>,
}

impl From<ConfigFile> for PipelineConfig {
    fn from(file: ConfigFile) -> Self {
        let base = PipelineConfig::default();
        PipelineConfig {
            default_ticker: file.default_ticker.unwrap_or(base.default_ticker),
            short: file.short.resolve(base.short),
            long: file.long.resolve(base.long),
            daily_source: file.daily_source.unwrap_or(base.daily_source),
            confidence: file.confidence.unwrap_or(base.confidence),
            worker_threads: file.worker_threads.unwrap_or(base.worker_threads),
            unit_timeout_secs: file.unit_timeout_secs.or(base.unit_timeout_secs),
            read_retries: file.read_retries.unwrap_or(base.read_retries),
            retry_base_delay_ms: file.retry_base_delay_ms.unwrap_or(base.retry_base_delay_ms),
            seed: file.seed.unwrap_or(base.seed),
        }
    }
}

/// Top-level pipeline settings. Fields missing from the file keep their
/// defaults, including individual fields inside `[short]` and `[long]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "ConfigFile")]
pub struct PipelineConfig {
    /// Ticker used when a request names none.
    pub default_ticker: String,
    pub short: HorizonConfig,
    pub long: HorizonConfig,
    pub daily_source: DailySource,
    /// Central interval coverage for forecasts.
    pub confidence: f64,
    /// Units run concurrently; 1 runs them one after another.
    pub worker_threads: usize,
    /// Per-unit deadline. `None` or 0 disables it.
    pub unit_timeout_secs: Option<u64>,
    pub read_retries: u32,
    pub retry_base_delay_ms: u64,
    /// Master seed; per-unit seeds are derived from it.
    pub seed: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            default_ticker: "HDFCBANK.NS".into(),
            short: HorizonConfig::short_term(),
            long: HorizonConfig::long_term(),
            daily_source: DailySource::AggregateHourly,
            confidence: 0.8,
            worker_threads: 1,
            unit_timeout_secs: Some(600),
            read_retries: 3,
            retry_base_delay_ms: 200,
            seed: 42,
        }
    }
}

impl PipelineConfig {
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.worker_threads == 0 {
            return Err(ConfigError::Invalid("worker_threads must be at least 1".into()));
        }
        if !(self.confidence > 0.0 && self.confidence < 1.0) {
            return Err(ConfigError::Invalid(format!(
                "confidence must be in (0, 1), got {}",
                self.confidence
            )));
        }
        for (name, section) in [("short", &self.short), ("long", &self.long)] {
            if section.window_days <= 0 {
                return Err(ConfigError::Invalid(format!(
                    "{name}.window_days must be positive"
                )));
            }
        }
        if self.default_ticker.trim().is_empty() {
            return Err(ConfigError::Invalid("default_ticker is empty".into()));
        }
        Ok(())
    }

    pub fn horizon(&self, horizon: Horizon) -> &HorizonConfig {
        match horizon {
            Horizon::Short => &self.short,
            Horizon::Long => &self.long,
        }
    }

    pub fn unit_timeout(&self) -> Option<Duration> {
        self.unit_timeout_secs
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
    }

    pub fn retry_base_delay(&self) -> Duration {
        Duration::from_millis(self.retry_base_delay_ms)
    }
}
