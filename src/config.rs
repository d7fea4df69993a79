//! Configuration management

use std::path::{Path, PathBuf};
use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Format, Yaml},
};
use serde::{Deserialize, Serialize};

use crate::analysis::{DetectorConfig, RecoveryConfig, WindowMode};
use crate::{Error, Result};

/// Main configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Load generation and failover
    pub dispatch: DispatchConfig,
    /// Analysis thresholds and windows
    pub analysis: AnalysisConfig,
    /// Where results are written
    pub output: OutputConfig,
}

/// Dispatcher and load generator configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Replica base URLs, e.g. `http://127.0.0.1:8001`
    pub replicas: Vec<String>,
    /// Bound on a single attempt against one replica
    #[serde(with = "humantime_serde")]
    pub attempt_timeout: Duration,
    /// Target logical requests per second
    pub rate_per_second: f64,
    /// How long a run lasts
    #[serde(with = "humantime_serde")]
    pub duration: Duration,
    /// Concurrent workers; 1 dispatches sequentially
    pub workers: usize,
    /// Unit of work sent with every request
    pub work: WorkConfig,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            replicas: Vec::new(),
            attempt_timeout: Duration::from_secs(5),
            rate_per_second: 5.0,
            duration: Duration::from_secs(60),
            workers: 1,
            work: WorkConfig::default(),
        }
    }
}

/// Work descriptor forwarded to the backend
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkConfig {
    /// Input the backend should process
    pub input_path: String,
    /// Numeric parameter of the operation
    pub threshold: u32,
}

impl Default for WorkConfig {
    fn default() -> Self {
        Self {
            input_path: "input.png".to_string(),
            threshold: 100,
        }
    }
}

/// Analysis configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Window length for throughput and latency series
    pub window_size_ms: f64,
    /// Slide latency windows instead of tiling them
    pub sliding: bool,
    /// Step between sliding windows
    pub slide_step_ms: f64,
    /// Latency above this is always a spike
    pub spike_threshold_ms: f64,
    /// Shortest spike run reported as a failure
    pub min_spike_duration_ms: f64,
    /// Recovered when window p95 <= baseline p95 x this
    pub latency_threshold_factor: f64,
    /// Recovered when the clean-success fraction >= this
    pub success_threshold_factor: f64,
    /// Exclusion margin around a failure interval
    pub phase_buffer_ms: f64,
    /// Minimum records for any baseline
    pub min_baseline_samples: usize,
    /// Detect the failure interval when none is given
    pub auto_detect: bool,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            window_size_ms: 1000.0,
            sliding: false,
            slide_step_ms: 500.0,
            spike_threshold_ms: 1000.0,
            min_spike_duration_ms: 2000.0,
            latency_threshold_factor: 1.5,
            success_threshold_factor: 0.8,
            phase_buffer_ms: 1000.0,
            min_baseline_samples: 5,
            auto_detect: true,
        }
    }
}

impl AnalysisConfig {
    /// Latency window layout
    #[must_use]
    pub fn window_mode(&self) -> WindowMode {
        WindowMode::from_flag(self.sliding, self.slide_step_ms)
    }

    /// Failure detector thresholds
    #[must_use]
    pub fn detector(&self) -> DetectorConfig {
        DetectorConfig {
            spike_threshold_ms: self.spike_threshold_ms,
            min_spike_duration_ms: self.min_spike_duration_ms,
            min_baseline_samples: self.min_baseline_samples,
            ..DetectorConfig::default()
        }
    }

    /// Recovery analyzer thresholds
    #[must_use]
    pub fn recovery(&self) -> RecoveryConfig {
        RecoveryConfig {
            latency_threshold_factor: self.latency_threshold_factor,
            success_threshold_factor: self.success_threshold_factor,
            min_baseline_samples: self.min_baseline_samples,
            ..RecoveryConfig::default()
        }
    }
}

/// Output configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Directory for metrics files and analysis artifacts
    pub directory: PathBuf,
    /// File name prefix of exported metrics
    pub file_prefix: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("./results"),
            file_prefix: "metrics".to_string(),
        }
    }
}

impl OutputConfig {
    /// Path of an exported metrics file with the given extension
    #[must_use]
    pub fn metrics_path(&self, extension: &str) -> PathBuf {
        self.directory
            .join(format!("{}.{extension}", self.file_prefix))
    }

    /// Path of the exported failure events
    #[must_use]
    pub fn events_path(&self) -> PathBuf {
        self.directory
            .join(format!("{}_events.csv", self.file_prefix))
    }
}

impl Config {
    /// Load configuration from file and environment
    ///
    /// # Errors
    ///
    /// Returns an error if the config file does not exist, cannot be parsed,
    /// or holds out-of-range values.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut figment = Figment::new();

        // Load from file if provided
        if let Some(p) = path {
            if !p.exists() {
                return Err(Error::Config(format!(
                    "Config file not found: {}",
                    p.display()
                )));
            }
            figment = figment.merge(Yaml::file(p));
        }

        // Merge environment variables (FAILOVER_BENCH_ prefix)
        figment = figment.merge(Env::prefixed("FAILOVER_BENCH_").split("__"));

        let config: Self = figment
            .extract()
            .map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values no run or analysis can work with
    pub fn validate(&self) -> Result<()> {
        let d = &self.dispatch;
        if !(d.rate_per_second.is_finite() && d.rate_per_second > 0.0) {
            return Err(Error::Config(format!(
                "dispatch.rate_per_second must be positive, got {}",
                d.rate_per_second
            )));
        }
        if d.workers == 0 {
            return Err(Error::Config("dispatch.workers must be at least 1".into()));
        }
        if d.attempt_timeout.is_zero() {
            return Err(Error::Config("dispatch.attempt_timeout must be non-zero".into()));
        }

        let a = &self.analysis;
        for (name, value) in [
            ("window_size_ms", a.window_size_ms),
            ("slide_step_ms", a.slide_step_ms),
            ("latency_threshold_factor", a.latency_threshold_factor),
        ] {
            if !(value.is_finite() && value > 0.0) {
                return Err(Error::Config(format!(
                    "analysis.{name} must be positive, got {value}"
                )));
            }
        }
        if !(a.phase_buffer_ms.is_finite() && a.phase_buffer_ms >= 0.0) {
            return Err(Error::Config("analysis.phase_buffer_ms must be >= 0".into()));
        }
        if !(0.0..=1.0).contains(&a.success_threshold_factor) {
            return Err(Error::Config(
                "analysis.success_threshold_factor must be within 0..=1".into(),
            ));
        }
        Ok(())
    }
}

/// Custom humantime serde module for Duration
pub mod humantime_serde {
    use std::time::Duration;

    use serde::{self, Deserialize, Deserializer, Serializer};

    /// Serialize Duration to human-readable string (e.g., "30s", "250ms")
    ///
    /// # Errors
    ///
    /// Returns a serialization error if the serializer fails.
    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        if duration.subsec_millis() == 0 {
            serializer.serialize_str(&format!("{}s", duration.as_secs()))
        } else {
            serializer.serialize_str(&format!("{}ms", duration.as_millis()))
        }
    }

    /// Deserialize human-readable duration string (e.g., "30s", "5m", "100ms")
    ///
    /// # Errors
    ///
    /// Returns a deserialization error if the string cannot be parsed as a duration.
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        let s = s.trim();

        // "ms" first: it also ends in 's'.
        if let Some(ms) = s.strip_suffix("ms") {
            ms.parse::<u64>()
                .map(Duration::from_millis)
                .map_err(serde::de::Error::custom)
        } else if let Some(secs) = s.strip_suffix('s') {
            secs.parse::<u64>()
                .map(Duration::from_secs)
                .map_err(serde::de::Error::custom)
        } else if let Some(mins) = s.strip_suffix('m') {
            mins.parse::<u64>()
                .map(|m| Duration::from_secs(m * 60))
                .map_err(serde::de::Error::custom)
        } else {
            // Assume seconds
            s.parse::<u64>()
                .map(Duration::from_secs)
                .map_err(serde::de::Error::custom)
        }
    }
}
