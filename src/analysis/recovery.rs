//! Recovery time after a failure
//!
//! The baseline comes from every record received before the failure. After
//! the failure a window of consecutive records slides forward one record at a
//! time; recovery is the first window whose p95 latency is back within
//! `latency_threshold_factor x baseline` and whose clean-success fraction is at
//! least `success_threshold_factor`.

use serde::Serialize;
use tracing::{info, warn};

use super::Unavailable;
use super::percentile::percentile;
use crate::metrics::{OutcomeRecord, Status};
use crate::{Error, Result};

/// Recovery thresholds
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RecoveryConfig {
    /// Recovered when window p95 <= baseline p95 x this
    pub latency_threshold_factor: f64,
    /// Recovered when the window's `SUCCESS` fraction >= this
    pub success_threshold_factor: f64,
    /// Consecutive records per window
    pub window_records: usize,
    /// Minimum pre-failure records for a baseline
    pub min_baseline_samples: usize,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            latency_threshold_factor: 1.5,
            success_threshold_factor: 0.8,
            window_records: 5,
            min_baseline_samples: 5,
        }
    }
}

/// Observed recovery after a failure
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecoveryResult {
    /// Failure start used for the analysis
    pub failure_time_ms: f64,
    /// Receive time of the first record of the recovered window
    pub recovery_time_ms: f64,
    /// `recovery_time_ms - failure_time_ms`, never negative
    pub recovery_duration_ms: f64,
    /// p95 latency before the failure
    pub baseline_latency_p95_ms: f64,
    /// Request rate before the failure
    pub baseline_throughput_rps: f64,
    /// p95 latency of the recovered window
    pub recovered_latency_p95_ms: f64,
    /// Request rate across the recovered window
    pub recovered_throughput_rps: f64,
}

impl RecoveryResult {
    /// Recovery duration in seconds
    #[must_use]
    pub fn recovery_duration_secs(&self) -> f64 {
        self.recovery_duration_ms / 1000.0
    }
}

/// What the recovery analysis concluded
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RecoveryOutcome {
    /// Recovery was observed
    Recovered(RecoveryResult),
    /// No window met both thresholds within the data
    NotObserved {
        /// Failure start used for the analysis
        failure_time_ms: f64,
        /// p95 latency before the failure
        baseline_latency_p95_ms: f64,
        /// Request rate before the failure
        baseline_throughput_rps: f64,
    },
    /// Not enough data to compute a baseline
    Unavailable(Unavailable),
}

impl RecoveryOutcome {
    /// The result, if recovery was observed
    #[must_use]
    pub fn recovered(&self) -> Option<&RecoveryResult> {
        match self {
            Self::Recovered(result) => Some(result),
            _ => None,
        }
    }
}

fn validate(config: &RecoveryConfig, failure_start_ms: f64) -> Result<()> {
    if !failure_start_ms.is_finite() {
        return Err(Error::invalid("failure_start_ms must be finite"));
    }
    if config.window_records == 0 {
        return Err(Error::invalid("recovery window must hold at least one record"));
    }
    if !(config.latency_threshold_factor.is_finite() && config.latency_threshold_factor > 0.0) {
        return Err(Error::invalid("latency_threshold_factor must be positive"));
    }
    if !(0.0..=1.0).contains(&config.success_threshold_factor) {
        return Err(Error::invalid("success_threshold_factor must be within 0..=1"));
    }
    Ok(())
}

/// Requests per second across a receive-time-ordered slice; 0 for a zero span
#[allow(clippy::cast_precision_loss)]
fn rate_over(records: &[OutcomeRecord]) -> f64 {
    match (records.first(), records.last()) {
        (Some(first), Some(last)) => {
            let span_secs = (last.received_at_ms - first.received_at_ms) / 1000.0;
            if span_secs > 0.0 {
                records.len() as f64 / span_secs
            } else {
                0.0
            }
        }
        _ => 0.0,
    }
}

/// Compute recovery after `failure_start_ms` over receive-time-ordered records
#[allow(clippy::cast_precision_loss)]
pub fn compute_recovery(
    records: &[OutcomeRecord],
    failure_start_ms: f64,
    config: &RecoveryConfig,
) -> Result<RecoveryOutcome> {
    validate(config, failure_start_ms)?;

    if records.is_empty() {
        warn!("No records, recovery analysis unavailable");
        return Ok(RecoveryOutcome::Unavailable(Unavailable::NoRecords));
    }

    let split = records.partition_point(|r| r.received_at_ms < failure_start_ms);
    let (before, after) = records.split_at(split);

    if before.len() < config.min_baseline_samples {
        warn!(
            found = before.len(),
            required = config.min_baseline_samples,
            "Not enough pre-failure data for a recovery baseline"
        );
        return Ok(RecoveryOutcome::Unavailable(Unavailable::InsufficientBaseline {
            required: config.min_baseline_samples,
            found: before.len(),
        }));
    }

    let baseline: Vec<f64> = before.iter().map(|r| r.latency_ms).collect();
    let Some(baseline_latency) = percentile(&baseline, 95.0) else {
        return Ok(RecoveryOutcome::Unavailable(Unavailable::NoRecords));
    };
    let baseline_throughput = rate_over(before);
    let latency_limit = baseline_latency * config.latency_threshold_factor;

    let mut latencies = Vec::with_capacity(config.window_records);
    for window in after.windows(config.window_records) {
        latencies.clear();
        latencies.extend(window.iter().map(|r| r.latency_ms));
        let Some(window_p95) = percentile(&latencies, 95.0) else {
            continue;
        };
        let clean = window.iter().filter(|r| r.status == Status::Success).count();
        let success_fraction = clean as f64 / window.len() as f64;

        if window_p95 <= latency_limit && success_fraction >= config.success_threshold_factor {
            let recovery_time_ms = window[0].received_at_ms;
            let result = RecoveryResult {
                failure_time_ms: failure_start_ms,
                recovery_time_ms,
                recovery_duration_ms: recovery_time_ms - failure_start_ms,
                baseline_latency_p95_ms: baseline_latency,
                baseline_throughput_rps: baseline_throughput,
                recovered_latency_p95_ms: window_p95,
                recovered_throughput_rps: rate_over(window),
            };
            info!(
                failure_start_ms,
                recovery_time_ms,
                duration_secs = result.recovery_duration_secs(),
                "Recovery observed"
            );
            return Ok(RecoveryOutcome::Recovered(result));
        }
    }

    warn!(failure_start_ms, "System did not recover within the measurement period");
    Ok(RecoveryOutcome::NotObserved {
        failure_time_ms: failure_start_ms,
        baseline_latency_p95_ms: baseline_latency,
        baseline_throughput_rps: baseline_throughput,
    })
}
