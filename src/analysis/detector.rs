//! Failure detection from latency spikes
//!
//! The baseline is the p95 latency of the earliest `max(5, ceil(n / 10))`
//! records. A record is a spike when its latency exceeds the absolute
//! threshold or `3 x` the baseline. A run of spikes that lasts at least the
//! minimum duration, measured from the first spike to the first normal record
//! after it, is reported as a failure period. One forward pass, O(n).

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::Unavailable;
use super::percentile::percentile;
use crate::metrics::{FailureEvent, OutcomeRecord};

/// Detection thresholds
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetectorConfig {
    /// Latency above this is always a spike (ms)
    pub spike_threshold_ms: f64,
    /// Spike runs shorter than this are noise (ms)
    pub min_spike_duration_ms: f64,
    /// Latency above `baseline_p95 * baseline_multiplier` is a spike
    pub baseline_multiplier: f64,
    /// Minimum baseline sample count
    pub min_baseline_samples: usize,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            spike_threshold_ms: 1000.0,
            min_spike_duration_ms: 2000.0,
            baseline_multiplier: 3.0,
            min_baseline_samples: 5,
        }
    }
}

/// A detected `[failure_start, recovery_end)` interval
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FailurePeriod {
    /// Receive time of the first spike
    pub failure_start_ms: f64,
    /// Receive time of the first normal record after the run
    pub recovery_end_ms: f64,
}

impl FailurePeriod {
    /// Length of the period
    #[must_use]
    pub fn duration_ms(&self) -> f64 {
        self.recovery_end_ms - self.failure_start_ms
    }

    /// Convert into a `detected` failure event
    #[must_use]
    pub fn to_event(&self) -> FailureEvent {
        FailureEvent {
            failure_start_ms: self.failure_start_ms,
            recovery_time_ms: Some(self.recovery_end_ms),
            event_type: FailureEvent::DETECTED.to_string(),
            description: format!("latency spike lasting {:.0} ms", self.duration_ms()),
        }
    }
}

/// Result of one detection pass
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Detection {
    /// Baseline p95 latency (ms)
    pub baseline_p95_ms: f64,
    /// Number of records the baseline was computed from
    pub baseline_samples: usize,
    /// Periods that ended within the data, in time order
    pub periods: Vec<FailurePeriod>,
    /// Start of a spike run still in progress at the end of the data
    pub unresolved_since_ms: Option<f64>,
}

/// Scan receive-time-ordered records for sustained latency spikes
pub fn detect_failures(
    records: &[OutcomeRecord],
    config: &DetectorConfig,
) -> Result<Detection, Unavailable> {
    if records.is_empty() {
        warn!("No records, failure detection unavailable");
        return Err(Unavailable::NoRecords);
    }
    if records.len() < config.min_baseline_samples {
        warn!(
            found = records.len(),
            required = config.min_baseline_samples,
            "Too few records for a detection baseline"
        );
        return Err(Unavailable::InsufficientBaseline {
            required: config.min_baseline_samples,
            found: records.len(),
        });
    }

    let baseline_samples = config.min_baseline_samples.max(records.len().div_ceil(10));
    let baseline: Vec<f64> = records[..baseline_samples]
        .iter()
        .map(|r| r.latency_ms)
        .collect();
    let Some(baseline_p95_ms) = percentile(&baseline, 95.0) else {
        return Err(Unavailable::NoRecords);
    };
    let relative_threshold = baseline_p95_ms * config.baseline_multiplier;

    let mut periods = Vec::new();
    let mut spike_start: Option<f64> = None;

    for record in records {
        let is_spike = record.latency_ms > config.spike_threshold_ms
            || record.latency_ms > relative_threshold;

        match (is_spike, spike_start) {
            (true, None) => spike_start = Some(record.received_at_ms),
            (false, Some(start)) => {
                let elapsed = record.received_at_ms - start;
                if elapsed >= config.min_spike_duration_ms {
                    periods.push(FailurePeriod {
                        failure_start_ms: start,
                        recovery_end_ms: record.received_at_ms,
                    });
                } else {
                    debug!(start, elapsed, "Discarding short spike run");
                }
                spike_start = None;
            }
            _ => {}
        }
    }

    info!(
        baseline_p95_ms,
        periods = periods.len(),
        unresolved = spike_start.is_some(),
        "Failure detection complete"
    );

    Ok(Detection {
        baseline_p95_ms,
        baseline_samples,
        periods,
        unresolved_since_ms: spike_start,
    })
}
