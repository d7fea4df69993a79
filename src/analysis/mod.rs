//! Fault-tolerance analysis over a frozen set of outcome records
//!
//! Every function here is a pure computation over a [`MetricsSnapshot`].
//! [`Analyzer`] bundles a snapshot with a [`WindowCache`] so repeated window
//! queries with the same parameters are computed once.
//!
//! Missing data is never an error: detection and recovery report
//! [`Unavailable`] and log a warning. Only invalid parameters fail.

mod cache;
mod detector;
mod percentile;
mod phase;
mod recovery;
mod summary;
mod window;

pub use cache::{SeriesKey, WindowCache};
pub use detector::{Detection, DetectorConfig, FailurePeriod, detect_failures};
pub use percentile::{mean, percentile, percentile_sorted};
pub use phase::{Phase, PhaseBoundaries, PhaseSummary, Segmentation, segment_phases};
pub use recovery::{RecoveryConfig, RecoveryOutcome, RecoveryResult, compute_recovery};
pub use summary::{SummaryStatistics, summarize};
pub use window::{
    LatencyWindow, MAX_WINDOWS, ThroughputWindow, WindowMode, compute_percentile_latency,
    compute_throughput,
};

use std::sync::Arc;

use serde::Serialize;
use tracing::info;

use crate::Result;
use crate::metrics::{FailureEvent, MetricsSnapshot, MetricsStore, OutcomeRecord};

/// Why an analysis produced no result
#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum Unavailable {
    /// The record set is empty
    #[error("no records to analyze")]
    NoRecords,

    /// Fewer baseline records than required
    #[error("insufficient baseline: need {required} records, found {found}")]
    InsufficientBaseline {
        /// Minimum number of records
        required: usize,
        /// Number actually available
        found: usize,
    },
}

/// Snapshot plus memoized window series
pub struct Analyzer {
    snapshot: MetricsSnapshot,
    cache: WindowCache,
}

impl Analyzer {
    /// Analyze a frozen snapshot
    #[must_use]
    pub fn new(snapshot: MetricsSnapshot) -> Self {
        Self {
            snapshot,
            cache: WindowCache::new(),
        }
    }

    /// Snapshot the store and analyze that
    #[must_use]
    pub fn from_store(store: &MetricsStore) -> Self {
        Self::new(store.snapshot())
    }

    /// The analyzed snapshot
    #[must_use]
    pub fn snapshot(&self) -> &MetricsSnapshot {
        &self.snapshot
    }

    /// Records ordered by receive time
    #[must_use]
    pub fn records(&self) -> &[OutcomeRecord] {
        self.snapshot.records()
    }

    /// The window cache
    #[must_use]
    pub fn cache(&self) -> &WindowCache {
        &self.cache
    }

    /// Throughput per fixed window
    pub fn throughput(&self, window_size_ms: f64) -> Result<Arc<[ThroughputWindow]>> {
        let key = SeriesKey::throughput(self.snapshot.version(), window_size_ms);
        self.cache
            .throughput(key, || compute_throughput(self.records(), window_size_ms))
    }

    /// Latency percentiles per fixed or sliding window
    pub fn latency(&self, window_size_ms: f64, mode: WindowMode) -> Result<Arc<[LatencyWindow]>> {
        let key = SeriesKey::latency(self.snapshot.version(), window_size_ms, mode);
        self.cache.latency(key, || {
            compute_percentile_latency(self.records(), window_size_ms, mode)
        })
    }

    /// Detect sustained latency spikes
    pub fn detect(&self, config: &DetectorConfig) -> std::result::Result<Detection, Unavailable> {
        detect_failures(self.records(), config)
    }

    /// Recovery after `failure_start_ms`
    pub fn recovery(&self, failure_start_ms: f64, config: &RecoveryConfig) -> Result<RecoveryOutcome> {
        compute_recovery(self.records(), failure_start_ms, config)
    }

    /// Per-phase statistics around a failure interval
    #[must_use]
    pub fn phases(&self, boundaries: &PhaseBoundaries) -> Segmentation {
        segment_phases(self.records(), boundaries)
    }

    /// Whole-run summary; `None` without records
    #[must_use]
    pub fn summary(&self) -> Option<SummaryStatistics> {
        summarize(self.records())
    }
}

/// Record the injected failure and every detected period in the store
///
/// Returns the number of events appended.
pub fn annotate_failure_events(
    store: &MetricsStore,
    injected: Option<(f64, Option<f64>)>,
    detected: &[FailurePeriod],
) -> Result<usize> {
    let mut appended = 0;
    if let Some((failure_start_ms, recovery_time_ms)) = injected {
        store.append_failure_event(FailureEvent::new(
            failure_start_ms,
            recovery_time_ms,
            FailureEvent::INJECTED,
            "failure injected into a replica",
        )?);
        appended += 1;
    }
    for period in detected {
        store.append_failure_event(period.to_event());
        appended += 1;
    }
    info!(appended, "Annotated failure events");
    Ok(appended)
}
