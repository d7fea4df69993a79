//! Before/during/after segmentation around a failure interval

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::percentile::percentile;
use crate::metrics::{OutcomeRecord, Status};
use crate::{Error, Result};

/// Position of a record relative to a failure interval
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Before `failure_start - buffer`
    Before,
    /// Within `[failure_start, recovery_end]`
    During,
    /// After `recovery_end + buffer`
    After,
}

impl Phase {
    /// All phases in time order
    pub const ALL: [Self; 3] = [Self::Before, Self::During, Self::After];

    /// Lowercase name
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Before => "before",
            Self::During => "during",
            Self::After => "after",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure interval plus the exclusion margin on either side
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PhaseBoundaries {
    /// Start of the failure
    pub failure_start_ms: f64,
    /// End of the failure
    pub recovery_end_ms: f64,
    /// Width of the ambiguous zone on each side
    pub buffer_ms: f64,
}

impl PhaseBoundaries {
    /// Validated boundaries
    pub fn new(failure_start_ms: f64, recovery_end_ms: f64, buffer_ms: f64) -> Result<Self> {
        if !(failure_start_ms.is_finite() && recovery_end_ms.is_finite()) {
            return Err(Error::invalid("phase boundaries must be finite"));
        }
        if recovery_end_ms < failure_start_ms {
            return Err(Error::invalid(format!(
                "recovery end {recovery_end_ms} precedes failure start {failure_start_ms}"
            )));
        }
        if !(buffer_ms.is_finite() && buffer_ms >= 0.0) {
            return Err(Error::invalid("phase buffer must be a non-negative number"));
        }
        Ok(Self {
            failure_start_ms,
            recovery_end_ms,
            buffer_ms,
        })
    }

    /// Phase of a receive time, or `None` inside a buffer margin
    #[must_use]
    pub fn classify(&self, received_at_ms: f64) -> Option<Phase> {
        if received_at_ms < self.failure_start_ms - self.buffer_ms {
            Some(Phase::Before)
        } else if (self.failure_start_ms..=self.recovery_end_ms).contains(&received_at_ms) {
            Some(Phase::During)
        } else if received_at_ms > self.recovery_end_ms + self.buffer_ms {
            Some(Phase::After)
        } else {
            None
        }
    }
}

/// Statistics for one non-empty phase
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseSummary {
    /// Which phase
    pub phase: Phase,
    /// Earliest receive time in the phase
    pub start_ms: f64,
    /// Latest receive time in the phase
    pub end_ms: f64,
    /// Records in the phase
    pub request_count: usize,
    /// Records per second between `start_ms` and `end_ms`
    pub throughput_avg: f64,
    /// p95 latency over the phase
    pub latency_p95_ms: f64,
    /// `SUCCESS / total x 100`; `RECOVERED` does not count here
    pub success_rate: f64,
}

/// Result of segmenting a record set
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Segmentation {
    /// Summaries of the non-empty phases, in time order
    pub phases: Vec<PhaseSummary>,
    /// Records that fell inside a buffer margin
    pub excluded: usize,
}

impl Segmentation {
    /// Summary for one phase, if it had records
    #[must_use]
    pub fn get(&self, phase: Phase) -> Option<&PhaseSummary> {
        self.phases.iter().find(|s| s.phase == phase)
    }
}

#[allow(clippy::cast_precision_loss)]
fn summarize(phase: Phase, records: &[&OutcomeRecord]) -> Option<PhaseSummary> {
    let start_ms = records.iter().map(|r| r.received_at_ms).reduce(f64::min)?;
    let end_ms = records.iter().map(|r| r.received_at_ms).reduce(f64::max)?;
    // A phase observed at a single instant is treated as lasting one second.
    let duration_secs = if end_ms > start_ms {
        (end_ms - start_ms) / 1000.0
    } else {
        1.0
    };

    let latencies: Vec<f64> = records.iter().map(|r| r.latency_ms).collect();
    let clean = records.iter().filter(|r| r.status == Status::Success).count();
    let count = records.len();

    Some(PhaseSummary {
        phase,
        start_ms,
        end_ms,
        request_count: count,
        throughput_avg: count as f64 / duration_secs,
        latency_p95_ms: percentile(&latencies, 95.0)?,
        success_rate: clean as f64 / count as f64 * 100.0,
    })
}

/// Split records into phases and summarize each non-empty one
pub fn segment_phases(records: &[OutcomeRecord], boundaries: &PhaseBoundaries) -> Segmentation {
    if records.is_empty() {
        warn!("No records, phase segmentation unavailable");
        return Segmentation::default();
    }

    let mut buckets: [Vec<&OutcomeRecord>; 3] = [Vec::new(), Vec::new(), Vec::new()];
    let mut excluded = 0;
    for record in records {
        match boundaries.classify(record.received_at_ms) {
            Some(phase) => buckets[phase as usize].push(record),
            None => excluded += 1,
        }
    }

    let phases: Vec<PhaseSummary> = Phase::ALL
        .into_iter()
        .zip(&buckets)
        .filter_map(|(phase, bucket)| summarize(phase, bucket))
        .collect();

    debug!(phases = phases.len(), excluded, "Segmented records into phases");
    Segmentation { phases, excluded }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn at(t: f64, latency: f64, status: Status) -> OutcomeRecord {
        OutcomeRecord::from_latency(t, latency, status, "r", None).unwrap()
    }

    #[test]
    fn test_classify_edges() {
        let b = PhaseBoundaries::new(10_000.0, 20_000.0, 1_000.0).unwrap();
        assert_eq!(b.classify(8_999.0), Some(Phase::Before));
        assert_eq!(b.classify(9_000.0), None);
        assert_eq!(b.classify(9_999.0), None);
        assert_eq!(b.classify(10_000.0), Some(Phase::During));
        assert_eq!(b.classify(20_000.0), Some(Phase::During));
        assert_eq!(b.classify(20_500.0), None);
        assert_eq!(b.classify(21_000.0), None);
        assert_eq!(b.classify(21_001.0), Some(Phase::After));
    }

    #[test]
    fn test_zero_buffer_has_no_gap() {
        let b = PhaseBoundaries::new(5.0, 7.0, 0.0).unwrap();
        assert_eq!(b.classify(4.999), Some(Phase::Before));
        assert_eq!(b.classify(5.0), Some(Phase::During));
        assert_eq!(b.classify(7.001), Some(Phase::After));
    }

    #[test]
    fn test_invalid_boundaries() {
        assert!(PhaseBoundaries::new(10.0, 5.0, 0.0).is_err());
        assert!(PhaseBoundaries::new(0.0, 5.0, -1.0).is_err());
        assert!(PhaseBoundaries::new(f64::NAN, 5.0, 0.0).is_err());
    }

    #[test]
    fn test_success_rate_ignores_recovered() {
        let records = vec![
            at(0.0, 10.0, Status::Success),
            at(100.0, 10.0, Status::Recovered),
            at(200.0, 10.0, Status::Success),
            at(300.0, 10.0, Status::Failed),
        ];
        let b = PhaseBoundaries::new(1_000.0, 2_000.0, 0.0).unwrap();
        let seg = segment_phases(&records, &b);
        let before = seg.get(Phase::Before).unwrap();
        assert_eq!(before.request_count, 4);
        assert!((before.success_rate - 50.0).abs() < f64::EPSILON);
        // 4 records over 0.3s
        assert!((before.throughput_avg - 4.0 / 0.3).abs() < 1e-9);
        assert!(seg.get(Phase::During).is_none());
    }

    #[test]
    fn test_single_instant_phase_uses_one_second() {
        let records = vec![at(5_000.0, 10.0, Status::Success), at(5_000.0, 20.0, Status::Success)];
        let b = PhaseBoundaries::new(5_000.0, 6_000.0, 0.0).unwrap();
        let during = segment_phases(&records, &b).get(Phase::During).cloned().unwrap();
        assert!((during.throughput_avg - 2.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_partition_accounts_for_every_record() {
        let records: Vec<_> = (0..300)
            .map(|i| at(f64::from(i) * 100.0, 10.0, Status::Success))
            .collect();
        let b = PhaseBoundaries::new(9_000.0, 20_000.0, 1_000.0).unwrap();
        let seg = segment_phases(&records, &b);
        let counted: usize = seg.phases.iter().map(|s| s.request_count).sum();
        assert_eq!(counted + seg.excluded, records.len());
        // 8_000..9_000 on the left, 20_100..=21_000 on the right
        assert_eq!(seg.excluded, 20);
    }

    #[test]
    fn test_empty_records() {
        let b = PhaseBoundaries::new(0.0, 1.0, 0.0).unwrap();
        assert_eq!(segment_phases(&[], &b), Segmentation::default());
    }
}
