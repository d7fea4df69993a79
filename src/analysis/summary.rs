//! Whole-run summary statistics

use serde::Serialize;

use super::percentile::{mean, percentile};
use crate::metrics::{OutcomeRecord, StatusCounts};

/// Aggregate view of a record set
///
/// `success_rate_percent` counts `RECOVERED` as delivered, unlike the
/// per-phase success rate which only counts clean `SUCCESS`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SummaryStatistics {
    /// Number of records
    pub total_requests: usize,
    /// Span from the first to the last receive time
    pub duration_seconds: f64,
    /// Records per second over that span; 0 for a zero span
    pub overall_throughput_rps: f64,
    /// Smallest latency
    pub latency_min_ms: f64,
    /// Largest latency
    pub latency_max_ms: f64,
    /// Mean latency
    pub latency_mean_ms: f64,
    /// 95th percentile latency
    pub latency_p95_ms: f64,
    /// Records per status
    pub counts: StatusCounts,
    /// `(SUCCESS + RECOVERED) / total x 100`
    pub success_rate_percent: f64,
}

/// Summarize receive-time-ordered records; `None` when there are none
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn summarize(records: &[OutcomeRecord]) -> Option<SummaryStatistics> {
    let first = records.first()?;
    let last = records.last()?;

    let latencies: Vec<f64> = records.iter().map(|r| r.latency_ms).collect();
    let counts = StatusCounts::from_records(records);
    let duration_seconds = (last.received_at_ms - first.received_at_ms) / 1000.0;
    let total = records.len();

    Some(SummaryStatistics {
        total_requests: total,
        duration_seconds,
        overall_throughput_rps: if duration_seconds > 0.0 {
            total as f64 / duration_seconds
        } else {
            0.0
        },
        latency_min_ms: latencies.iter().copied().reduce(f64::min)?,
        latency_max_ms: latencies.iter().copied().reduce(f64::max)?,
        latency_mean_ms: mean(&latencies)?,
        latency_p95_ms: percentile(&latencies, 95.0)?,
        success_rate_percent: counts.delivered() as f64 / total as f64 * 100.0,
        counts,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::Status;

    #[test]
    fn test_empty() {
        assert!(summarize(&[]).is_none());
    }

    #[test]
    fn test_counts_recovered_as_delivered() {
        let records: Vec<_> = [
            (0.0, 10.0, Status::Success),
            (1_000.0, 30.0, Status::Recovered),
            (2_000.0, 20.0, Status::Failed),
            (4_000.0, 40.0, Status::Timeout),
        ]
        .into_iter()
        .map(|(t, l, s)| OutcomeRecord::from_latency(t, l, s, "r", None).unwrap())
        .collect();

        let summary = summarize(&records).unwrap();
        assert_eq!(summary.total_requests, 4);
        assert!((summary.duration_seconds - 4.0).abs() < f64::EPSILON);
        assert!((summary.overall_throughput_rps - 1.0).abs() < f64::EPSILON);
        assert!((summary.latency_min_ms - 10.0).abs() < f64::EPSILON);
        assert!((summary.latency_max_ms - 40.0).abs() < f64::EPSILON);
        assert!((summary.latency_mean_ms - 25.0).abs() < f64::EPSILON);
        assert!((summary.success_rate_percent - 50.0).abs() < f64::EPSILON);
        assert_eq!(summary.counts.timeout, 1);
    }
}
