//! Time-windowed throughput and latency series
//!
//! Windows are anchored at the earliest receive time and laid out until the
//! latest receive time is covered. Window `k` spans
//! `[first + k * step, first + k * step + size)`; boundaries are computed by
//! multiplication rather than accumulation so they never drift.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::percentile::{mean, percentile_sorted};
use crate::metrics::OutcomeRecord;
use crate::{Error, Result};

/// Request rate over one window
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThroughputWindow {
    /// Inclusive window start (ms)
    pub window_start_ms: f64,
    /// Exclusive window end (ms)
    pub window_end_ms: f64,
    /// Records in the window divided by the window length in seconds
    pub requests_per_second: f64,
    /// `SUCCESS` and `RECOVERED` records
    pub success_count: usize,
    /// `FAILED` and `TIMEOUT` records
    pub failed_count: usize,
}

impl ThroughputWindow {
    /// Total records in the window
    #[must_use]
    pub fn total(&self) -> usize {
        self.success_count + self.failed_count
    }
}

/// Latency distribution over one non-empty window
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LatencyWindow {
    /// Inclusive window start (ms)
    pub window_start_ms: f64,
    /// Exclusive window end (ms)
    pub window_end_ms: f64,
    /// Median latency
    pub p50_ms: f64,
    /// 95th percentile latency
    pub p95_ms: f64,
    /// 99th percentile latency
    pub p99_ms: f64,
    /// Mean latency
    pub mean_ms: f64,
    /// Largest latency
    pub max_ms: f64,
    /// Number of records in the window
    pub sample_count: usize,
}

/// How latency windows advance
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum WindowMode {
    /// Consecutive, non-overlapping windows
    Fixed,
    /// Windows advance by `step_ms` and may overlap
    Sliding {
        /// Distance between consecutive window starts
        step_ms: f64,
    },
}

impl WindowMode {
    /// Build from the `sliding` flag and step used in configuration
    #[must_use]
    pub fn from_flag(sliding: bool, step_ms: f64) -> Self {
        if sliding {
            Self::Sliding { step_ms }
        } else {
            Self::Fixed
        }
    }

    fn step(self, window_size_ms: f64) -> f64 {
        match self {
            Self::Fixed => window_size_ms,
            Self::Sliding { step_ms } => step_ms,
        }
    }
}

pub(crate) fn validate_positive(name: &str, value: f64) -> Result<()> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(Error::invalid(format!("{name} must be a positive number, got {value}")))
    }
}

/// Upper bound on windows in one series
pub const MAX_WINDOWS: usize = 1_000_000;

/// Reject layouts whose window count over `[first, last]` exceeds [`MAX_WINDOWS`]
#[allow(clippy::cast_precision_loss)]
fn check_window_count(first: f64, last: f64, step: f64) -> Result<()> {
    let count = ((last - first) / step).floor() + 1.0;
    if count <= MAX_WINDOWS as f64 {
        Ok(())
    } else {
        Err(Error::invalid(format!(
            "a {step} ms step over {} ms needs {count} windows, limit is {MAX_WINDOWS}",
            last - first
        )))
    }
}

#[allow(clippy::cast_precision_loss)]
fn boundary(first: f64, k: usize, step: f64) -> f64 {
    first + k as f64 * step
}

/// Throughput per fixed window over receive-time-ordered records
///
/// Empty windows are emitted with a rate of zero, so the series has no gaps.
#[allow(clippy::cast_precision_loss)]
pub fn compute_throughput(
    records: &[OutcomeRecord],
    window_size_ms: f64,
) -> Result<Vec<ThroughputWindow>> {
    validate_positive("window_size_ms", window_size_ms)?;
    debug_assert!(records.is_sorted_by(|a, b| a.received_at_ms <= b.received_at_ms));

    let (Some(first), Some(last)) = (records.first(), records.last()) else {
        warn!("No records, throughput series is empty");
        return Ok(Vec::new());
    };
    let (first, last) = (first.received_at_ms, last.received_at_ms);
    check_window_count(first, last, window_size_ms)?;
    let window_secs = window_size_ms / 1000.0;

    let mut windows = Vec::new();
    let mut next = 0;
    let mut k = 0;
    loop {
        let start = boundary(first, k, window_size_ms);
        if start > last {
            break;
        }
        let end = boundary(first, k + 1, window_size_ms);

        let mut success_count = 0;
        let mut failed_count = 0;
        while let Some(record) = records.get(next) {
            if record.received_at_ms >= end {
                break;
            }
            if record.status.is_delivered() {
                success_count += 1;
            } else {
                failed_count += 1;
            }
            next += 1;
        }

        windows.push(ThroughputWindow {
            window_start_ms: start,
            window_end_ms: end,
            requests_per_second: (success_count + failed_count) as f64 / window_secs,
            success_count,
            failed_count,
        });
        k += 1;
    }

    debug!(windows = windows.len(), window_size_ms, "Computed throughput series");
    Ok(windows)
}

/// Latency percentiles per window over receive-time-ordered records
///
/// Windows without samples are skipped: latency is undefined there.
pub fn compute_percentile_latency(
    records: &[OutcomeRecord],
    window_size_ms: f64,
    mode: WindowMode,
) -> Result<Vec<LatencyWindow>> {
    validate_positive("window_size_ms", window_size_ms)?;
    let step = mode.step(window_size_ms);
    validate_positive("slide_step_ms", step)?;
    debug_assert!(records.is_sorted_by(|a, b| a.received_at_ms <= b.received_at_ms));

    let (Some(first), Some(last)) = (records.first(), records.last()) else {
        warn!("No records, latency series is empty");
        return Ok(Vec::new());
    };
    let (first, last) = (first.received_at_ms, last.received_at_ms);
    check_window_count(first, last, step)?;

    let mut windows = Vec::new();
    let mut latencies = Vec::new();
    let mut k = 0;
    loop {
        let start = boundary(first, k, step);
        if start > last {
            break;
        }
        let end = start + window_size_ms;
        k += 1;

        let lo = records.partition_point(|r| r.received_at_ms < start);
        let hi = records.partition_point(|r| r.received_at_ms < end);
        if lo == hi {
            continue;
        }

        latencies.clear();
        latencies.extend(records[lo..hi].iter().map(|r| r.latency_ms));
        latencies.sort_by(f64::total_cmp);

        if let Some(window) = latency_window(start, end, &latencies) {
            windows.push(window);
        }
    }

    debug!(windows = windows.len(), window_size_ms, step, "Computed latency series");
    Ok(windows)
}

fn latency_window(start: f64, end: f64, sorted: &[f64]) -> Option<LatencyWindow> {
    Some(LatencyWindow {
        window_start_ms: start,
        window_end_ms: end,
        p50_ms: percentile_sorted(sorted, 50.0)?,
        p95_ms: percentile_sorted(sorted, 95.0)?,
        p99_ms: percentile_sorted(sorted, 99.0)?,
        mean_ms: mean(sorted)?,
        max_ms: *sorted.last()?,
        sample_count: sorted.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::Status;

    fn at(received: f64, latency: f64, status: Status) -> OutcomeRecord {
        OutcomeRecord::from_latency(received, latency, status, "r", None).unwrap()
    }

    #[test]
    fn test_throughput_counts_and_rate() {
        let records = vec![
            at(0.0, 10.0, Status::Success),
            at(400.0, 10.0, Status::Recovered),
            at(999.0, 10.0, Status::Failed),
            at(1000.0, 10.0, Status::Timeout),
        ];
        let windows = compute_throughput(&records, 1000.0).unwrap();
        assert_eq!(windows.len(), 2);
        assert_eq!(windows[0].success_count, 2);
        assert_eq!(windows[0].failed_count, 1);
        assert!((windows[0].requests_per_second - 3.0).abs() < f64::EPSILON);
        assert_eq!(windows[1].failed_count, 1);
    }

    #[test]
    fn test_throughput_emits_empty_windows() {
        let records = vec![at(0.0, 1.0, Status::Success), at(3500.0, 1.0, Status::Success)];
        let windows = compute_throughput(&records, 1000.0).unwrap();
        assert_eq!(windows.len(), 4);
        assert_eq!(windows[1].total(), 0);
        assert_eq!(windows[2].total(), 0);
        assert!(windows[1].requests_per_second.abs() < f64::EPSILON);
    }

    #[test]
    fn test_throughput_single_instant() {
        let records = vec![at(5.0, 1.0, Status::Success), at(5.0, 1.0, Status::Failed)];
        let windows = compute_throughput(&records, 1000.0).unwrap();
        assert_eq!(windows.len(), 1);
        assert_eq!(windows[0].total(), 2);
    }

    #[test]
    fn test_throughput_partitions_every_record() {
        let records: Vec<_> = (0..257)
            .map(|i| at(f64::from(i) * 37.3, 5.0, if i % 3 == 0 { Status::Failed } else { Status::Success }))
            .collect();
        for size in [1.0, 100.0, 333.3, 1000.0, 50_000.0] {
            let windows = compute_throughput(&records, size).unwrap();
            let total: usize = windows.iter().map(ThroughputWindow::total).sum();
            assert_eq!(total, records.len(), "window size {size}");
        }
    }

    #[test]
    fn test_rejects_bad_window_size() {
        assert!(compute_throughput(&[], 0.0).is_err());
        assert!(compute_percentile_latency(&[], -5.0, WindowMode::Fixed).is_err());
        assert!(
            compute_percentile_latency(&[], 1000.0, WindowMode::Sliding { step_ms: 0.0 }).is_err()
        );
    }

    #[test]
    fn test_empty_input() {
        assert!(compute_throughput(&[], 1000.0).unwrap().is_empty());
        assert!(compute_percentile_latency(&[], 1000.0, WindowMode::Fixed).unwrap().is_empty());
    }

    #[test]
    fn test_latency_skips_empty_windows() {
        let records = vec![at(0.0, 10.0, Status::Success), at(2500.0, 30.0, Status::Success)];
        let windows = compute_percentile_latency(&records, 1000.0, WindowMode::Fixed).unwrap();
        assert_eq!(windows.len(), 2);
        assert!((windows[0].window_start_ms - 0.0).abs() < f64::EPSILON);
        assert!((windows[1].window_start_ms - 2000.0).abs() < f64::EPSILON);
        assert_eq!(windows[1].sample_count, 1);
    }

    #[test]
    fn test_sliding_windows_overlap() {
        let records: Vec<_> = (0..10)
            .map(|i| at(f64::from(i) * 100.0, f64::from(i), Status::Success))
            .collect();
        let windows = compute_percentile_latency(
            &records,
            500.0,
            WindowMode::Sliding { step_ms: 250.0 },
        )
        .unwrap();
        // starts 0, 250, ..., 750 (<= 900); 1000 > 900
        assert_eq!(windows.len(), 4);
        assert_eq!(windows[0].sample_count, 5);
        assert_eq!(windows[1].sample_count, 5); // 300..700
        let overlap: usize = windows.iter().map(|w| w.sample_count).sum();
        assert!(overlap > records.len());
    }

    #[test]
    fn test_latency_window_stats_within_bounds() {
        let records: Vec<_> = (0..50)
            .map(|i| at(f64::from(i) * 10.0, f64::from((i * 13) % 17), Status::Success))
            .collect();
        for window in compute_percentile_latency(&records, 100.0, WindowMode::Fixed).unwrap() {
            let slice: Vec<f64> = records
                .iter()
                .filter(|r| r.received_at_ms >= window.window_start_ms && r.received_at_ms < window.window_end_ms)
                .map(|r| r.latency_ms)
                .collect();
            let min = slice.iter().copied().fold(f64::INFINITY, f64::min);
            assert!(window.p95_ms >= min && window.p95_ms <= window.max_ms);
            assert_eq!(window.sample_count, slice.len());
        }
    }

    #[test]
    fn test_tiny_window_over_epoch_span_is_rejected() {
        // One day of epoch-millisecond timestamps
        let start = 1_700_000_000_000.0;
        let records = vec![
            at(start, 10.0, Status::Success),
            at(start + 86_400_000.0, 10.0, Status::Success),
        ];

        assert!(matches!(
            compute_throughput(&records, 1e-9),
            Err(Error::InvalidParameter(_))
        ));
        assert!(matches!(
            compute_percentile_latency(&records, 1_000.0, WindowMode::Sliding { step_ms: 1e-9 }),
            Err(Error::InvalidParameter(_))
        ));
        // A day in one-second windows stays within the limit
        assert_eq!(compute_throughput(&records, 1_000.0).unwrap().len(), 86_401);
    }
}
