//! Analysis pipeline and report artifacts
//!
//! Runs the analyzers in order over one snapshot of the store: window series,
//! failure detection (unless a failure time is given and detection is off),
//! event annotation, recovery, then phases. A missing failure interval skips
//! recovery and phases instead of failing.

use std::fmt;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};

use crate::analysis::{
    Analyzer, Detection, LatencyWindow, PhaseBoundaries, RecoveryOutcome, Segmentation,
    SummaryStatistics, ThroughputWindow, Unavailable, annotate_failure_events,
};
use crate::config::AnalysisConfig;
use crate::metrics::{FailureEvent, MetricsStore};
use crate::stats::DispatchStatsSnapshot;
use crate::Result;

/// Window series for plotting
pub const THROUGHPUT_ARTIFACT: &str = "throughput.csv";
/// Latency series for plotting
pub const LATENCY_ARTIFACT: &str = "latency.csv";
/// The report itself
pub const REPORT_ARTIFACT: &str = "analysis_results.json";

/// Inputs of one analysis run besides the records
#[derive(Debug, Clone, Default)]
pub struct AnalysisOptions {
    /// Thresholds and window layout
    pub analysis: AnalysisConfig,
    /// Known failure injection time (ms)
    pub failure_time_ms: Option<f64>,
    /// Known recovery time (ms)
    pub recovery_time_ms: Option<f64>,
    /// Where artifacts go; nothing is written when `None`
    pub output_dir: Option<PathBuf>,
}

/// What failure detection produced
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum DetectionOutcome {
    /// Detection ran
    Detected(Detection),
    /// Not enough data
    Unavailable(Unavailable),
    /// Turned off in configuration
    Skipped,
}

impl DetectionOutcome {
    fn first_period(&self) -> Option<(f64, f64)> {
        match self {
            Self::Detected(d) => d
                .periods
                .first()
                .map(|p| (p.failure_start_ms, p.recovery_end_ms)),
            _ => None,
        }
    }
}

/// Failure interval the recovery and phase analyses were run against
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FailureInterval {
    /// Start of the failure
    pub failure_start_ms: f64,
    /// End of the failure, when known
    pub recovery_end_ms: Option<f64>,
}

/// Structured analysis result written as `analysis_results.json`
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisReport {
    /// When the report was produced
    pub generated_at: DateTime<Utc>,
    /// Whole-run statistics; absent without records
    pub summary: Option<SummaryStatistics>,
    /// Failure detection result
    pub detection: DetectionOutcome,
    /// Interval used below, if any
    pub failure_interval: Option<FailureInterval>,
    /// Injected and detected events
    pub failure_events: Vec<FailureEvent>,
    /// Recovery result; absent without a failure interval
    pub recovery: Option<RecoveryOutcome>,
    /// Per-phase statistics; absent without a complete failure interval
    pub phases: Option<Segmentation>,
    /// Dispatcher counters when the records came from a live run
    pub dispatch: Option<DispatchStatsSnapshot>,
    /// Artifact file names written next to the report
    pub artifacts: Vec<String>,
}

/// Run the full pipeline over the store's current contents
///
/// Detected and injected failure events are appended to `store`. When
/// `options.output_dir` is set the window series and the report are written
/// there.
pub fn run_analysis(
    store: &MetricsStore,
    options: &AnalysisOptions,
    dispatch: Option<DispatchStatsSnapshot>,
) -> Result<AnalysisReport> {
    let cfg = &options.analysis;
    let analyzer = Analyzer::from_store(store);
    info!(records = analyzer.records().len(), "Running analysis");

    let throughput = analyzer.throughput(cfg.window_size_ms)?;
    let latency = analyzer.latency(cfg.window_size_ms, cfg.window_mode())?;

    let detection = if cfg.auto_detect {
        match analyzer.detect(&cfg.detector()) {
            Ok(detection) => DetectionOutcome::Detected(detection),
            Err(reason) => DetectionOutcome::Unavailable(reason),
        }
    } else {
        DetectionOutcome::Skipped
    };

    // A known failure time wins outright; a detected period never lends it an end.
    let failure_interval = match options.failure_time_ms {
        Some(failure_start_ms) => Some(FailureInterval {
            failure_start_ms,
            recovery_end_ms: options.recovery_time_ms,
        }),
        None => detection
            .first_period()
            .map(|(failure_start_ms, end)| FailureInterval {
                failure_start_ms,
                recovery_end_ms: Some(end),
            }),
    };

    let periods = match &detection {
        DetectionOutcome::Detected(d) => d.periods.as_slice(),
        _ => &[],
    };
    let injected = options.failure_time_ms.map(|start| {
        let end = options.recovery_time_ms.filter(|&end| end >= start);
        if end.is_none() && options.recovery_time_ms.is_some() {
            warn!(
                failure_start_ms = start,
                recovery_time_ms = options.recovery_time_ms,
                "Recovery time precedes failure time, recording the failure as open"
            );
        }
        (start, end)
    });
    annotate_failure_events(store, injected, periods)?;

    let recovery = match failure_interval {
        Some(interval) => Some(analyzer.recovery(interval.failure_start_ms, &cfg.recovery())?),
        None => {
            warn!("No failure interval known, skipping recovery analysis");
            None
        }
    };

    let phases = match failure_interval {
        Some(FailureInterval {
            failure_start_ms,
            recovery_end_ms: Some(recovery_end_ms),
        }) => match PhaseBoundaries::new(failure_start_ms, recovery_end_ms, cfg.phase_buffer_ms) {
            Ok(boundaries) => Some(analyzer.phases(&boundaries)),
            Err(e) => {
                warn!(error = %e, "Unusable failure interval, skipping phase segmentation");
                None
            }
        },
        _ => {
            warn!("No recovery end known, skipping phase segmentation");
            None
        }
    };

    let mut report = AnalysisReport {
        generated_at: Utc::now(),
        summary: analyzer.summary(),
        detection,
        failure_interval,
        failure_events: store.failure_events(),
        recovery,
        phases,
        dispatch,
        artifacts: Vec::new(),
    };

    if let Some(dir) = &options.output_dir {
        write_artifacts(&mut report, dir, &throughput, &latency)?;
    }
    Ok(report)
}

fn write_series<T: Serialize>(path: &Path, rows: &[T]) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)?;
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    Ok(())
}

/// Write the window series and the report into `dir`
pub fn write_artifacts(
    report: &mut AnalysisReport,
    dir: &Path,
    throughput: &[ThroughputWindow],
    latency: &[LatencyWindow],
) -> Result<()> {
    fs::create_dir_all(dir)?;

    write_series(&dir.join(THROUGHPUT_ARTIFACT), throughput)?;
    write_series(&dir.join(LATENCY_ARTIFACT), latency)?;
    report.artifacts = vec![
        THROUGHPUT_ARTIFACT.to_string(),
        LATENCY_ARTIFACT.to_string(),
        REPORT_ARTIFACT.to_string(),
    ];

    let path = dir.join(REPORT_ARTIFACT);
    let mut writer = BufWriter::new(File::create(&path)?);
    serde_json::to_writer_pretty(&mut writer, report)?;
    writer.flush()?;
    info!(path = %path.display(), "Analysis report written");
    Ok(())
}

impl fmt::Display for AnalysisReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.summary {
            Some(s) => {
                writeln!(
                    f,
                    "Requests: {} over {:.1}s ({:.2} req/s)",
                    s.total_requests, s.duration_seconds, s.overall_throughput_rps
                )?;
                writeln!(
                    f,
                    "Latency: mean {:.1} ms, p95 {:.1} ms, max {:.1} ms",
                    s.latency_mean_ms, s.latency_p95_ms, s.latency_max_ms
                )?;
                writeln!(
                    f,
                    "Delivered: {:.1}% ({} success, {} recovered, {} failed, {} timeout)",
                    s.success_rate_percent,
                    s.counts.success,
                    s.counts.recovered,
                    s.counts.failed,
                    s.counts.timeout
                )?;
            }
            None => writeln!(f, "No records")?,
        }

        match &self.detection {
            DetectionOutcome::Detected(d) => {
                writeln!(f, "Detected failure periods: {}", d.periods.len())?;
                for p in &d.periods {
                    writeln!(
                        f,
                        "  {:.0} ms -> {:.0} ms ({:.1}s)",
                        p.failure_start_ms,
                        p.recovery_end_ms,
                        p.duration_ms() / 1000.0
                    )?;
                }
            }
            DetectionOutcome::Unavailable(reason) => {
                writeln!(f, "Failure detection unavailable: {reason}")?;
            }
            DetectionOutcome::Skipped => {}
        }

        match &self.recovery {
            Some(RecoveryOutcome::Recovered(r)) => writeln!(
                f,
                "Recovery: {:.2}s (p95 {:.1} ms -> {:.1} ms)",
                r.recovery_duration_secs(),
                r.baseline_latency_p95_ms,
                r.recovered_latency_p95_ms
            )?,
            Some(RecoveryOutcome::NotObserved { .. }) => {
                writeln!(f, "Recovery: not observed within the data")?;
            }
            Some(RecoveryOutcome::Unavailable(reason)) => {
                writeln!(f, "Recovery unavailable: {reason}")?;
            }
            None => {}
        }

        if let Some(phases) = &self.phases {
            for p in &phases.phases {
                writeln!(
                    f,
                    "  {:<6} {:>6} req  {:>8.2} req/s  p95 {:>8.1} ms  success {:>5.1}%",
                    p.phase.as_str(),
                    p.request_count,
                    p.throughput_avg,
                    p.latency_p95_ms,
                    p.success_rate
                )?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::{OutcomeRecord, Status};

    fn store_with_outage() -> MetricsStore {
        let store = MetricsStore::new();
        for t in (0..30_000).step_by(100) {
            let (latency, status) = match t {
                0..9_000 => (50.0, Status::Success),
                9_000..20_000 => (3_000.0, Status::Failed),
                _ => (60.0, Status::Success),
            };
            store.append(
                OutcomeRecord::from_latency(f64::from(t), latency, status, "r", None).unwrap(),
            );
        }
        store
    }

    #[test]
    fn test_pipeline_uses_detected_interval() {
        let store = store_with_outage();
        let report = run_analysis(&store, &AnalysisOptions::default(), None).unwrap();

        let interval = report.failure_interval.unwrap();
        assert!((interval.failure_start_ms - 9_000.0).abs() < f64::EPSILON);
        assert_eq!(interval.recovery_end_ms, Some(20_000.0));
        assert!(report.recovery.as_ref().unwrap().recovered().is_some());
        assert_eq!(report.phases.as_ref().unwrap().phases.len(), 3);
        assert_eq!(report.failure_events.len(), 1);
        assert!(report.artifacts.is_empty());
    }

    #[test]
    fn test_no_failure_short_circuits() {
        let store = MetricsStore::new();
        for t in (0..5_000).step_by(100) {
            store.append(
                OutcomeRecord::from_latency(f64::from(t), 40.0, Status::Success, "r", None)
                    .unwrap(),
            );
        }
        let report = run_analysis(&store, &AnalysisOptions::default(), None).unwrap();
        assert!(report.failure_interval.is_none());
        assert!(report.recovery.is_none());
        assert!(report.phases.is_none());
        assert!(report.to_string().contains("Detected failure periods: 0"));
    }

    #[test]
    fn test_explicit_failure_time_ignores_detected_end() {
        // Detection finds 9000..20000, which ends before the given failure time
        let store = store_with_outage();
        let options = AnalysisOptions {
            failure_time_ms: Some(25_000.0),
            ..AnalysisOptions::default()
        };
        let report = run_analysis(&store, &options, None).unwrap();

        let interval = report.failure_interval.unwrap();
        assert!((interval.failure_start_ms - 25_000.0).abs() < f64::EPSILON);
        assert_eq!(interval.recovery_end_ms, None);
        assert!(report.recovery.is_some());
        assert!(report.phases.is_none());
        assert!(matches!(report.detection, DetectionOutcome::Detected(_)));
    }

    #[test]
    fn test_inverted_explicit_interval_skips_phases() {
        let options = AnalysisOptions {
            failure_time_ms: Some(20_000.0),
            recovery_time_ms: Some(9_000.0),
            ..AnalysisOptions::default()
        };
        let report = run_analysis(&store_with_outage(), &options, None).unwrap();
        assert!(report.phases.is_none());
        assert!(report.recovery.is_some());

        let injected = report
            .failure_events
            .iter()
            .find(|e| e.event_type == FailureEvent::INJECTED)
            .unwrap();
        assert!(injected.is_open());
    }

    #[test]
    fn test_empty_store() {
        let report =
            run_analysis(&MetricsStore::new(), &AnalysisOptions::default(), None).unwrap();
        assert!(report.summary.is_none());
        assert_eq!(report.detection, DetectionOutcome::Unavailable(Unavailable::NoRecords));
    }

    #[test]
    fn test_artifacts_written() {
        let dir = tempfile::tempdir().unwrap();
        let options = AnalysisOptions {
            output_dir: Some(dir.path().to_path_buf()),
            failure_time_ms: Some(9_000.0),
            ..AnalysisOptions::default()
        };
        let report = run_analysis(&store_with_outage(), &options, None).unwrap();
        assert_eq!(report.artifacts.len(), 3);
        for name in &report.artifacts {
            assert!(dir.path().join(name).exists(), "{name}");
        }

        let json: serde_json::Value = serde_json::from_str(
            &fs::read_to_string(dir.path().join(REPORT_ARTIFACT)).unwrap(),
        )
        .unwrap();
        assert_eq!(json["recovery"]["outcome"], "recovered");
        assert_eq!(json["detection"]["outcome"], "detected");
        // one injected, one detected
        assert_eq!(json["failure_events"].as_array().unwrap().len(), 2);
    }
}
