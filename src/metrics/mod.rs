//! Append-only metrics store for outcome records and failure events
//!
//! Appends are serialised behind a mutex so concurrent dispatch workers can
//! share one store. Analysis never reads the live vectors; it works on a
//! [`MetricsSnapshot`], a frozen copy sorted by receive time.

mod persist;
mod record;

pub use persist::{
    ExportMetadata, MetricsFormat, Schema, read_events_csv, read_json, read_records_csv,
    write_events_csv, write_json, write_records_csv,
};
pub use record::{FailureEvent, OutcomeRecord, Status};

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, info};

use crate::Result;

/// Thread-safe, append-only metrics store
pub struct MetricsStore {
    /// Outcome records in insertion order
    records: Mutex<Vec<OutcomeRecord>>,
    /// Failure/recovery events in insertion order
    events: Mutex<Vec<FailureEvent>>,
    /// Bumped on every mutation of either collection
    version: AtomicU64,
}

impl MetricsStore {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self {
            records: Mutex::new(Vec::new()),
            events: Mutex::new(Vec::new()),
            version: AtomicU64::new(0),
        }
    }

    /// Append one outcome record
    pub fn append(&self, record: OutcomeRecord) {
        let mut records = self.records.lock();
        records.push(record);
        self.version.fetch_add(1, Ordering::Release);
    }

    /// Append one failure event
    pub fn append_failure_event(&self, event: FailureEvent) {
        debug!(
            failure_start_ms = event.failure_start_ms,
            event_type = %event.event_type,
            "Failure event recorded"
        );
        let mut events = self.events.lock();
        events.push(event);
        self.version.fetch_add(1, Ordering::Release);
    }

    /// All records ordered by receive time (insertion order breaks ties)
    #[must_use]
    pub fn all(&self) -> Vec<OutcomeRecord> {
        let mut records = self.records.lock().clone();
        sort_by_receive_time(&mut records);
        records
    }

    /// All failure events in insertion order
    #[must_use]
    pub fn failure_events(&self) -> Vec<FailureEvent> {
        self.events.lock().clone()
    }

    /// Number of outcome records
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    /// Whether no outcome records have been stored
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }

    /// Monotonic version of the stored data
    #[must_use]
    pub fn version(&self) -> u64 {
        self.version.load(Ordering::Acquire)
    }

    /// Per-status record counts
    #[must_use]
    pub fn status_counts(&self) -> StatusCounts {
        StatusCounts::from_records(&self.records.lock())
    }

    /// Freeze the current contents for analysis
    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        // Writers bump the version under the lock they hold, so holding both
        // locks here pins the version to the copied contents.
        let records = self.records.lock();
        let events = self.events.lock();
        let mut sorted = records.clone();
        sort_by_receive_time(&mut sorted);
        MetricsSnapshot {
            records: sorted.into(),
            events: events.clone().into(),
            version: self.version(),
        }
    }

    /// Drop all records and events
    pub fn clear(&self) {
        let mut records = self.records.lock();
        let mut events = self.events.lock();
        records.clear();
        events.clear();
        self.version.fetch_add(1, Ordering::Release);
    }

    /// Replace the contents with what `reader` holds
    ///
    /// CSV carries outcome records only, so existing failure events are kept;
    /// JSON replaces both collections. Nothing changes if any row is malformed.
    pub fn load_from<R: Read>(&self, reader: R, format: MetricsFormat) -> Result<()> {
        match format {
            MetricsFormat::Csv => {
                let loaded = read_records_csv(reader)?;
                info!(records = loaded.len(), "Loaded metrics from CSV");
                let mut records = self.records.lock();
                *records = loaded;
                self.version.fetch_add(1, Ordering::Release);
            }
            MetricsFormat::Json => {
                let (loaded, events) = read_json(reader)?;
                info!(
                    records = loaded.len(),
                    events = events.len(),
                    "Loaded metrics from JSON"
                );
                let mut records = self.records.lock();
                let mut stored_events = self.events.lock();
                *records = loaded;
                *stored_events = events;
                self.version.fetch_add(1, Ordering::Release);
            }
        }
        Ok(())
    }

    /// Write the contents to `writer` in the current schema
    pub fn export_to<W: Write>(&self, writer: W, format: MetricsFormat) -> Result<()> {
        let records = self.all();
        match format {
            MetricsFormat::Csv => write_records_csv(writer, &records),
            MetricsFormat::Json => write_json(writer, &records, &self.failure_events()),
        }
    }

    /// Load from a file, picking the format from its extension
    pub fn load_file(&self, path: &Path) -> Result<()> {
        let file = File::open(path)?;
        self.load_from(BufReader::new(file), MetricsFormat::from_path(path))
    }

    /// Export to a file, picking the format from its extension
    pub fn export_file(&self, path: &Path) -> Result<()> {
        let mut writer = BufWriter::new(File::create(path)?);
        self.export_to(&mut writer, MetricsFormat::from_path(path))?;
        writer.flush()?;
        info!(path = %path.display(), records = self.len(), "Exported metrics");
        Ok(())
    }

    /// Export failure events as CSV
    pub fn export_events_file(&self, path: &Path) -> Result<()> {
        let mut writer = BufWriter::new(File::create(path)?);
        write_events_csv(&mut writer, &self.failure_events())?;
        writer.flush()?;
        Ok(())
    }
}

impl Default for MetricsStore {
    fn default() -> Self {
        Self::new()
    }
}

fn sort_by_receive_time(records: &mut [OutcomeRecord]) {
    // Stable sort keeps insertion order among equal timestamps.
    records.sort_by(|a, b| a.received_at_ms.total_cmp(&b.received_at_ms));
}

/// Frozen, receive-time-ordered view of a store
#[derive(Debug, Clone)]
pub struct MetricsSnapshot {
    records: Arc<[OutcomeRecord]>,
    events: Arc<[FailureEvent]>,
    version: u64,
}

impl MetricsSnapshot {
    /// Build a snapshot directly from records (sorted here)
    #[must_use]
    pub fn from_records(mut records: Vec<OutcomeRecord>) -> Self {
        sort_by_receive_time(&mut records);
        Self {
            records: records.into(),
            events: Vec::new().into(),
            version: 0,
        }
    }

    /// Attach failure events
    #[must_use]
    pub fn with_events(mut self, events: Vec<FailureEvent>) -> Self {
        self.events = events.into();
        self
    }

    /// Records ordered by receive time
    #[must_use]
    pub fn records(&self) -> &[OutcomeRecord] {
        &self.records
    }

    /// Failure events
    #[must_use]
    pub fn events(&self) -> &[FailureEvent] {
        &self.events
    }

    /// Version of the store this snapshot was taken from
    #[must_use]
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Number of records
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the snapshot holds no records
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Record counts per final status
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatusCounts {
    /// `SUCCESS` records
    pub success: usize,
    /// `RECOVERED` records
    pub recovered: usize,
    /// `FAILED` records
    pub failed: usize,
    /// `TIMEOUT` records
    pub timeout: usize,
}

impl StatusCounts {
    /// Count statuses over a record slice
    #[must_use]
    pub fn from_records(records: &[OutcomeRecord]) -> Self {
        let mut counts = Self::default();
        for record in records {
            match record.status {
                Status::Success => counts.success += 1,
                Status::Recovered => counts.recovered += 1,
                Status::Failed => counts.failed += 1,
                Status::Timeout => counts.timeout += 1,
            }
        }
        counts
    }

    /// Total number of records counted
    #[must_use]
    pub fn total(&self) -> usize {
        self.success + self.recovered + self.failed + self.timeout
    }

    /// Records served clean or after failover
    #[must_use]
    pub fn delivered(&self) -> usize {
        self.success + self.recovered
    }
}
