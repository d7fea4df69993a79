//! Metrics persistence: CSV and JSON, current and legacy schemas
//!
//! The current schema is millisecond-based:
//! `timestamp_ms, send_time_ms, latency_ms, status, server_replica, request_id`.
//! The legacy schema is second-based: `timestamp, latency, status, server`.
//! The schema is decided once per file from its header (CSV) or from the keys
//! of the first metric object (JSON). A single bad row rejects the whole file.

use std::io::{Read, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::record::{FailureEvent, OutcomeRecord, Status};
use crate::{Error, Result};

/// On-disk format, picked from the file extension
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricsFormat {
    /// Comma-separated rows with a header
    Csv,
    /// `{ metrics, failure_events, metadata }` document
    Json,
}

impl MetricsFormat {
    /// `.json` maps to JSON, anything else to CSV
    #[must_use]
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => Self::Json,
            _ => Self::Csv,
        }
    }
}

/// Column layout detected for one file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Schema {
    /// `timestamp, latency, status, server` in seconds
    Legacy,
    /// `timestamp_ms, send_time_ms, latency_ms, status, server_replica, request_id`
    Current,
}

const LEGACY_REQUIRED: [&str; 3] = ["timestamp", "latency", "status"];
const CURRENT_REQUIRED: [&str; 4] = ["timestamp_ms", "send_time_ms", "latency_ms", "status"];
const UNKNOWN_REPLICA: &str = "unknown";

impl Schema {
    /// Detect the schema from a set of column names
    pub fn detect<'a>(columns: impl IntoIterator<Item = &'a str>) -> Result<Self> {
        let columns: Vec<&str> = columns.into_iter().map(str::trim).collect();
        let has_all = |required: &[&str]| required.iter().all(|c| columns.contains(c));

        if has_all(&LEGACY_REQUIRED) {
            Ok(Self::Legacy)
        } else if has_all(&CURRENT_REQUIRED) {
            Ok(Self::Current)
        } else {
            Err(Error::Schema(format!(
                "expected columns {CURRENT_REQUIRED:?} or legacy {LEGACY_REQUIRED:?}, found {columns:?}"
            )))
        }
    }

    /// Normalise one row into a millisecond-based record
    ///
    /// `field` returns the raw text of a column, `None` when absent or empty.
    fn normalize<F>(self, line: usize, field: F) -> Result<OutcomeRecord>
    where
        F: Fn(&str) -> Option<String>,
    {
        let number = |name: &str| -> Result<f64> {
            let raw = field(name).ok_or_else(|| Error::malformed(line, format!("missing {name}")))?;
            let value: f64 = raw
                .trim()
                .parse()
                .map_err(|_| Error::malformed(line, format!("{name} is not a number: '{raw}'")))?;
            if value.is_finite() {
                Ok(value)
            } else {
                Err(Error::malformed(line, format!("{name} is not finite")))
            }
        };
        let status = field("status")
            .ok_or_else(|| Error::malformed(line, "missing status"))?
            .parse::<Status>()
            .map_err(|e| Error::malformed(line, e.to_string()))?;

        let (received_at_ms, sent_at_ms, latency_ms, replica, request_id) = match self {
            Self::Legacy => {
                let received = number("timestamp")? * 1000.0;
                let latency = number("latency")? * 1000.0;
                let replica = field("server").unwrap_or_else(|| UNKNOWN_REPLICA.to_string());
                (received, received - latency, latency, replica, None)
            }
            Self::Current => {
                let replica =
                    field("server_replica").unwrap_or_else(|| UNKNOWN_REPLICA.to_string());
                (
                    number("timestamp_ms")?,
                    number("send_time_ms")?,
                    number("latency_ms")?,
                    replica,
                    field("request_id"),
                )
            }
        };

        if latency_ms < 0.0 {
            return Err(Error::malformed(line, format!("negative latency {latency_ms}")));
        }
        if received_at_ms < sent_at_ms {
            return Err(Error::malformed(
                line,
                format!("received at {received_at_ms} precedes sent at {sent_at_ms}"),
            ));
        }

        Ok(OutcomeRecord {
            received_at_ms,
            sent_at_ms,
            latency_ms,
            status,
            replica,
            request_id,
        })
    }
}

/// Read outcome records from CSV, auto-detecting the schema from the header
pub fn read_records_csv<R: Read>(reader: R) -> Result<Vec<OutcomeRecord>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let headers = reader.headers()?.clone();
    let schema = Schema::detect(headers.iter())?;

    let mut records = Vec::new();
    for row in reader.records() {
        let row = row?;
        let line = row.position().map_or(records.len() + 2, |p| p.line() as usize);
        let record = schema.normalize(line, |name| {
            headers
                .iter()
                .position(|h| h == name)
                .and_then(|i| row.get(i))
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        })?;
        records.push(record);
    }
    Ok(records)
}

/// Write outcome records as current-schema CSV
pub fn write_records_csv<W: Write>(writer: W, records: &[OutcomeRecord]) -> Result<()> {
    let mut writer = csv::Writer::from_writer(writer);
    for record in records {
        writer.serialize(record)?;
    }
    writer.flush()?;
    Ok(())
}

/// Read failure events from CSV
pub fn read_events_csv<R: Read>(reader: R) -> Result<Vec<FailureEvent>> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader);
    let mut events = Vec::new();
    for (index, row) in reader.deserialize::<FailureEvent>().enumerate() {
        events.push(row.map_err(|e| Error::malformed(index + 2, e.to_string()))?);
    }
    Ok(events)
}

/// Write failure events as CSV
pub fn write_events_csv<W: Write>(writer: W, events: &[FailureEvent]) -> Result<()> {
    let mut writer = csv::Writer::from_writer(writer);
    for event in events {
        writer.serialize(event)?;
    }
    writer.flush()?;
    Ok(())
}

/// Export metadata stored alongside JSON metrics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportMetadata {
    /// Number of outcome records
    pub total_requests: usize,
    /// Number of failure events
    pub total_failures: usize,
    /// Wall-clock export time (Unix millis)
    pub export_time_ms: i64,
}

#[derive(Serialize)]
struct JsonDocumentRef<'a> {
    metrics: &'a [OutcomeRecord],
    failure_events: &'a [FailureEvent],
    metadata: ExportMetadata,
}

/// Read records and failure events from a JSON document
pub fn read_json<R: Read>(reader: R) -> Result<(Vec<OutcomeRecord>, Vec<FailureEvent>)> {
    let document: Value = serde_json::from_reader(reader)?;

    let metrics = match document.get("metrics") {
        Some(Value::Array(items)) => items.as_slice(),
        Some(_) => return Err(Error::Schema("'metrics' must be an array".to_string())),
        None => &[],
    };

    let mut records = Vec::with_capacity(metrics.len());
    if let Some(first) = metrics.first() {
        let keys = first
            .as_object()
            .ok_or_else(|| Error::malformed(0, "metric entry is not an object"))?
            .keys()
            .map(String::as_str);
        let schema = Schema::detect(keys)?;

        for (index, item) in metrics.iter().enumerate() {
            let object = item
                .as_object()
                .ok_or_else(|| Error::malformed(index, "metric entry is not an object"))?;
            records.push(schema.normalize(index, |name| {
                object.get(name).and_then(|value| match value {
                    Value::String(s) if !s.is_empty() => Some(s.clone()),
                    Value::Number(n) => Some(n.to_string()),
                    _ => None,
                })
            })?);
        }
    }

    let events = match document.get("failure_events") {
        Some(value) if !value.is_null() => serde_json::from_value(value.clone())?,
        _ => Vec::new(),
    };

    Ok((records, events))
}

/// Write records and failure events as a JSON document
pub fn write_json<W: Write>(
    writer: W,
    records: &[OutcomeRecord],
    events: &[FailureEvent],
) -> Result<()> {
    let document = JsonDocumentRef {
        metrics: records,
        failure_events: events,
        metadata: ExportMetadata {
            total_requests: records.len(),
            total_failures: events.len(),
            export_time_ms: chrono::Utc::now().timestamp_millis(),
        },
    };
    serde_json::to_writer_pretty(writer, &document)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_detect_current_schema() {
        let schema = Schema::detect([
            "timestamp_ms",
            "send_time_ms",
            "latency_ms",
            "status",
            "server_replica",
            "request_id",
        ])
        .unwrap();
        assert_eq!(schema, Schema::Current);
    }

    #[test]
    fn test_detect_legacy_schema() {
        let schema = Schema::detect(["timestamp", "latency", "status", "server"]).unwrap();
        assert_eq!(schema, Schema::Legacy);
    }

    #[test]
    fn test_detect_unknown_schema() {
        assert!(matches!(
            Schema::detect(["time", "status"]),
            Err(Error::Schema(_))
        ));
    }

    #[test]
    fn test_read_legacy_csv_normalises_to_millis() {
        let input = "timestamp,latency,status,server\n1.5,0.25,SUCCESS,localhost:50051\n";
        let records = read_records_csv(input.as_bytes()).unwrap();
        assert_eq!(records.len(), 1);
        let r = &records[0];
        assert!((r.received_at_ms - 1500.0).abs() < 1e-9);
        assert!((r.latency_ms - 250.0).abs() < 1e-9);
        assert!((r.sent_at_ms - 1250.0).abs() < 1e-9);
        assert_eq!(r.replica, "localhost:50051");
        assert_eq!(r.request_id, None);
    }

    #[test]
    fn test_read_current_csv_optional_columns() {
        let input = "timestamp_ms,send_time_ms,latency_ms,status\n200,150,50,RECOVERED\n";
        let records = read_records_csv(input.as_bytes()).unwrap();
        assert_eq!(records[0].replica, "unknown");
        assert_eq!(records[0].status, Status::Recovered);
    }

    #[test]
    fn test_missing_required_field_rejects_file() {
        let input = "timestamp_ms,send_time_ms,latency_ms,status,server_replica,request_id\n\
                     200,150,50,SUCCESS,a,1\n\
                     300,250,,SUCCESS,a,2\n";
        let err = read_records_csv(input.as_bytes()).unwrap_err();
        assert!(matches!(err, Error::MalformedRecord { line: 3, .. }), "{err}");
    }

    #[test]
    fn test_receive_before_send_rejects_file() {
        let input = "timestamp_ms,send_time_ms,latency_ms,status,server_replica,request_id\n\
                     200,150,50,SUCCESS,a,1\n\
                     100,500,5,SUCCESS,a,x\n";
        let err = read_records_csv(input.as_bytes()).unwrap_err();
        assert!(matches!(err, Error::MalformedRecord { line: 3, .. }), "{err}");
    }

    #[test]
    fn test_receive_before_send_rejects_json() {
        let input = r#"{"metrics":[{"timestamp_ms":100,"send_time_ms":500,"latency_ms":5,"status":"SUCCESS"}]}"#;
        assert!(matches!(
            read_json(input.as_bytes()),
            Err(Error::MalformedRecord { line: 0, .. })
        ));
    }

    #[test]
    fn test_unknown_status_rejects_file() {
        let input = "timestamp,latency,status,server\n1,0.1,MAYBE,a\n";
        assert!(matches!(
            read_records_csv(input.as_bytes()),
            Err(Error::MalformedRecord { .. })
        ));
    }

    #[test]
    fn test_csv_round_trip() {
        let records = vec![
            OutcomeRecord::new(1000.25, 1050.5, Status::Success, "r1", Some("a".into())).unwrap(),
            OutcomeRecord::new(1100.0, 4100.0, Status::Timeout, "r2", None).unwrap(),
        ];
        let mut buf = Vec::new();
        write_records_csv(&mut buf, &records).unwrap();

        let header = String::from_utf8(buf.clone()).unwrap();
        assert!(header.starts_with(
            "timestamp_ms,send_time_ms,latency_ms,status,server_replica,request_id"
        ));
        assert_eq!(read_records_csv(buf.as_slice()).unwrap(), records);
    }

    #[test]
    fn test_json_round_trip_with_events() {
        let records =
            vec![OutcomeRecord::new(0.0, 20.0, Status::Recovered, "r2", Some("x".into())).unwrap()];
        let events = vec![FailureEvent::new(10.0, Some(30.0), "injected", "kill r1").unwrap()];
        let mut buf = Vec::new();
        write_json(&mut buf, &records, &events).unwrap();

        let (loaded, loaded_events) = read_json(buf.as_slice()).unwrap();
        assert_eq!(loaded, records);
        assert_eq!(loaded_events, events);
    }

    #[test]
    fn test_json_legacy_metrics() {
        let input = r#"{"metrics": [{"timestamp": 2.0, "latency": 0.5, "status": "FAILED", "server": "b"}]}"#;
        let (records, events) = read_json(input.as_bytes()).unwrap();
        assert!(events.is_empty());
        assert!((records[0].received_at_ms - 2000.0).abs() < 1e-9);
        assert_eq!(records[0].status, Status::Failed);
    }

    #[test]
    fn test_events_csv_round_trip() {
        let events = vec![
            FailureEvent::new(100.0, None, "detected", "").unwrap(),
            FailureEvent::new(200.0, Some(900.0), "injected", "kill").unwrap(),
        ];
        let mut buf = Vec::new();
        write_events_csv(&mut buf, &events).unwrap();
        assert_eq!(read_events_csv(buf.as_slice()).unwrap(), events);
    }

    #[test]
    fn test_format_from_path() {
        assert_eq!(MetricsFormat::from_path(Path::new("m.JSON")), MetricsFormat::Json);
        assert_eq!(MetricsFormat::from_path(Path::new("m.csv")), MetricsFormat::Csv);
        assert_eq!(MetricsFormat::from_path(Path::new("metrics")), MetricsFormat::Csv);
    }
}
