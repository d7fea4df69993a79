//! Outcome records and failure events
//!
//! All instants are milliseconds on a shared wall-clock axis (Unix epoch for
//! live runs, arbitrary origin for synthetic data). Fractional milliseconds are
//! kept so legacy second-based files normalise without rounding.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Final status of one logical request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Status {
    /// First replica answered
    Success,
    /// An alternate replica answered after the first one failed
    Recovered,
    /// Every replica failed and the last failure was a transport error
    Failed,
    /// Every replica failed and the last failure was a timeout
    Timeout,
}

impl Status {
    /// All statuses in reporting order
    pub const ALL: [Self; 4] = [Self::Success, Self::Recovered, Self::Failed, Self::Timeout];

    /// Wire name used in persisted files
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Success => "SUCCESS",
            Self::Recovered => "RECOVERED",
            Self::Failed => "FAILED",
            Self::Timeout => "TIMEOUT",
        }
    }

    /// Whether the request was served at all (clean or after failover)
    #[must_use]
    pub fn is_delivered(self) -> bool {
        matches!(self, Self::Success | Self::Recovered)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Status {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        Self::ALL
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| Error::invalid(format!("unknown status '{s}'")))
    }
}

/// One logical request's final outcome. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutcomeRecord {
    /// When the response (or final failure) was observed
    #[serde(rename = "timestamp_ms")]
    pub received_at_ms: f64,
    /// When the request was first sent
    #[serde(rename = "send_time_ms")]
    pub sent_at_ms: f64,
    /// `received_at_ms - sent_at_ms`
    pub latency_ms: f64,
    /// Final status
    pub status: Status,
    /// Replica that served the request, or the last one attempted
    #[serde(rename = "server_replica")]
    pub replica: String,
    /// Optional correlation key
    #[serde(default)]
    pub request_id: Option<String>,
}

impl OutcomeRecord {
    /// Build a record from send/receive instants
    ///
    /// Latency is derived, so it is never negative as long as the instants are
    /// ordered.
    pub fn new(
        sent_at_ms: f64,
        received_at_ms: f64,
        status: Status,
        replica: impl Into<String>,
        request_id: Option<String>,
    ) -> Result<Self> {
        if !sent_at_ms.is_finite() || !received_at_ms.is_finite() {
            return Err(Error::invalid("record instants must be finite"));
        }
        if received_at_ms < sent_at_ms {
            return Err(Error::invalid(format!(
                "received_at ({received_at_ms}) precedes sent_at ({sent_at_ms})"
            )));
        }
        Ok(Self {
            received_at_ms,
            sent_at_ms,
            latency_ms: received_at_ms - sent_at_ms,
            status,
            replica: replica.into(),
            request_id,
        })
    }

    /// Build a record from a receive instant and a latency
    pub fn from_latency(
        received_at_ms: f64,
        latency_ms: f64,
        status: Status,
        replica: impl Into<String>,
        request_id: Option<String>,
    ) -> Result<Self> {
        if !latency_ms.is_finite() || latency_ms < 0.0 {
            return Err(Error::invalid(format!("latency must be >= 0, got {latency_ms}")));
        }
        Ok(Self {
            received_at_ms,
            sent_at_ms: received_at_ms - latency_ms,
            latency_ms,
            status,
            replica: replica.into(),
            request_id,
        })
    }
}

/// A failure/recovery marker, injected externally or produced by detection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureEvent {
    /// When the failure began
    pub failure_start_ms: f64,
    /// When recovery completed, if known
    #[serde(default)]
    pub recovery_time_ms: Option<f64>,
    /// Free-form tag (`injected`, `detected`, `crash`, ...)
    pub event_type: String,
    /// Human-readable note
    #[serde(default)]
    pub description: String,
}

impl FailureEvent {
    /// Tag for events coming from a fault-injection signal
    pub const INJECTED: &'static str = "injected";
    /// Tag for events produced by the failure detector
    pub const DETECTED: &'static str = "detected";

    /// Build an event, rejecting a recovery instant before the failure
    pub fn new(
        failure_start_ms: f64,
        recovery_time_ms: Option<f64>,
        event_type: impl Into<String>,
        description: impl Into<String>,
    ) -> Result<Self> {
        if let Some(recovery) = recovery_time_ms
            && recovery < failure_start_ms
        {
            return Err(Error::invalid(format!(
                "recovery_time ({recovery}) precedes failure_start ({failure_start_ms})"
            )));
        }
        Ok(Self {
            failure_start_ms,
            recovery_time_ms,
            event_type: event_type.into(),
            description: description.into(),
        })
    }

    /// Whether the event is still open (no recovery recorded)
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.recovery_time_ms.is_none()
    }
}
