//! Error types for the failover bench

use std::io;

use thiserror::Error;

/// Result type alias for the failover bench
pub type Result<T> = std::result::Result<T, Error>;

/// Failover bench errors
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// An analysis or dispatch parameter is out of range
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// A persisted record is missing a field or carries an unparsable value
    #[error("Malformed record at line {line}: {reason}")]
    MalformedRecord {
        /// 1-based line (CSV, header is line 1) or element index (JSON)
        line: usize,
        /// What was wrong with it
        reason: String,
    },

    /// Input does not match any known metrics schema
    #[error("Unrecognised metrics schema: {0}")]
    Schema(String),

    /// Dispatcher was built with an empty replica set
    #[error("No replicas configured")]
    NoReplicas,

    /// Backend call exceeded its deadline
    #[error("Backend timeout: {0}")]
    BackendTimeout(String),

    /// Transport error
    #[error("Transport error: {0}")]
    Transport(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// CSV error
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// HTTP error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create an invalid-parameter error
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidParameter(message.into())
    }

    /// Create a malformed-record error
    pub fn malformed(line: usize, reason: impl Into<String>) -> Self {
        Self::MalformedRecord {
            line,
            reason: reason.into(),
        }
    }

    /// Whether this error represents an attempt that ran out of time
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        match self {
            Self::BackendTimeout(_) => true,
            Self::Http(e) => e.is_timeout(),
            _ => false,
        }
    }
}
