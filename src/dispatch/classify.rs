//! Outcome classification for one logical request

use crate::Error;
use crate::metrics::Status;

/// What happened on one attempt against one replica
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptOutcome {
    /// The replica returned a result
    Completed,
    /// The attempt hit its timeout
    TimedOut,
    /// The call failed for any other reason
    TransportFailed(String),
}

impl AttemptOutcome {
    /// Classify a finished attempt
    pub fn from_result<T>(result: &Result<T, Error>) -> Self {
        match result {
            Ok(_) => Self::Completed,
            Err(e) if e.is_timeout() => Self::TimedOut,
            Err(e) => Self::TransportFailed(e.to_string()),
        }
    }

    /// Whether the attempt succeeded
    #[must_use]
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed)
    }
}

/// Final status from the ordered attempts of one logical request
///
/// A completed first attempt is `SUCCESS`, a completed later attempt is
/// `RECOVERED`. With no completion the last attempt decides between `TIMEOUT`
/// and `FAILED`. `None` for an empty slice.
#[must_use]
pub fn classify(attempts: &[AttemptOutcome]) -> Option<Status> {
    let last = attempts.last()?;
    Some(match last {
        AttemptOutcome::Completed if attempts.len() == 1 => Status::Success,
        AttemptOutcome::Completed => Status::Recovered,
        AttemptOutcome::TimedOut => Status::Timeout,
        AttemptOutcome::TransportFailed(_) => Status::Failed,
    })
}
