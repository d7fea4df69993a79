//! Failover dispatcher
//!
//! Each logical request starts at a replica picked by the selection policy.
//! On timeout or transport failure the remaining replicas are tried one at a
//! time in set order, each attempt bounded by the same timeout, so a request
//! makes at most one attempt per replica. Exactly one [`OutcomeRecord`] is
//! appended to the store per logical request, after all attempts resolve.

mod backend;
mod classify;
mod load;
mod pacer;
mod selection;

pub use backend::{Backend, HttpBackend, WorkItem, WorkResult};
pub use classify::{AttemptOutcome, classify};
pub use load::{LoadGenerator, LoadSummary};
pub use pacer::{Pacer, interval_for, pacing_delay};
pub use selection::{FixedSequence, RandomSelection, SelectionPolicy, attempt_order};

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, warn};
use uuid::Uuid;

use crate::metrics::{MetricsStore, OutcomeRecord};
use crate::stats::DispatchStats;
use crate::{Error, Result};

/// Wall-clock time in fractional milliseconds since the Unix epoch
#[allow(clippy::cast_precision_loss)]
pub(crate) fn now_ms() -> f64 {
    chrono::Utc::now().timestamp_micros() as f64 / 1000.0
}

/// Dispatches work across replicas with failover
pub struct Dispatcher {
    replicas: Vec<String>,
    backend: Arc<dyn Backend>,
    selection: Arc<dyn SelectionPolicy>,
    attempt_timeout: Duration,
    store: Arc<MetricsStore>,
    stats: Arc<DispatchStats>,
}

impl Dispatcher {
    /// Create a dispatcher with random initial selection
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoReplicas`] for an empty replica set and
    /// [`Error::InvalidParameter`] for a zero timeout.
    pub fn new(
        replicas: Vec<String>,
        backend: Arc<dyn Backend>,
        store: Arc<MetricsStore>,
        attempt_timeout: Duration,
    ) -> Result<Self> {
        if replicas.is_empty() {
            return Err(Error::NoReplicas);
        }
        if attempt_timeout.is_zero() {
            return Err(Error::invalid("attempt timeout must be non-zero"));
        }
        Ok(Self {
            replicas,
            backend,
            selection: Arc::new(RandomSelection::new()),
            attempt_timeout,
            store,
            stats: Arc::new(DispatchStats::new()),
        })
    }

    /// Replace the initial-replica policy
    #[must_use]
    pub fn with_selection(mut self, selection: Arc<dyn SelectionPolicy>) -> Self {
        self.selection = selection;
        self
    }

    /// Replica addresses in set order
    pub fn replicas(&self) -> &[String] {
        &self.replicas
    }

    /// Store receiving the outcome records
    pub fn store(&self) -> &Arc<MetricsStore> {
        &self.store
    }

    /// Live dispatch statistics
    pub fn stats(&self) -> &Arc<DispatchStats> {
        &self.stats
    }

    async fn attempt(&self, replica: &str, item: &WorkItem) -> AttemptOutcome {
        let result = match tokio::time::timeout(
            self.attempt_timeout,
            self.backend.process(replica, item),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(Error::BackendTimeout(replica.to_string())),
        };
        AttemptOutcome::from_result(&result)
    }

    /// Run one logical request to completion and record its outcome
    pub async fn dispatch(&self, item: &WorkItem) -> Result<OutcomeRecord> {
        let request_id = Uuid::new_v4().to_string();
        let count = self.replicas.len();
        let initial = self.selection.initial(count).min(count - 1);

        let sent_at_ms = now_ms();
        let started = Instant::now();

        let mut attempts = Vec::with_capacity(count);
        let mut last = initial;
        for index in attempt_order(initial, count) {
            let replica = &self.replicas[index];
            last = index;

            let outcome = self.attempt(replica, item).await;
            let done = outcome.is_completed();
            self.stats.record_attempt(replica, done);

            match &outcome {
                AttemptOutcome::Completed => {
                    debug!(request_id = %request_id, replica = %replica, "Attempt completed");
                }
                AttemptOutcome::TimedOut => {
                    warn!(request_id = %request_id, replica = %replica, "Attempt timed out");
                }
                AttemptOutcome::TransportFailed(reason) => {
                    warn!(request_id = %request_id, replica = %replica, reason = %reason, "Attempt failed");
                }
            }

            attempts.push(outcome);
            if done {
                break;
            }
        }

        let status = classify(&attempts)
            .ok_or_else(|| Error::Internal("logical request made no attempts".into()))?;
        self.stats.record_request(attempts.len(), status);
        if !status.is_delivered() {
            warn!(
                request_id = %request_id,
                attempts = attempts.len(),
                status = %status,
                "All replicas failed"
            );
        }

        // Monotonic elapsed time keeps received >= sent even if the wall clock steps.
        let received_at_ms = sent_at_ms + started.elapsed().as_secs_f64() * 1000.0;
        let record = OutcomeRecord::new(
            sent_at_ms,
            received_at_ms,
            status,
            self.replicas[last].clone(),
            Some(request_id),
        )?;
        self.store.append(record.clone());
        Ok(record)
    }
}
