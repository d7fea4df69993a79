//! Dispatch statistics
//!
//! Counts logical requests, failovers and exhausted requests, plus attempts
//! per replica. Updated concurrently by dispatch workers.

use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::metrics::Status;

#[derive(Default)]
struct ReplicaCounters {
    attempts: AtomicU64,
    successes: AtomicU64,
    failures: AtomicU64,
}

/// Dispatch statistics
pub struct DispatchStats {
    /// Logical requests dispatched
    requests: AtomicU64,
    /// Requests that needed more than one attempt
    failovers: AtomicU64,
    /// Requests where every replica failed
    exhausted: AtomicU64,
    /// Per-replica attempt counts (key = replica address)
    replicas: DashMap<String, ReplicaCounters>,
}

impl DispatchStats {
    /// Create new statistics tracker
    #[must_use]
    pub fn new() -> Self {
        Self {
            requests: AtomicU64::new(0),
            failovers: AtomicU64::new(0),
            exhausted: AtomicU64::new(0),
            replicas: DashMap::new(),
        }
    }

    /// Record one attempt against `replica`
    pub fn record_attempt(&self, replica: &str, succeeded: bool) {
        let entry = self.replicas.entry(replica.to_string()).or_default();
        entry.attempts.fetch_add(1, Ordering::Relaxed);
        if succeeded {
            entry.successes.fetch_add(1, Ordering::Relaxed);
        } else {
            entry.failures.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Record the final status of a logical request
    pub fn record_request(&self, attempts: usize, status: Status) {
        self.requests.fetch_add(1, Ordering::Relaxed);
        if attempts > 1 {
            self.failovers.fetch_add(1, Ordering::Relaxed);
        }
        if !status.is_delivered() {
            self.exhausted.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Attempts made against one replica
    pub fn attempts(&self, replica: &str) -> u64 {
        self.replicas
            .get(replica)
            .map_or(0, |entry| entry.attempts.load(Ordering::Relaxed))
    }

    /// Get snapshot of current statistics
    pub fn snapshot(&self) -> DispatchStatsSnapshot {
        let mut replicas: Vec<ReplicaStats> = self
            .replicas
            .iter()
            .map(|entry| ReplicaStats {
                replica: entry.key().clone(),
                attempts: entry.attempts.load(Ordering::Relaxed),
                successes: entry.successes.load(Ordering::Relaxed),
                failures: entry.failures.load(Ordering::Relaxed),
            })
            .collect();
        replicas.sort_by(|a, b| a.replica.cmp(&b.replica));

        let requests = self.requests.load(Ordering::Relaxed);
        let failovers = self.failovers.load(Ordering::Relaxed);

        #[allow(clippy::cast_precision_loss)]
        let failover_rate = if requests > 0 {
            failovers as f64 / requests as f64
        } else {
            0.0
        };

        DispatchStatsSnapshot {
            requests,
            failovers,
            failover_rate,
            exhausted: self.exhausted.load(Ordering::Relaxed),
            replicas,
        }
    }
}

impl Default for DispatchStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of dispatch statistics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispatchStatsSnapshot {
    /// Logical requests
    pub requests: u64,
    /// Requests that failed over at least once
    pub failovers: u64,
    /// Failover rate (0.0-1.0)
    pub failover_rate: f64,
    /// Requests no replica could serve
    pub exhausted: u64,
    /// Per-replica counters, sorted by address
    pub replicas: Vec<ReplicaStats>,
}

/// Attempt counters for one replica
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplicaStats {
    /// Replica address
    pub replica: String,
    /// Attempts made
    pub attempts: u64,
    /// Attempts that completed
    pub successes: u64,
    /// Attempts that failed or timed out
    pub failures: u64,
}
