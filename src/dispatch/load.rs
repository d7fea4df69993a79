//! Load generation at a target request rate
//!
//! One worker paces itself: after each logical request it sleeps for what is
//! left of the interval, so time spent in failover is not added on top. Several
//! workers share one rate limiter instead and dispatch independently.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::task::JoinSet;
use tokio::time::{Instant, sleep, sleep_until};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::pacer::{Pacer, interval_for, pacing_delay};
use super::{Dispatcher, WorkItem};
use crate::{Error, Result};

/// Totals for one load run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LoadSummary {
    /// Logical requests dispatched
    pub requests: u64,
    /// Wall time the run took
    pub elapsed_secs: f64,
    /// `requests / elapsed_secs`
    pub achieved_rate: f64,
    /// Whether the run was stopped before its deadline
    pub cancelled: bool,
}

/// Drives a dispatcher for a fixed duration
pub struct LoadGenerator {
    dispatcher: Arc<Dispatcher>,
    work: WorkItem,
    rate_per_second: f64,
    duration: Duration,
    workers: usize,
}

impl LoadGenerator {
    /// Create a generator
    pub fn new(
        dispatcher: Arc<Dispatcher>,
        work: WorkItem,
        rate_per_second: f64,
        duration: Duration,
        workers: usize,
    ) -> Result<Self> {
        interval_for(rate_per_second)?;
        if workers == 0 {
            return Err(Error::invalid("at least one worker is required"));
        }
        Ok(Self {
            dispatcher,
            work,
            rate_per_second,
            duration,
            workers,
        })
    }

    /// Dispatch until the duration elapses or `cancel` fires
    pub async fn run(&self, cancel: CancellationToken) -> Result<LoadSummary> {
        info!(
            rate = self.rate_per_second,
            duration_secs = self.duration.as_secs_f64(),
            workers = self.workers,
            replicas = self.dispatcher.replicas().len(),
            "Starting load"
        );
        let started = Instant::now();
        let deadline = started + self.duration;

        let requests = if self.workers == 1 {
            self.run_sequential(deadline, &cancel).await?
        } else {
            self.run_concurrent(deadline, &cancel).await?
        };

        let elapsed_secs = started.elapsed().as_secs_f64();
        #[allow(clippy::cast_precision_loss)]
        let achieved_rate = if elapsed_secs > 0.0 {
            requests as f64 / elapsed_secs
        } else {
            0.0
        };
        let summary = LoadSummary {
            requests,
            elapsed_secs,
            achieved_rate,
            cancelled: cancel.is_cancelled(),
        };
        info!(
            requests,
            achieved_rate,
            cancelled = summary.cancelled,
            "Load finished"
        );
        Ok(summary)
    }

    async fn run_sequential(&self, deadline: Instant, cancel: &CancellationToken) -> Result<u64> {
        let interval = interval_for(self.rate_per_second)?;
        let mut requests = 0;

        while Instant::now() < deadline && !cancel.is_cancelled() {
            let started = Instant::now();
            self.dispatcher.dispatch(&self.work).await?;
            requests += 1;

            let delay = pacing_delay(interval, started.elapsed());
            debug!(delay_ms = delay.as_millis(), "Pacing");
            tokio::select! {
                () = cancel.cancelled() => break,
                () = sleep(delay) => {}
            }
        }
        Ok(requests)
    }

    async fn run_concurrent(&self, deadline: Instant, cancel: &CancellationToken) -> Result<u64> {
        let pacer = Arc::new(Pacer::new(self.rate_per_second)?);
        let mut set = JoinSet::new();

        for worker in 0..self.workers {
            let pacer = Arc::clone(&pacer);
            let dispatcher = Arc::clone(&self.dispatcher);
            let work = self.work.clone();
            let cancel = cancel.clone();

            set.spawn(async move {
                let mut requests = 0u64;
                loop {
                    tokio::select! {
                        () = cancel.cancelled() => break,
                        () = sleep_until(deadline) => break,
                        () = pacer.ready() => {}
                    }
                    if Instant::now() >= deadline {
                        break;
                    }
                    dispatcher.dispatch(&work).await?;
                    requests += 1;
                }
                debug!(worker, requests, "Worker finished");
                Ok::<u64, Error>(requests)
            });
        }

        let mut total = 0;
        while let Some(joined) = set.join_next().await {
            total += joined.map_err(|e| Error::Internal(format!("load worker panicked: {e}")))??;
        }
        Ok(total)
    }
}
