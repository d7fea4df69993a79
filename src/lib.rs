//! Failover Bench Library
//!
//! Measures how a replicated request-processing service absorbs and recovers
//! from replica failures.
//!
//! # Features
//!
//! - **Failover dispatch**: random initial replica, ordered failover, one
//!   outcome record per logical request
//! - **Load generation**: target request rate, sequential or concurrent
//! - **Metrics store**: thread-safe, CSV/JSON persistence, legacy schema import
//! - **Analysis**: windowed throughput and latency, spike-based failure
//!   detection, recovery time, before/during/after phase comparison
//! - **Reports**: structured JSON plus window series for plotting

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod analysis;
pub mod cli;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod metrics;
pub mod report;
pub mod stats;

pub use error::{Error, Result};

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Setup tracing/logging
pub fn setup_tracing(level: &str, format: Option<&str>) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let subscriber = tracing_subscriber::registry().with(filter);

    match format {
        Some("json") => {
            subscriber
                .with(fmt::layer().json())
                .try_init()
                .map_err(|e| Error::Internal(e.to_string()))?;
        }
        _ => {
            subscriber
                .with(fmt::layer().with_writer(std::io::stderr))
                .try_init()
                .map_err(|e| Error::Internal(e.to_string()))?;
        }
    }

    Ok(())
}
