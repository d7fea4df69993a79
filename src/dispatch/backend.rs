//! Backend call interface
//!
//! A replica exposes one operation: process a work item and report where the
//! result went and when processing started and ended.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{Error, Result};

/// Work descriptor plus its numeric parameter
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkItem {
    /// Input the replica should process
    pub input_path: String,
    /// Operation parameter
    pub threshold: u32,
}

/// What a replica returns for a processed item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkResult {
    /// Where the replica stored its output
    pub output_path: String,
    /// Replica-side processing start (ms)
    #[serde(alias = "start_time")]
    pub start_time_ms: f64,
    /// Replica-side processing end (ms)
    #[serde(alias = "end_time")]
    pub end_time_ms: f64,
}

/// One remote operation against a named replica
#[async_trait]
pub trait Backend: Send + Sync {
    /// Process `item` on `replica`
    async fn process(&self, replica: &str, item: &WorkItem) -> Result<WorkResult>;
}

/// JSON-over-HTTP backend: `POST {replica}/process`
pub struct HttpBackend {
    client: Client,
}

impl HttpBackend {
    /// Create a backend whose calls give up after `timeout`
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .pool_max_idle_per_host(10)
            .pool_idle_timeout(Duration::from_secs(90))
            .tcp_nodelay(true)
            .build()
            .map_err(|e| Error::Transport(e.to_string()))?;
        Ok(Self { client })
    }

    fn endpoint(replica: &str) -> String {
        format!("{}/process", replica.trim_end_matches('/'))
    }
}

#[async_trait]
impl Backend for HttpBackend {
    async fn process(&self, replica: &str, item: &WorkItem) -> Result<WorkResult> {
        let url = Self::endpoint(replica);
        debug!(url = %url, input = %item.input_path, "Sending work item");

        let response = self
            .client
            .post(&url)
            .json(item)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    Error::BackendTimeout(replica.to_string())
                } else {
                    Error::Http(e)
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::Transport(format!("{replica} answered {status}")));
        }

        response.json::<WorkResult>().await.map_err(|e| {
            if e.is_timeout() {
                Error::BackendTimeout(replica.to_string())
            } else {
                Error::Http(e)
            }
        })
    }
}
