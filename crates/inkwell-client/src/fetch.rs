//! Redundant blob download from a pool of aggregator mirrors.
//!
//! Mirrors are public, unauthenticated and individually unreliable. A fetch
//! walks the ordered list once: each mirror gets one attempt bounded by a
//! hard timeout, failures are logged and the next mirror is tried. The first
//! 2xx body wins.

use std::time::Duration;

use futures::future::join_all;
use tracing::{debug, warn};

use crate::error::FetchFailure;

pub struct AggregatorPool {
    client: reqwest::Client,
    mirrors: Vec<String>,
    timeout: Duration,
}

#[derive(Debug)]
enum AttemptError {
    Status(reqwest::StatusCode),
    Transport(reqwest::Error),
}

impl std::fmt::Display for AttemptError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AttemptError::Status(s) => write!(f, "http {s}"),
            AttemptError::Transport(e) => write!(f, "{e}"),
        }
    }
}

impl AggregatorPool {
    /// `timeout` bounds each attempt, body download included.
    pub fn new(mirrors: Vec<String>, timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            mirrors,
            timeout,
        }
    }

    pub fn mirrors(&self) -> &[String] {
        &self.mirrors
    }

    /// Download one blob by its content-addressed fetch key.
    pub async fn fetch(&self, fetch_key: &str) -> Result<Vec<u8>, FetchFailure> {
        if fetch_key.is_empty() {
            warn!("refusing to fetch an empty blob key");
            return Err(FetchFailure {
                fetch_key: String::new(),
                attempts: 0,
            });
        }

        let mut attempts = 0;
        for mirror in &self.mirrors {
            attempts += 1;
            let url = format!("{}/v1/blobs/{}", mirror.trim_end_matches('/'), fetch_key);

            // Dropping the future on timeout aborts the request.
            match tokio::time::timeout(self.timeout, self.get(&url)).await {
                Ok(Ok(body)) => {
                    debug!(%mirror, fetch_key, bytes = body.len(), attempts, "blob fetched");
                    return Ok(body);
                }
                Ok(Err(e)) => {
                    warn!(%mirror, fetch_key, error = %e, "aggregator fetch failed");
                }
                Err(_) => {
                    warn!(
                        %mirror,
                        fetch_key,
                        timeout_ms = self.timeout.as_millis() as u64,
                        "aggregator fetch timed out"
                    );
                }
            }
        }

        warn!(fetch_key, attempts, "all aggregators failed");
        Err(FetchFailure {
            fetch_key: fetch_key.to_string(),
            attempts,
        })
    }

    /// Fetch many blobs concurrently. Results come back in input order.
    pub async fn fetch_all(&self, fetch_keys: &[String]) -> Vec<Result<Vec<u8>, FetchFailure>> {
        join_all(fetch_keys.iter().map(|key| self.fetch(key))).await
    }

    async fn get(&self, url: &str) -> Result<Vec<u8>, AttemptError> {
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(AttemptError::Transport)?;
        if !resp.status().is_success() {
            return Err(AttemptError::Status(resp.status()));
        }
        let body = resp.bytes().await.map_err(AttemptError::Transport)?;
        Ok(body.to_vec())
    }
}
