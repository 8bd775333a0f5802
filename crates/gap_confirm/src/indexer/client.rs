//! Karma GAP indexer client: snapshot reads, listener notification, retries.

use crate::indexer::target::PollTarget;
use serde_json::Value;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use thiserror::Error;
use time::OffsetDateTime;
use tracing::{debug, warn};
use url::Url;

const DEFAULT_INDEXER_URL: &str = "https://gapapi.karmahq.xyz";
const RATE_LIMIT_MS: u64 = 200;
const MAX_RETRIES: u32 = 3;
const RETRY_BACKOFF_MS: u64 = 500;

#[derive(Clone, Debug)]
pub struct IndexerConfig {
    pub base_url: String,
    pub rate_limit_ms: u64,
    pub max_retries: u32,
    pub retry_backoff_ms: u64,
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_INDEXER_URL.to_string(),
            rate_limit_ms: RATE_LIMIT_MS,
            max_retries: MAX_RETRIES,
            retry_backoff_ms: RETRY_BACKOFF_MS,
        }
    }
}

#[derive(Error, Debug)]
pub enum IndexerError {
    #[error("request: {0}")]
    Request(#[from] reqwest::Error),
    #[error("invalid base url {0}: {1}")]
    BaseUrl(String, url::ParseError),
    #[error("api error: status {0} body {1}")]
    Api(u16, String),
    #[error("parse snapshot: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Read side of the indexer: fetch a fresh snapshot of a poll target.
///
/// The confirmation flow only depends on this trait; tests substitute
/// in-memory sources.
pub trait SnapshotSource: Send + Sync {
    fn snapshot(
        &self,
        target: &PollTarget,
    ) -> impl Future<Output = Result<Value, IndexerError>> + Send;
}

/// Best-effort listener notification, keyed by tx hash or attestation UID.
///
/// Callers ignore the error: the indexer follows the chain on its own and
/// will observe the transaction regardless.
pub trait ListenerNotify: Send + Sync {
    fn notify_listener(
        &self,
        key: &str,
        chain_id: u64,
    ) -> impl Future<Output = Result<(), IndexerError>> + Send;
}

/// HTTP client for the indexer with rate limiting and per-request retries.
pub struct IndexerClient {
    config: IndexerConfig,
    client: reqwest::Client,
    last_request: std::sync::Mutex<Option<OffsetDateTime>>,
    request_count: AtomicU64,
}

impl IndexerClient {
    pub fn new(config: IndexerConfig) -> Result<Self, IndexerError> {
        Url::parse(&config.base_url)
            .map_err(|e| IndexerError::BaseUrl(config.base_url.clone(), e))?;
        let client = reqwest::Client::builder()
            .use_rustls_tls()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            config,
            client,
            last_request: std::sync::Mutex::new(None),
            request_count: AtomicU64::new(0),
        })
    }

    async fn rate_limit(&self) {
        let sleep_ms = {
            let last = self.last_request.lock().unwrap_or_else(|e| e.into_inner());
            let prev = *last;
            drop(last);
            if let Some(prev) = prev {
                let elapsed = (OffsetDateTime::now_utc() - prev).whole_milliseconds();
                let need: i128 = i128::from(self.config.rate_limit_ms);
                if elapsed < need {
                    (need - elapsed).max(0) as u64
                } else {
                    0
                }
            } else {
                0
            }
        };
        if sleep_ms > 0 {
            tokio::time::sleep(Duration::from_millis(sleep_ms)).await;
        }
        *self
            .last_request
            .lock()
            .unwrap_or_else(|e| e.into_inner()) = Some(OffsetDateTime::now_utc());
    }

    fn url_for(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }

    async fn get_with_retries(&self, path: &str) -> Result<String, IndexerError> {
        self.rate_limit().await;
        let url = self.url_for(path);
        let mut last_err = None;
        for attempt in 0..=self.config.max_retries {
            match self.client.get(&url).send().await {
                Ok(r) => {
                    let status = r.status();
                    let body = r.text().await.unwrap_or_default();
                    if !status.is_success() {
                        last_err = Some(IndexerError::Api(status.as_u16(), body));
                        if attempt < self.config.max_retries {
                            let ms = self.config.retry_backoff_ms * (1 << attempt);
                            tokio::time::sleep(Duration::from_millis(ms)).await;
                        }
                        continue;
                    }
                    self.request_count.fetch_add(1, Ordering::Relaxed);
                    return Ok(body);
                }
                Err(e) => {
                    last_err = Some(IndexerError::Request(e));
                    if attempt < self.config.max_retries {
                        let ms = self.config.retry_backoff_ms * (1 << attempt);
                        warn!(attempt, ms, path, "retry after request error");
                        tokio::time::sleep(Duration::from_millis(ms)).await;
                    }
                }
            }
        }
        Err(last_err.unwrap_or(IndexerError::Api(0, "unknown".to_string())))
    }

    /// GET a fresh snapshot of `target` and parse it as JSON.
    pub async fn fetch_snapshot(&self, target: &PollTarget) -> Result<Value, IndexerError> {
        let body = self.get_with_retries(&target.path()).await?;
        let value: Value = serde_json::from_str(&body)?;
        debug!(target = target.kind(), "snapshot fetched");
        Ok(value)
    }

    /// POST `/attestations/listener/:key/:chainId`. Single shot, no retries.
    pub async fn post_listener(&self, key: &str, chain_id: u64) -> Result<(), IndexerError> {
        self.rate_limit().await;
        let url = self.url_for(&format!(
            "/attestations/listener/{}/{}",
            urlencoding::encode(key),
            chain_id
        ));
        let r = self.client.post(&url).send().await?;
        let status = r.status();
        if !status.is_success() {
            let body = r.text().await.unwrap_or_default();
            return Err(IndexerError::Api(status.as_u16(), body));
        }
        self.request_count.fetch_add(1, Ordering::Relaxed);
        debug!(key, chain_id, "listener notified");
        Ok(())
    }

    pub fn request_count(&self) -> u64 {
        self.request_count.load(Ordering::Relaxed)
    }
}

impl SnapshotSource for IndexerClient {
    async fn snapshot(&self, target: &PollTarget) -> Result<Value, IndexerError> {
        self.fetch_snapshot(target).await
    }
}

impl ListenerNotify for IndexerClient {
    async fn notify_listener(&self, key: &str, chain_id: u64) -> Result<(), IndexerError> {
        self.post_listener(key, chain_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_defaults() {
        let c = IndexerConfig::default();
        assert_eq!(c.base_url, DEFAULT_INDEXER_URL);
        assert_eq!(c.max_retries, 3);
    }

    #[test]
    fn new_rejects_bad_base_url() {
        let config = IndexerConfig {
            base_url: "not a url".to_string(),
            ..Default::default()
        };
        assert!(IndexerClient::new(config).is_err());
    }

    #[test]
    fn url_for_strips_trailing_slash() {
        let config = IndexerConfig {
            base_url: "https://example.com/".to_string(),
            ..Default::default()
        };
        let client = IndexerClient::new(config).unwrap();
        assert_eq!(client.url_for("/projects/x"), "https://example.com/projects/x");
    }
}
