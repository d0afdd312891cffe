//! HTTP access to sheet exports and calendar pages.
//!
//! Sources are fetched one at a time. Throttling, server errors, timeouts and
//! refused connections are retried with a doubling delay; anything else fails
//! the fetch immediately.

use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use thiserror::Error;
use tracing::{debug, info_span, warn, Instrument};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub first_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            first_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(8),
        }
    }
}

impl RetryPolicy {
    /// Wait before the zero-based `retry`, doubling each time up to `max_delay`.
    pub fn delay(&self, retry: u32) -> Duration {
        self.first_delay
            .saturating_mul(2u32.saturating_pow(retry))
            .min(self.max_delay)
    }
}

#[derive(Debug, Clone)]
pub struct FetchConfig {
    pub timeout: Duration,
    pub user_agent: Option<String>,
    pub retry: RetryPolicy,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(20),
            user_agent: None,
            retry: RetryPolicy::default(),
        }
    }
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("building http client: {0}")]
    Client(#[source] reqwest::Error),
    #[error("requesting {url}: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("{url} answered {status}")]
    Status { url: String, status: StatusCode },
    #[error("{url} returned a body that is not UTF-8")]
    NotUtf8 { url: String },
}

pub fn is_transient_status(status: StatusCode) -> bool {
    status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS
}

fn is_transient_error(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect()
}

/// A successfully downloaded source body.
#[derive(Debug, Clone)]
pub struct FetchedText {
    pub final_url: String,
    pub status: StatusCode,
    pub fetched_at: DateTime<Utc>,
    pub text: String,
}

enum Attempt {
    Transient(FetchError),
    Fatal(FetchError),
}

impl Attempt {
    fn new(transient: bool, err: FetchError) -> Self {
        if transient {
            Attempt::Transient(err)
        } else {
            Attempt::Fatal(err)
        }
    }
}

#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
    retry: RetryPolicy,
}

impl HttpFetcher {
    pub fn new(config: FetchConfig) -> Result<Self, FetchError> {
        let mut builder = reqwest::Client::builder()
            .gzip(true)
            .brotli(true)
            .timeout(config.timeout);
        if let Some(agent) = config.user_agent {
            builder = builder.user_agent(agent);
        }
        let client = builder.build().map_err(FetchError::Client)?;
        Ok(Self {
            client,
            retry: config.retry,
        })
    }

    /// GET `url` and decode the body as UTF-8.
    pub async fn fetch_text(
        &self,
        run_id: Uuid,
        label: &str,
        url: &str,
    ) -> Result<FetchedText, FetchError> {
        let span = info_span!("fetch", %run_id, source = label, url);
        async {
            let mut retry = 0;
            loop {
                match self.attempt(url).await {
                    Ok(fetched) => return Ok(fetched),
                    Err(Attempt::Transient(err)) if retry < self.retry.max_retries => {
                        let delay = self.retry.delay(retry);
                        warn!(error = %err, retry, ?delay, "transient fetch failure, retrying");
                        tokio::time::sleep(delay).await;
                        retry += 1;
                    }
                    Err(Attempt::Transient(err) | Attempt::Fatal(err)) => return Err(err),
                }
            }
        }
        .instrument(span)
        .await
    }

    async fn attempt(&self, url: &str) -> Result<FetchedText, Attempt> {
        let response = self.client.get(url).send().await.map_err(|source| {
            let transient = is_transient_error(&source);
            Attempt::new(
                transient,
                FetchError::Request {
                    url: url.to_string(),
                    source,
                },
            )
        })?;

        let status = response.status();
        let final_url = response.url().to_string();
        if !status.is_success() {
            return Err(Attempt::new(
                is_transient_status(status),
                FetchError::Status {
                    url: final_url,
                    status,
                },
            ));
        }

        // A body cut off mid-transfer is worth another try.
        let body = response.bytes().await.map_err(|source| {
            Attempt::Transient(FetchError::Request {
                url: final_url.clone(),
                source,
            })
        })?;
        let text = String::from_utf8(body.to_vec()).map_err(|_| {
            Attempt::Fatal(FetchError::NotUtf8 {
                url: final_url.clone(),
            })
        })?;
        debug!(%status, bytes = text.len(), "source downloaded");

        Ok(FetchedText {
            final_url,
            status,
            fetched_at: Utc::now(),
            text,
        })
    }
}
