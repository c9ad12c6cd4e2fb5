// src/transport.rs
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, warn};
use reqwest::header::{HeaderValue, ACCEPT, USER_AGENT};
use reqwest::RequestBuilder;

use crate::flag::FlagSet;
use crate::FlagError;

/// Total attempts per logical fetch: the first try plus two retries.
pub const MAX_ATTEMPTS: u32 = 3;

/// Hook applied to every outgoing request before it is sent, once per
/// attempt. Typical use is injecting an `Authorization` header whose
/// token has to be looked up asynchronously.
///
/// A decoration failure fails the attempt the same way a network error
/// would; it is never swallowed.
#[async_trait]
pub trait RequestDecorator: Send + Sync {
    async fn decorate(
        &self,
        request: RequestBuilder,
    ) -> Result<RequestBuilder, Box<dyn std::error::Error + Send + Sync>>;
}

/// Fetches the remote flag set over HTTP with a bounded retry budget.
///
/// The transport only reports success or failure; substituting fallback
/// data on failure is the resolver's job, not ours.
pub struct Transport {
    url: String,
    http_client: reqwest::Client,
    decorator: Option<Arc<dyn RequestDecorator>>,
    retry_delay: Duration,
}

impl Transport {
    pub fn new(
        url: String,
        decorator: Option<Arc<dyn RequestDecorator>>,
        retry_delay: Duration,
    ) -> Self {
        Self {
            url,
            http_client: reqwest::Client::builder()
                .timeout(Duration::from_secs(10))
                .build()
                .unwrap(),
            decorator,
            retry_delay,
        }
    }

    /// One logical fetch: up to [`MAX_ATTEMPTS`] tries with a linear
    /// backoff between them, returning the last error once the budget
    /// is exhausted.
    pub async fn fetch(&self) -> Result<FlagSet, FlagError> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.fetch_once().await {
                Ok(set) => {
                    debug!("fetched {} flags on attempt {}", set.len(), attempt);
                    return Ok(set);
                }
                Err(e) => {
                    warn!("flag fetch attempt {}/{} failed: {}", attempt, MAX_ATTEMPTS, e);
                    if attempt >= MAX_ATTEMPTS {
                        return Err(e);
                    }
                    tokio::time::sleep(self.retry_delay * attempt).await;
                }
            }
        }
    }

    async fn fetch_once(&self) -> Result<FlagSet, FlagError> {
        let mut request = self
            .http_client
            .get(&self.url)
            .header(USER_AGENT, HeaderValue::from_static("flag-resolver"))
            .header(ACCEPT, HeaderValue::from_static("application/json"));

        if let Some(decorator) = &self.decorator {
            request = decorator
                .decorate(request)
                .await
                .map_err(|e| FlagError::Decoration(e.to_string()))?;
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FlagError::Api(status));
        }

        let body = response.bytes().await?;
        serde_json::from_slice::<FlagSet>(&body).map_err(|e| FlagError::Decode(e.to_string()))
    }
}
