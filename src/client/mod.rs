//! HTTP client for the orchestration backend.

pub mod gateway;
pub mod resilience;

pub use gateway::BackendConfig;
pub use resilience::{
    AttemptErrorClass, AttemptOutcome, ExponentialBackoff, RETRYABLE_STATUSES, RetryAttempt,
    RetryConfig, RetryError, RetryPolicy, TransportFailure,
};

use bytes::Bytes;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::{Error, Result};

/// A fully-read backend response.
#[derive(Debug, Clone)]
pub struct BackendResponse {
    pub status: u16,
    pub body: Bytes,
}

impl BackendResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

impl AttemptOutcome for BackendResponse {
    fn status(&self) -> u16 {
        self.status
    }
}

#[derive(Clone, Debug)]
pub struct BackendClient {
    http: reqwest::Client,
    config: BackendConfig,
    policy: RetryPolicy,
}

impl BackendClient {
    pub fn new(config: BackendConfig, retry: RetryConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .build()
            .map_err(Error::Network)?;
        Ok(Self::with_http(config, retry, http))
    }

    pub fn with_http(config: BackendConfig, retry: RetryConfig, http: reqwest::Client) -> Self {
        Self {
            http,
            config,
            policy: RetryPolicy::new(retry),
        }
    }

    pub fn config(&self) -> &BackendConfig {
        &self.config
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// `POST {base}/v1/chat` under the retry policy.
    ///
    /// Each attempt reads the whole body inside its own timeout, so a stalled
    /// body counts as a timed-out attempt.
    pub async fn send_chat<B>(
        &self,
        body: &B,
        cancel: &CancellationToken,
    ) -> std::result::Result<BackendResponse, RetryError>
    where
        B: Serialize + ?Sized,
    {
        let url = self.config.chat_url();
        let headers = self.config.all_headers();

        self.policy
            .execute(cancel, |attempt| {
                let mut request = self.http.post(&url).json(body);
                for (name, value) in &headers {
                    request = request.header(name.as_str(), value.as_str());
                }
                async move {
                    if attempt.is_retry() {
                        tracing::debug!(
                            attempt = attempt.index,
                            elapsed_ms = attempt.elapsed.as_millis() as u64,
                            last_error = ?attempt.last_error,
                            "Re-sending backend request"
                        );
                    }
                    let response = request.send().await?;
                    let status = response.status().as_u16();
                    let body = response.bytes().await?;
                    Ok::<_, reqwest::Error>(BackendResponse { status, body })
                }
            })
            .await
    }
}
