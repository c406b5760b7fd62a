//! Resilience layer for the backend client.
//!
//! Bounded retries with jittered exponential backoff, a per-attempt timeout,
//! and an outer wall-clock budget enforced together with a cancellation token.

mod backoff;

pub use backoff::ExponentialBackoff;

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Upstream statuses considered transient.
pub const RETRYABLE_STATUSES: [u16; 4] = [429, 502, 503, 504];

#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub backoff: ExponentialBackoff,
    pub retryable_statuses: Vec<u16>,
    pub attempt_timeout: Duration,
    pub request_budget: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 5,
            backoff: ExponentialBackoff::default(),
            retryable_statuses: RETRYABLE_STATUSES.to_vec(),
            attempt_timeout: Duration::from_secs(60),
            request_budget: Duration::from_secs(180),
        }
    }
}

impl RetryConfig {
    pub fn no_retry() -> Self {
        Self {
            max_retries: 0,
            ..Default::default()
        }
    }

    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn backoff(mut self, backoff: ExponentialBackoff) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn attempt_timeout(mut self, timeout: Duration) -> Self {
        self.attempt_timeout = timeout;
        self
    }

    pub fn request_budget(mut self, budget: Duration) -> Self {
        self.request_budget = budget;
        self
    }

    pub fn is_retryable_status(&self, status: u16) -> bool {
        self.retryable_statuses.contains(&status)
    }

    /// Total attempts, including the first.
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }
}

/// Why an attempt did not produce a usable response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptErrorClass {
    Timeout,
    Connect,
    Transport,
    Status(u16),
}

impl std::fmt::Display for AttemptErrorClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Timeout => write!(f, "timeout"),
            Self::Connect => write!(f, "connect"),
            Self::Transport => write!(f, "transport"),
            Self::Status(status) => write!(f, "status {status}"),
        }
    }
}

/// Per-attempt context handed to the operation.
#[derive(Debug, Clone)]
pub struct RetryAttempt {
    pub index: u32,
    pub elapsed: Duration,
    pub last_error: Option<AttemptErrorClass>,
}

impl RetryAttempt {
    pub fn is_retry(&self) -> bool {
        self.index > 0
    }
}

/// A completed attempt that carries an HTTP status.
pub trait AttemptOutcome {
    fn status(&self) -> u16;
}

/// A transport-level failure that can be classified for retry bookkeeping.
pub trait TransportFailure: std::fmt::Display {
    fn class(&self) -> AttemptErrorClass;
}

impl TransportFailure for reqwest::Error {
    fn class(&self) -> AttemptErrorClass {
        if self.is_timeout() {
            AttemptErrorClass::Timeout
        } else if self.is_connect() {
            AttemptErrorClass::Connect
        } else {
            AttemptErrorClass::Transport
        }
    }
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum RetryError {
    #[error("Max retries exceeded after {attempts} attempts ({class}): {cause}")]
    Exhausted {
        attempts: u32,
        class: AttemptErrorClass,
        cause: String,
    },

    #[error("Request budget of {budget:?} exceeded")]
    BudgetExceeded { budget: Duration },

    #[error("Request cancelled")]
    Cancelled,
}

impl RetryError {
    pub fn is_connect_failure(&self) -> bool {
        matches!(
            self,
            Self::Exhausted {
                class: AttemptErrorClass::Connect,
                ..
            }
        )
    }
}

#[derive(Debug, Clone, Default)]
pub struct RetryPolicy {
    config: RetryConfig,
}

impl RetryPolicy {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Run `operation` until it yields a non-retryable outcome or attempts run out.
    ///
    /// A final retryable status is returned as-is. Transport failures on the
    /// last attempt become [`RetryError::Exhausted`]. The whole loop is bounded
    /// by `request_budget`, and `cancel` aborts the in-flight attempt.
    pub async fn execute<F, Fut, T, E>(
        &self,
        cancel: &CancellationToken,
        operation: F,
    ) -> Result<T, RetryError>
    where
        F: FnMut(RetryAttempt) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        T: AttemptOutcome,
        E: TransportFailure,
    {
        let deadline = Instant::now() + self.config.request_budget;

        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tracing::debug!("Retry loop cancelled");
                Err(RetryError::Cancelled)
            }
            result = tokio::time::timeout_at(deadline, self.run(operation)) => match result {
                Ok(outcome) => outcome,
                Err(_) => {
                    tracing::warn!(
                        budget_ms = self.config.request_budget.as_millis() as u64,
                        "Request budget exceeded"
                    );
                    Err(RetryError::BudgetExceeded {
                        budget: self.config.request_budget,
                    })
                }
            },
        }
    }

    async fn run<F, Fut, T, E>(&self, mut operation: F) -> Result<T, RetryError>
    where
        F: FnMut(RetryAttempt) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        T: AttemptOutcome,
        E: TransportFailure,
    {
        let started = Instant::now();
        let mut last_error = None;
        let mut index = 0;

        loop {
            let attempt = RetryAttempt {
                index,
                elapsed: started.elapsed(),
                last_error,
            };
            let is_last = index >= self.config.max_retries;

            let (class, cause) =
                match tokio::time::timeout(self.config.attempt_timeout, operation(attempt)).await {
                    Ok(Ok(outcome)) => {
                        let status = outcome.status();
                        if is_last || !self.config.is_retryable_status(status) {
                            return Ok(outcome);
                        }
                        (
                            AttemptErrorClass::Status(status),
                            format!("upstream returned {status}"),
                        )
                    }
                    Ok(Err(e)) => (e.class(), e.to_string()),
                    Err(_) => (
                        AttemptErrorClass::Timeout,
                        format!("attempt timed out after {:?}", self.config.attempt_timeout),
                    ),
                };

            if is_last {
                tracing::warn!(
                    attempts = index + 1,
                    class = %class,
                    cause = %cause,
                    "Retries exhausted"
                );
                return Err(RetryError::Exhausted {
                    attempts: index + 1,
                    class,
                    cause,
                });
            }

            let delay = self.config.backoff.delay_for(index);
            tracing::warn!(
                attempt = index + 1,
                max_attempts = self.config.max_attempts(),
                class = %class,
                delay_ms = delay.as_millis() as u64,
                "Retrying backend call"
            );
            tokio::time::sleep(delay).await;

            last_error = Some(class);
            index += 1;
        }
    }
}
