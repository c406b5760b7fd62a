//! Client-facing error taxonomy for forwarded chat requests.

use std::time::Duration;

use serde::Serialize;

use crate::client::{AttemptErrorClass, RetryError};

#[derive(Debug, Clone, thiserror::Error)]
pub enum ProxyError {
    /// No user message with content remained after filtering.
    #[error("No user message to send")]
    EmptyPrompt,

    /// The inbound body could not be understood.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Every attempt failed to connect.
    #[error("Backend unreachable after {attempts} attempts: {cause}")]
    BackendUnreachable { attempts: u32, cause: String },

    /// Transport failures persisted past the retry limit.
    #[error("Max retries exceeded after {attempts} attempts: {cause}")]
    MaxRetriesExceeded { attempts: u32, cause: String },

    /// The wall-clock budget ran out.
    #[error("Request timed out after {:.1}s", .0.as_secs_f64())]
    Timeout(Duration),

    #[error("Request cancelled")]
    Cancelled,

    /// The backend answered with a non-success status.
    #[error("Backend returned HTTP {status}")]
    Upstream { status: u16, body: String },

    /// The backend answered 2xx with a body that is not a chat reply.
    #[error("Malformed backend response: {0}")]
    MalformedResponse(String),
}

/// The three failure tiers a client distinguishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Rejected before any backend call; never retried
    ClientInput,
    /// Retried here already; the client may try again later
    Transient,
    /// Surfaced once; retrying will not help
    Terminal,
}

impl ProxyError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::EmptyPrompt | Self::InvalidRequest(_) => ErrorCategory::ClientInput,
            Self::BackendUnreachable { .. }
            | Self::MaxRetriesExceeded { .. }
            | Self::Timeout(_)
            | Self::Cancelled => ErrorCategory::Transient,
            Self::Upstream { status, .. } if *status == 429 || *status >= 500 => {
                ErrorCategory::Transient
            }
            Self::Upstream { .. } | Self::MalformedResponse(_) => ErrorCategory::Terminal,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.category() == ErrorCategory::Transient
    }

    /// HTTP status returned to the client.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::EmptyPrompt | Self::InvalidRequest(_) => 400,
            Self::BackendUnreachable { .. } | Self::MaxRetriesExceeded { .. } | Self::Cancelled => {
                503
            }
            Self::Timeout(_) => 504,
            Self::Upstream { status, .. } if (400..=599).contains(status) => *status,
            Self::Upstream { .. } | Self::MalformedResponse(_) => 502,
        }
    }

    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::EmptyPrompt => "EMPTY_PROMPT",
            Self::InvalidRequest(_) => "INVALID_REQUEST",
            Self::BackendUnreachable { .. } => "BACKEND_UNREACHABLE",
            Self::MaxRetriesExceeded { .. } => "MAX_RETRIES_EXCEEDED",
            Self::Timeout(_) => "TIMEOUT",
            Self::Cancelled => "CANCELLED",
            Self::Upstream { .. } => "UPSTREAM_ERROR",
            Self::MalformedResponse(_) => "MALFORMED_RESPONSE",
        }
    }

    /// Plain-language message that never names internal hosts or causes.
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::EmptyPrompt => "Please enter a message before sending.",
            Self::InvalidRequest(_) => "The request could not be understood.",
            Self::BackendUnreachable { .. } => "The AI service is currently unreachable.",
            Self::MaxRetriesExceeded { .. } => {
                "The AI service did not respond after several attempts."
            }
            Self::Timeout(_) => "The request took too long to complete.",
            Self::Cancelled => "The request was cancelled before it completed.",
            Self::Upstream { status, .. } => match status {
                400 => "The AI service could not process this request.",
                401 => "Your session is no longer valid.",
                403 => "Your current plan does not include this feature.",
                429 => "Too many requests right now.",
                500..=599 => "The AI service is having temporary trouble.",
                _ => "The AI service returned an unexpected error.",
            },
            Self::MalformedResponse(_) => "The AI service returned an unreadable response.",
        }
    }

    pub fn suggestion(&self) -> &'static str {
        match self {
            Self::EmptyPrompt => "Type a question and try again.",
            Self::InvalidRequest(_) => "Refresh the page and try again.",
            Self::BackendUnreachable { .. }
            | Self::MaxRetriesExceeded { .. }
            | Self::Cancelled => "This is usually temporary. Please retry in a moment.",
            Self::Timeout(_) => "Try a shorter question or retry in a moment.",
            Self::Upstream { status, .. } => match status {
                400 => "Try rephrasing your message.",
                401 => "Please sign in again.",
                403 => "Upgrade your plan to continue.",
                429 => "Please wait a moment and retry.",
                500..=599 => "This is temporary. Please retry shortly.",
                _ => "Please try again later.",
            },
            Self::MalformedResponse(_) => "Please try again later.",
        }
    }

    /// Internal cause, only rendered in development mode.
    pub fn details(&self) -> Option<String> {
        match self {
            Self::EmptyPrompt | Self::Cancelled => None,
            Self::Upstream { status, body } if body.is_empty() => {
                Some(format!("upstream status {status}"))
            }
            Self::Upstream { status, body } => Some(format!("upstream status {status}: {body}")),
            other => Some(other.to_string()),
        }
    }

    pub fn to_body(&self, dev_mode: bool) -> ErrorBody {
        ErrorBody {
            error: self.user_message().to_string(),
            code: self.code(),
            retryable: self.is_retryable(),
            suggestion: self.suggestion().to_string(),
            details: if dev_mode { self.details() } else { None },
        }
    }
}

impl From<RetryError> for ProxyError {
    fn from(error: RetryError) -> Self {
        match error {
            RetryError::Exhausted {
                attempts,
                class: AttemptErrorClass::Connect,
                cause,
            } => Self::BackendUnreachable { attempts, cause },
            RetryError::Exhausted {
                attempts, cause, ..
            } => Self::MaxRetriesExceeded { attempts, cause },
            RetryError::BudgetExceeded { budget } => Self::Timeout(budget),
            RetryError::Cancelled => Self::Cancelled,
        }
    }
}

/// JSON error body sent to the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorBody {
    pub error: String,
    pub code: &'static str,
    pub retryable: bool,
    pub suggestion: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}
