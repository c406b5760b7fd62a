use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use crate::proxy::{ErrorBody, ProxyError};
use crate::store::StoreError;

/// Error response rendered as the JSON [`ErrorBody`].
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    body: ErrorBody,
}

impl ApiError {
    pub fn proxy(error: &ProxyError, dev_mode: bool) -> Self {
        Self {
            status: StatusCode::from_u16(error.status_code())
                .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
            body: error.to_body(dev_mode),
        }
    }

    pub fn store(error: &StoreError, dev_mode: bool) -> Self {
        tracing::error!(error = %error, "Store operation failed");
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            body: ErrorBody {
                error: "Could not access stored preferences.".to_string(),
                code: "STORE_ERROR",
                retryable: true,
                suggestion: "Please retry in a moment.".to_string(),
                details: dev_mode.then(|| error.to_string()),
            },
        }
    }

    /// Usage writes are rejected while a billing service owns usage.
    pub fn usage_read_only() -> Self {
        Self {
            status: StatusCode::CONFLICT,
            body: ErrorBody {
                error: "Usage is managed by the billing service.".to_string(),
                code: "USAGE_READ_ONLY",
                retryable: false,
                suggestion: "Record usage through the billing service.".to_string(),
                details: None,
            },
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}
