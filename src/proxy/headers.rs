//! Side-channel response metadata carried in headers.

use axum::http::{HeaderMap, HeaderName, HeaderValue, header};
use serde::Serialize;

use super::response::BackendReply;

pub const X_MODELS_USED: &str = "x-models-used";
pub const X_TOKENS_USED: &str = "x-tokens-used";
pub const X_LATENCY_MS: &str = "x-latency-ms";
pub const X_QUALITY_METADATA: &str = "x-quality-metadata";

/// Headers a browser client may read.
pub const EXPOSED_HEADERS: [&str; 4] = [X_MODELS_USED, X_TOKENS_USED, X_LATENCY_MS, X_QUALITY_METADATA];

pub const CONTENT_TYPE_TEXT: &str = "text/plain; charset=utf-8";

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct QualityMetadata {
    pub verification_score: Option<f64>,
    pub consensus_score: Option<f64>,
    pub confidence: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ResponseMetadata {
    pub models_used: Vec<String>,
    pub tokens_used: u64,
    pub latency_ms: u64,
    pub quality: QualityMetadata,
}

impl ResponseMetadata {
    /// Metadata from `reply`, using `measured_latency_ms` when the backend
    /// did not report one.
    pub fn from_reply(reply: &BackendReply, measured_latency_ms: u64) -> Self {
        Self {
            models_used: reply.models_used.clone(),
            tokens_used: reply.tokens_used.unwrap_or(0),
            latency_ms: reply.latency_ms.unwrap_or(measured_latency_ms),
            quality: QualityMetadata {
                verification_score: reply.verification_score,
                consensus_score: reply.consensus_score,
                confidence: reply.confidence,
            },
        }
    }

    pub fn header_map(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(CONTENT_TYPE_TEXT));
        headers.insert(
            header::ACCESS_CONTROL_EXPOSE_HEADERS,
            header_value(&EXPOSED_HEADERS.join(", ")),
        );

        let quality = serde_json::to_string(&self.quality).unwrap_or_else(|_| "{}".to_string());
        for (name, value) in [
            (X_MODELS_USED, self.models_used.join(",")),
            (X_TOKENS_USED, self.tokens_used.to_string()),
            (X_LATENCY_MS, self.latency_ms.to_string()),
            (X_QUALITY_METADATA, quality),
        ] {
            headers.insert(HeaderName::from_static(name), header_value(&value));
        }
        headers
    }
}

/// Header-safe value; characters outside visible ASCII are dropped.
fn header_value(value: &str) -> HeaderValue {
    let cleaned: String = value
        .chars()
        .filter(|c| c.is_ascii_graphic() || *c == ' ')
        .collect();
    HeaderValue::from_str(&cleaned).unwrap_or_else(|_| HeaderValue::from_static(""))
}
