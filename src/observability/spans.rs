use std::time::Instant;

use tracing::{Level, Span, field, span};
use uuid::Uuid;

use crate::quota::OrchestrationMode;

/// Span around one forwarded chat request.
pub struct ForwardSpan {
    span: Span,
    request_id: String,
    start: Instant,
}

impl ForwardSpan {
    pub fn new(user_id: Option<&str>, tier: &str, mode: OrchestrationMode) -> Self {
        let request_id = Uuid::new_v4().to_string();
        let span = span!(
            Level::INFO,
            "proxy.forward",
            request_id = %request_id,
            user_id = user_id.unwrap_or("-"),
            tier = tier,
            mode = %mode,
            status = field::Empty,
            tokens_used = field::Empty,
            latency_ms = field::Empty,
            error_code = field::Empty,
        );
        Self {
            span,
            request_id,
            start: Instant::now(),
        }
    }

    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    pub fn span(&self) -> &Span {
        &self.span
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }

    pub fn record_status(&self, status: u16) {
        self.span.record("status", status);
    }

    pub fn record_tokens(&self, tokens_used: u64) {
        self.span.record("tokens_used", tokens_used);
    }

    pub fn record_error(&self, code: &str) {
        self.span.record("error_code", code);
    }

    pub fn finish(self) {
        let latency_ms = self.elapsed_ms();
        self.span.record("latency_ms", latency_ms);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forward_span() {
        let span = ForwardSpan::new(Some("user-1"), "pro", OrchestrationMode::Elite);
        assert_eq!(span.request_id().len(), 36);
        span.record_status(200);
        span.record_tokens(512);
        span.record_error("TIMEOUT");
        span.finish();
    }

    #[test]
    fn test_request_ids_unique() {
        let a = ForwardSpan::new(None, "free", OrchestrationMode::Free);
        let b = ForwardSpan::new(None, "free", OrchestrationMode::Free);
        assert_ne!(a.request_id(), b.request_id());
    }
}
