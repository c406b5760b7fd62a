//! Resilient request forwarding to the orchestration backend.
//!
//! [`RequestProxy::forward`] shapes the client request under a
//! [`QuotaDecision`], sends it with bounded retries, and re-emits the single
//! JSON reply as a chunked text stream with metadata in headers.

pub mod error;
pub mod headers;
pub mod payload;
pub mod request;
pub mod response;
pub mod stream;

pub use error::{ErrorBody, ErrorCategory, ProxyError};
pub use headers::{EXPOSED_HEADERS, QualityMetadata, ResponseMetadata};
pub use payload::{AUTOMATIC_MODEL, OutboundPayload, expand_models, is_temporal_query, map_format_style};
pub use request::{ChatMessage, ChatRequest, OrchestratorSettings};
pub use response::{APOLOGY_MESSAGE, BackendReply};
pub use stream::{DEFAULT_CHUNK_DELAY, chunk_stream};

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures::stream::BoxStream;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::client::BackendClient;
use crate::notify::{Notification, NotificationDispatcher};
use crate::observability::ForwardSpan;
use crate::quota::QuotaDecision;
use crate::store::{CriteriaWeights, KeyedStore};

/// Upstream error bodies are truncated to this many bytes in diagnostics.
const MAX_ERROR_BODY: usize = 512;

/// A successful forward: metadata for headers plus the chunked body.
pub struct ProxyResponse {
    pub request_id: String,
    pub metadata: ResponseMetadata,
    pub body: BoxStream<'static, Result<Bytes, Infallible>>,
}

impl std::fmt::Debug for ProxyResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProxyResponse")
            .field("request_id", &self.request_id)
            .field("metadata", &self.metadata)
            .finish_non_exhaustive()
    }
}

#[derive(Clone)]
pub struct RequestProxy {
    client: BackendClient,
    criteria: Arc<dyn KeyedStore<CriteriaWeights>>,
    notifier: NotificationDispatcher,
    chunk_delay: Duration,
}

impl RequestProxy {
    pub fn new(client: BackendClient, criteria: Arc<dyn KeyedStore<CriteriaWeights>>) -> Self {
        Self {
            client,
            criteria,
            notifier: NotificationDispatcher::new(),
            chunk_delay: DEFAULT_CHUNK_DELAY,
        }
    }

    pub fn notifier(mut self, notifier: NotificationDispatcher) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn chunk_delay(mut self, delay: Duration) -> Self {
        self.chunk_delay = delay;
        self
    }

    pub fn client(&self) -> &BackendClient {
        &self.client
    }

    pub async fn forward(
        &self,
        request: &ChatRequest,
        decision: &QuotaDecision,
    ) -> Result<ProxyResponse, ProxyError> {
        self.forward_with_cancel(request, decision, &CancellationToken::new())
            .await
    }

    /// Like [`forward`](Self::forward); cancelling `cancel` aborts the
    /// in-flight attempt and any further retries.
    pub async fn forward_with_cancel(
        &self,
        request: &ChatRequest,
        decision: &QuotaDecision,
        cancel: &CancellationToken,
    ) -> Result<ProxyResponse, ProxyError> {
        let span = ForwardSpan::new(
            request.user_id.as_deref(),
            &decision.tier,
            decision.orchestration_mode,
        );
        let result = self
            .forward_inner(request, decision, cancel, &span)
            .instrument(span.span().clone())
            .await;

        if let Err(e) = &result {
            span.record_error(e.code());
        }
        span.finish();
        result
    }

    async fn forward_inner(
        &self,
        request: &ChatRequest,
        decision: &QuotaDecision,
        cancel: &CancellationToken,
        span: &ForwardSpan,
    ) -> Result<ProxyResponse, ProxyError> {
        let criteria = self.criteria_for(request.user_id.as_deref()).await;
        let payload = OutboundPayload::build(request, decision, criteria)?;

        tracing::debug!(
            models = ?payload.models,
            format_style = %payload.format_style,
            live_research = payload.orchestration.enable_live_research,
            history = payload.history.len(),
            "Forwarding chat request"
        );

        let response = match self.client.send_chat(&payload, cancel).await {
            Ok(response) => response,
            Err(e) => {
                let error = ProxyError::from(e);
                if !matches!(error, ProxyError::Cancelled) {
                    self.report_failure(span, request, &error);
                }
                return Err(error);
            }
        };
        span.record_status(response.status);

        if !response.is_success() {
            let error = ProxyError::Upstream {
                status: response.status,
                body: truncate_body(&response.body),
            };
            tracing::warn!(status = response.status, "Backend returned error status");
            if self.client.policy().config().is_retryable_status(response.status) {
                self.report_failure(span, request, &error);
            }
            return Err(error);
        }

        let reply = BackendReply::parse(&response.body)?;
        if reply.is_fallback() {
            tracing::warn!("Backend returned an empty message, sending apology");
        }

        let metadata = ResponseMetadata::from_reply(&reply, span.elapsed_ms());
        span.record_tokens(metadata.tokens_used);

        Ok(ProxyResponse {
            request_id: span.request_id().to_string(),
            metadata,
            body: Box::pin(chunk_stream(reply.content(), self.chunk_delay)),
        })
    }

    async fn criteria_for(&self, user_id: Option<&str>) -> CriteriaWeights {
        let Some(user_id) = user_id else {
            return CriteriaWeights::default();
        };
        match self.criteria.get(user_id).await {
            Ok(weights) => weights.unwrap_or_default(),
            Err(e) => {
                tracing::warn!(
                    user_id,
                    store = self.criteria.name(),
                    error = %e,
                    "Criteria lookup failed, using defaults"
                );
                CriteriaWeights::default()
            }
        }
    }

    fn report_failure(&self, span: &ForwardSpan, request: &ChatRequest, error: &ProxyError) {
        tracing::error!(code = error.code(), error = %error, "Backend call failed");
        self.notifier.dispatch(Notification::backend_failure(
            span.request_id(),
            request.user_id.as_deref(),
            error,
        ));
    }
}

fn truncate_body(body: &[u8]) -> String {
    let text = String::from_utf8_lossy(body);
    if text.len() <= MAX_ERROR_BODY {
        return text.into_owned();
    }
    let mut end = MAX_ERROR_BODY;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    text[..end].to_string()
}
