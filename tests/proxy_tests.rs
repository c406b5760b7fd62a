//! RequestProxy against a mock backend.
//!
//! Run: cargo nextest run --test proxy_tests

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use orchestration_proxy::client::{BackendClient, BackendConfig, ExponentialBackoff, RetryConfig};
use orchestration_proxy::notify::{Notification, NotificationDispatcher, Notifier, NotifyError};
use orchestration_proxy::proxy::{APOLOGY_MESSAGE, ChatMessage, ChatRequest, ProxyError, ProxyResponse, RequestProxy};
use orchestration_proxy::quota::{QuotaDecision, QuotaEngine, TierTable, UsageSnapshot};
use orchestration_proxy::store::{CriteriaWeights, KeyedStore, MemoryStore};
use serde_json::{Value, json};
use tokio::sync::mpsc;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn fast_retry(max_retries: u32) -> RetryConfig {
    RetryConfig::default()
        .max_retries(max_retries)
        .backoff(
            ExponentialBackoff::new(Duration::from_millis(1), Duration::from_millis(5), 2.0)
                .with_jitter(0.0),
        )
        .attempt_timeout(Duration::from_secs(5))
        .request_budget(Duration::from_secs(30))
}

fn proxy_for(base_url: &str, retry: RetryConfig) -> RequestProxy {
    let client = BackendClient::new(BackendConfig::new(base_url).api_key("test-key"), retry).unwrap();
    RequestProxy::new(client, Arc::new(MemoryStore::new())).chunk_delay(Duration::ZERO)
}

fn decision() -> QuotaDecision {
    QuotaEngine::new(TierTable::canonical())
        .unwrap()
        .decide(&UsageSnapshot::new("pro").elite_used(10))
}

fn prompt(text: &str) -> ChatRequest {
    ChatRequest::new(vec![ChatMessage::user(text)]).user_id("user-42")
}

fn ok_reply(message: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "message": message,
        "models_used": ["gpt-5", "claude-sonnet"],
        "tokens_used": 128,
        "latency_ms": 900,
        "confidence": 0.91
    }))
}

async fn collect_body(response: ProxyResponse) -> String {
    let chunks: Vec<_> = response.body.map(|c| c.unwrap()).collect().await;
    String::from_utf8(chunks.concat()).unwrap()
}

async fn request_count(server: &MockServer) -> usize {
    server.received_requests().await.unwrap().len()
}

// =============================================================================
// Retry behaviour
// =============================================================================

#[tokio::test]
async fn test_transient_503_then_success() {
    let server = MockServer::start().await;
    let k = 3;
    Mock::given(method("POST"))
        .and(path("/v1/chat"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(k)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/chat"))
        .respond_with(ok_reply("Hello there, friend"))
        .mount(&server)
        .await;

    let proxy = proxy_for(&server.uri(), fast_retry(5));
    let response = proxy.forward(&prompt("hi"), &decision()).await.unwrap();

    assert_eq!(request_count(&server).await, k as usize + 1);
    assert_eq!(response.metadata.tokens_used, 128);
    assert_eq!(collect_body(response).await, "Hello there, friend");
}

#[tokio::test]
async fn test_always_429_exhausts_retries() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(429))
        .mount(&server)
        .await;

    let max_retries = 3;
    let proxy = proxy_for(&server.uri(), fast_retry(max_retries));
    let err = proxy.forward(&prompt("hi"), &decision()).await.unwrap_err();

    assert_eq!(request_count(&server).await, max_retries as usize + 1);
    assert!(matches!(err, ProxyError::Upstream { status: 429, .. }));
    assert!(err.is_retryable());
    assert_eq!(err.status_code(), 429);
}

#[tokio::test]
async fn test_non_retryable_status_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(401).set_body_string("bad key"))
        .mount(&server)
        .await;

    let proxy = proxy_for(&server.uri(), fast_retry(5));
    let err = proxy.forward(&prompt("hi"), &decision()).await.unwrap_err();

    assert_eq!(request_count(&server).await, 1);
    assert!(!err.is_retryable());
    assert!(err.suggestion().contains("sign in again"));
}

#[tokio::test]
async fn test_connection_refused_is_unreachable() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let proxy = proxy_for(&format!("http://{addr}"), fast_retry(1));
    let err = proxy.forward(&prompt("hi"), &decision()).await.unwrap_err();

    assert!(
        matches!(err, ProxyError::BackendUnreachable { .. }),
        "{err:?}"
    );
    assert_eq!(err.status_code(), 503);
    assert!(err.is_retryable());
}

#[tokio::test]
async fn test_request_budget_times_out() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ok_reply("late").set_delay(Duration::from_secs(2)))
        .mount(&server)
        .await;

    let retry = fast_retry(5).request_budget(Duration::from_millis(200));
    let proxy = proxy_for(&server.uri(), retry);
    let err = proxy.forward(&prompt("hi"), &decision()).await.unwrap_err();

    assert!(matches!(err, ProxyError::Timeout(_)));
    assert_eq!(err.status_code(), 504);
}

// =============================================================================
// Payload and response shaping
// =============================================================================

#[tokio::test]
async fn test_outbound_payload_contract() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat"))
        .and(header("X-API-Key", "test-key"))
        .respond_with(ok_reply("ok"))
        .expect(1)
        .mount(&server)
        .await;

    let criteria = Arc::new(MemoryStore::<CriteriaWeights>::new());
    criteria
        .put(
            "user-42",
            CriteriaWeights {
                accuracy: 0.9,
                speed: 0.1,
                creativity: 0.4,
            },
        )
        .await
        .unwrap();
    let client = BackendClient::new(
        BackendConfig::new(server.uri()).api_key("test-key"),
        fast_retry(0),
    )
    .unwrap();
    let proxy = RequestProxy::new(client, criteria).chunk_delay(Duration::ZERO);

    let request = ChatRequest::new(vec![
        ChatMessage::user("earlier question"),
        ChatMessage::assistant("earlier answer"),
        ChatMessage::user("What is the latest on the 2026 budget?"),
    ])
    .models(["automatic"])
    .user_id("user-42")
    .chat_id("chat-1");
    proxy.forward(&request, &decision()).await.unwrap();

    let received = server.received_requests().await.unwrap();
    let body: Value = serde_json::from_slice(&received[0].body).unwrap();
    assert_eq!(body["prompt"], "What is the latest on the 2026 budget?");
    assert!(body["models"].is_null());
    assert_eq!(body["history"].as_array().unwrap().len(), 2);
    assert_eq!(body["format_style"], "automatic");
    assert_eq!(body["orchestration"]["enable_live_research"], true);
    assert_eq!(body["orchestration"]["mode"], "elite");
    assert_eq!(body["metadata"]["chat_id"], "chat-1");
    assert_eq!(body["metadata"]["tier"], "pro");
    assert_eq!(body["metadata"]["criteria"]["accuracy"], 0.9);
    assert_eq!(body["tuning"].as_object().unwrap().len(), 4);
}

#[tokio::test]
async fn test_empty_message_yields_apology() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"message": "  "})))
        .mount(&server)
        .await;

    let proxy = proxy_for(&server.uri(), fast_retry(0));
    let response = proxy.forward(&prompt("hi"), &decision()).await.unwrap();
    let body = collect_body(response).await;

    assert!(!body.is_empty());
    assert_eq!(body, APOLOGY_MESSAGE);
}

#[tokio::test]
async fn test_metadata_headers() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ok_reply("some words here"))
        .mount(&server)
        .await;

    let proxy = proxy_for(&server.uri(), fast_retry(0));
    let response = proxy.forward(&prompt("hi"), &decision()).await.unwrap();
    let headers = response.metadata.header_map();

    assert_eq!(headers["x-models-used"], "gpt-5,claude-sonnet");
    assert_eq!(headers["x-tokens-used"], "128");
    assert_eq!(headers["x-latency-ms"], "900");
    assert!(headers["content-type"].to_str().unwrap().starts_with("text/plain"));
    assert!(!response.request_id.is_empty());
}

#[tokio::test]
async fn test_malformed_success_body() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
        .mount(&server)
        .await;

    let proxy = proxy_for(&server.uri(), fast_retry(3));
    let err = proxy.forward(&prompt("hi"), &decision()).await.unwrap_err();

    assert!(matches!(err, ProxyError::MalformedResponse(_)));
    assert_eq!(request_count(&server).await, 1);
}

#[tokio::test]
async fn test_empty_prompt_never_calls_backend() {
    let server = MockServer::start().await;
    let proxy = proxy_for(&server.uri(), fast_retry(3));

    let request = ChatRequest::new(vec![ChatMessage::assistant("hello"), ChatMessage::user("")]);
    let err = proxy.forward(&request, &decision()).await.unwrap_err();

    assert!(matches!(err, ProxyError::EmptyPrompt));
    assert_eq!(err.status_code(), 400);
    assert_eq!(request_count(&server).await, 0);
}

// =============================================================================
// Notifications
// =============================================================================

struct ChannelNotifier(mpsc::UnboundedSender<Notification>);

#[async_trait::async_trait]
impl Notifier for ChannelNotifier {
    fn name(&self) -> &str {
        "channel"
    }

    async fn notify(&self, notification: &Notification) -> Result<(), NotifyError> {
        let _ = self.0.send(notification.clone());
        Ok(())
    }
}

#[tokio::test]
async fn test_exhaustion_dispatches_notification() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let (tx, mut rx) = mpsc::unbounded_channel();
    let proxy = proxy_for(&server.uri(), fast_retry(1))
        .notifier(NotificationDispatcher::new().register(ChannelNotifier(tx)));

    let err = proxy.forward(&prompt("hi"), &decision()).await.unwrap_err();
    assert!(err.is_retryable());

    let notification = tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .unwrap()
        .unwrap();
    match notification {
        Notification::BackendFailure { user_id, .. } => {
            assert_eq!(user_id.as_deref(), Some("user-42"));
        }
    }
}
