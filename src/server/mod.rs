//! HTTP surface.
//!
//! | route | handler |
//! |---|---|
//! | `POST /api/chat` | forward a chat request, chunked text response |
//! | `GET /api/usage/:user_id` | quota report |
//! | `PUT /api/usage/:user_id` | record a usage snapshot (local usage store only) |
//! | `GET /api/criteria/:user_id` | ranking weights |
//! | `PUT /api/criteria/:user_id` | replace ranking weights |
//! | `GET /health` | liveness |

mod error;

pub use error::ApiError;

use std::sync::Arc;

use axum::body::{Body, Bytes};
use axum::extract::{Path, State};
use axum::http::{HeaderName, HeaderValue, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::client::BackendClient;
use crate::config::Settings;
use crate::notify::{LogNotifier, NotificationDispatcher, WebhookNotifier};
use crate::proxy::{ChatRequest, EXPOSED_HEADERS, ProxyError, RequestProxy};
use crate::quota::{
    HttpUsageSource, QuotaDecision, QuotaEngine, QuotaReport, StoreUsageSource, TierTable,
    UsageSnapshot, UsageSource,
};
use crate::store::{CriteriaWeights, KeyedStore, MemoryStore};

pub const REQUEST_ID_HEADER: &str = "x-request-id";

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<QuotaEngine>,
    pub usage: Arc<dyn UsageSource>,
    /// Writable usage store. `None` when a billing service owns usage.
    pub usage_store: Option<Arc<dyn KeyedStore<UsageSnapshot>>>,
    pub proxy: RequestProxy,
    pub criteria: Arc<dyn KeyedStore<CriteriaWeights>>,
    pub dev_mode: bool,
    /// Cancelled on shutdown; aborts in-flight backend calls.
    pub shutdown: CancellationToken,
}

impl AppState {
    /// Wire every collaborator from `settings`. Usage comes from the billing
    /// service when one is configured, otherwise from an in-memory store fed
    /// by `PUT /api/usage/:user_id`. Criteria live in memory.
    pub async fn from_settings(settings: &Settings) -> crate::Result<Self> {
        let table = match &settings.quota_table_path {
            Some(path) => TierTable::load(path).await?,
            None => TierTable::canonical(),
        };
        let engine = Arc::new(QuotaEngine::new(table)?);

        let mut notifier = NotificationDispatcher::new().register(LogNotifier);
        if let Some(url) = &settings.notify_webhook_url {
            notifier = notifier.register(WebhookNotifier::new(url.clone())?);
        }

        let criteria: Arc<dyn KeyedStore<CriteriaWeights>> = Arc::new(MemoryStore::new());
        let client = BackendClient::new(settings.backend.clone(), settings.retry.clone())?;
        let proxy = RequestProxy::new(client, Arc::clone(&criteria))
            .notifier(notifier)
            .chunk_delay(settings.chunk_delay);

        let usage: Arc<dyn UsageSource>;
        let usage_store: Option<Arc<dyn KeyedStore<UsageSnapshot>>>;
        match &settings.billing_url {
            Some(url) => {
                tracing::info!(billing_url = %url, "Reading usage from billing service");
                usage = Arc::new(HttpUsageSource::new(url, settings.billing_api_key.clone())?);
                usage_store = None;
            }
            None => {
                tracing::warn!("No billing service configured, usage is read from the local store");
                let store: Arc<dyn KeyedStore<UsageSnapshot>> = Arc::new(MemoryStore::new());
                usage = Arc::new(StoreUsageSource::new(Arc::clone(&store)));
                usage_store = Some(store);
            }
        }

        Ok(Self {
            engine,
            usage,
            usage_store,
            proxy,
            criteria,
            dev_mode: settings.dev_mode,
            shutdown: CancellationToken::new(),
        })
    }

    async fn decision_for(&self, user_id: Option<&str>) -> QuotaDecision {
        match user_id {
            Some(user_id) => self.engine.resolve(self.usage.as_ref(), user_id).await,
            None => self
                .engine
                .decide(&UsageSnapshot::zeroed(self.engine.lowest_tier())),
        }
    }
}

pub fn router(state: AppState, allowed_origins: &[String]) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/chat", post(chat))
        .route("/api/usage/:user_id", get(usage).put(put_usage))
        .route("/api/criteria/:user_id", get(get_criteria).put(put_criteria))
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(allowed_origins))
        .with_state(state)
}

fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    let allow_origin = if origins.is_empty() {
        AllowOrigin::from(Any)
    } else {
        AllowOrigin::list(origins)
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([Method::GET, Method::POST, Method::PUT])
        .allow_headers(Any)
        .expose_headers(EXPOSED_HEADERS.map(HeaderName::from_static))
}

async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "tierTableVersion": state.engine.table().version,
    }))
}

/// The body is parsed by hand so malformed JSON gets the taxonomy's 400.
async fn chat(State(state): State<AppState>, body: Bytes) -> Result<Response, ApiError> {
    let request: ChatRequest = serde_json::from_slice(&body).map_err(|e| {
        ApiError::proxy(&ProxyError::InvalidRequest(e.to_string()), state.dev_mode)
    })?;

    let decision = state.decision_for(request.user_id.as_deref()).await;
    let cancel = state.shutdown.child_token();
    let response = state
        .proxy
        .forward_with_cancel(&request, &decision, &cancel)
        .await
        .map_err(|e| ApiError::proxy(&e, state.dev_mode))?;

    let mut headers = response.metadata.header_map();
    if let Ok(value) = HeaderValue::from_str(&response.request_id) {
        headers.insert(HeaderName::from_static(REQUEST_ID_HEADER), value);
    }
    Ok((StatusCode::OK, headers, Body::from_stream(response.body)).into_response())
}

async fn usage(State(state): State<AppState>, Path(user_id): Path<String>) -> Json<QuotaReport> {
    let decision = state.engine.resolve(state.usage.as_ref(), &user_id).await;
    Json(QuotaReport::from(&decision))
}

async fn put_usage(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Json(snapshot): Json<UsageSnapshot>,
) -> Result<Json<QuotaReport>, ApiError> {
    let Some(store) = &state.usage_store else {
        return Err(ApiError::usage_read_only());
    };
    store
        .put(&user_id, snapshot)
        .await
        .map_err(|e| ApiError::store(&e, state.dev_mode))?;
    tracing::debug!(user_id = %user_id, "Usage recorded");

    let decision = state.engine.resolve(state.usage.as_ref(), &user_id).await;
    Ok(Json(QuotaReport::from(&decision)))
}

async fn get_criteria(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<CriteriaWeights>, ApiError> {
    let weights = state
        .criteria
        .get(&user_id)
        .await
        .map_err(|e| ApiError::store(&e, state.dev_mode))?;
    Ok(Json(weights.unwrap_or_default()))
}

async fn put_criteria(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Json(weights): Json<CriteriaWeights>,
) -> Result<Json<CriteriaWeights>, ApiError> {
    let weights = weights.normalized();
    state
        .criteria
        .put(&user_id, weights)
        .await
        .map_err(|e| ApiError::store(&e, state.dev_mode))?;
    tracing::debug!(user_id = %user_id, "Criteria updated");
    Ok(Json(weights))
}

/// Resolves on Ctrl+C or SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received Ctrl+C signal"),
        _ = terminate => tracing::info!("Received SIGTERM signal"),
    }
}
