//! # orchestration-proxy
//!
//! Request-forwarding layer between a web client and an external
//! orchestration backend, plus the tier-based quota engine that decides which
//! orchestration mode each request runs under.
//!
//! ## Quota decisions
//!
//! ```rust
//! use orchestration_proxy::quota::{OrchestrationMode, QuotaEngine, TierTable, UsageSnapshot};
//!
//! let engine = QuotaEngine::new(TierTable::canonical())?;
//! let decision = engine.decide(&UsageSnapshot::new("lite").elite_used(100));
//! assert_eq!(decision.orchestration_mode, OrchestrationMode::Budget);
//! assert!(decision.upgrade_suggested());
//! # Ok::<(), orchestration_proxy::Error>(())
//! ```
//!
//! ## Forwarding
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use futures::StreamExt;
//! use orchestration_proxy::client::{BackendClient, BackendConfig, RetryConfig};
//! use orchestration_proxy::proxy::{ChatMessage, ChatRequest, RequestProxy};
//! use orchestration_proxy::quota::{QuotaEngine, TierTable, UsageSnapshot};
//! use orchestration_proxy::store::MemoryStore;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = BackendClient::new(
//!         BackendConfig::new("http://localhost:8000"),
//!         RetryConfig::default(),
//!     )?;
//!     let proxy = RequestProxy::new(client, Arc::new(MemoryStore::new()));
//!
//!     let engine = QuotaEngine::new(TierTable::canonical())?;
//!     let decision = engine.decide(&UsageSnapshot::new("pro"));
//!     let request = ChatRequest::new(vec![ChatMessage::user("What changed this week?")]);
//!
//!     let mut response = proxy.forward(&request, &decision).await?;
//!     while let Some(Ok(chunk)) = response.body.next().await {
//!         print!("{}", String::from_utf8_lossy(&chunk));
//!     }
//!     Ok(())
//! }
//! ```

#![deny(rustdoc::broken_intra_doc_links)]

pub mod client;
pub mod config;
pub mod notify;
pub mod observability;
pub mod proxy;
pub mod quota;
pub mod server;
pub mod store;

pub use client::{BackendClient, BackendConfig, ExponentialBackoff, RetryConfig, RetryPolicy};
pub use config::{ConfigError, Settings};
pub use proxy::{ChatRequest, ProxyError, RequestProxy};
pub use quota::{OrchestrationMode, QuotaDecision, QuotaEngine, QuotaStatus, TierTable};

/// Setup-level error. Per-request failures use [`ProxyError`].
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// Invalid or missing configuration.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// HTTP client could not be built.
    #[error("Network setup failed: {0}")]
    Network(#[from] reqwest::Error),

    /// Socket or file operation failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Usage source setup failed: {0}")]
    Usage(#[from] quota::UsageError),

    #[error("Notifier setup failed: {0}")]
    Notify(#[from] notify::NotifyError),

    #[error(transparent)]
    Tracing(#[from] observability::TracingInitError),
}

pub type Result<T> = std::result::Result<T, Error>;
