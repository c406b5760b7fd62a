//! Structured logging and request spans.

mod spans;

pub use spans::ForwardSpan;

use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Subscriber configuration. `RUST_LOG` overrides `default_directive`.
#[derive(Debug, Clone)]
pub struct TracingConfig {
    pub default_directive: String,
    pub json: bool,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            default_directive: "orchestration_proxy=info,tower_http=info".to_string(),
            json: false,
        }
    }
}

impl TracingConfig {
    pub fn json(mut self, json: bool) -> Self {
        self.json = json;
        self
    }

    pub fn default_directive(mut self, directive: impl Into<String>) -> Self {
        self.default_directive = directive.into();
        self
    }

    fn env_filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&self.default_directive))
    }
}

#[derive(Debug, thiserror::Error)]
#[error("Failed to init tracing subscriber: {0}")]
pub struct TracingInitError(#[from] tracing_subscriber::util::TryInitError);

/// Install the global subscriber.
pub fn init_tracing(config: &TracingConfig) -> Result<(), TracingInitError> {
    let registry = tracing_subscriber::registry().with(config.env_filter());

    if config.json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_current_span(true))
            .try_init()?;
    } else {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false),
            )
            .try_init()?;
    }
    Ok(())
}
