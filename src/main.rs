use orchestration_proxy::config::{ConfigProviderExt, ENV_PREFIX, EnvConfigProvider, Settings, keys};
use orchestration_proxy::observability::{TracingConfig, init_tracing};
use orchestration_proxy::server::{self, AppState};

#[tokio::main]
async fn main() -> orchestration_proxy::Result<()> {
    let dotenv = dotenvy::dotenv();

    let provider = EnvConfigProvider::prefixed(ENV_PREFIX);
    // Settings are logged while loading, so the subscriber comes first.
    let log_json = provider.flag(keys::LOG_JSON).await.unwrap_or(false);
    init_tracing(&TracingConfig::default().json(log_json))?;

    if let Err(e) = dotenv
        && !e.not_found()
    {
        tracing::warn!(error = %e, "Failed to read .env file");
    }

    let settings = Settings::load(&provider).await?;
    let state = AppState::from_settings(&settings).await?;
    let shutdown = state.shutdown.clone();
    let app = server::router(state, &settings.cors_allowed_origins);

    let listener = tokio::net::TcpListener::bind(settings.server_addr).await?;
    tracing::info!(addr = %settings.server_addr, "Listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            server::shutdown_signal().await;
            shutdown.cancel();
        })
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}
