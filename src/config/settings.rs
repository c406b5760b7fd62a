//! Startup settings.
//!
//! Read once from a [`ConfigProvider`]. Every invalid or missing key is
//! reported together.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;

use super::provider::{ConfigProvider, ConfigProviderExt};
use super::{ConfigError, ConfigResult, ValidationErrors};
use crate::client::{BackendConfig, ExponentialBackoff, RetryConfig};
use crate::proxy::DEFAULT_CHUNK_DELAY;

/// Environment prefix used by the binary.
pub const ENV_PREFIX: &str = "ORCH_";

pub mod keys {
    pub const BACKEND_URL: &str = "backend.url";
    pub const BACKEND_API_KEY: &str = "backend.api.key";
    pub const SERVER_ADDR: &str = "server.addr";
    pub const DEV_MODE: &str = "dev.mode";
    pub const LOG_JSON: &str = "log.json";
    pub const CORS_ALLOWED_ORIGINS: &str = "cors.allowed.origins";
    pub const RETRY_MAX_RETRIES: &str = "retry.max.retries";
    pub const RETRY_INITIAL_DELAY_MS: &str = "retry.initial.delay.ms";
    pub const RETRY_MAX_DELAY_MS: &str = "retry.max.delay.ms";
    pub const RETRY_MULTIPLIER: &str = "retry.multiplier";
    pub const RETRY_JITTER: &str = "retry.jitter";
    pub const RETRY_ATTEMPT_TIMEOUT_MS: &str = "retry.attempt.timeout.ms";
    pub const RETRY_REQUEST_BUDGET_MS: &str = "retry.request.budget.ms";
    pub const STREAM_CHUNK_DELAY_MS: &str = "stream.chunk.delay.ms";
    pub const QUOTA_TABLE_PATH: &str = "quota.table.path";
    pub const NOTIFY_WEBHOOK_URL: &str = "notify.webhook.url";
    pub const BILLING_URL: &str = "billing.url";
    pub const BILLING_API_KEY: &str = "billing.api.key";
}

const DEFAULT_SERVER_ADDR: &str = "0.0.0.0:8080";
const MAX_RETRIES_LIMIT: u32 = 10;

#[derive(Debug, Clone)]
pub struct Settings {
    pub backend: BackendConfig,
    pub retry: RetryConfig,
    pub server_addr: SocketAddr,
    /// Include internal causes in error bodies.
    pub dev_mode: bool,
    pub log_json: bool,
    /// Empty means any origin.
    pub cors_allowed_origins: Vec<String>,
    pub chunk_delay: Duration,
    pub quota_table_path: Option<PathBuf>,
    pub notify_webhook_url: Option<String>,
    /// Base URL of the billing service. Usage is kept in a local store fed
    /// through the API when unset.
    pub billing_url: Option<String>,
    pub billing_api_key: Option<SecretString>,
}

impl Settings {
    pub async fn load<P: ConfigProvider + ?Sized>(provider: &P) -> ConfigResult<Self> {
        let mut errors = Vec::new();

        let backend_url = match provider.string(keys::BACKEND_URL).await {
            Ok(Some(url)) => collect(&mut errors, validate_http_url(keys::BACKEND_URL, &url)),
            Ok(None) => {
                errors.push(ConfigError::NotFound {
                    key: keys::BACKEND_URL.to_string(),
                });
                None
            }
            Err(e) => {
                errors.push(e);
                None
            }
        };
        let api_key = collect(&mut errors, provider.string(keys::BACKEND_API_KEY).await).flatten();

        let server_addr = collect(&mut errors, provider.parse::<SocketAddr>(keys::SERVER_ADDR).await)
            .flatten();
        let dev_mode = collect(&mut errors, provider.flag(keys::DEV_MODE).await).unwrap_or(false);
        let log_json = collect(&mut errors, provider.flag(keys::LOG_JSON).await).unwrap_or(false);
        let cors_allowed_origins = collect(
            &mut errors,
            provider.string(keys::CORS_ALLOWED_ORIGINS).await,
        )
        .flatten()
        .map(|origins| {
            origins
                .split(',')
                .map(str::trim)
                .filter(|o| !o.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

        let retry = collect(&mut errors, load_retry(provider).await);
        let chunk_delay = collect(&mut errors, millis(provider, keys::STREAM_CHUNK_DELAY_MS).await)
            .flatten()
            .unwrap_or(DEFAULT_CHUNK_DELAY);
        let quota_table_path = collect(&mut errors, provider.string(keys::QUOTA_TABLE_PATH).await)
            .flatten()
            .map(PathBuf::from);
        let notify_webhook_url =
            match collect(&mut errors, provider.string(keys::NOTIFY_WEBHOOK_URL).await).flatten() {
                Some(url) => collect(
                    &mut errors,
                    validate_http_url(keys::NOTIFY_WEBHOOK_URL, &url),
                ),
                None => None,
            };

        let billing_url =
            match collect(&mut errors, provider.string(keys::BILLING_URL).await).flatten() {
                Some(url) => collect(&mut errors, validate_http_url(keys::BILLING_URL, &url)),
                None => None,
            };
        let billing_api_key =
            collect(&mut errors, provider.string(keys::BILLING_API_KEY).await).flatten();

        let (Some(backend_url), Some(retry)) = (backend_url, retry) else {
            return Err(into_error(errors));
        };
        if !errors.is_empty() {
            return Err(into_error(errors));
        }

        let server_addr = match server_addr {
            Some(addr) => addr,
            None => DEFAULT_SERVER_ADDR
                .parse()
                .map_err(|e: std::net::AddrParseError| ConfigError::InvalidValue {
                    key: keys::SERVER_ADDR.to_string(),
                    message: e.to_string(),
                })?,
        };

        tracing::info!(
            provider = provider.name(),
            backend_url = %backend_url,
            %server_addr,
            dev_mode,
            max_retries = retry.max_retries,
            "Settings loaded"
        );

        Ok(Self {
            backend: BackendConfig::new(backend_url).api_key_secret(api_key.map(SecretString::from)),
            retry,
            server_addr,
            dev_mode,
            log_json,
            cors_allowed_origins,
            chunk_delay,
            quota_table_path,
            notify_webhook_url,
            billing_url,
            billing_api_key: billing_api_key.map(SecretString::from),
        })
    }
}

async fn load_retry<P: ConfigProvider + ?Sized>(provider: &P) -> ConfigResult<RetryConfig> {
    let defaults = RetryConfig::default();
    let mut errors = Vec::new();

    let max_retries = collect(&mut errors, provider.parse::<u32>(keys::RETRY_MAX_RETRIES).await)
        .flatten()
        .unwrap_or(defaults.max_retries);
    if max_retries > MAX_RETRIES_LIMIT {
        errors.push(ConfigError::InvalidValue {
            key: keys::RETRY_MAX_RETRIES.to_string(),
            message: format!("must be at most {MAX_RETRIES_LIMIT}"),
        });
    }

    let initial = collect(&mut errors, millis(provider, keys::RETRY_INITIAL_DELAY_MS).await)
        .flatten()
        .unwrap_or(defaults.backoff.initial());
    let max = collect(&mut errors, millis(provider, keys::RETRY_MAX_DELAY_MS).await)
        .flatten()
        .unwrap_or(defaults.backoff.max());
    if max < initial {
        errors.push(ConfigError::InvalidValue {
            key: keys::RETRY_MAX_DELAY_MS.to_string(),
            message: "must not be below the initial delay".to_string(),
        });
    }

    let multiplier = collect(&mut errors, provider.parse::<f64>(keys::RETRY_MULTIPLIER).await)
        .flatten()
        .unwrap_or(defaults.backoff.factor());
    if !multiplier.is_finite() || multiplier < 1.0 {
        errors.push(ConfigError::InvalidValue {
            key: keys::RETRY_MULTIPLIER.to_string(),
            message: "must be a finite number >= 1".to_string(),
        });
    }

    let jitter = collect(&mut errors, provider.parse::<f64>(keys::RETRY_JITTER).await)
        .flatten()
        .unwrap_or(defaults.backoff.jitter());
    if !(0.0..=1.0).contains(&jitter) {
        errors.push(ConfigError::InvalidValue {
            key: keys::RETRY_JITTER.to_string(),
            message: "must be between 0 and 1".to_string(),
        });
    }

    let attempt_timeout = collect(&mut errors, millis(provider, keys::RETRY_ATTEMPT_TIMEOUT_MS).await)
        .flatten()
        .unwrap_or(defaults.attempt_timeout);
    let request_budget = collect(&mut errors, millis(provider, keys::RETRY_REQUEST_BUDGET_MS).await)
        .flatten()
        .unwrap_or(defaults.request_budget);
    for (key, value) in [
        (keys::RETRY_ATTEMPT_TIMEOUT_MS, attempt_timeout),
        (keys::RETRY_REQUEST_BUDGET_MS, request_budget),
    ] {
        if value.is_zero() {
            errors.push(ConfigError::InvalidValue {
                key: key.to_string(),
                message: "must be greater than zero".to_string(),
            });
        }
    }

    if !errors.is_empty() {
        return Err(into_error(errors));
    }

    Ok(RetryConfig {
        max_retries,
        backoff: ExponentialBackoff::new(initial, max, multiplier).with_jitter(jitter),
        attempt_timeout,
        request_budget,
        ..defaults
    })
}

async fn millis<P: ConfigProvider + ?Sized>(
    provider: &P,
    key: &str,
) -> ConfigResult<Option<Duration>> {
    Ok(provider.parse::<u64>(key).await?.map(Duration::from_millis))
}

fn validate_http_url(key: &str, url: &str) -> ConfigResult<String> {
    let parsed = reqwest::Url::parse(url).map_err(|e| ConfigError::InvalidValue {
        key: key.to_string(),
        message: e.to_string(),
    })?;
    match parsed.scheme() {
        "http" | "https" => Ok(url.to_string()),
        other => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("unsupported scheme '{other}'"),
        }),
    }
}

fn collect<T>(errors: &mut Vec<ConfigError>, result: ConfigResult<T>) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(ConfigError::ValidationErrors(ValidationErrors(nested))) => {
            errors.extend(nested);
            None
        }
        Err(e) => {
            errors.push(e);
            None
        }
    }
}

fn into_error(mut errors: Vec<ConfigError>) -> ConfigError {
    if errors.len() == 1 {
        errors.remove(0)
    } else {
        ConfigError::ValidationErrors(ValidationErrors(errors))
    }
}
