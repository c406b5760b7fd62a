//! HTTP client for the billing service's usage endpoint.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{StatusCode, Url};
use secrecy::{ExposeSecret, SecretString};

use super::usage::{UsageError, UsageSnapshot, UsageSource};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Reads usage snapshots from `GET {base}/usage/{user_id}`.
#[derive(Debug, Clone)]
pub struct HttpUsageSource {
    http: reqwest::Client,
    base_url: Url,
    api_key: Option<SecretString>,
}

impl HttpUsageSource {
    pub fn new(base_url: &str, api_key: Option<SecretString>) -> Result<Self, UsageError> {
        let http = reqwest::Client::builder().timeout(DEFAULT_TIMEOUT).build()?;
        Self::with_http(base_url, api_key, http)
    }

    pub fn with_http(
        base_url: &str,
        api_key: Option<SecretString>,
        http: reqwest::Client,
    ) -> Result<Self, UsageError> {
        let base_url = Url::parse(base_url)
            .map_err(|e| UsageError::Unavailable(format!("invalid billing URL: {e}")))?;
        if base_url.cannot_be_a_base() {
            return Err(UsageError::Unavailable(format!(
                "billing URL cannot be a base: {base_url}"
            )));
        }
        Ok(Self {
            http,
            base_url,
            api_key,
        })
    }

    fn usage_url(&self, user_id: &str) -> Url {
        let mut url = self.base_url.clone();
        // Checked at construction.
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().push("usage").push(user_id);
        }
        url
    }
}

#[async_trait]
impl UsageSource for HttpUsageSource {
    fn name(&self) -> &str {
        "billing-http"
    }

    async fn snapshot(&self, user_id: &str) -> Result<UsageSnapshot, UsageError> {
        let mut request = self.http.get(self.usage_url(user_id));
        if let Some(key) = &self.api_key {
            request = request.header("X-API-Key", key.expose_secret());
        }

        let response = request.send().await?;
        match response.status() {
            status if status.is_success() => Ok(response.json::<UsageSnapshot>().await?),
            StatusCode::NOT_FOUND => Err(UsageError::NotFound {
                user_id: user_id.to_string(),
            }),
            status => Err(UsageError::Unavailable(format!(
                "billing service returned {}",
                status.as_u16()
            ))),
        }
    }
}
