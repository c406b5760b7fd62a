//! Orchestration backend endpoint configuration.

use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};

const CHAT_PATH: &str = "/v1/chat";
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Where and how to reach the orchestration backend.
#[derive(Clone, Debug)]
pub struct BackendConfig {
    /// Base URL without the `/v1/chat` suffix
    pub base_url: String,
    /// Sent as `X-API-Key` when present
    pub api_key: Option<SecretString>,
    /// Extra headers attached to every call
    pub custom_headers: Vec<(String, String)>,
    pub connect_timeout: Duration,
}

impl BackendConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: None,
            custom_headers: Vec::new(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }

    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        let key = key.into();
        self.api_key = (!key.trim().is_empty()).then(|| SecretString::from(key));
        self
    }

    pub fn api_key_secret(mut self, key: Option<SecretString>) -> Self {
        self.api_key = key;
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.custom_headers.push((name.into(), value.into()));
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn chat_url(&self) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), CHAT_PATH)
    }

    /// All headers for an outbound call, `X-API-Key` first.
    pub fn all_headers(&self) -> Vec<(String, String)> {
        let mut headers = Vec::with_capacity(self.custom_headers.len() + 1);
        if let Some(key) = &self.api_key {
            headers.push(("X-API-Key".to_string(), key.expose_secret().to_string()));
        }
        headers.extend(self.custom_headers.iter().cloned());
        headers
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chat_url_trims_trailing_slash() {
        assert_eq!(
            BackendConfig::new("https://backend.internal/").chat_url(),
            "https://backend.internal/v1/chat"
        );
        assert_eq!(
            BackendConfig::new("http://localhost:8000").chat_url(),
            "http://localhost:8000/v1/chat"
        );
    }

    #[test]
    fn test_headers_include_api_key() {
        let config = BackendConfig::new("http://localhost")
            .api_key("secret")
            .header("X-Trace", "1");
        assert_eq!(
            config.all_headers(),
            vec![
                ("X-API-Key".to_string(), "secret".to_string()),
                ("X-Trace".to_string(), "1".to_string()),
            ]
        );
    }

    #[test]
    fn test_blank_api_key_omitted() {
        let config = BackendConfig::new("http://localhost").api_key("  ");
        assert!(config.api_key.is_none());
        assert!(config.all_headers().is_empty());
    }

    #[test]
    fn test_debug_redacts_key() {
        let config = BackendConfig::new("http://localhost").api_key("hunter2");
        assert!(!format!("{config:?}").contains("hunter2"));
    }
}
