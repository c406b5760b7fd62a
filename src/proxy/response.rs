//! Parsing the backend's single JSON reply.

use serde::{Deserialize, Serialize};

use super::error::ProxyError;

/// Sent instead of an empty or placeholder backend message.
pub const APOLOGY_MESSAGE: &str =
    "I'm sorry, I wasn't able to generate a response this time. Please try again.";

const PLACEHOLDERS: &[&str] = &["null", "undefined", "none"];

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendReply {
    pub message: Option<String>,
    #[serde(alias = "models")]
    pub models_used: Vec<String>,
    #[serde(alias = "total_tokens")]
    pub tokens_used: Option<u64>,
    pub latency_ms: Option<u64>,
    pub verification_score: Option<f64>,
    pub consensus_score: Option<f64>,
    pub confidence: Option<f64>,
}

impl BackendReply {
    pub fn parse(body: &[u8]) -> Result<Self, ProxyError> {
        serde_json::from_slice(body).map_err(|e| ProxyError::MalformedResponse(e.to_string()))
    }

    /// Message text, or [`APOLOGY_MESSAGE`] when the backend sent nothing usable.
    pub fn content(&self) -> &str {
        match self.message.as_deref() {
            Some(message) if !is_placeholder(message) => message,
            _ => APOLOGY_MESSAGE,
        }
    }

    pub fn is_fallback(&self) -> bool {
        self.message.as_deref().is_none_or(is_placeholder)
    }
}

fn is_placeholder(message: &str) -> bool {
    let trimmed = message.trim();
    trimmed.is_empty() || PLACEHOLDERS.iter().any(|p| trimmed.eq_ignore_ascii_case(p))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_reply() {
        let reply = BackendReply::parse(
            br#"{"message":"Hello","models_used":["gpt-5","claude"],"tokens_used":42,
                "latency_ms":900,"verification_score":0.9,"consensus_score":0.8,"confidence":0.95}"#,
        )
        .unwrap();
        assert_eq!(reply.content(), "Hello");
        assert_eq!(reply.models_used.len(), 2);
        assert_eq!(reply.tokens_used, Some(42));
        assert!(!reply.is_fallback());
    }

    #[test]
    fn test_aliases() {
        let reply = BackendReply::parse(br#"{"message":"x","models":["a"],"total_tokens":7}"#)
            .unwrap();
        assert_eq!(reply.models_used, vec!["a".to_string()]);
        assert_eq!(reply.tokens_used, Some(7));
    }

    #[test]
    fn test_placeholder_messages_use_apology() {
        for body in [
            r#"{}"#,
            r#"{"message":null}"#,
            r#"{"message":""}"#,
            r#"{"message":"   \n"}"#,
            r#"{"message":"undefined"}"#,
            r#"{"message":"None"}"#,
        ] {
            let reply = BackendReply::parse(body.as_bytes()).unwrap();
            assert_eq!(reply.content(), APOLOGY_MESSAGE, "{body}");
            assert!(reply.is_fallback());
        }
    }

    #[test]
    fn test_malformed_body() {
        let err = BackendReply::parse(b"<html>bad gateway</html>").unwrap_err();
        assert!(matches!(err, ProxyError::MalformedResponse(_)));
        assert!(!err.is_retryable());
    }
}
