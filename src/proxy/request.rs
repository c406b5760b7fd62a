//! Inbound chat request from the web client.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    #[serde(default)]
    pub messages: Vec<ChatMessage>,
    #[serde(default)]
    pub models: Vec<String>,
    #[serde(default)]
    pub orchestrator_settings: OrchestratorSettings,
    #[serde(default)]
    pub chat_id: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub project_id: Option<String>,
}

impl ChatRequest {
    pub fn new(messages: Vec<ChatMessage>) -> Self {
        Self {
            messages,
            ..Default::default()
        }
    }

    pub fn models<I, S>(mut self, models: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.models = models.into_iter().map(Into::into).collect();
        self
    }

    pub fn settings(mut self, settings: OrchestratorSettings) -> Self {
        self.orchestrator_settings = settings;
        self
    }

    pub fn user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn chat_id(mut self, chat_id: impl Into<String>) -> Self {
        self.chat_id = Some(chat_id.into());
        self
    }

    /// Index of the most recent user message with non-blank content.
    pub fn prompt_index(&self) -> Option<usize> {
        self.messages
            .iter()
            .rposition(|m| m.is_user() && !m.content.trim().is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    #[serde(default)]
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: content.into(),
        }
    }

    pub fn is_user(&self) -> bool {
        self.role.eq_ignore_ascii_case("user")
    }
}

/// Client-side orchestration knobs. Every field is optional on the wire.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OrchestratorSettings {
    pub reasoning_mode: Option<String>,
    pub reasoning_method: Option<String>,
    pub domain_pack: Option<String>,
    pub agent_mode: Option<String>,
    pub protocol: Option<String>,
    /// UI answer-format name, mapped to the backend vocabulary.
    pub answer_format: Option<String>,
    pub accuracy_level: Option<u8>,
    pub tuning: TuningOptions,
    pub engines: EngineToggles,
    pub features: FeatureToggles,
    pub temperature: Option<f64>,
    pub max_tokens: Option<u32>,
    pub top_p: Option<f64>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TuningOptions {
    pub prompt_optimization: bool,
    pub output_validation: bool,
    pub answer_structure: bool,
    pub learn_from_chat: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EngineToggles {
    pub hrm: bool,
    pub prompt_diffusion: bool,
    pub deep_consensus: bool,
    pub adaptive_ensemble: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FeatureToggles {
    pub enable_verification: bool,
    pub enable_tool_broker: bool,
    pub enable_live_research: bool,
}
