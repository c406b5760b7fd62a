//! Outbound payload sent to `POST {base}/v1/chat`.

use std::sync::OnceLock;

use regex::Regex;
use serde::Serialize;

use super::error::ProxyError;
use super::request::{ChatMessage, ChatRequest, TuningOptions};
use crate::quota::{OrchestrationMode, QuotaDecision};
use crate::store::CriteriaWeights;

/// Model-list entry meaning "let the backend choose".
pub const AUTOMATIC_MODEL: &str = "automatic";

const DEFAULT_REASONING_MODE: &str = "standard";
const DEFAULT_DOMAIN_PACK: &str = "default";
const DEFAULT_AGENT_MODE: &str = "single";
const DEFAULT_ACCURACY_LEVEL: u8 = 3;
const MAX_ACCURACY_LEVEL: u8 = 5;

const FORMAT_STYLES: &[(&str, &str)] = &[
    ("default", "automatic"),
    ("automatic", "automatic"),
    ("concise", "concise"),
    ("detailed", "detailed"),
    ("bullets", "bullet"),
    ("bullet_points", "bullet"),
    ("step_by_step", "steps"),
    ("steps", "steps"),
    ("academic", "academic"),
    ("code", "code"),
];

fn temporal_patterns() -> &'static [Regex] {
    static RE: OnceLock<Vec<Regex>> = OnceLock::new();
    RE.get_or_init(|| {
        [
            r"(?i)\b(today|tonight|yesterday|this\s+(week|month|year))\b",
            r"(?i)\b(current|currently|latest|recent|recently|right\s+now|up[\s-]to[\s-]date|breaking)\b",
            r"\b20(2[3-9]|3[0-9])\b",
        ]
        .into_iter()
        .map(|p| Regex::new(p).expect("valid temporal regex"))
        .collect()
    })
}

/// Heuristic pre-filter for prompts that likely need fresh information.
pub fn is_temporal_query(prompt: &str) -> bool {
    temporal_patterns().iter().any(|re| re.is_match(prompt))
}

/// Backend format vocabulary for a UI answer-format name.
pub fn map_format_style(ui_name: Option<&str>) -> &'static str {
    let Some(name) = ui_name else {
        return AUTOMATIC_MODEL;
    };
    let name = name.trim().to_ascii_lowercase().replace(['-', ' '], "_");
    FORMAT_STYLES
        .iter()
        .find(|(ui, _)| *ui == name)
        .map(|(_, backend)| *backend)
        .unwrap_or(AUTOMATIC_MODEL)
}

/// Explicit model list with the sentinel removed, or `None` when the backend
/// should select models itself.
pub fn expand_models(models: &[String]) -> Option<Vec<String>> {
    let explicit: Vec<String> = models
        .iter()
        .map(|m| m.trim())
        .filter(|m| !m.is_empty() && !m.eq_ignore_ascii_case(AUTOMATIC_MODEL))
        .map(str::to_string)
        .collect();
    (!explicit.is_empty()).then_some(explicit)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TuningFlags {
    pub prompt_optimization: bool,
    pub output_validation: bool,
    pub answer_structure: bool,
    pub learn_from_chat: bool,
}

impl From<TuningOptions> for TuningFlags {
    fn from(options: TuningOptions) -> Self {
        Self {
            prompt_optimization: options.prompt_optimization,
            output_validation: options.output_validation,
            answer_structure: options.answer_structure,
            learn_from_chat: options.learn_from_chat,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrchestrationOptions {
    pub mode: OrchestrationMode,
    pub accuracy_level: u8,
    pub enable_hrm: bool,
    pub enable_prompt_diffusion: bool,
    pub enable_deep_consensus: bool,
    pub enable_adaptive_ensemble: bool,
    pub temperature: Option<f64>,
    pub max_tokens: Option<u32>,
    pub top_p: Option<f64>,
    pub enable_verification: bool,
    pub enable_tool_broker: bool,
    pub enable_live_research: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PayloadMetadata {
    pub chat_id: Option<String>,
    pub user_id: Option<String>,
    pub project_id: Option<String>,
    pub tier: String,
    pub orchestration_mode: OrchestrationMode,
    pub criteria: CriteriaWeights,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutboundPayload {
    pub prompt: String,
    pub models: Option<Vec<String>>,
    pub protocol: Option<String>,
    pub reasoning_mode: String,
    pub reasoning_method: Option<String>,
    pub domain_pack: String,
    pub agent_mode: String,
    pub format_style: String,
    pub tuning: TuningFlags,
    pub orchestration: OrchestrationOptions,
    pub metadata: PayloadMetadata,
    pub history: Vec<ChatMessage>,
}

impl OutboundPayload {
    /// Shape `request` for the backend under `decision`.
    ///
    /// History holds the non-blank messages preceding the prompt.
    pub fn build(
        request: &ChatRequest,
        decision: &QuotaDecision,
        criteria: CriteriaWeights,
    ) -> Result<Self, ProxyError> {
        let index = request.prompt_index().ok_or(ProxyError::EmptyPrompt)?;
        let prompt = request.messages[index].content.trim().to_string();
        let settings = &request.orchestrator_settings;

        let history = request.messages[..index]
            .iter()
            .filter(|m| !m.content.trim().is_empty())
            .cloned()
            .collect();

        let live_research =
            settings.features.enable_live_research || is_temporal_query(&prompt);

        Ok(Self {
            models: expand_models(&request.models),
            protocol: non_blank(settings.protocol.as_deref()),
            reasoning_mode: non_blank(settings.reasoning_mode.as_deref())
                .unwrap_or_else(|| DEFAULT_REASONING_MODE.to_string()),
            reasoning_method: non_blank(settings.reasoning_method.as_deref()),
            domain_pack: non_blank(settings.domain_pack.as_deref())
                .unwrap_or_else(|| DEFAULT_DOMAIN_PACK.to_string()),
            agent_mode: non_blank(settings.agent_mode.as_deref())
                .unwrap_or_else(|| DEFAULT_AGENT_MODE.to_string()),
            format_style: map_format_style(settings.answer_format.as_deref()).to_string(),
            tuning: settings.tuning.into(),
            orchestration: OrchestrationOptions {
                mode: decision.orchestration_mode,
                accuracy_level: settings
                    .accuracy_level
                    .unwrap_or(DEFAULT_ACCURACY_LEVEL)
                    .clamp(1, MAX_ACCURACY_LEVEL),
                enable_hrm: settings.engines.hrm,
                enable_prompt_diffusion: settings.engines.prompt_diffusion,
                enable_deep_consensus: settings.engines.deep_consensus,
                enable_adaptive_ensemble: settings.engines.adaptive_ensemble,
                temperature: settings.temperature,
                max_tokens: settings.max_tokens,
                top_p: settings.top_p,
                enable_verification: settings.features.enable_verification,
                enable_tool_broker: settings.features.enable_tool_broker,
                enable_live_research: live_research,
            },
            metadata: PayloadMetadata {
                chat_id: request.chat_id.clone(),
                user_id: request.user_id.clone(),
                project_id: request.project_id.clone(),
                tier: decision.tier.clone(),
                orchestration_mode: decision.orchestration_mode,
                criteria: criteria.normalized(),
            },
            history,
            prompt,
        })
    }
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}
