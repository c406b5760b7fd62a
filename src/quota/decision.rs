//! Per-request quota decisions.

use serde::{Deserialize, Serialize};

use super::tier::OrchestrationMode;

/// Share of the elite allowance at which users are warned.
pub const WARNING_THRESHOLD: f64 = 0.80;

/// Share of the elite allowance at which a warning also nudges an upgrade.
pub const UPGRADE_NUDGE_THRESHOLD: f64 = 0.90;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum QuotaStatus {
    Normal,
    Warning,
    Throttled,
    TrialEnded,
}

impl QuotaStatus {
    /// Precedence: trial end, throttling, warning, normal.
    pub fn classify(elite_remaining: u64, is_lowest_tier: bool, percent_used: f64) -> Self {
        if elite_remaining == 0 && is_lowest_tier {
            Self::TrialEnded
        } else if elite_remaining == 0 {
            Self::Throttled
        } else if percent_used >= WARNING_THRESHOLD {
            Self::Warning
        } else {
            Self::Normal
        }
    }

    pub fn suggests_upgrade(&self, percent_used: f64) -> bool {
        match self {
            Self::Throttled | Self::TrialEnded => true,
            Self::Warning => percent_used >= UPGRADE_NUDGE_THRESHOLD,
            Self::Normal => false,
        }
    }

    pub fn is_limited(&self) -> bool {
        matches!(self, Self::Throttled | Self::TrialEnded)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Allowance {
    pub used: u64,
    pub limit: u64,
    pub remaining: u64,
}

impl Allowance {
    pub fn new(used: u64, limit: u64) -> Self {
        Self {
            used,
            limit,
            remaining: limit.saturating_sub(used),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpgradePrompt {
    pub suggested: bool,
    pub message: String,
}

impl UpgradePrompt {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn suggest(message: impl Into<String>) -> Self {
        Self {
            suggested: true,
            message: message.into(),
        }
    }
}

/// Derived quota state for one request. Recomputed on every query, never stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuotaDecision {
    pub tier: String,
    pub orchestration_mode: OrchestrationMode,
    pub after_quota_mode: OrchestrationMode,
    pub elite: Allowance,
    pub secondary: Allowance,
    pub tokens: Allowance,
    /// Ratio of the elite allowance consumed, in `[0, 1]`.
    pub percent_used: f64,
    pub status: QuotaStatus,
    pub status_message: String,
    pub days_until_reset: u32,
    pub upgrade: UpgradePrompt,
}

impl QuotaDecision {
    pub fn upgrade_suggested(&self) -> bool {
        self.upgrade.suggested
    }

    pub fn is_elite(&self) -> bool {
        self.orchestration_mode == OrchestrationMode::Elite
    }
}

pub(crate) fn status_message(
    status: QuotaStatus,
    elite: &Allowance,
    percent_used: f64,
    mode: OrchestrationMode,
    days_until_reset: u32,
) -> String {
    match status {
        QuotaStatus::Normal => format!(
            "You have {} elite queries remaining this month.",
            elite.remaining
        ),
        QuotaStatus::Warning => format!(
            "You've used {:.0}% of your elite queries. {} remaining, resets in {} days.",
            percent_used * 100.0,
            elite.remaining,
            days_until_reset
        ),
        QuotaStatus::Throttled => format!(
            "Elite quota used. Requests now run in {} mode until your quota resets in {} days.",
            mode, days_until_reset
        ),
        QuotaStatus::TrialEnded => {
            "Your free trial of elite orchestration has ended. Upgrade to keep using elite mode."
                .to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_precedence() {
        assert_eq!(QuotaStatus::classify(0, true, 1.0), QuotaStatus::TrialEnded);
        assert_eq!(QuotaStatus::classify(0, false, 1.0), QuotaStatus::Throttled);
        assert_eq!(QuotaStatus::classify(10, false, 0.8), QuotaStatus::Warning);
        assert_eq!(QuotaStatus::classify(10, true, 0.5), QuotaStatus::Normal);
    }

    #[test]
    fn test_upgrade_nudge() {
        assert!(!QuotaStatus::Warning.suggests_upgrade(0.85));
        assert!(QuotaStatus::Warning.suggests_upgrade(0.9));
        assert!(QuotaStatus::Throttled.suggests_upgrade(1.0));
        assert!(!QuotaStatus::Normal.suggests_upgrade(0.95));
    }

    #[test]
    fn test_allowance_saturates() {
        let allowance = Allowance::new(120, 100);
        assert_eq!(allowance.remaining, 0);
    }

    #[test]
    fn test_trial_ended_serializes_camel_case() {
        let json = serde_json::to_string(&QuotaStatus::TrialEnded).unwrap();
        assert_eq!(json, "\"trialEnded\"");
    }
}
