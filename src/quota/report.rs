//! Wire shape of the usage query consumed by the dashboard.

use serde::Serialize;

use super::decision::{Allowance, QuotaDecision, QuotaStatus};
use super::tier::OrchestrationMode;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuotaReport {
    pub tier: String,
    pub orchestration_mode: OrchestrationMode,
    pub elite: EliteReport,
    pub after_quota_tier: OrchestrationMode,
    /// Non-elite requests counted against the tier's secondary allowance.
    pub secondary: Allowance,
    pub tokens: TokenReport,
    pub status: QuotaStatus,
    pub status_message: String,
    pub days_until_reset: u32,
    pub show_upgrade_prompt: bool,
    pub upgrade_message: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EliteReport {
    pub used: u64,
    pub limit: u64,
    pub remaining: u64,
    /// Percentage rounded to one decimal.
    pub percent_used: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct TokenReport {
    pub used: u64,
    pub limit: u64,
}

impl From<&QuotaDecision> for QuotaReport {
    fn from(decision: &QuotaDecision) -> Self {
        Self {
            tier: decision.tier.clone(),
            orchestration_mode: decision.orchestration_mode,
            elite: EliteReport {
                used: decision.elite.used,
                limit: decision.elite.limit,
                remaining: decision.elite.remaining,
                percent_used: (decision.percent_used * 1000.0).round() / 10.0,
            },
            after_quota_tier: decision.after_quota_mode,
            secondary: decision.secondary,
            tokens: TokenReport {
                used: decision.tokens.used,
                limit: decision.tokens.limit,
            },
            status: decision.status,
            status_message: decision.status_message.clone(),
            days_until_reset: decision.days_until_reset,
            show_upgrade_prompt: decision.upgrade.suggested,
            upgrade_message: decision.upgrade.message.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quota::{QuotaEngine, TierTable, UsageSnapshot};
    use chrono::NaiveDate;

    #[test]
    fn test_report_wire_shape() {
        let engine = QuotaEngine::new(TierTable::canonical()).unwrap();
        let today = NaiveDate::from_ymd_opt(2026, 10, 19).unwrap();
        let decision = engine.decide_at(
            &UsageSnapshot {
                secondary_used: 40,
                ..UsageSnapshot::new("pro").elite_used(122)
            },
            today,
        );

        let value = serde_json::to_value(QuotaReport::from(&decision)).unwrap();
        assert_eq!(value["tier"], "pro");
        assert_eq!(value["orchestrationMode"], "elite");
        assert_eq!(value["afterQuotaTier"], "standard");
        assert_eq!(value["elite"]["limit"], 400);
        assert_eq!(value["elite"]["remaining"], 278);
        assert_eq!(value["elite"]["percentUsed"], 30.5);
        assert_eq!(value["secondary"]["used"], 40);
        assert_eq!(value["secondary"]["limit"], 1_600);
        assert_eq!(value["secondary"]["remaining"], 1_560);
        assert_eq!(value["tokens"]["limit"], 2_000_000);
        assert_eq!(value["status"], "normal");
        assert_eq!(value["daysUntilReset"], 13);
        assert_eq!(value["showUpgradePrompt"], false);
        assert!(value.get("upgradeMessage").is_some());
    }
}
