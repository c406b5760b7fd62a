//! Tier-based quota engine.
//!
//! Classifies a user's current-period consumption against their tier's limits
//! and derives the orchestration mode, status and upgrade messaging for a request.
//!
//! ```rust
//! use orchestration_proxy::quota::{QuotaEngine, QuotaStatus, TierTable, UsageSnapshot};
//!
//! let engine = QuotaEngine::new(TierTable::canonical()).unwrap();
//! let decision = engine.decide(&UsageSnapshot::new("lite").elite_used(100));
//! assert_eq!(decision.status, QuotaStatus::Throttled);
//! ```

mod billing;
mod decision;
pub mod period;
mod report;
mod tier;
mod usage;

pub use billing::HttpUsageSource;
pub use decision::{
    Allowance, QuotaDecision, QuotaStatus, UPGRADE_NUDGE_THRESHOLD, UpgradePrompt,
    WARNING_THRESHOLD,
};
pub use report::{EliteReport, QuotaReport, TokenReport};
pub use tier::{
    CANONICAL_TABLE_VERSION, OrchestrationMode, TierQuota, TierTable, TierTableBuilder,
};
pub use usage::{StoreUsageSource, UsageError, UsageSnapshot, UsageSource};

use chrono::{NaiveDate, Utc};

use crate::config::{ConfigError, ConfigResult};

/// Pure decision function over a [`TierTable`].
#[derive(Debug, Clone)]
pub struct QuotaEngine {
    table: TierTable,
    lowest: TierQuota,
}

impl QuotaEngine {
    pub fn new(table: TierTable) -> ConfigResult<Self> {
        table.validate()?;
        let lowest = table
            .lowest_quota()
            .cloned()
            .ok_or_else(|| ConfigError::NotFound {
                key: format!("tiers.{}", table.lowest),
            })?;
        Ok(Self { table, lowest })
    }

    pub fn table(&self) -> &TierTable {
        &self.table
    }

    pub fn lowest_tier(&self) -> &str {
        &self.table.lowest
    }

    pub fn decide(&self, usage: &UsageSnapshot) -> QuotaDecision {
        self.decide_at(usage, Utc::now().date_naive())
    }

    /// Decision as of `today`. Unknown tiers are served with the lowest tier's quota.
    pub fn decide_at(&self, usage: &UsageSnapshot, today: NaiveDate) -> QuotaDecision {
        let (tier, base) = match self.table.get(&usage.tier) {
            Some(quota) => (usage.tier.as_str(), quota),
            None => {
                tracing::debug!(
                    tier = %usage.tier,
                    fallback = %self.table.lowest,
                    "Unknown tier, using lowest tier quota"
                );
                (self.table.lowest.as_str(), &self.lowest)
            }
        };
        let quota = base.for_seats(usage.seats);
        let days_until_reset = period::days_until_reset(today);

        let elite = Allowance::new(usage.elite_used, quota.elite_allowance);
        let secondary = Allowance::new(usage.secondary_used, quota.secondary_allowance);
        let tokens = Allowance::new(usage.tokens_used, quota.token_allowance);

        if quota.never_throttled {
            let percent_used = usage_ratio(usage.elite_used, quota.elite_allowance, 0.0);
            let status = QuotaStatus::Normal;
            return QuotaDecision {
                tier: tier.to_string(),
                orchestration_mode: quota.top_mode,
                after_quota_mode: quota.top_mode,
                status_message: decision::status_message(
                    status,
                    &elite,
                    percent_used,
                    quota.top_mode,
                    days_until_reset,
                ),
                elite,
                secondary,
                tokens,
                percent_used,
                status,
                days_until_reset,
                upgrade: UpgradePrompt::none(),
            };
        }

        // A zero allowance counts as fully consumed.
        let percent_used = usage_ratio(usage.elite_used, quota.elite_allowance, 1.0);
        let orchestration_mode = if elite.remaining > 0 {
            quota.top_mode
        } else {
            quota.fallback_tier
        };
        let status = QuotaStatus::classify(elite.remaining, self.table.is_lowest(tier), percent_used);
        let upgrade = if status.suggests_upgrade(percent_used) {
            UpgradePrompt::suggest(self.upgrade_message(&quota, status))
        } else {
            UpgradePrompt::none()
        };

        if status.is_limited() {
            tracing::debug!(
                tier,
                mode = %orchestration_mode,
                ?status,
                "Elite allowance exhausted"
            );
        }

        QuotaDecision {
            tier: tier.to_string(),
            orchestration_mode,
            after_quota_mode: quota.fallback_tier,
            status_message: decision::status_message(
                status,
                &elite,
                percent_used,
                orchestration_mode,
                days_until_reset,
            ),
            elite,
            secondary,
            tokens,
            percent_used,
            status,
            days_until_reset,
            upgrade,
        }
    }

    /// Decision for `user_id`, degrading to an unused lowest-tier snapshot when
    /// the billing collaborator cannot answer.
    pub async fn resolve(&self, source: &dyn UsageSource, user_id: &str) -> QuotaDecision {
        let snapshot = match source.snapshot(user_id).await {
            Ok(snapshot) => snapshot,
            Err(UsageError::NotFound { .. }) => {
                tracing::debug!(user_id, "No usage on record, assuming lowest tier");
                UsageSnapshot::zeroed(self.lowest_tier())
            }
            Err(e) => {
                tracing::warn!(
                    user_id,
                    source = source.name(),
                    error = %e,
                    "Usage lookup failed, degrading to lowest tier"
                );
                UsageSnapshot::zeroed(self.lowest_tier())
            }
        };
        self.decide(&snapshot)
    }

    fn upgrade_message(&self, quota: &TierQuota, status: QuotaStatus) -> String {
        let target = quota
            .upgrade_to
            .as_deref()
            .and_then(|name| self.table.get(name).map(|q| (name, q)));

        match (status, target) {
            (QuotaStatus::TrialEnded, Some((name, next))) => format!(
                "Upgrade to {} to get {} elite queries every month.",
                display(name, next),
                next.elite_allowance
            ),
            (_, Some((name, next))) => format!(
                "Upgrade to {} for {} elite queries per month.",
                display(name, next),
                next.elite_allowance
            ),
            (_, None) => "Contact us to raise your elite query allowance.".to_string(),
        }
    }
}

fn display<'a>(name: &'a str, quota: &'a TierQuota) -> &'a str {
    if quota.display_name.is_empty() {
        name
    } else {
        &quota.display_name
    }
}

fn usage_ratio(used: u64, allowance: u64, when_zero: f64) -> f64 {
    if allowance == 0 {
        return when_zero;
    }
    (used as f64 / allowance as f64).min(1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine() -> QuotaEngine {
        QuotaEngine::new(TierTable::canonical()).unwrap()
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, 19).unwrap()
    }

    #[test]
    fn test_lite_exhausted_falls_back_to_budget() {
        let decision = engine().decide_at(&UsageSnapshot::new("lite").elite_used(100), today());
        assert_eq!(decision.orchestration_mode, OrchestrationMode::Budget);
        assert_eq!(decision.status, QuotaStatus::Throttled);
        assert!(decision.upgrade_suggested());
        assert!(decision.upgrade.message.contains("Pro"));
    }

    #[test]
    fn test_free_exhausted_ends_trial() {
        let decision = engine().decide_at(&UsageSnapshot::new("free").elite_used(50), today());
        assert_eq!(decision.status, QuotaStatus::TrialEnded);
        assert_eq!(decision.orchestration_mode, OrchestrationMode::Free);
        assert!(decision.upgrade_suggested());
    }

    #[test]
    fn test_zero_allowance_uses_fallback_without_dividing() {
        let table = TierTable::builder(9)
            .lowest("free", TierQuota::new(10, OrchestrationMode::Free))
            .tier("starter", TierQuota::new(0, OrchestrationMode::Budget))
            .tier("team", TierQuota::new(0, OrchestrationMode::Standard))
            .build()
            .unwrap();
        let engine = QuotaEngine::new(table).unwrap();

        for (tier, fallback) in [
            ("starter", OrchestrationMode::Budget),
            ("team", OrchestrationMode::Standard),
        ] {
            let decision = engine.decide_at(&UsageSnapshot::new(tier), today());
            assert_eq!(decision.orchestration_mode, fallback);
            assert_eq!(decision.percent_used, 1.0);
            assert!(decision.percent_used.is_finite());
            assert_eq!(decision.status, QuotaStatus::Throttled);
        }
    }

    #[test]
    fn test_exhausted_never_normal() {
        let engine = engine();
        for tier in ["free", "lite", "pro", "enterprise"] {
            let limit = engine.table().get(tier).unwrap().elite_allowance;
            for used in [limit, limit + 1, limit * 2] {
                let decision = engine.decide_at(&UsageSnapshot::new(tier).elite_used(used), today());
                assert!(
                    matches!(
                        decision.status,
                        QuotaStatus::Throttled | QuotaStatus::TrialEnded
                    ),
                    "{tier} at {used} was {:?}",
                    decision.status
                );
            }
        }
    }

    #[test]
    fn test_percent_used_monotonic() {
        let engine = engine();
        let mut previous = -1.0;
        for used in 0..=450 {
            let decision = engine.decide_at(&UsageSnapshot::new("pro").elite_used(used), today());
            assert!(decision.percent_used >= previous);
            previous = decision.percent_used;
        }
    }

    #[test]
    fn test_warning_thresholds() {
        let engine = engine();

        let at_80 = engine.decide_at(&UsageSnapshot::new("lite").elite_used(80), today());
        assert_eq!(at_80.status, QuotaStatus::Warning);
        assert!(!at_80.upgrade_suggested());
        assert_eq!(at_80.orchestration_mode, OrchestrationMode::Elite);

        let at_90 = engine.decide_at(&UsageSnapshot::new("lite").elite_used(90), today());
        assert_eq!(at_90.status, QuotaStatus::Warning);
        assert!(at_90.upgrade_suggested());

        let at_50 = engine.decide_at(&UsageSnapshot::new("lite").elite_used(50), today());
        assert_eq!(at_50.status, QuotaStatus::Normal);
        assert!(at_50.upgrade.message.is_empty());
    }

    #[test]
    fn test_unknown_tier_uses_lowest() {
        let decision =
            engine().decide_at(&UsageSnapshot::new("platinum").elite_used(50), today());
        assert_eq!(decision.tier, "free");
        assert_eq!(decision.elite.limit, 50);
        assert_eq!(decision.status, QuotaStatus::TrialEnded);
    }

    #[test]
    fn test_never_throttled_tier() {
        let decision =
            engine().decide_at(&UsageSnapshot::new("maximum").elite_used(5_000), today());
        assert_eq!(decision.orchestration_mode, OrchestrationMode::Maximum);
        assert_eq!(decision.status, QuotaStatus::Normal);
        assert!(!decision.upgrade_suggested());
    }

    #[test]
    fn test_per_seat_allowance() {
        let decision = engine().decide_at(
            &UsageSnapshot::new("enterprise").elite_used(500).seats(3),
            today(),
        );
        assert_eq!(decision.elite.limit, 900);
        assert_eq!(decision.elite.remaining, 400);
        assert!(decision.is_elite());
    }

    #[test]
    fn test_days_until_reset_embedded() {
        let decision = engine().decide_at(&UsageSnapshot::new("pro"), today());
        assert_eq!(decision.days_until_reset, 13);
    }

    struct FailingSource;

    #[async_trait::async_trait]
    impl UsageSource for FailingSource {
        fn name(&self) -> &str {
            "failing"
        }

        async fn snapshot(&self, _user_id: &str) -> Result<UsageSnapshot, UsageError> {
            Err(UsageError::Unavailable("connection reset".into()))
        }
    }

    #[tokio::test]
    async fn test_resolve_degrades_on_failure() {
        let decision = engine().resolve(&FailingSource, "user-1").await;
        assert_eq!(decision.tier, "free");
        assert_eq!(decision.elite.used, 0);
        assert_eq!(decision.status, QuotaStatus::Normal);
        assert_eq!(decision.orchestration_mode, OrchestrationMode::Elite);
    }
}
