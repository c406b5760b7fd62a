//! Tier quota definitions and the canonical, versioned quota table.
//!
//! The table is loaded once at startup and handed to [`QuotaEngine`](super::QuotaEngine)
//! explicitly. There is exactly one authoritative table per process.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::config::{ConfigError, ConfigResult, ValidationErrors};

/// Current version of the built-in table.
pub const CANONICAL_TABLE_VERSION: u32 = 1;

/// Quality/cost tier a single chat request is served under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrchestrationMode {
    Elite,
    Standard,
    Budget,
    Maximum,
    Free,
}

impl OrchestrationMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Elite => "elite",
            Self::Standard => "standard",
            Self::Budget => "budget",
            Self::Maximum => "maximum",
            Self::Free => "free",
        }
    }

    /// Modes that are always servable without consuming a primary allowance.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Standard | Self::Budget | Self::Free)
    }
}

impl std::fmt::Display for OrchestrationMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

fn default_top_mode() -> OrchestrationMode {
    OrchestrationMode::Elite
}

/// Static per-tier quota configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TierQuota {
    #[serde(default)]
    pub display_name: String,
    pub elite_allowance: u64,
    #[serde(default)]
    pub secondary_allowance: u64,
    pub total_allowance: u64,
    pub token_allowance: u64,
    pub fallback_tier: OrchestrationMode,
    #[serde(default = "default_top_mode")]
    pub top_mode: OrchestrationMode,
    #[serde(default)]
    pub per_seat: bool,
    #[serde(default)]
    pub never_throttled: bool,
    #[serde(default)]
    pub upgrade_to: Option<String>,
}

impl TierQuota {
    pub fn new(elite_allowance: u64, fallback_tier: OrchestrationMode) -> Self {
        Self {
            display_name: String::new(),
            elite_allowance,
            secondary_allowance: 0,
            total_allowance: elite_allowance,
            token_allowance: 0,
            fallback_tier,
            top_mode: OrchestrationMode::Elite,
            per_seat: false,
            never_throttled: false,
            upgrade_to: None,
        }
    }

    pub fn display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = name.into();
        self
    }

    pub fn secondary(mut self, secondary_allowance: u64) -> Self {
        self.secondary_allowance = secondary_allowance;
        self.total_allowance = self.elite_allowance + secondary_allowance;
        self
    }

    pub fn tokens(mut self, token_allowance: u64) -> Self {
        self.token_allowance = token_allowance;
        self
    }

    pub fn top_mode(mut self, mode: OrchestrationMode) -> Self {
        self.top_mode = mode;
        self
    }

    pub fn per_seat(mut self) -> Self {
        self.per_seat = true;
        self
    }

    pub fn never_throttled(mut self) -> Self {
        self.never_throttled = true;
        self
    }

    pub fn upgrade_to(mut self, tier: impl Into<String>) -> Self {
        self.upgrade_to = Some(tier.into());
        self
    }

    /// Allowances scaled by seat count for per-seat tiers.
    pub fn for_seats(&self, seats: Option<u32>) -> Self {
        if !self.per_seat {
            return self.clone();
        }
        let factor = u64::from(seats.unwrap_or(1).max(1));
        Self {
            elite_allowance: self.elite_allowance.saturating_mul(factor),
            secondary_allowance: self.secondary_allowance.saturating_mul(factor),
            total_allowance: self.total_allowance.saturating_mul(factor),
            token_allowance: self.token_allowance.saturating_mul(factor),
            ..self.clone()
        }
    }
}

/// Versioned table of tier quotas.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TierTable {
    pub version: u32,
    pub lowest: String,
    pub tiers: BTreeMap<String, TierQuota>,
}

impl TierTable {
    pub fn builder(version: u32) -> TierTableBuilder {
        TierTableBuilder::new(version)
    }

    /// The built-in table.
    pub fn canonical() -> Self {
        use OrchestrationMode::*;

        Self::builder(CANONICAL_TABLE_VERSION)
            .lowest(
                "free",
                TierQuota::new(50, Free)
                    .display_name("Free")
                    .tokens(100_000)
                    .upgrade_to("lite"),
            )
            .tier(
                "lite",
                TierQuota::new(100, Budget)
                    .display_name("Lite")
                    .secondary(400)
                    .tokens(500_000)
                    .upgrade_to("pro"),
            )
            .tier(
                "pro",
                TierQuota::new(400, Standard)
                    .display_name("Pro")
                    .secondary(1_600)
                    .tokens(2_000_000)
                    .upgrade_to("enterprise"),
            )
            .tier(
                "enterprise",
                TierQuota::new(300, Standard)
                    .display_name("Enterprise")
                    .secondary(700)
                    .tokens(1_500_000)
                    .per_seat(),
            )
            .tier(
                "maximum",
                TierQuota::new(1_000, Standard)
                    .display_name("Maximum")
                    .tokens(10_000_000)
                    .top_mode(Maximum)
                    .never_throttled(),
            )
            .build_unchecked()
    }

    pub fn from_json(json: &str) -> ConfigResult<Self> {
        let table: Self = serde_json::from_str(json)?;
        table.validate()?;
        Ok(table)
    }

    pub async fn load(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let raw = tokio::fs::read_to_string(path.as_ref()).await?;
        let table = Self::from_json(&raw)?;
        tracing::info!(
            path = %path.as_ref().display(),
            version = table.version,
            tiers = table.tiers.len(),
            "Loaded tier quota table"
        );
        Ok(table)
    }

    pub fn get(&self, tier: &str) -> Option<&TierQuota> {
        self.tiers.get(tier)
    }

    pub fn is_lowest(&self, tier: &str) -> bool {
        self.lowest == tier
    }

    /// Quota for the lowest tier. Presence is checked by [`validate`](Self::validate).
    pub fn lowest_quota(&self) -> Option<&TierQuota> {
        self.tiers.get(&self.lowest)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        let mut errors = Vec::new();

        if !self.tiers.contains_key(&self.lowest) {
            errors.push(ConfigError::InvalidValue {
                key: "lowest".into(),
                message: format!("tier '{}' is not defined", self.lowest),
            });
        }

        for (name, quota) in &self.tiers {
            if !quota.fallback_tier.is_terminal() {
                errors.push(ConfigError::InvalidValue {
                    key: format!("tiers.{name}.fallbackTier"),
                    message: format!(
                        "'{}' is not a servable fallback mode",
                        quota.fallback_tier
                    ),
                });
            }
            if let Some(ref target) = quota.upgrade_to
                && !self.tiers.contains_key(target)
            {
                errors.push(ConfigError::InvalidValue {
                    key: format!("tiers.{name}.upgradeTo"),
                    message: format!("tier '{target}' is not defined"),
                });
            }
        }

        match errors.len() {
            0 => Ok(()),
            1 => Err(errors.remove(0)),
            _ => Err(ConfigError::ValidationErrors(ValidationErrors(errors))),
        }
    }
}

impl Default for TierTable {
    fn default() -> Self {
        Self::canonical()
    }
}

#[derive(Debug)]
pub struct TierTableBuilder {
    version: u32,
    lowest: Option<String>,
    tiers: BTreeMap<String, TierQuota>,
}

impl TierTableBuilder {
    pub fn new(version: u32) -> Self {
        Self {
            version,
            lowest: None,
            tiers: BTreeMap::new(),
        }
    }

    pub fn lowest(mut self, name: impl Into<String>, quota: TierQuota) -> Self {
        let name = name.into();
        self.tiers.insert(name.clone(), quota);
        self.lowest = Some(name);
        self
    }

    pub fn tier(mut self, name: impl Into<String>, quota: TierQuota) -> Self {
        self.tiers.insert(name.into(), quota);
        self
    }

    pub fn build(self) -> ConfigResult<TierTable> {
        let table = self.build_unchecked();
        table.validate()?;
        Ok(table)
    }

    fn build_unchecked(self) -> TierTable {
        TierTable {
            version: self.version,
            lowest: self.lowest.unwrap_or_default(),
            tiers: self.tiers,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonical_table_is_valid() {
        let table = TierTable::canonical();
        assert!(table.validate().is_ok());
        assert_eq!(table.version, CANONICAL_TABLE_VERSION);
        assert!(table.is_lowest("free"));
        assert_eq!(
            table.get("lite").unwrap().fallback_tier,
            OrchestrationMode::Budget
        );
    }

    #[test]
    fn test_elite_fallback_rejected() {
        let result = TierTable::builder(2)
            .lowest("free", TierQuota::new(10, OrchestrationMode::Free))
            .tier("loop", TierQuota::new(10, OrchestrationMode::Elite))
            .build();
        assert!(matches!(result, Err(ConfigError::InvalidValue { .. })));
    }

    #[test]
    fn test_missing_lowest_rejected() {
        let result = TierTable::builder(2)
            .tier("pro", TierQuota::new(10, OrchestrationMode::Standard))
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn test_multiple_errors_collected() {
        let result = TierTable::builder(2)
            .tier(
                "pro",
                TierQuota::new(10, OrchestrationMode::Maximum).upgrade_to("ghost"),
            )
            .build();
        match result {
            Err(ConfigError::ValidationErrors(errors)) => assert_eq!(errors.0.len(), 3),
            other => panic!("expected validation errors, got {other:?}"),
        }
    }

    #[test]
    fn test_per_seat_scaling() {
        let quota = TierQuota::new(300, OrchestrationMode::Standard)
            .secondary(700)
            .per_seat();
        let scaled = quota.for_seats(Some(4));
        assert_eq!(scaled.elite_allowance, 1_200);
        assert_eq!(scaled.total_allowance, 4_000);

        let zero_seats = quota.for_seats(Some(0));
        assert_eq!(zero_seats.elite_allowance, 300);

        let flat = TierQuota::new(100, OrchestrationMode::Budget).for_seats(Some(9));
        assert_eq!(flat.elite_allowance, 100);
    }

    #[test]
    fn test_table_json_roundtrip_validates() {
        let json = r#"{
            "version": 7,
            "lowest": "free",
            "tiers": {
                "free": {"eliteAllowance": 5, "totalAllowance": 5, "tokenAllowance": 10, "fallbackTier": "free"},
                "team": {"eliteAllowance": 50, "totalAllowance": 90, "tokenAllowance": 100, "fallbackTier": "standard", "perSeat": true}
            }
        }"#;
        let table = TierTable::from_json(json).unwrap();
        assert_eq!(table.version, 7);
        let team = table.get("team").unwrap();
        assert!(team.per_seat);
        assert_eq!(team.top_mode, OrchestrationMode::Elite);
    }

    #[tokio::test]
    async fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tiers.json");
        let json = serde_json::to_string(&TierTable::canonical()).unwrap();
        tokio::fs::write(&path, json).await.unwrap();

        let table = TierTable::load(&path).await.unwrap();
        assert_eq!(table, TierTable::canonical());
    }
}
