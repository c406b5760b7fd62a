//! Usage snapshots supplied by the billing collaborator.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::store::{KeyedStore, StoreError};

/// Current-period counters for one user, owned by the billing side.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageSnapshot {
    pub tier: String,
    #[serde(default)]
    pub elite_used: u64,
    #[serde(default)]
    pub secondary_used: u64,
    #[serde(default)]
    pub tokens_used: u64,
    #[serde(default)]
    pub seats: Option<u32>,
}

impl UsageSnapshot {
    pub fn new(tier: impl Into<String>) -> Self {
        Self {
            tier: tier.into(),
            ..Default::default()
        }
    }

    /// A snapshot with no recorded usage.
    pub fn zeroed(tier: impl Into<String>) -> Self {
        Self::new(tier)
    }

    pub fn elite_used(mut self, used: u64) -> Self {
        self.elite_used = used;
        self
    }

    pub fn seats(mut self, seats: u32) -> Self {
        self.seats = Some(seats);
        self
    }
}

#[derive(Debug, thiserror::Error)]
pub enum UsageError {
    #[error("No usage recorded for user {user_id}")]
    NotFound { user_id: String },

    #[error("Billing service unavailable: {0}")]
    Unavailable(String),

    #[error("Billing request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Read-only view of the billing collaborator.
#[async_trait::async_trait]
pub trait UsageSource: Send + Sync {
    fn name(&self) -> &str;

    async fn snapshot(&self, user_id: &str) -> Result<UsageSnapshot, UsageError>;
}

/// Usage source backed by a keyed store.
pub struct StoreUsageSource {
    store: Arc<dyn KeyedStore<UsageSnapshot>>,
}

impl StoreUsageSource {
    pub fn new(store: Arc<dyn KeyedStore<UsageSnapshot>>) -> Self {
        Self { store }
    }
}

#[async_trait::async_trait]
impl UsageSource for StoreUsageSource {
    fn name(&self) -> &str {
        "store"
    }

    async fn snapshot(&self, user_id: &str) -> Result<UsageSnapshot, UsageError> {
        self.store
            .get(user_id)
            .await?
            .ok_or_else(|| UsageError::NotFound {
                user_id: user_id.to_string(),
            })
    }
}
