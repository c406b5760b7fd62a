//! Keyed persistence collaborators.
//!
//! State that would otherwise live in process-wide maps is injected through
//! [`KeyedStore`] so the core stays testable without a running server.

use std::sync::Arc;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Storage backend error: {message}")]
    Backend { message: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// A keyed store with get/put/list operations.
#[async_trait::async_trait]
pub trait KeyedStore<V>: Send + Sync
where
    V: Clone + Send + Sync + 'static,
{
    fn name(&self) -> &str;

    async fn get(&self, key: &str) -> StoreResult<Option<V>>;

    async fn put(&self, key: &str, value: V) -> StoreResult<()>;

    async fn list(&self) -> StoreResult<Vec<(String, V)>>;
}

/// In-memory store (for testing and single-instance deployments).
#[derive(Debug)]
pub struct MemoryStore<V> {
    entries: Arc<DashMap<String, V>>,
}

impl<V> MemoryStore<V> {
    pub fn new() -> Self {
        Self {
            entries: Arc::new(DashMap::new()),
        }
    }
}

impl<V> Default for MemoryStore<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> Clone for MemoryStore<V> {
    fn clone(&self) -> Self {
        Self {
            entries: Arc::clone(&self.entries),
        }
    }
}

#[async_trait::async_trait]
impl<V> KeyedStore<V> for MemoryStore<V>
where
    V: Clone + Send + Sync + 'static,
{
    fn name(&self) -> &str {
        "memory"
    }

    async fn get(&self, key: &str) -> StoreResult<Option<V>> {
        Ok(self.entries.get(key).map(|v| v.value().clone()))
    }

    async fn put(&self, key: &str, value: V) -> StoreResult<()> {
        self.entries.insert(key.to_string(), value);
        Ok(())
    }

    async fn list(&self) -> StoreResult<Vec<(String, V)>> {
        let mut entries: Vec<(String, V)> = self
            .entries
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(entries)
    }
}

/// Per-user answer-ranking weights forwarded to the backend.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CriteriaWeights {
    pub accuracy: f64,
    pub speed: f64,
    pub creativity: f64,
}

impl Default for CriteriaWeights {
    fn default() -> Self {
        Self {
            accuracy: 0.5,
            speed: 0.5,
            creativity: 0.5,
        }
    }
}

impl CriteriaWeights {
    /// Weights clamped to `[0, 1]`; non-finite values reset to the default.
    pub fn normalized(self) -> Self {
        let fix = |v: f64| if v.is_finite() { v.clamp(0.0, 1.0) } else { 0.5 };
        Self {
            accuracy: fix(self.accuracy),
            speed: fix(self.speed),
            creativity: fix(self.creativity),
        }
    }
}
