//! Statistics store: parsed rearrangement statistics per repertoire.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::StatisticsError;

/// Persists the statistics a finished job produced.
#[async_trait]
pub trait StatisticsStore: Send + Sync {
    /// Stores statistics for a repertoire, replacing any previous set.
    async fn record_statistics(
        &self,
        repertoire_id: &str,
        statistics: &Value,
    ) -> Result<(), StatisticsError>;

    /// Removes a repertoire's statistics. Succeeds if none are stored.
    async fn delete_statistics(&self, repertoire_id: &str) -> Result<(), StatisticsError>;
}

/// Statistics store backed by process memory.
#[derive(Debug, Default)]
pub struct MemoryStatisticsStore {
    entries: RwLock<HashMap<String, Value>>,
}

impl MemoryStatisticsStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, repertoire_id: &str) -> Option<Value> {
        self.entries
            .read()
            .ok()
            .and_then(|entries| entries.get(repertoire_id).cloned())
    }

    pub fn contains(&self, repertoire_id: &str) -> bool {
        self.get(repertoire_id).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl StatisticsStore for MemoryStatisticsStore {
    async fn record_statistics(
        &self,
        repertoire_id: &str,
        statistics: &Value,
    ) -> Result<(), StatisticsError> {
        let mut entries = self
            .entries
            .write()
            .map_err(|_| StatisticsError::Unavailable("store lock poisoned".to_string()))?;
        entries.insert(repertoire_id.to_string(), statistics.clone());
        Ok(())
    }

    async fn delete_statistics(&self, repertoire_id: &str) -> Result<(), StatisticsError> {
        let mut entries = self
            .entries
            .write()
            .map_err(|_| StatisticsError::Unavailable("store lock poisoned".to_string()))?;
        entries.remove(repertoire_id);
        Ok(())
    }
}
