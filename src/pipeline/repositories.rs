//! Repositories that take part in statistics caching.

use super::orchestrator::CachePipeline;
use crate::error::RegistryError;

impl CachePipeline {
    /// Ids of repositories with both the download cache and the statistics
    /// cache enabled, in stable order.
    pub async fn participating_repositories(&self) -> Result<Vec<String>, RegistryError> {
        let repositories = self.registry.list_repositories().await?;
        let total = repositories.len();
        let ids: Vec<String> = repositories
            .into_iter()
            .filter(|r| r.participates())
            .map(|r| r.repository_id)
            .collect();

        tracing::debug!(total, participating = ids.len(), "Enumerated repositories");
        Ok(ids)
    }
}
