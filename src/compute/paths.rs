//! Storage layout for cached statistics.
//!
//! Everything lives under a configurable root, grouped by the study's
//! download cache id:
//!
//! ```text
//! {root}/{download_cache_id}/repertoires.airr.json
//! {root}/{download_cache_id}/{repertoire_id}.airr.tsv.gz
//! {root}/{download_cache_id}/statistics/
//! {root}/{download_cache_id}/statistics/{repertoire_id}/rearrangement_statistics.json
//! ```

/// File name the statistics job writes into its archive directory.
pub const STATISTICS_ARTIFACT: &str = "rearrangement_statistics.json";

/// Resolves cache paths relative to the configured root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachePaths {
    root: String,
}

impl CachePaths {
    pub fn new(root: impl Into<String>) -> Self {
        let root = root.into();
        let trimmed = root.trim_end_matches('/');
        Self {
            root: if trimmed.is_empty() {
                "/".to_string()
            } else {
                trimmed.to_string()
            },
        }
    }

    pub fn root(&self) -> &str {
        &self.root
    }

    fn join(&self, rest: &str) -> String {
        if self.root == "/" {
            format!("/{}", rest)
        } else {
            format!("{}/{}", self.root, rest)
        }
    }

    /// Aggregate statistics directory of a study.
    pub fn study_dir(&self, download_cache_id: &str) -> String {
        self.join(&format!("{}/statistics", download_cache_id))
    }

    /// Job archive directory of a repertoire.
    pub fn repertoire_dir(&self, download_cache_id: &str, repertoire_id: &str) -> String {
        format!("{}/{}", self.study_dir(download_cache_id), repertoire_id)
    }

    /// Result artifact produced by a successful job.
    pub fn artifact(&self, download_cache_id: &str, repertoire_id: &str) -> String {
        format!(
            "{}/{}",
            self.repertoire_dir(download_cache_id, repertoire_id),
            STATISTICS_ARTIFACT
        )
    }

    /// Repertoire metadata input of a job.
    pub fn metadata_input(&self, download_cache_id: &str) -> String {
        self.join(&format!("{}/repertoires.airr.json", download_cache_id))
    }

    /// Rearrangement data input of a job.
    pub fn rearrangement_input(&self, download_cache_id: &str, repertoire_id: &str) -> String {
        self.join(&format!("{}/{}.airr.tsv.gz", download_cache_id, repertoire_id))
    }
}
