//! Database schema constants.
//!
//! All cache records share one table with an explicit `kind` tag. Partial
//! unique indexes enforce the natural keys per kind.

/// SQL schema for the cache records table.
pub const CREATE_CACHE_RECORDS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS cache_records (
    id UUID PRIMARY KEY,
    kind VARCHAR(20) NOT NULL CHECK (kind IN ('singleton', 'study', 'repertoire')),
    repository_id VARCHAR(255),
    study_id VARCHAR(255),
    repertoire_id VARCHAR(255),
    download_cache_id VARCHAR(255),
    cache_ref VARCHAR(255),
    enable_cache BOOLEAN NOT NULL DEFAULT FALSE,
    jobs_submitted BOOLEAN NOT NULL DEFAULT FALSE,
    should_cache BOOLEAN NOT NULL DEFAULT FALSE,
    is_cached BOOLEAN NOT NULL DEFAULT FALSE,
    statistics_job_id VARCHAR(255),
    time_multiplier INTEGER NOT NULL DEFAULT 1 CHECK (time_multiplier >= 1),
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
)
"#;

/// SQL schema for per-repository cache settings.
pub const CREATE_REPOSITORY_SETTINGS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS repository_settings (
    repository_id VARCHAR(255) PRIMARY KEY,
    enable_cache BOOLEAN NOT NULL DEFAULT FALSE,
    enable_statistics_cache BOOLEAN NOT NULL DEFAULT FALSE,
    updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
)
"#;

/// SQL schema for parsed rearrangement statistics.
pub const CREATE_STATISTICS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS rearrangement_statistics (
    repertoire_id VARCHAR(255) PRIMARY KEY,
    statistics JSONB NOT NULL,
    recorded_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
)
"#;

/// One singleton record at most.
pub const CREATE_SINGLETON_INDEX: &str = "CREATE UNIQUE INDEX IF NOT EXISTS idx_cache_records_singleton ON cache_records(kind) WHERE kind = 'singleton'";

/// Study natural key.
pub const CREATE_STUDY_KEY_INDEX: &str = "CREATE UNIQUE INDEX IF NOT EXISTS idx_cache_records_study_key ON cache_records(repository_id, study_id) WHERE kind = 'study'";

/// Repertoire natural key.
pub const CREATE_REPERTOIRE_KEY_INDEX: &str = "CREATE UNIQUE INDEX IF NOT EXISTS idx_cache_records_repertoire_key ON cache_records(repertoire_id) WHERE kind = 'repertoire'";

pub const CREATE_REPERTOIRE_STUDY_INDEX: &str = "CREATE INDEX IF NOT EXISTS idx_cache_records_repertoire_study ON cache_records(repository_id, study_id) WHERE kind = 'repertoire'";

pub const CREATE_JOB_INDEX: &str = "CREATE INDEX IF NOT EXISTS idx_cache_records_job ON cache_records(statistics_job_id) WHERE statistics_job_id IS NOT NULL";

/// Returns all schema creation statements in the correct order.
///
/// Each entry is a single statement so it can run as a prepared query.
pub fn all_schema_statements() -> Vec<&'static str> {
    vec![
        CREATE_CACHE_RECORDS_TABLE,
        CREATE_REPOSITORY_SETTINGS_TABLE,
        CREATE_STATISTICS_TABLE,
        CREATE_SINGLETON_INDEX,
        CREATE_STUDY_KEY_INDEX,
        CREATE_REPERTOIRE_KEY_INDEX,
        CREATE_REPERTOIRE_STUDY_INDEX,
        CREATE_JOB_INDEX,
    ]
}

/// Table names in the schema.
pub mod tables {
    pub const CACHE_RECORDS: &str = "cache_records";
    pub const REPOSITORY_SETTINGS: &str = "repository_settings";
    pub const STATISTICS: &str = "rearrangement_statistics";
}
