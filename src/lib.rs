//! stats-cache: keeps precomputed repertoire statistics in step with the
//! studies and repertoires held by participating repositories.
//!
//! The registry records which studies and repertoires should be cached and
//! which already are. Discovery fills the registry from the compute
//! platform, submission launches bounded statistics jobs, and completion
//! handling (webhook or poller) ingests results, retries timeouts with a
//! larger time budget, or disables entries that cannot be computed.

pub mod admin;
pub mod alert;
pub mod cli;
pub mod compute;
pub mod error;
pub mod metrics;
pub mod pipeline;
pub mod registry;
pub mod scheduler;
pub mod server;
pub mod storage;

pub use error::{CacheError, ComputeError, ErrorKind, RegistryError, StatisticsError};
