//! Statistics cache pipeline.
//!
//! # Stages
//!
//! - **Discover**: reconcile study and repertoire entries against upstream
//!   listings ([`CachePipeline::discover`])
//! - **Submit**: start statistics jobs for pending repertoires, bounded by
//!   `max_jobs` ([`CachePipeline::submit`])
//! - **Finish**: apply a terminal job event, ingesting the artifact or
//!   retrying / disabling the entry ([`CachePipeline::finish`])
//! - **Poll**: fallback status checks for outstanding jobs
//!   ([`CachePipeline::poll`])
//! - **Clear**: administrative removal ([`CachePipeline::clear`])
//!
//! Stage bodies never retry. Collaborator failures are logged, alerted and
//! returned; the next scheduled pass picks up from persisted state.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use stats_cache::pipeline::{CacheConfig, CachePipeline};
//!
//! let pipeline = CachePipeline::new(
//!     CacheConfig::from_env()?,
//!     registry,
//!     compute,
//!     statistics,
//!     alerter,
//! )?;
//!
//! let singleton = ensure_singleton(pipeline.registry().as_ref()).await?;
//! let report = pipeline.discover(&singleton).await?;
//! let submitted = pipeline.submit(singleton).await?;
//! ```

pub mod aggregate;
pub mod budget;
pub mod clearer;
pub mod completion;
pub mod config;
pub mod orchestrator;
pub mod poller;
pub mod reconciler;
pub mod repositories;
pub mod stage;
pub mod submitter;

pub use aggregate::study_is_cached;
pub use budget::{TimeBudget, TimeoutDecision};
pub use clearer::{ClearReport, ClearTarget};
pub use completion::{
    CompletionEvent, CompletionOutcome, EventSource, IgnoreReason,
};
pub use config::{CacheConfig, ConfigError};
pub use orchestrator::{CachePipeline, PipelineStats};
pub use poller::PollResult;
pub use reconciler::DiscoveryReport;
pub use stage::{Stage, StageGuard};
pub use submitter::SubmissionResult;
