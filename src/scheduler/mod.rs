//! Stage scheduling: queue, periodic enqueues and the dispatcher.
//!
//! ```text
//!   webhook / admin / periodic ──► StageQueue ──► Dispatcher workers
//!                                  (Redis or        │ one lock per stage kind
//!                                   memory)         ▼
//!                                               StageExecutor ──► CachePipeline
//! ```
//!
//! - **StageQueue**: FIFO of [`StageJob`]s. [`RedisQueue`] survives restarts
//!   using BRPOPLPUSH and a processing list; [`MemoryQueue`] does not.
//! - **PeriodicScheduler**: named recurring enqueues, replaced on re-register.
//! - **Dispatcher**: worker pool with graceful shutdown. A stage kind never
//!   runs concurrently with itself.
//!
//! # Example
//!
//! ```rust,ignore
//! let queue: Arc<dyn StageQueue> = Arc::new(RedisQueue::connect(&redis_url, "stats-cache").await?);
//! let periodic = Arc::new(PeriodicScheduler::new(queue.clone()));
//! let executor = Arc::new(StageExecutor::new(pipeline, queue.clone(), periodic));
//!
//! let mut dispatcher = Dispatcher::new(DispatcherConfig::default(), queue.clone(), executor);
//! dispatcher.start().await?;
//! enqueue_stage(queue.as_ref(), StageJob::Bootstrap).await?;
//! ```

pub mod dispatcher;
pub mod executor;
pub mod job;
pub mod memory_queue;
pub mod periodic;
pub mod queue;

pub use dispatcher::{DispatchError, Dispatcher, DispatcherConfig, DispatcherStats};
pub use executor::{StageExecutor, StageReport};
pub use job::{QueuedJob, StageJob};
pub use memory_queue::MemoryQueue;
pub use periodic::{PeriodicScheduler, CHECK, DISCOVERY};
pub use queue::{enqueue_stage, QueueError, QueueStats, RedisQueue, StageQueue};
