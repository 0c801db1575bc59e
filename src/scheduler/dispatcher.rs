//! Worker pool that drains the stage queue.
//!
//! Any number of workers pull jobs, but runs of the same stage kind never
//! overlap: each kind has its own lock, held for the duration of the run.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use thiserror::Error;
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::executor::StageExecutor;
use super::job::QueuedJob;
use super::queue::{QueueError, StageQueue};
use crate::metrics::MetricsCollector;
use crate::pipeline::Stage;

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),

    #[error("Dispatcher is already running")]
    AlreadyRunning,

    #[error("Dispatcher is not running")]
    NotRunning,

    #[error("Shutdown timed out after {0:?}")]
    ShutdownTimeout(Duration),
}

#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    pub num_workers: usize,
    /// How long one dequeue waits before re-checking for shutdown.
    pub poll_interval: Duration,
    /// Upper bound on a single stage run.
    pub job_timeout: Duration,
    pub shutdown_timeout: Duration,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            num_workers: 4,
            poll_interval: Duration::from_secs(1),
            job_timeout: Duration::from_secs(1800),
            shutdown_timeout: Duration::from_secs(60),
        }
    }
}

impl DispatcherConfig {
    pub fn new(num_workers: usize) -> Self {
        Self {
            num_workers,
            ..Default::default()
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_job_timeout(mut self, timeout: Duration) -> Self {
        self.job_timeout = timeout;
        self
    }

    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatcherStats {
    pub num_workers: usize,
    pub active_workers: usize,
    pub jobs_completed: u64,
    pub jobs_failed: u64,
    pub jobs_timed_out: u64,
}

impl DispatcherStats {
    pub fn total_processed(&self) -> u64 {
        self.jobs_completed + self.jobs_failed + self.jobs_timed_out
    }
}

#[derive(Default)]
struct SharedStats {
    jobs_completed: AtomicU64,
    jobs_failed: AtomicU64,
    jobs_timed_out: AtomicU64,
    active_workers: AtomicU64,
}

impl SharedStats {
    fn snapshot(&self, num_workers: usize) -> DispatcherStats {
        DispatcherStats {
            num_workers,
            active_workers: self.active_workers.load(Ordering::SeqCst) as usize,
            jobs_completed: self.jobs_completed.load(Ordering::SeqCst),
            jobs_failed: self.jobs_failed.load(Ordering::SeqCst),
            jobs_timed_out: self.jobs_timed_out.load(Ordering::SeqCst),
        }
    }
}

type StageLocks = HashMap<Stage, Mutex<()>>;

pub struct Dispatcher {
    config: DispatcherConfig,
    queue: Arc<dyn StageQueue>,
    executor: Arc<StageExecutor>,
    shutdown_tx: broadcast::Sender<()>,
    handles: Vec<JoinHandle<()>>,
    stats: Arc<SharedStats>,
    locks: Arc<StageLocks>,
    is_running: AtomicBool,
}

impl Dispatcher {
    pub fn new(
        config: DispatcherConfig,
        queue: Arc<dyn StageQueue>,
        executor: Arc<StageExecutor>,
    ) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        let locks = Stage::ALL.iter().map(|s| (*s, Mutex::new(()))).collect();

        Self {
            config,
            queue,
            executor,
            shutdown_tx,
            handles: Vec::new(),
            stats: Arc::new(SharedStats::default()),
            locks: Arc::new(locks),
            is_running: AtomicBool::new(false),
        }
    }

    /// Recovers abandoned jobs and spawns the workers.
    pub async fn start(&mut self) -> Result<(), DispatchError> {
        if self.is_running.load(Ordering::SeqCst) {
            return Err(DispatchError::AlreadyRunning);
        }

        match self.queue.recover().await {
            Ok(0) => {}
            Ok(recovered) => info!(recovered, "Recovered stage jobs from processing list"),
            Err(e) => warn!(error = %e, "Failed to recover processing jobs"),
        }

        for i in 0..self.config.num_workers.max(1) {
            let worker = Worker {
                id: format!("worker-{}", i),
                queue: Arc::clone(&self.queue),
                executor: Arc::clone(&self.executor),
                shutdown_rx: self.shutdown_tx.subscribe(),
                poll_interval: self.config.poll_interval,
                job_timeout: self.config.job_timeout,
                stats: Arc::clone(&self.stats),
                locks: Arc::clone(&self.locks),
                metrics: MetricsCollector::new(),
            };
            self.handles.push(tokio::spawn(worker.run()));
        }

        self.is_running.store(true, Ordering::SeqCst);
        info!(num_workers = self.config.num_workers, queue = self.queue.name(), "Dispatcher started");
        Ok(())
    }

    /// Signals workers and waits for in-flight stage runs to finish.
    pub async fn shutdown(&mut self) -> Result<(), DispatchError> {
        if !self.is_running.swap(false, Ordering::SeqCst) {
            return Err(DispatchError::NotRunning);
        }

        info!("Initiating dispatcher shutdown");
        let _ = self.shutdown_tx.send(());

        let handles: Vec<JoinHandle<()>> = self.handles.drain(..).collect();
        match tokio::time::timeout(
            self.config.shutdown_timeout,
            futures::future::join_all(handles),
        )
        .await
        {
            Ok(results) => {
                for result in results {
                    if let Err(e) = result {
                        error!(error = %e, "Worker task panicked during shutdown");
                    }
                }
                info!("Dispatcher shutdown complete");
                Ok(())
            }
            Err(_) => Err(DispatchError::ShutdownTimeout(self.config.shutdown_timeout)),
        }
    }

    pub fn stats(&self) -> DispatcherStats {
        self.stats.snapshot(self.config.num_workers)
    }

    pub fn is_running(&self) -> bool {
        self.is_running.load(Ordering::SeqCst)
    }
}

struct Worker {
    id: String,
    queue: Arc<dyn StageQueue>,
    executor: Arc<StageExecutor>,
    shutdown_rx: broadcast::Receiver<()>,
    poll_interval: Duration,
    job_timeout: Duration,
    stats: Arc<SharedStats>,
    locks: Arc<StageLocks>,
    metrics: MetricsCollector,
}

impl Worker {
    async fn run(mut self) {
        debug!(worker_id = %self.id, "Worker started");

        loop {
            match self.shutdown_rx.try_recv() {
                Ok(()) | Err(broadcast::error::TryRecvError::Closed) => break,
                Err(broadcast::error::TryRecvError::Lagged(_)) => continue,
                Err(broadcast::error::TryRecvError::Empty) => {}
            }

            match self.queue.dequeue(self.poll_interval).await {
                Ok(Some(job)) => {
                    self.process(job).await;
                    if let Ok(depth) = self.queue.len().await {
                        self.metrics.update_queue_depth(self.queue.name(), depth);
                    }
                }
                Ok(None) => {}
                Err(e) => {
                    error!(worker_id = %self.id, error = %e, "Failed to dequeue stage job");
                    tokio::time::sleep(self.poll_interval).await;
                }
            }
        }

        debug!(worker_id = %self.id, "Worker stopped");
    }

    async fn process(&self, job: QueuedJob) {
        let stage = job.stage();
        let started = Instant::now();

        let _serial = match self.locks.get(&stage) {
            Some(lock) => Some(lock.lock().await),
            None => None,
        };

        self.stats.active_workers.fetch_add(1, Ordering::SeqCst);
        debug!(worker_id = %self.id, job_id = %job.id, stage = %stage, "Running stage");

        let run = self.executor.run(job.job.clone());
        let result = if is_bounded(stage) {
            tokio::time::timeout(self.job_timeout, run).await
        } else {
            Ok(run.await)
        };
        self.stats.active_workers.fetch_sub(1, Ordering::SeqCst);

        match result {
            Ok(Ok(report)) => {
                self.stats.jobs_completed.fetch_add(1, Ordering::SeqCst);
                info!(
                    worker_id = %self.id,
                    stage = %stage,
                    duration_ms = started.elapsed().as_millis() as u64,
                    report = ?report,
                    "Stage completed"
                );
            }
            Ok(Err(e)) => {
                // Already alerted by the stage; the next scheduled run retries.
                self.stats.jobs_failed.fetch_add(1, Ordering::SeqCst);
                warn!(worker_id = %self.id, stage = %stage, error = %e, "Stage failed");
            }
            Err(_) => {
                self.stats.jobs_timed_out.fetch_add(1, Ordering::SeqCst);
                error!(
                    worker_id = %self.id,
                    stage = %stage,
                    timeout_secs = self.job_timeout.as_secs(),
                    "Stage timed out"
                );
            }
        }

        if let Err(e) = self.queue.complete(&job).await {
            error!(worker_id = %self.id, job_id = %job.id, error = %e, "Failed to acknowledge stage job");
        }
    }
}

/// Whether the job timeout may cut a stage off.
///
/// A Submit run is never cut off: a job the platform accepted must have its
/// id recorded before the run ends.
fn is_bounded(stage: Stage) -> bool {
    !matches!(stage, Stage::Submit)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_submit_is_not_bounded() {
        assert!(!is_bounded(Stage::Submit));
        assert!(is_bounded(Stage::Discover));
        assert!(is_bounded(Stage::Finish));
    }

    #[test]
    fn test_config_builders() {
        let config = DispatcherConfig::new(2)
            .with_poll_interval(Duration::from_millis(50))
            .with_job_timeout(Duration::from_secs(5))
            .with_shutdown_timeout(Duration::from_secs(1));
        assert_eq!(config.num_workers, 2);
        assert_eq!(config.poll_interval, Duration::from_millis(50));
        assert_eq!(config.job_timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_stats_total() {
        let stats = DispatcherStats {
            num_workers: 2,
            active_workers: 0,
            jobs_completed: 3,
            jobs_failed: 1,
            jobs_timed_out: 1,
        };
        assert_eq!(stats.total_processed(), 5);
    }
}
