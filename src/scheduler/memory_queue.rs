//! In-process stage queue for single-node deployments and tests.

use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, Notify};

use super::job::QueuedJob;
use super::queue::{QueueError, StageQueue};

/// FIFO queue held in memory. Jobs are lost on restart.
pub struct MemoryQueue {
    name: String,
    jobs: Mutex<VecDeque<QueuedJob>>,
    notify: Notify,
}

impl MemoryQueue {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            jobs: Mutex::new(VecDeque::new()),
            notify: Notify::new(),
        }
    }

    /// Removes and returns every waiting job without running it.
    pub async fn drain(&self) -> Vec<QueuedJob> {
        self.jobs.lock().await.drain(..).collect()
    }

    /// Copies of the waiting jobs, oldest first.
    pub async fn snapshot(&self) -> Vec<QueuedJob> {
        self.jobs.lock().await.iter().cloned().collect()
    }
}

impl Default for MemoryQueue {
    fn default() -> Self {
        Self::new("memory")
    }
}

#[async_trait]
impl StageQueue for MemoryQueue {
    async fn enqueue(&self, job: QueuedJob) -> Result<(), QueueError> {
        self.jobs.lock().await.push_back(job);
        self.notify.notify_one();
        Ok(())
    }

    async fn dequeue(&self, timeout: Duration) -> Result<Option<QueuedJob>, QueueError> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let notified = self.notify.notified();
            if let Some(job) = self.jobs.lock().await.pop_front() {
                return Ok(Some(job));
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return Ok(None);
            }
        }
    }

    async fn complete(&self, _job: &QueuedJob) -> Result<(), QueueError> {
        Ok(())
    }

    async fn len(&self) -> Result<usize, QueueError> {
        Ok(self.jobs.lock().await.len())
    }

    fn name(&self) -> &str {
        &self.name
    }
}
