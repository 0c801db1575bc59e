//! Named recurring enqueues ("discovery", "check").

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use super::job::StageJob;
use super::queue::{enqueue_stage, StageQueue};

/// Name of the recurring reconciliation enqueue.
pub const DISCOVERY: &str = "discovery";
/// Name of the recurring submit-or-poll check.
pub const CHECK: &str = "check";

struct Registration {
    every: Duration,
    job: StageJob,
    handle: JoinHandle<()>,
}

/// Keeps at most one recurring task per name.
pub struct PeriodicScheduler {
    queue: Arc<dyn StageQueue>,
    tasks: Mutex<HashMap<String, Registration>>,
}

impl PeriodicScheduler {
    pub fn new(queue: Arc<dyn StageQueue>) -> Self {
        Self {
            queue,
            tasks: Mutex::new(HashMap::new()),
        }
    }

    /// Registers `job` to be enqueued every `every`, the first time
    /// immediately.
    ///
    /// Re-registering an unchanged name and schedule is a no-op; a changed
    /// one replaces the running task.
    pub fn upsert(&self, name: &str, every: Duration, job: StageJob) {
        let Ok(mut tasks) = self.tasks.lock() else {
            tracing::error!(name, "Periodic task table poisoned");
            return;
        };

        if let Some(existing) = tasks.get(name) {
            if existing.every == every && existing.job == job && !existing.handle.is_finished() {
                return;
            }
        }
        if let Some(previous) = tasks.remove(name) {
            previous.handle.abort();
        }

        let queue = Arc::clone(&self.queue);
        let task_name = name.to_string();
        let task_job = job.clone();
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                if let Err(e) = enqueue_stage(queue.as_ref(), task_job.clone()).await {
                    tracing::error!(name = %task_name, error = %e, "Periodic enqueue failed");
                }
            }
        });

        tracing::info!(name, every_secs = every.as_secs(), "Registered periodic task");
        tasks.insert(name.to_string(), Registration { every, job, handle });
    }

    /// Stops and forgets one task.
    pub fn cancel(&self, name: &str) -> bool {
        match self.tasks.lock() {
            Ok(mut tasks) => match tasks.remove(name) {
                Some(registration) => {
                    registration.handle.abort();
                    true
                }
                None => false,
            },
            Err(_) => false,
        }
    }

    /// Stops every task.
    pub fn clear(&self) {
        if let Ok(mut tasks) = self.tasks.lock() {
            for (name, registration) in tasks.drain() {
                registration.handle.abort();
                tracing::info!(name = %name, "Cancelled periodic task");
            }
        }
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .tasks
            .lock()
            .map(|t| t.keys().cloned().collect())
            .unwrap_or_default();
        names.sort();
        names
    }
}

impl Drop for PeriodicScheduler {
    fn drop(&mut self) {
        self.clear();
    }
}
