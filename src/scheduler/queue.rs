//! Stage job queues.
//!
//! [`RedisQueue`] uses three Redis lists:
//!
//! - `{queue_name}`: jobs waiting to run
//! - `{queue_name}:processing`: jobs taken by a worker (for crash recovery)
//! - `{queue_name}:dead_letter`: jobs recovered too many times
//!
//! Jobs move atomically from the main list to the processing list on
//! dequeue (BRPOPLPUSH) and are removed from it on completion.

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use thiserror::Error;
use uuid::Uuid;

use super::job::{QueuedJob, StageJob};

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("Redis connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Redis operation failed: {0}")]
    RedisError(#[from] redis::RedisError),

    #[error("Serialization failed: {0}")]
    SerializationFailed(#[from] serde_json::Error),

    #[error("Queue closed")]
    Closed,
}

/// A FIFO of stage jobs shared by producers and the dispatcher.
#[async_trait]
pub trait StageQueue: Send + Sync {
    async fn enqueue(&self, job: QueuedJob) -> Result<(), QueueError>;

    /// Waits up to `timeout` for the next job.
    async fn dequeue(&self, timeout: Duration) -> Result<Option<QueuedJob>, QueueError>;

    /// Acknowledges a dequeued job.
    async fn complete(&self, job: &QueuedJob) -> Result<(), QueueError>;

    /// Jobs waiting to run.
    async fn len(&self) -> Result<usize, QueueError>;

    /// Moves jobs left behind by a crashed worker back to the queue.
    async fn recover(&self) -> Result<usize, QueueError> {
        Ok(0)
    }

    fn name(&self) -> &str;
}

/// Enqueues a stage job, returning its queue id.
pub async fn enqueue_stage(queue: &dyn StageQueue, job: StageJob) -> Result<Uuid, QueueError> {
    let queued = QueuedJob::new(job);
    let id = queued.id;
    tracing::debug!(job_id = %id, stage = %queued.stage(), "Enqueueing stage job");
    queue.enqueue(queued).await?;
    Ok(id)
}

/// Redis-backed stage queue with reliable dequeue.
pub struct RedisQueue {
    redis: ConnectionManager,
    queue_name: String,
    processing_queue: String,
    dead_letter_queue: String,
}

impl RedisQueue {
    /// Connects to Redis.
    ///
    /// # Errors
    ///
    /// Returns `QueueError::ConnectionFailed` if the connection fails.
    pub async fn connect(redis_url: &str, queue_name: &str) -> Result<Self, QueueError> {
        let client = redis::Client::open(redis_url)
            .map_err(|e| QueueError::ConnectionFailed(e.to_string()))?;

        let redis = ConnectionManager::new(client)
            .await
            .map_err(|e| QueueError::ConnectionFailed(e.to_string()))?;

        Ok(Self::from_connection(redis, queue_name))
    }

    pub fn from_connection(redis: ConnectionManager, queue_name: &str) -> Self {
        Self {
            redis,
            queue_name: queue_name.to_string(),
            processing_queue: format!("{}:processing", queue_name),
            dead_letter_queue: format!("{}:dead_letter", queue_name),
        }
    }

    pub async fn processing_len(&self) -> Result<usize, QueueError> {
        let mut conn = self.redis.clone();
        let len: usize = conn.llen(&self.processing_queue).await?;
        Ok(len)
    }

    pub async fn dead_letter_len(&self) -> Result<usize, QueueError> {
        let mut conn = self.redis.clone();
        let len: usize = conn.llen(&self.dead_letter_queue).await?;
        Ok(len)
    }

    pub async fn stats(&self) -> Result<QueueStats, QueueError> {
        let (pending, processing, dead_letter) =
            tokio::try_join!(self.len(), self.processing_len(), self.dead_letter_len())?;

        Ok(QueueStats {
            queue_name: self.queue_name.clone(),
            pending_jobs: pending,
            processing_jobs: processing,
            dead_letter_jobs: dead_letter,
        })
    }

    /// Deletes every list. Used by tests and operators resetting a queue.
    pub async fn clear(&self) -> Result<(), QueueError> {
        let mut conn = self.redis.clone();
        let mut pipe = redis::pipe();
        pipe.del(&self.queue_name)
            .del(&self.processing_queue)
            .del(&self.dead_letter_queue);
        pipe.query_async::<_, ()>(&mut conn).await?;
        Ok(())
    }

    async fn dead_letter(&self, job: QueuedJob, error: &str) -> Result<(), QueueError> {
        let mut conn = self.redis.clone();
        let entry = serde_json::json!({
            "job": job,
            "error": error,
            "moved_at": chrono::Utc::now().to_rfc3339(),
        });
        conn.lpush::<_, _, ()>(&self.dead_letter_queue, serde_json::to_string(&entry)?)
            .await?;
        Ok(())
    }

    async fn remove_from_processing(&self, job_id: Uuid) -> Result<(), QueueError> {
        let mut conn = self.redis.clone();
        let jobs: Vec<String> = conn.lrange(&self.processing_queue, 0, -1).await?;

        for data in jobs {
            if let Ok(job) = serde_json::from_str::<QueuedJob>(&data) {
                if job.id == job_id {
                    conn.lrem::<_, _, ()>(&self.processing_queue, 1, &data)
                        .await?;
                    return Ok(());
                }
            }
        }
        // Already gone
        Ok(())
    }
}

#[async_trait]
impl StageQueue for RedisQueue {
    async fn enqueue(&self, job: QueuedJob) -> Result<(), QueueError> {
        let serialized = serde_json::to_string(&job)?;
        let mut conn = self.redis.clone();
        conn.lpush::<_, _, ()>(&self.queue_name, serialized).await?;
        Ok(())
    }

    async fn dequeue(&self, timeout: Duration) -> Result<Option<QueuedJob>, QueueError> {
        let mut conn = self.redis.clone();
        let timeout_secs = timeout.as_secs().max(1) as usize;

        let result: Option<String> = redis::cmd("BRPOPLPUSH")
            .arg(&self.queue_name)
            .arg(&self.processing_queue)
            .arg(timeout_secs)
            .query_async(&mut conn)
            .await?;

        match result {
            Some(data) => match serde_json::from_str::<QueuedJob>(&data) {
                Ok(job) => Ok(Some(job)),
                Err(e) => {
                    tracing::error!(error = %e, "Dropping undecodable stage job");
                    conn.lrem::<_, _, ()>(&self.processing_queue, 1, &data)
                        .await?;
                    Ok(None)
                }
            },
            None => Ok(None),
        }
    }

    async fn complete(&self, job: &QueuedJob) -> Result<(), QueueError> {
        self.remove_from_processing(job.id).await
    }

    async fn len(&self) -> Result<usize, QueueError> {
        let mut conn = self.redis.clone();
        let len: usize = conn.llen(&self.queue_name).await?;
        Ok(len)
    }

    async fn recover(&self) -> Result<usize, QueueError> {
        let mut conn = self.redis.clone();
        let mut recovered = 0;
        let jobs: Vec<String> = conn.lrange(&self.processing_queue, 0, -1).await?;

        for data in jobs {
            let Ok(mut job) = serde_json::from_str::<QueuedJob>(&data) else {
                conn.lrem::<_, _, ()>(&self.processing_queue, 1, &data)
                    .await?;
                continue;
            };
            job.increment_attempts();

            if job.should_retry() {
                let serialized = serde_json::to_string(&job)?;
                let mut pipe = redis::pipe();
                pipe.atomic()
                    .lrem(&self.processing_queue, 1, &data)
                    .rpush(&self.queue_name, &serialized);
                pipe.query_async::<_, ()>(&mut conn).await?;
                recovered += 1;
            } else {
                conn.lrem::<_, _, ()>(&self.processing_queue, 1, &data)
                    .await?;
                self.dead_letter(job, "recovered from processing list too many times")
                    .await?;
            }
        }

        Ok(recovered)
    }

    fn name(&self) -> &str {
        &self.queue_name
    }
}

/// Snapshot of Redis queue state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueStats {
    pub queue_name: String,
    pub pending_jobs: usize,
    pub processing_jobs: usize,
    pub dead_letter_jobs: usize,
}

impl QueueStats {
    pub fn total_jobs(&self) -> usize {
        self.pending_jobs + self.processing_jobs + self.dead_letter_jobs
    }
}
