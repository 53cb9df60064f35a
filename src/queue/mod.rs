pub mod job;
pub mod memory_queue;
pub mod redis_queue;

pub use job::{JobStatus, LifecycleAction, LifecycleJob};
pub use memory_queue::InMemoryQueue;
pub use redis_queue::RedisQueue;

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::AppResult;

/// Job queue trait for abstracting queue backends.
///
/// Delivery is at-least-once; a worker executes one job to completion
/// before dequeuing the next. Serialization of jobs that target the
/// same environment is the orchestrator's lease's responsibility, not
/// the queue's.
#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Push a job onto the queue
    async fn enqueue(&self, job: LifecycleJob) -> AppResult<Uuid>;

    /// Pop the next job from the queue (blocking with timeout)
    async fn dequeue(&self, timeout_seconds: u64) -> AppResult<Option<LifecycleJob>>;

    /// Get job by ID
    async fn get_job(&self, job_id: Uuid) -> AppResult<Option<LifecycleJob>>;

    /// Update job status
    async fn update_status(&self, job_id: Uuid, status: JobStatus) -> AppResult<()>;

    /// Mark job as completed
    async fn complete_job(&self, job_id: Uuid) -> AppResult<()>;

    /// Mark job as failed with error message
    async fn fail_job(&self, job_id: Uuid, error: String, retryable: bool) -> AppResult<()>;

    /// Get queue length
    async fn queue_length(&self) -> AppResult<u64>;

    /// Most recently created jobs (for the operator job listing)
    async fn list_recent(&self, limit: u64) -> AppResult<Vec<LifecycleJob>>;

    /// Requeue failed job for retry
    async fn requeue(&self, job_id: Uuid) -> AppResult<()>;

    /// Cancel a pending or running job
    async fn cancel_job(&self, job_id: Uuid) -> AppResult<()>;
}
