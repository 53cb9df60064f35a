use async_trait::async_trait;
use redis::aio::ConnectionManager as RedisConnectionManager;
use redis::AsyncCommands;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::queue::{JobQueue, JobStatus, LifecycleJob};

/// Redis keys structure:
/// - staging:jobs:queue   - List for pending jobs (FIFO)
/// - staging:jobs:{id}    - String for job data (JSON)
/// - staging:jobs:recent  - List of job IDs, newest first
const QUEUE_KEY: &str = "staging:jobs:queue";
const JOB_PREFIX: &str = "staging:jobs:";
const RECENT_KEY: &str = "staging:jobs:recent";

/// How many job IDs the recency index retains
const RECENT_MAX: isize = 500;

/// Redis-backed job queue implementation
#[derive(Clone)]
pub struct RedisQueue {
    conn: RedisConnectionManager,
}

impl RedisQueue {
    pub fn new(conn: RedisConnectionManager) -> Self {
        Self { conn }
    }

    fn job_key(id: Uuid) -> String {
        format!("{}{}", JOB_PREFIX, id)
    }

    async fn save_job(&self, job: &LifecycleJob) -> AppResult<()> {
        let mut conn = self.conn.clone();
        let job_json = serde_json::to_string(job)
            .map_err(|e| AppError::Internal(format!("Serialization error: {}", e)))?;

        let _: () = conn
            .set(Self::job_key(job.id), &job_json)
            .await
            .map_err(|e| AppError::Internal(format!("Redis error: {}", e)))?;

        Ok(())
    }
}

#[async_trait]
impl JobQueue for RedisQueue {
    async fn enqueue(&self, job: LifecycleJob) -> AppResult<Uuid> {
        let mut conn = self.conn.clone();
        let job_id = job.id;

        // Store job data
        self.save_job(&job).await?;

        // Add to queue
        let _: () = conn
            .rpush(QUEUE_KEY, job_id.to_string())
            .await
            .map_err(|e| AppError::Internal(format!("Redis error: {}", e)))?;

        // Track in recency index
        let _: () = conn
            .lpush(RECENT_KEY, job_id.to_string())
            .await
            .map_err(|e| AppError::Internal(format!("Redis error: {}", e)))?;
        let _: () = conn
            .ltrim(RECENT_KEY, 0, RECENT_MAX - 1)
            .await
            .map_err(|e| AppError::Internal(format!("Redis error: {}", e)))?;

        tracing::info!(job_id = %job_id, action = job.action.as_str(), environment = %job.environment, "Job enqueued");

        Ok(job_id)
    }

    async fn dequeue(&self, timeout_seconds: u64) -> AppResult<Option<LifecycleJob>> {
        let mut conn = self.conn.clone();

        // Blocking pop from queue
        let result: Option<(String, String)> = conn
            .blpop(QUEUE_KEY, timeout_seconds as f64)
            .await
            .map_err(|e| AppError::Internal(format!("Redis error: {}", e)))?;

        if let Some((_, job_id_str)) = result {
            let job_id = Uuid::parse_str(&job_id_str)
                .map_err(|e| AppError::Internal(format!("Invalid UUID: {}", e)))?;

            // Get job data
            if let Some(mut job) = self.get_job(job_id).await? {
                // Update status to running
                job.status = JobStatus::Running;
                job.started_at = Some(time::OffsetDateTime::now_utc());
                self.save_job(&job).await?;

                tracing::info!(job_id = %job_id, "Job dequeued and started");
                return Ok(Some(job));
            }
        }

        Ok(None)
    }

    async fn get_job(&self, job_id: Uuid) -> AppResult<Option<LifecycleJob>> {
        let mut conn = self.conn.clone();

        let job_json: Option<String> = conn
            .get(Self::job_key(job_id))
            .await
            .map_err(|e| AppError::Internal(format!("Redis error: {}", e)))?;

        match job_json {
            Some(json) => {
                let job: LifecycleJob = serde_json::from_str(&json)
                    .map_err(|e| AppError::Internal(format!("Deserialization error: {}", e)))?;
                Ok(Some(job))
            }
            None => Ok(None),
        }
    }

    async fn update_status(&self, job_id: Uuid, status: JobStatus) -> AppResult<()> {
        let mut job = self
            .get_job(job_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Job".to_string()))?;

        job.status = status;

        if status.is_terminal() {
            job.completed_at = Some(time::OffsetDateTime::now_utc());
        }

        self.save_job(&job).await?;

        tracing::info!(job_id = %job_id, status = ?status, "Job status updated");

        Ok(())
    }

    async fn complete_job(&self, job_id: Uuid) -> AppResult<()> {
        let mut job = self
            .get_job(job_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Job".to_string()))?;

        job.status = JobStatus::Completed;
        job.completed_at = Some(time::OffsetDateTime::now_utc());

        self.save_job(&job).await?;

        tracing::info!(
            job_id = %job_id,
            action = job.action.as_str(),
            environment = %job.environment,
            "Job completed"
        );

        Ok(())
    }

    async fn fail_job(&self, job_id: Uuid, error: String, retryable: bool) -> AppResult<()> {
        let mut job = self
            .get_job(job_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Job".to_string()))?;

        job.error_message = Some(error.clone());

        let new_status = if retryable && job.retry_count < job.max_retries {
            job.retry_count += 1;
            JobStatus::Failed
        } else {
            job.completed_at = Some(time::OffsetDateTime::now_utc());
            JobStatus::Dead
        };

        job.status = new_status;
        self.save_job(&job).await?;

        tracing::warn!(
            job_id = %job_id,
            status = ?new_status,
            retry_count = job.retry_count,
            error = %error,
            "Job failed"
        );

        Ok(())
    }

    async fn queue_length(&self) -> AppResult<u64> {
        let mut conn = self.conn.clone();
        let len: u64 = conn
            .llen(QUEUE_KEY)
            .await
            .map_err(|e| AppError::Internal(format!("Redis error: {}", e)))?;
        Ok(len)
    }

    async fn list_recent(&self, limit: u64) -> AppResult<Vec<LifecycleJob>> {
        let mut conn = self.conn.clone();

        let job_ids: Vec<String> = conn
            .lrange(RECENT_KEY, 0, limit as isize - 1)
            .await
            .map_err(|e| AppError::Internal(format!("Redis error: {}", e)))?;

        let mut jobs = Vec::new();
        for job_id_str in job_ids {
            if let Ok(job_id) = Uuid::parse_str(&job_id_str) {
                if let Some(job) = self.get_job(job_id).await? {
                    jobs.push(job);
                }
            }
        }

        Ok(jobs)
    }

    async fn requeue(&self, job_id: Uuid) -> AppResult<()> {
        let mut job = self
            .get_job(job_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Job".to_string()))?;

        if !matches!(job.status, JobStatus::Failed | JobStatus::Dead) {
            return Err(AppError::Validation(
                "Only failed jobs can be requeued".to_string(),
            ));
        }

        let mut conn = self.conn.clone();

        // A dead job gets a fresh retry budget when an operator
        // revives it
        if job.status == JobStatus::Dead {
            job.retry_count = 0;
        }
        job.status = JobStatus::Pending;
        job.started_at = None;
        job.completed_at = None;
        job.error_message = None;

        self.save_job(&job).await?;

        // Add back to queue
        let _: () = conn
            .rpush(QUEUE_KEY, job_id.to_string())
            .await
            .map_err(|e| AppError::Internal(format!("Redis error: {}", e)))?;

        tracing::info!(job_id = %job_id, "Job requeued");

        Ok(())
    }

    async fn cancel_job(&self, job_id: Uuid) -> AppResult<()> {
        let mut job = self
            .get_job(job_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Job".to_string()))?;

        if job.status.is_terminal() {
            return Err(AppError::Validation(
                "Cannot cancel a completed job".to_string(),
            ));
        }

        job.status = JobStatus::Cancelled;
        job.completed_at = Some(time::OffsetDateTime::now_utc());

        self.save_job(&job).await?;

        tracing::info!(job_id = %job_id, "Job cancelled");

        Ok(())
    }
}
