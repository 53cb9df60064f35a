use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::{Mutex, Notify};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::queue::{JobQueue, JobStatus, LifecycleJob};

/// In-memory queue for unit testing
#[derive(Clone)]
pub struct InMemoryQueue {
    inner: Arc<Mutex<InMemoryQueueInner>>,
    notify: Arc<Notify>,
}

struct InMemoryQueueInner {
    queue: VecDeque<Uuid>,
    jobs: HashMap<Uuid, LifecycleJob>,
}

impl InMemoryQueue {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(InMemoryQueueInner {
                queue: VecDeque::new(),
                jobs: HashMap::new(),
            })),
            notify: Arc::new(Notify::new()),
        }
    }
}

impl Default for InMemoryQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl JobQueue for InMemoryQueue {
    async fn enqueue(&self, job: LifecycleJob) -> AppResult<Uuid> {
        let job_id = job.id;
        let mut inner = self.inner.lock().await;
        inner.jobs.insert(job_id, job);
        inner.queue.push_back(job_id);
        drop(inner);
        self.notify.notify_one();
        Ok(job_id)
    }

    async fn dequeue(&self, timeout_seconds: u64) -> AppResult<Option<LifecycleJob>> {
        let timeout = std::time::Duration::from_secs(timeout_seconds);

        // Try to get a job immediately
        {
            let mut inner = self.inner.lock().await;
            if let Some(job_id) = inner.queue.pop_front() {
                if let Some(job) = inner.jobs.get_mut(&job_id) {
                    job.status = JobStatus::Running;
                    job.started_at = Some(time::OffsetDateTime::now_utc());
                    return Ok(Some(job.clone()));
                }
            }
        }

        // Wait for notification with timeout
        tokio::select! {
            _ = tokio::time::sleep(timeout) => Ok(None),
            _ = self.notify.notified() => {
                let mut inner = self.inner.lock().await;
                if let Some(job_id) = inner.queue.pop_front() {
                    if let Some(job) = inner.jobs.get_mut(&job_id) {
                        job.status = JobStatus::Running;
                        job.started_at = Some(time::OffsetDateTime::now_utc());
                        return Ok(Some(job.clone()));
                    }
                }
                Ok(None)
            }
        }
    }

    async fn get_job(&self, job_id: Uuid) -> AppResult<Option<LifecycleJob>> {
        let inner = self.inner.lock().await;
        Ok(inner.jobs.get(&job_id).cloned())
    }

    async fn update_status(&self, job_id: Uuid, status: JobStatus) -> AppResult<()> {
        let mut inner = self.inner.lock().await;
        let job = inner
            .jobs
            .get_mut(&job_id)
            .ok_or_else(|| AppError::NotFound("Job".to_string()))?;
        job.status = status;
        if status.is_terminal() {
            job.completed_at = Some(time::OffsetDateTime::now_utc());
        }
        Ok(())
    }

    async fn complete_job(&self, job_id: Uuid) -> AppResult<()> {
        let mut inner = self.inner.lock().await;
        let job = inner
            .jobs
            .get_mut(&job_id)
            .ok_or_else(|| AppError::NotFound("Job".to_string()))?;
        job.status = JobStatus::Completed;
        job.completed_at = Some(time::OffsetDateTime::now_utc());
        Ok(())
    }

    async fn fail_job(&self, job_id: Uuid, error: String, retryable: bool) -> AppResult<()> {
        let mut inner = self.inner.lock().await;
        let job = inner
            .jobs
            .get_mut(&job_id)
            .ok_or_else(|| AppError::NotFound("Job".to_string()))?;

        job.error_message = Some(error);

        if retryable && job.retry_count < job.max_retries {
            job.retry_count += 1;
            job.status = JobStatus::Failed;
        } else {
            job.status = JobStatus::Dead;
            job.completed_at = Some(time::OffsetDateTime::now_utc());
        }
        Ok(())
    }

    async fn queue_length(&self) -> AppResult<u64> {
        let inner = self.inner.lock().await;
        Ok(inner.queue.len() as u64)
    }

    async fn list_recent(&self, limit: u64) -> AppResult<Vec<LifecycleJob>> {
        let inner = self.inner.lock().await;
        let mut jobs: Vec<LifecycleJob> = inner.jobs.values().cloned().collect();

        // Sort by created_at descending
        jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        Ok(jobs.into_iter().take(limit as usize).collect())
    }

    async fn requeue(&self, job_id: Uuid) -> AppResult<()> {
        let mut inner = self.inner.lock().await;
        let job = inner
            .jobs
            .get_mut(&job_id)
            .ok_or_else(|| AppError::NotFound("Job".to_string()))?;

        if !matches!(job.status, JobStatus::Failed | JobStatus::Dead) {
            return Err(AppError::Validation(
                "Only failed jobs can be requeued".to_string(),
            ));
        }

        // A dead job gets a fresh retry budget when an operator
        // revives it
        if job.status == JobStatus::Dead {
            job.retry_count = 0;
        }
        job.status = JobStatus::Pending;
        job.started_at = None;
        job.completed_at = None;
        job.error_message = None;
        inner.queue.push_back(job_id);
        drop(inner);
        self.notify.notify_one();
        Ok(())
    }

    async fn cancel_job(&self, job_id: Uuid) -> AppResult<()> {
        let mut inner = self.inner.lock().await;
        let job = inner
            .jobs
            .get_mut(&job_id)
            .ok_or_else(|| AppError::NotFound("Job".to_string()))?;

        if job.status.is_terminal() {
            return Err(AppError::Validation(
                "Cannot cancel a completed job".to_string(),
            ));
        }

        job.status = JobStatus::Cancelled;
        job.completed_at = Some(time::OffsetDateTime::now_utc());
        Ok(())
    }
}
