use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::queue::LifecycleJob;
use crate::state::AppState;

// ============ Request/Response DTOs ============

#[derive(Debug, Deserialize, IntoParams)]
pub struct JobListParams {
    #[param(default = 20, minimum = 1, maximum = 100)]
    pub limit: Option<i64>,
}

/// Job status response
#[derive(Debug, Serialize, ToSchema)]
pub struct JobStatusResponse {
    pub job_id: Uuid,
    pub action: String,
    pub environment: String,
    pub status: String,
    pub retry_count: u32,
    pub max_retries: u32,
    #[schema(value_type = String)]
    pub created_at: time::OffsetDateTime,
    #[schema(value_type = Option<String>)]
    pub started_at: Option<time::OffsetDateTime>,
    #[schema(value_type = Option<String>)]
    pub completed_at: Option<time::OffsetDateTime>,
    pub error_message: Option<String>,
}

impl From<LifecycleJob> for JobStatusResponse {
    fn from(job: LifecycleJob) -> Self {
        Self {
            job_id: job.id,
            action: job.action.as_str().to_string(),
            environment: job.environment,
            status: job.status.as_str().to_string(),
            retry_count: job.retry_count,
            max_retries: job.max_retries,
            created_at: job.created_at,
            started_at: job.started_at,
            completed_at: job.completed_at,
            error_message: job.error_message,
        }
    }
}

/// Job list response
#[derive(Debug, Serialize, ToSchema)]
pub struct JobListResponse {
    pub data: Vec<JobStatusResponse>,
    pub total: u64,
    pub limit: u64,
}

/// Queue statistics
#[derive(Debug, Serialize, ToSchema)]
pub struct QueueStatsResponse {
    pub queue_length: u64,
}

// ============ Handlers ============

/// Get job status by ID
#[utoipa::path(
    get,
    path = "/api/jobs/{job_id}",
    params(
        ("job_id" = Uuid, Path, description = "Job ID")
    ),
    responses(
        (status = 200, description = "Job status", body = JobStatusResponse),
        (status = 404, description = "Job not found")
    ),
    tag = "Jobs"
)]
pub async fn get_job_status(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
) -> AppResult<Json<JobStatusResponse>> {
    let job = state
        .job_queue
        .get_job(job_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Job".to_string()))?;

    Ok(Json(job.into()))
}

/// List recently submitted jobs, newest first
#[utoipa::path(
    get,
    path = "/api/jobs",
    params(
        JobListParams
    ),
    responses(
        (status = 200, description = "List of jobs", body = JobListResponse)
    ),
    tag = "Jobs"
)]
pub async fn list_jobs(
    State(state): State<AppState>,
    Query(params): Query<JobListParams>,
) -> AppResult<Json<JobListResponse>> {
    let limit = params.limit.unwrap_or(20).clamp(1, 100) as u64;

    let jobs = state.job_queue.list_recent(limit).await?;

    let data: Vec<JobStatusResponse> = jobs.into_iter().map(|job| job.into()).collect();
    let total = data.len() as u64;

    Ok(Json(JobListResponse { data, total, limit }))
}

/// Cancel a pending job
#[utoipa::path(
    delete,
    path = "/api/jobs/{job_id}",
    params(
        ("job_id" = Uuid, Path, description = "Job ID")
    ),
    responses(
        (status = 200, description = "Job cancelled", body = JobStatusResponse),
        (status = 404, description = "Job not found"),
        (status = 400, description = "Job already finished")
    ),
    tag = "Jobs"
)]
pub async fn cancel_job(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
) -> AppResult<Json<JobStatusResponse>> {
    state.job_queue.cancel_job(job_id).await?;

    let job = state
        .job_queue
        .get_job(job_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Job".to_string()))?;

    Ok(Json(job.into()))
}

/// Requeue a failed or dead job.
///
/// This is the operator recovery path after a workflow step failure:
/// the environment record keeps its in-flight status, and requeueing
/// the job retries the workflow against current state.
#[utoipa::path(
    post,
    path = "/api/jobs/{job_id}/requeue",
    params(
        ("job_id" = Uuid, Path, description = "Job ID")
    ),
    responses(
        (status = 200, description = "Job requeued", body = JobStatusResponse),
        (status = 404, description = "Job not found"),
        (status = 400, description = "Only failed jobs can be requeued")
    ),
    tag = "Jobs"
)]
pub async fn requeue_job(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
) -> AppResult<Json<JobStatusResponse>> {
    state.job_queue.requeue(job_id).await?;

    let job = state
        .job_queue
        .get_job(job_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Job".to_string()))?;

    Ok(Json(job.into()))
}

/// Get queue statistics
#[utoipa::path(
    get,
    path = "/api/jobs/stats",
    responses(
        (status = 200, description = "Queue statistics", body = QueueStatsResponse)
    ),
    tag = "Jobs"
)]
pub async fn get_queue_stats(
    State(state): State<AppState>,
) -> AppResult<Json<QueueStatsResponse>> {
    let queue_length = state.job_queue.queue_length().await?;

    Ok(Json(QueueStatsResponse { queue_length }))
}
