use axum::{
    extract::{Path, State},
    Json,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::Environment;
use crate::queue::LifecycleAction;
use crate::services::JobScheduler;
use crate::state::AppState;

// ============ Request/Response DTOs ============

#[derive(Debug, Serialize, ToSchema)]
pub struct EnvironmentResponse {
    pub id: Uuid,
    pub name: String,
    pub status: String,
    pub repository: String,
    pub branch: String,
    pub sha: String,
    pub url: String,
    #[schema(value_type = String)]
    pub created_at: time::OffsetDateTime,
    #[schema(value_type = String)]
    pub updated_at: time::OffsetDateTime,
}

impl EnvironmentResponse {
    fn from_environment(e: Environment, domain: &str) -> Self {
        Self {
            id: e.id,
            name: e.name.clone(),
            status: e.status.as_str().to_string(),
            url: e.url(domain),
            repository: e.repository,
            branch: e.branch,
            sha: e.sha,
            created_at: e.created_at,
            updated_at: e.updated_at,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct EnvironmentListResponse {
    pub data: Vec<EnvironmentResponse>,
    pub total: u64,
}

/// Batch action on named environments
#[derive(Debug, Deserialize, ToSchema)]
pub struct BatchActionRequest {
    /// One of: create, update, refresh, recreate, delete
    pub action: String,
    pub names: Vec<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct QueuedActionResponse {
    pub name: String,
    pub job_id: Uuid,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct BatchActionResponse {
    pub action: String,
    pub queued: Vec<QueuedActionResponse>,
    /// Names with no matching environment record, skipped
    pub missing: Vec<String>,
}

// ============ Handlers ============

/// List all tracked environments
#[utoipa::path(
    get,
    path = "/api/environments",
    responses(
        (status = 200, description = "List of environments", body = EnvironmentListResponse)
    ),
    tag = "Environments"
)]
pub async fn list_environments(
    State(state): State<AppState>,
) -> AppResult<Json<EnvironmentListResponse>> {
    let environments = state.registry.list().await?;
    let total = environments.len() as u64;
    let domain = &state.config.domain;

    Ok(Json(EnvironmentListResponse {
        data: environments
            .into_iter()
            .map(|e| EnvironmentResponse::from_environment(e, domain))
            .collect(),
        total,
    }))
}

/// Get an environment by name
#[utoipa::path(
    get,
    path = "/api/environments/{name}",
    params(
        ("name" = String, Path, description = "Environment name")
    ),
    responses(
        (status = 200, description = "Environment details", body = EnvironmentResponse),
        (status = 404, description = "Environment not found")
    ),
    tag = "Environments"
)]
pub async fn get_environment(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> AppResult<Json<EnvironmentResponse>> {
    let environment = state
        .registry
        .find_by_name(&name)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Environment {name}")))?;

    Ok(Json(EnvironmentResponse::from_environment(
        environment,
        &state.config.domain,
    )))
}

/// Queue a lifecycle action for a batch of environments.
///
/// Names without a matching record are reported back rather than
/// failing the whole batch.
#[utoipa::path(
    post,
    path = "/api/environments/actions",
    request_body = BatchActionRequest,
    responses(
        (status = 200, description = "Jobs queued", body = BatchActionResponse),
        (status = 400, description = "Unknown action")
    ),
    tag = "Environments"
)]
pub async fn batch_environment_action(
    State(state): State<AppState>,
    Json(payload): Json<BatchActionRequest>,
) -> AppResult<Json<BatchActionResponse>> {
    let action = LifecycleAction::parse(&payload.action)
        .ok_or_else(|| AppError::Validation(format!("unknown action '{}'", payload.action)))?;

    let scheduler = JobScheduler::new(state.registry.clone(), state.job_queue.clone());

    let mut queued = Vec::new();
    let mut missing = Vec::new();

    for name in payload.names {
        if state.registry.find_by_name(&name).await?.is_none() {
            missing.push(name);
            continue;
        }

        let job_id = scheduler.queue_lifecycle_action(&name, action).await?;
        tracing::info!(environment = %name, action = %action.as_str(), job_id = %job_id, "Queued lifecycle action");
        queued.push(QueuedActionResponse { name, job_id });
    }

    Ok(Json(BatchActionResponse {
        action: action.as_str().to_string(),
        queued,
        missing,
    }))
}
