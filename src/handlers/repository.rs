use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::AppResult;
use crate::models::{AllowedRepository, NewAllowedRepository};
use crate::state::AppState;

// ============ Request/Response DTOs ============

#[derive(Debug, Deserialize, ToSchema)]
pub struct AllowRepositoryRequest {
    /// Clone URL exactly as it appears in webhook payloads
    pub url: String,
    /// Who approved the repository
    pub allowed_by: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct DisallowRepositoryRequest {
    pub url: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct RepositoryResponse {
    pub id: Uuid,
    pub url: String,
    pub allowed_by: String,
    #[schema(value_type = String)]
    pub created_at: time::OffsetDateTime,
}

impl From<AllowedRepository> for RepositoryResponse {
    fn from(r: AllowedRepository) -> Self {
        Self {
            id: r.id,
            url: r.url,
            allowed_by: r.allowed_by,
            created_at: r.created_at,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct RepositoryListResponse {
    pub data: Vec<RepositoryResponse>,
    pub total: u64,
}

// ============ Handlers ============

/// List allow-listed repositories
#[utoipa::path(
    get,
    path = "/api/repositories",
    responses(
        (status = 200, description = "List of allow-listed repositories", body = RepositoryListResponse)
    ),
    tag = "Repositories"
)]
pub async fn list_repositories(
    State(state): State<AppState>,
) -> AppResult<Json<RepositoryListResponse>> {
    let repositories = state.registry.list_allowed_repositories().await?;
    let total = repositories.len() as u64;

    Ok(Json(RepositoryListResponse {
        data: repositories.into_iter().map(|r| r.into()).collect(),
        total,
    }))
}

/// Add a repository to the allow-list
#[utoipa::path(
    post,
    path = "/api/repositories",
    request_body = AllowRepositoryRequest,
    responses(
        (status = 200, description = "Repository allow-listed", body = RepositoryResponse),
        (status = 409, description = "Repository already allow-listed")
    ),
    tag = "Repositories"
)]
pub async fn allow_repository(
    State(state): State<AppState>,
    Json(payload): Json<AllowRepositoryRequest>,
) -> AppResult<Json<RepositoryResponse>> {
    let input = NewAllowedRepository {
        url: payload.url,
        allowed_by: payload.allowed_by,
    };

    let repository = state.registry.insert_allowed_repository(&input).await?;
    tracing::info!(url = %repository.url, allowed_by = %repository.allowed_by, "Repository allow-listed");

    Ok(Json(repository.into()))
}

/// Remove a repository from the allow-list.
///
/// The URL goes in the body because clone URLs do not survive as path
/// segments. Existing environments are untouched; the next webhook from
/// the repository is simply rejected.
#[utoipa::path(
    delete,
    path = "/api/repositories",
    request_body = DisallowRepositoryRequest,
    responses(
        (status = 200, description = "Repository removed from the allow-list"),
        (status = 404, description = "Repository not on the allow-list")
    ),
    tag = "Repositories"
)]
pub async fn disallow_repository(
    State(state): State<AppState>,
    Json(payload): Json<DisallowRepositoryRequest>,
) -> AppResult<()> {
    state.registry.remove_allowed_repository(&payload.url).await?;
    tracing::info!(url = %payload.url, "Repository removed from allow-list");
    Ok(())
}
