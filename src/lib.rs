// Library crate for Stagehand
// Exports modules for use by the server and worker binaries and tests

pub mod config;
pub mod entity;
pub mod error;
pub mod handlers;
pub mod models;
pub mod queue;
pub mod registry;
pub mod services;
pub mod state;

use axum::{
    routing::{delete, get, post},
    Router,
};

use crate::handlers::{
    allow_repository, batch_environment_action, cancel_job, disallow_repository, get_environment,
    get_job_status, get_queue_stats, list_environments, list_jobs, list_repositories, receive_event,
    requeue_job,
};
use crate::state::AppState;

/// Build the application router with the given state
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(|| async { "Stagehand is running." }))
        // Webhook intake
        .route("/hooks/events", post(receive_event))
        // Environment routes
        .route("/api/environments", get(list_environments))
        .route("/api/environments/actions", post(batch_environment_action))
        .route("/api/environments/{name}", get(get_environment))
        // Allow-list routes
        .route("/api/repositories", get(list_repositories))
        .route("/api/repositories", post(allow_repository))
        .route("/api/repositories", delete(disallow_repository))
        // Job management routes
        .route("/api/jobs", get(list_jobs))
        .route("/api/jobs/stats", get(get_queue_stats))
        .route("/api/jobs/{job_id}", get(get_job_status))
        .route("/api/jobs/{job_id}", delete(cancel_job))
        .route("/api/jobs/{job_id}/requeue", post(requeue_job))
        .with_state(state)
}
