pub mod environment;
pub mod job;
pub mod repository;
pub mod webhook;

pub use environment::{
    batch_environment_action, get_environment, list_environments, BatchActionRequest,
    BatchActionResponse, EnvironmentListResponse, EnvironmentResponse, QueuedActionResponse,
};
pub use job::{
    cancel_job, get_job_status, get_queue_stats, list_jobs, requeue_job, JobListResponse,
    JobStatusResponse, QueueStatsResponse,
};
pub use repository::{
    allow_repository, disallow_repository, list_repositories, AllowRepositoryRequest,
    DisallowRepositoryRequest, RepositoryListResponse, RepositoryResponse,
};
pub use webhook::receive_event;
