use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use stagehand::config::Config;
use stagehand::handlers::{
    AllowRepositoryRequest, BatchActionRequest, BatchActionResponse, DisallowRepositoryRequest,
    EnvironmentListResponse, EnvironmentResponse, JobListResponse, JobStatusResponse,
    QueuedActionResponse, QueueStatsResponse, RepositoryListResponse, RepositoryResponse,
};
use stagehand::state::AppState;
use stagehand::{build_router, handlers};

#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::webhook::receive_event,
        handlers::environment::list_environments,
        handlers::environment::get_environment,
        handlers::environment::batch_environment_action,
        handlers::repository::list_repositories,
        handlers::repository::allow_repository,
        handlers::repository::disallow_repository,
        handlers::job::get_job_status,
        handlers::job::list_jobs,
        handlers::job::cancel_job,
        handlers::job::requeue_job,
        handlers::job::get_queue_stats,
    ),
    components(schemas(
        EnvironmentListResponse,
        EnvironmentResponse,
        BatchActionRequest,
        BatchActionResponse,
        QueuedActionResponse,
        AllowRepositoryRequest,
        DisallowRepositoryRequest,
        RepositoryListResponse,
        RepositoryResponse,
        JobStatusResponse,
        JobListResponse,
        QueueStatsResponse,
    )),
    tags(
        (name = "Webhooks", description = "Webhook intake from the git host"),
        (name = "Environments", description = "Staging environment inspection and batch actions"),
        (name = "Repositories", description = "Repository allow-list management"),
        (name = "Jobs", description = "Lifecycle job queue management")
    )
)]
struct ApiDoc;

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    // Load configuration
    let config = Config::from_env().expect("Failed to load configuration");
    let addr = config.server_addr();

    // Initialize application state (connects to Postgres and Redis)
    tracing::info!("Connecting to databases...");
    let state = AppState::new(config)
        .await
        .expect("Failed to initialize application state");
    tracing::info!("Database connections established");

    // Build the main application router
    let app = build_router(state)
        // Add Swagger UI
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()));

    let listener = tokio::net::TcpListener::bind(&addr).await.unwrap();

    tracing::info!("Server started on http://{}", addr);
    tracing::info!("Swagger UI: http://{}/swagger-ui/", addr);
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<std::net::SocketAddr>(),
    )
    .await
    .unwrap();
}
