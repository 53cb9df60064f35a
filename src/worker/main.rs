mod executor;

use std::sync::Arc;

use tokio::signal;
use tokio::sync::watch;

// Import from the main crate
use stagehand::config::Config;
use stagehand::state::AppState;

use executor::JobExecutor;

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    tracing::info!("Starting Stagehand worker...");

    // Load configuration
    let config = Config::from_env().expect("Failed to load configuration");

    // Initialize application state
    tracing::info!("Connecting to databases...");
    let state = AppState::new(config)
        .await
        .expect("Failed to initialize application state");
    let state = Arc::new(state);
    tracing::info!("Database connections established");

    // Set up graceful shutdown
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // Spawn shutdown signal handler
    tokio::spawn(async move {
        shutdown_signal().await;
        tracing::info!("Shutdown signal received, stopping worker...");
        let _ = shutdown_tx.send(true);
    });

    // Create job executor
    let executor = JobExecutor::new(state.clone());

    // Worker loop
    tracing::info!("Worker started, waiting for jobs...");
    loop {
        // Check for shutdown
        if *shutdown_rx.borrow() {
            tracing::info!("Shutdown requested, exiting worker loop");
            break;
        }

        // Try to dequeue a job (with 5 second timeout)
        match state.job_queue.dequeue(5).await {
            Ok(Some(job)) => {
                let job_id = job.id;
                let action = job.action.as_str();
                let environment = job.environment.clone();
                tracing::info!(job_id = %job_id, action = %action, environment = %environment, "Processing job");

                // Update status to Running
                if let Err(e) = state
                    .job_queue
                    .update_status(job_id, stagehand::queue::JobStatus::Running)
                    .await
                {
                    tracing::error!(job_id = %job_id, error = %e, "Failed to update job status");
                    continue;
                }

                // Execute the job
                match executor.execute(job).await {
                    Ok(()) => {
                        tracing::info!(
                            job_id = %job_id,
                            environment = %environment,
                            "Job completed successfully"
                        );
                        if let Err(e) = state.job_queue.complete_job(job_id).await {
                            tracing::error!(job_id = %job_id, error = %e, "Failed to mark job as complete");
                        }
                    }
                    Err(e) => {
                        let is_retryable = is_retryable_error(&e);
                        tracing::error!(
                            job_id = %job_id,
                            environment = %environment,
                            error = %e,
                            retryable = is_retryable,
                            "Job failed"
                        );
                        if let Err(e) = state
                            .job_queue
                            .fail_job(job_id, e.to_string(), is_retryable)
                            .await
                        {
                            tracing::error!(job_id = %job_id, error = %e, "Failed to mark job as failed");
                        }
                    }
                }
            }
            Ok(None) => {
                // No job available, continue loop (dequeue already waited)
            }
            Err(e) => {
                tracing::error!(error = %e, "Error dequeuing job");
                // Brief sleep on error to prevent tight loop
                tokio::time::sleep(std::time::Duration::from_secs(1)).await;
            }
        }
    }

    tracing::info!("Worker shutdown complete");
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

/// Determine if an error is retryable
fn is_retryable_error(error: &stagehand::error::AppError) -> bool {
    match error {
        // A step that timed out may succeed with a clean retry; a step
        // that exited non-zero needs operator attention first
        stagehand::error::AppError::StepExecution { detail, .. } => {
            detail.contains("timed out") || detail.contains("connection")
        }
        // Network errors are usually retryable
        stagehand::error::AppError::Internal(msg) => {
            msg.contains("timeout") || msg.contains("connection") || msg.contains("network")
        }
        // Queue errors might be retryable
        stagehand::error::AppError::Queue(msg) => {
            msg.contains("timeout") || msg.contains("connection")
        }
        // Database errors might be retryable (transient failures)
        stagehand::error::AppError::Database(_) => true,
        // Validation errors are not retryable
        stagehand::error::AppError::Validation(_) => false,
        // Not found errors are not retryable
        stagehand::error::AppError::NotFound(_) => false,
        // Conflict errors are not retryable
        stagehand::error::AppError::Conflict(_) => false,
        stagehand::error::AppError::AccessDenied(_)
        | stagehand::error::AppError::MalformedPayload(_) => false,
    }
}
