use std::sync::Arc;
use uuid::Uuid;

use crate::error::AppResult;
use crate::models::EnvStatus;
use crate::queue::{JobQueue, LifecycleAction, LifecycleJob};
use crate::registry::EnvironmentRegistry;

/// The synchronous half of every lifecycle action: persist the target
/// status on the record, then enqueue the job that performs the work.
/// Never runs a provisioning step itself, so the webhook path stays
/// short.
#[derive(Clone)]
pub struct JobScheduler {
    registry: Arc<dyn EnvironmentRegistry>,
    queue: Arc<dyn JobQueue>,
}

impl JobScheduler {
    pub fn new(registry: Arc<dyn EnvironmentRegistry>, queue: Arc<dyn JobQueue>) -> Self {
        Self { registry, queue }
    }

    pub async fn queue_for_creation(&self, name: &str) -> AppResult<Uuid> {
        self.queue_action(name, EnvStatus::Creating, LifecycleAction::Create)
            .await
    }

    pub async fn queue_for_update(&self, name: &str) -> AppResult<Uuid> {
        self.queue_action(name, EnvStatus::Updating, LifecycleAction::Update)
            .await
    }

    pub async fn queue_for_refresh(&self, name: &str) -> AppResult<Uuid> {
        self.queue_action(name, EnvStatus::Refreshing, LifecycleAction::Refresh)
            .await
    }

    pub async fn queue_for_recreation(&self, name: &str) -> AppResult<Uuid> {
        self.queue_action(name, EnvStatus::Creating, LifecycleAction::Recreate)
            .await
    }

    pub async fn queue_for_deletion(&self, name: &str) -> AppResult<Uuid> {
        self.queue_action(name, EnvStatus::Deleting, LifecycleAction::Delete)
            .await
    }

    pub async fn queue_lifecycle_action(
        &self,
        name: &str,
        action: LifecycleAction,
    ) -> AppResult<Uuid> {
        match action {
            LifecycleAction::Create => self.queue_for_creation(name).await,
            LifecycleAction::Update => self.queue_for_update(name).await,
            LifecycleAction::Refresh => self.queue_for_refresh(name).await,
            LifecycleAction::Recreate => self.queue_for_recreation(name).await,
            LifecycleAction::Delete => self.queue_for_deletion(name).await,
        }
    }

    async fn queue_action(
        &self,
        name: &str,
        status: EnvStatus,
        action: LifecycleAction,
    ) -> AppResult<Uuid> {
        self.registry.set_status(name, status).await?;

        let job = LifecycleJob::new(action, name);
        let job_id = self.queue.enqueue(job).await?;

        tracing::info!(
            environment = %name,
            action = action.as_str(),
            job_id = %job_id,
            "Lifecycle action queued"
        );

        Ok(job_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{NewEnvironment, Protocol};
    use crate::queue::{InMemoryQueue, JobStatus};
    use crate::registry::InMemoryRegistry;

    async fn setup() -> (Arc<InMemoryRegistry>, Arc<InMemoryQueue>, JobScheduler) {
        let registry = Arc::new(InMemoryRegistry::new());
        let queue = Arc::new(InMemoryQueue::new());
        let scheduler = JobScheduler::new(registry.clone(), queue.clone());

        registry
            .insert(&NewEnvironment {
                name: "pr-1".to_string(),
                repository: "git@example.com:acme/app.git".to_string(),
                branch: "feature-x".to_string(),
                sha: "abc123".to_string(),
                protocol: Protocol::Http,
            })
            .await
            .unwrap();

        (registry, queue, scheduler)
    }

    #[tokio::test]
    async fn test_queue_sets_status_and_enqueues() {
        let (registry, queue, scheduler) = setup().await;

        let job_id = scheduler.queue_for_update("pr-1").await.unwrap();

        let env = registry.find_by_name("pr-1").await.unwrap().unwrap();
        assert_eq!(env.status, EnvStatus::Updating);

        let job = queue.get_job(job_id).await.unwrap().unwrap();
        assert_eq!(job.action, LifecycleAction::Update);
        assert_eq!(job.environment, "pr-1");
        assert_eq!(job.status, JobStatus::Pending);
    }

    #[tokio::test]
    async fn test_queue_for_deletion_marks_deleting() {
        let (registry, _queue, scheduler) = setup().await;

        scheduler.queue_for_deletion("pr-1").await.unwrap();

        let env = registry.find_by_name("pr-1").await.unwrap().unwrap();
        assert_eq!(env.status, EnvStatus::Deleting);
    }

    #[tokio::test]
    async fn test_queue_unknown_environment_fails() {
        let (_registry, queue, scheduler) = setup().await;

        let result = scheduler.queue_for_refresh("pr-404").await;
        assert!(result.is_err());
        // No job was enqueued
        assert_eq!(queue.queue_length().await.unwrap(), 0);
    }
}
