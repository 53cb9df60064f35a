use std::sync::Arc;
use std::time::Duration;

use stagehand::error::AppResult;
use stagehand::queue::LifecycleJob;
use stagehand::services::{LifecycleOrchestrator, ShellRunner, StatusNotifier};
use stagehand::state::AppState;

/// Job executor that runs lifecycle workflows
pub struct JobExecutor {
    orchestrator: LifecycleOrchestrator,
}

impl JobExecutor {
    pub fn new(state: Arc<AppState>) -> Self {
        let runner = Arc::new(ShellRunner::new(Duration::from_secs(
            state.config.command_timeout_secs,
        )));
        let notifier = StatusNotifier::from_token(state.config.github_token.clone());

        let orchestrator = LifecycleOrchestrator::new(
            state.registry.clone(),
            runner,
            state.leases.clone(),
            notifier,
            &state.config,
        );

        Self { orchestrator }
    }

    /// Execute a job against the environment it names
    pub async fn execute(&self, job: LifecycleJob) -> AppResult<()> {
        self.orchestrator.run(job.action, &job.environment).await
    }
}
