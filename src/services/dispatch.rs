use serde::Deserialize;
use std::sync::Arc;

use crate::error::{AppError, AppResult};
use crate::models::{environment_name_for_pr, NewEnvironment, Protocol};
use crate::registry::EnvironmentRegistry;
use crate::services::scheduler::JobScheduler;

/// Synchronous outcome reported to the webhook caller. Rejections
/// and ignores are outcomes, not errors: the caller still gets a
/// 200 with a human-readable reason.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Ok,
    Ignored(String),
    Rejected(String),
}

impl Outcome {
    pub fn message(&self) -> &str {
        match self {
            Self::Ok => "OK",
            Self::Ignored(reason) | Self::Rejected(reason) => reason,
        }
    }
}

// Webhook payload shapes; a missing field is a malformed payload,
// answered with a 4xx rather than taking the process down.

#[derive(Debug, Deserialize)]
struct PullRequestPayload {
    action: String,
    number: u64,
    pull_request: PullRequestDetail,
}

#[derive(Debug, Deserialize)]
struct PullRequestDetail {
    head: PullRequestHead,
}

#[derive(Debug, Deserialize)]
struct PullRequestHead {
    repo: RepoRef,
    #[serde(rename = "ref")]
    git_ref: String,
    sha: String,
}

#[derive(Debug, Deserialize)]
struct RepoRef {
    ssh_url: String,
}

#[derive(Debug, Deserialize)]
struct PushPayload {
    #[serde(rename = "ref")]
    git_ref: String,
    after: String,
    repository: RepoRef,
}

/// Validates and maps inbound webhook events to lifecycle actions.
/// Side effects are delegated entirely to the scheduler's `queue_for_*`
/// actions; nothing here runs a provisioning step, so the webhook
/// path stays short and synchronous.
#[derive(Clone)]
pub struct EventDispatcher {
    registry: Arc<dyn EnvironmentRegistry>,
    scheduler: JobScheduler,
}

impl EventDispatcher {
    pub fn new(registry: Arc<dyn EnvironmentRegistry>, scheduler: JobScheduler) -> Self {
        Self { registry, scheduler }
    }

    pub async fn handle(&self, event_kind: &str, body: &[u8]) -> AppResult<Outcome> {
        match event_kind {
            "pull_request" => self.handle_pull_request(body).await,
            "push" => self.handle_push(body).await,
            other => Ok(Outcome::Ignored(format!("{} event ignored.", other))),
        }
    }

    async fn handle_pull_request(&self, body: &[u8]) -> AppResult<Outcome> {
        let payload: PullRequestPayload = serde_json::from_slice(body)
            .map_err(|e| AppError::MalformedPayload(e.to_string()))?;

        let repo = payload.pull_request.head.repo.ssh_url;
        let branch = branch_name_from_ref(&payload.pull_request.head.git_ref).to_string();
        let sha = payload.pull_request.head.sha;
        let number = payload.number;

        // Filtering at creation time: every pull-request event is
        // gated on the allow-list.
        if !self.registry.repository_allowed(&repo).await? {
            return Ok(Outcome::Rejected(format!(
                "Repository {} is not allowed. Ignored.",
                repo
            )));
        }

        match payload.action.as_str() {
            "opened" | "reopened" => self.opened_pull_request(number, repo, branch, sha).await,
            "closed" => self.closed_pull_request(number).await,
            action => Ok(Outcome::Ignored(format!(
                "{} action on PR {} ignored.",
                action, number
            ))),
        }
    }

    async fn opened_pull_request(
        &self,
        number: u64,
        repo: String,
        branch: String,
        sha: String,
    ) -> AppResult<Outcome> {
        let name = environment_name_for_pr(number);

        match self.registry.find_by_name(&name).await? {
            // Re-opened before a prior teardown completed: recreate
            // in place rather than erroring on the duplicate.
            Some(_) => {
                tracing::info!(environment = %name, "Record already exists; recreating in place");
                self.registry
                    .update_source(&name, &repo, &branch, &sha)
                    .await?;
                self.scheduler.queue_for_recreation(&name).await?;
            }
            None => {
                self.registry
                    .insert(&NewEnvironment {
                        name: name.clone(),
                        repository: repo,
                        branch,
                        sha,
                        protocol: Protocol::Http,
                    })
                    .await?;
                self.scheduler.queue_for_creation(&name).await?;
            }
        }

        Ok(Outcome::Ok)
    }

    async fn closed_pull_request(&self, number: u64) -> AppResult<Outcome> {
        let name = environment_name_for_pr(number);

        if self.registry.find_by_name(&name).await?.is_none() {
            return Ok(Outcome::Rejected(format!(
                "Environment {} not found. Ignored.",
                name
            )));
        }

        self.scheduler.queue_for_deletion(&name).await?;
        Ok(Outcome::Ok)
    }

    async fn handle_push(&self, body: &[u8]) -> AppResult<Outcome> {
        let payload: PushPayload = serde_json::from_slice(body)
            .map_err(|e| AppError::MalformedPayload(e.to_string()))?;

        let repo = payload.repository.ssh_url;
        let branch = branch_name_from_ref(&payload.git_ref).to_string();
        let sha = payload.after;

        let environments = self.registry.find_by_repo_branch(&repo, &branch).await?;
        if environments.is_empty() {
            return Ok(Outcome::Ignored(format!(
                "Ignoring, no environment found for repo {} and branch {}.",
                repo, branch
            )));
        }

        for env in environments {
            self.registry.set_sha(&env.name, &sha).await?;
            self.scheduler.queue_for_update(&env.name).await?;
        }

        Ok(Outcome::Ok)
    }
}

/// Branch name from a ref string. A fully-qualified ref such as
/// `refs/heads/feature-x` yields its third slash-delimited segment; a
/// bare branch name passes through unchanged. Both webhook event
/// kinds are normalized through this one function.
pub fn branch_name_from_ref(git_ref: &str) -> &str {
    if git_ref.matches('/').count() < 2 {
        return git_ref;
    }
    git_ref.split('/').nth(2).unwrap_or(git_ref)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_branch_name_from_qualified_ref() {
        assert_eq!(branch_name_from_ref("refs/heads/feature-x"), "feature-x");
        assert_eq!(branch_name_from_ref("refs/heads/main"), "main");
    }

    #[test]
    fn test_branch_name_from_bare_name() {
        assert_eq!(branch_name_from_ref("feature-x"), "feature-x");
        assert_eq!(branch_name_from_ref("a/b"), "a/b");
    }

    #[test]
    fn test_outcome_messages() {
        assert_eq!(Outcome::Ok.message(), "OK");
        assert_eq!(
            Outcome::Ignored("x event ignored.".to_string()).message(),
            "x event ignored."
        );
    }
}
