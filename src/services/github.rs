use serde_json::json;

/// Commit state reported to the source-control host
#[derive(Debug, Clone, Copy)]
pub enum CommitState {
    Pending,
    Success,
    Error,
}

impl CommitState {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Success => "success",
            Self::Error => "error",
        }
    }
}

/// Publishes commit statuses for the revision a workflow is acting
/// on. Notifications are advisory: failures are logged, never
/// propagated into the workflow.
#[derive(Clone)]
pub struct StatusNotifier {
    http: reqwest::Client,
    token: String,
}

impl StatusNotifier {
    /// Returns None when no token is configured, which disables
    /// notifications entirely.
    pub fn from_token(token: Option<String>) -> Option<Self> {
        token.map(|token| Self {
            http: reqwest::Client::new(),
            token,
        })
    }

    pub async fn pending(&self, repository: &str, sha: &str) {
        self.publish(
            repository,
            sha,
            CommitState::Pending,
            "Stagehand is updating the environment.",
            None,
        )
        .await;
    }

    pub async fn success(&self, repository: &str, sha: &str, environment_url: &str) {
        self.publish(
            repository,
            sha,
            CommitState::Success,
            "Stagehand has created a staging environment.",
            Some(environment_url),
        )
        .await;
    }

    pub async fn error(&self, repository: &str, sha: &str) {
        self.publish(
            repository,
            sha,
            CommitState::Error,
            "Stagehand failed to update the environment.",
            None,
        )
        .await;
    }

    async fn publish(
        &self,
        repository: &str,
        sha: &str,
        state: CommitState,
        description: &str,
        target_url: Option<&str>,
    ) {
        let Some(slug) = repo_slug(repository) else {
            tracing::warn!(repository = %repository, "Cannot derive repo slug; skipping commit status");
            return;
        };

        let url = format!("https://api.github.com/repos/{}/statuses/{}", slug, sha);
        let mut payload = json!({
            "state": state.as_str(),
            "description": description,
            "context": "stagehand-pr",
        });
        if let Some(target) = target_url {
            payload["target_url"] = json!(target);
        }

        let result = self
            .http
            .post(&url)
            .header("Authorization", format!("token {}", self.token))
            .header("User-Agent", "stagehand")
            .json(&payload)
            .send()
            .await;

        match result {
            Ok(response) if response.status().is_success() => {
                tracing::debug!(sha = %sha, state = state.as_str(), "Commit status published");
            }
            Ok(response) => {
                tracing::warn!(sha = %sha, status = %response.status(), "Commit status rejected");
            }
            Err(e) => {
                tracing::warn!(sha = %sha, error = %e, "Commit status request failed");
            }
        }
    }
}

/// Extract `owner/repo` from an ssh clone URL like
/// `git@github.com:owner/repo.git`.
fn repo_slug(ssh_url: &str) -> Option<&str> {
    let after_colon = ssh_url.split_once(':')?.1;
    Some(after_colon.strip_suffix(".git").unwrap_or(after_colon))
}
