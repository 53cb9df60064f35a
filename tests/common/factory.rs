use stagehand::models::{
    AllowedRepository, Environment, NewAllowedRepository, NewEnvironment, Protocol,
};
use stagehand::state::AppState;

/// Seeds registry records directly, bypassing the HTTP surface
pub struct Factory<'a> {
    state: &'a AppState,
}

impl<'a> Factory<'a> {
    pub fn new(state: &'a AppState) -> Self {
        Self { state }
    }

    pub async fn allow_repository(&self, url: &str) -> AllowedRepository {
        self.state
            .registry
            .insert_allowed_repository(&NewAllowedRepository {
                url: url.to_string(),
                allowed_by: "alex".to_string(),
            })
            .await
            .expect("Failed to allow repository")
    }

    pub async fn create_environment(
        &self,
        name: &str,
        repository: &str,
        branch: &str,
        sha: &str,
    ) -> Environment {
        self.state
            .registry
            .insert(&NewEnvironment {
                name: name.to_string(),
                repository: repository.to_string(),
                branch: branch.to_string(),
                sha: sha.to_string(),
                protocol: Protocol::Http,
            })
            .await
            .expect("Failed to create environment")
    }
}
