use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::{
    AllowedRepository, DbCredentials, EnvStatus, Environment, NewAllowedRepository,
    NewEnvironment,
};
use crate::registry::EnvironmentRegistry;

/// In-memory registry for unit testing
#[derive(Clone, Default)]
pub struct InMemoryRegistry {
    inner: Arc<Mutex<InMemoryRegistryInner>>,
}

#[derive(Default)]
struct InMemoryRegistryInner {
    environments: HashMap<String, Environment>,
    repositories: HashMap<String, AllowedRepository>,
}

impl InMemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl EnvironmentRegistry for InMemoryRegistry {
    async fn insert(&self, input: &NewEnvironment) -> AppResult<Environment> {
        let mut inner = self.inner.lock().await;
        if inner.environments.contains_key(&input.name) {
            return Err(AppError::Conflict(format!("Environment '{}'", input.name)));
        }

        let now = time::OffsetDateTime::now_utc();
        let env = Environment {
            id: Uuid::new_v4(),
            name: input.name.clone(),
            status: EnvStatus::Creating,
            repository: input.repository.clone(),
            branch: input.branch.clone(),
            sha: input.sha.clone(),
            protocol: input.protocol,
            db_name: None,
            db_user: None,
            db_pass: None,
            created_at: now,
            updated_at: now,
        };
        inner.environments.insert(env.name.clone(), env.clone());
        Ok(env)
    }

    async fn find_by_name(&self, name: &str) -> AppResult<Option<Environment>> {
        let inner = self.inner.lock().await;
        Ok(inner.environments.get(name).cloned())
    }

    async fn find_by_repo_branch(
        &self,
        repository: &str,
        branch: &str,
    ) -> AppResult<Vec<Environment>> {
        let inner = self.inner.lock().await;
        let mut matches: Vec<Environment> = inner
            .environments
            .values()
            .filter(|e| e.repository == repository && e.branch == branch)
            .cloned()
            .collect();
        matches.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(matches)
    }

    async fn list(&self) -> AppResult<Vec<Environment>> {
        let inner = self.inner.lock().await;
        let mut all: Vec<Environment> = inner.environments.values().cloned().collect();
        all.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(all)
    }

    async fn count(&self) -> AppResult<u64> {
        let inner = self.inner.lock().await;
        Ok(inner.environments.len() as u64)
    }

    async fn set_status(&self, name: &str, status: EnvStatus) -> AppResult<Environment> {
        let mut inner = self.inner.lock().await;
        let env = inner
            .environments
            .get_mut(name)
            .ok_or_else(|| AppError::NotFound(format!("Environment '{}'", name)))?;
        env.status = status;
        env.updated_at = time::OffsetDateTime::now_utc();
        Ok(env.clone())
    }

    async fn compare_and_set_status(
        &self,
        name: &str,
        expected: EnvStatus,
        status: EnvStatus,
    ) -> AppResult<bool> {
        let mut inner = self.inner.lock().await;
        let env = inner
            .environments
            .get_mut(name)
            .ok_or_else(|| AppError::NotFound(format!("Environment '{}'", name)))?;
        if env.status != expected {
            return Ok(false);
        }
        env.status = status;
        env.updated_at = time::OffsetDateTime::now_utc();
        Ok(true)
    }

    async fn set_sha(&self, name: &str, sha: &str) -> AppResult<Environment> {
        let mut inner = self.inner.lock().await;
        let env = inner
            .environments
            .get_mut(name)
            .ok_or_else(|| AppError::NotFound(format!("Environment '{}'", name)))?;
        env.sha = sha.to_string();
        env.updated_at = time::OffsetDateTime::now_utc();
        Ok(env.clone())
    }

    async fn update_source(
        &self,
        name: &str,
        repository: &str,
        branch: &str,
        sha: &str,
    ) -> AppResult<Environment> {
        let mut inner = self.inner.lock().await;
        let env = inner
            .environments
            .get_mut(name)
            .ok_or_else(|| AppError::NotFound(format!("Environment '{}'", name)))?;
        env.repository = repository.to_string();
        env.branch = branch.to_string();
        env.sha = sha.to_string();
        env.updated_at = time::OffsetDateTime::now_utc();
        Ok(env.clone())
    }

    async fn set_credentials(
        &self,
        name: &str,
        credentials: &DbCredentials,
    ) -> AppResult<Environment> {
        let mut inner = self.inner.lock().await;
        let env = inner
            .environments
            .get_mut(name)
            .ok_or_else(|| AppError::NotFound(format!("Environment '{}'", name)))?;
        env.db_name = Some(credentials.name.clone());
        env.db_user = Some(credentials.user.clone());
        env.db_pass = Some(credentials.pass.clone());
        env.updated_at = time::OffsetDateTime::now_utc();
        Ok(env.clone())
    }

    async fn clear_credentials(&self, name: &str) -> AppResult<Environment> {
        let mut inner = self.inner.lock().await;
        let env = inner
            .environments
            .get_mut(name)
            .ok_or_else(|| AppError::NotFound(format!("Environment '{}'", name)))?;
        env.db_name = None;
        env.db_user = None;
        env.db_pass = None;
        env.updated_at = time::OffsetDateTime::now_utc();
        Ok(env.clone())
    }

    async fn remove(&self, name: &str) -> AppResult<()> {
        let mut inner = self.inner.lock().await;
        inner
            .environments
            .remove(name)
            .ok_or_else(|| AppError::NotFound(format!("Environment '{}'", name)))?;
        Ok(())
    }

    async fn repository_allowed(&self, url: &str) -> AppResult<bool> {
        let inner = self.inner.lock().await;
        Ok(inner.repositories.contains_key(url))
    }

    async fn insert_allowed_repository(
        &self,
        input: &NewAllowedRepository,
    ) -> AppResult<AllowedRepository> {
        let mut inner = self.inner.lock().await;
        if inner.repositories.contains_key(&input.url) {
            return Err(AppError::Conflict(format!("Repository '{}'", input.url)));
        }

        let now = time::OffsetDateTime::now_utc();
        let repo = AllowedRepository {
            id: Uuid::new_v4(),
            url: input.url.clone(),
            allowed_by: input.allowed_by.clone(),
            created_at: now,
            updated_at: now,
        };
        inner.repositories.insert(repo.url.clone(), repo.clone());
        Ok(repo)
    }

    async fn list_allowed_repositories(&self) -> AppResult<Vec<AllowedRepository>> {
        let inner = self.inner.lock().await;
        let mut all: Vec<AllowedRepository> = inner.repositories.values().cloned().collect();
        all.sort_by(|a, b| a.url.cmp(&b.url));
        Ok(all)
    }

    async fn remove_allowed_repository(&self, url: &str) -> AppResult<()> {
        let mut inner = self.inner.lock().await;
        inner
            .repositories
            .remove(url)
            .ok_or_else(|| AppError::NotFound(format!("Repository '{}'", url)))?;
        Ok(())
    }
}
