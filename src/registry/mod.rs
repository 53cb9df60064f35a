pub mod memory;
pub mod postgres;

pub use memory::InMemoryRegistry;
pub use postgres::PgRegistry;

use async_trait::async_trait;

use crate::error::AppResult;
use crate::models::{
    AllowedRepository, DbCredentials, EnvStatus, Environment, NewAllowedRepository, NewEnvironment,
};

/// Durable store of Environment and AllowedRepository records.
///
/// The dispatcher and orchestrator hold only transient references by
/// name and re-fetch current state before mutating. Status writes use
/// [`compare_and_set_status`](EnvironmentRegistry::compare_and_set_status)
/// so a stale workflow never clobbers a newer transition.
#[async_trait]
pub trait EnvironmentRegistry: Send + Sync {
    /// Insert a new environment record; Conflict if the name exists.
    async fn insert(&self, input: &NewEnvironment) -> AppResult<Environment>;

    async fn find_by_name(&self, name: &str) -> AppResult<Option<Environment>>;

    /// All environments tracking the given (repository, branch) pair.
    async fn find_by_repo_branch(
        &self,
        repository: &str,
        branch: &str,
    ) -> AppResult<Vec<Environment>>;

    async fn list(&self) -> AppResult<Vec<Environment>>;

    async fn count(&self) -> AppResult<u64>;

    async fn set_status(&self, name: &str, status: EnvStatus) -> AppResult<Environment>;

    /// Set status only if the current status matches `expected`.
    /// Returns whether the swap happened.
    async fn compare_and_set_status(
        &self,
        name: &str,
        expected: EnvStatus,
        status: EnvStatus,
    ) -> AppResult<bool>;

    async fn set_sha(&self, name: &str, sha: &str) -> AppResult<Environment>;

    /// Point an existing record at a new repository/branch/sha
    /// (a pull request re-opened against a surviving record).
    async fn update_source(
        &self,
        name: &str,
        repository: &str,
        branch: &str,
        sha: &str,
    ) -> AppResult<Environment>;

    async fn set_credentials(
        &self,
        name: &str,
        credentials: &DbCredentials,
    ) -> AppResult<Environment>;

    async fn clear_credentials(&self, name: &str) -> AppResult<Environment>;

    async fn remove(&self, name: &str) -> AppResult<()>;

    // Allow-list

    async fn repository_allowed(&self, url: &str) -> AppResult<bool>;

    async fn insert_allowed_repository(
        &self,
        input: &NewAllowedRepository,
    ) -> AppResult<AllowedRepository>;

    async fn list_allowed_repositories(&self) -> AppResult<Vec<AllowedRepository>>;

    async fn remove_allowed_repository(&self, url: &str) -> AppResult<()>;
}
