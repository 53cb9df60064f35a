use async_trait::async_trait;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, Set,
};
use uuid::Uuid;

use crate::entity::allowed_repository::{
    ActiveModel as RepoActiveModel, Column as RepoColumn, Entity as RepoEntity,
    Model as RepoModel,
};
use crate::entity::environment::{
    self, ActiveModel, Column, Entity as EnvironmentEntity, Model as EnvModel,
};
use crate::error::{AppError, AppResult};
use crate::models::{
    AllowedRepository, DbCredentials, EnvStatus, Environment, NewAllowedRepository,
    NewEnvironment, Protocol,
};
use crate::registry::EnvironmentRegistry;

/// PostgreSQL-backed registry (SeaORM)
#[derive(Clone)]
pub struct PgRegistry {
    db: DatabaseConnection,
}

impl PgRegistry {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    async fn fetch(&self, name: &str) -> AppResult<EnvModel> {
        EnvironmentEntity::find()
            .filter(Column::Name.eq(name))
            .one(&self.db)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Environment '{}'", name)))
    }
}

#[async_trait]
impl EnvironmentRegistry for PgRegistry {
    async fn insert(&self, input: &NewEnvironment) -> AppResult<Environment> {
        let existing = EnvironmentEntity::find()
            .filter(Column::Name.eq(&input.name))
            .one(&self.db)
            .await?;
        if existing.is_some() {
            return Err(AppError::Conflict(format!(
                "Environment '{}'",
                input.name
            )));
        }

        let now = time::OffsetDateTime::now_utc();
        let model = ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(input.name.clone()),
            status: Set(EnvStatus::Creating.as_str().to_string()),
            repository: Set(input.repository.clone()),
            branch: Set(input.branch.clone()),
            sha: Set(input.sha.clone()),
            protocol: Set(input.protocol.as_str().to_string()),
            db_name: Set(None),
            db_user: Set(None),
            db_pass: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
        };

        let result = model.insert(&self.db).await?;
        result.try_into()
    }

    async fn find_by_name(&self, name: &str) -> AppResult<Option<Environment>> {
        let model = EnvironmentEntity::find()
            .filter(Column::Name.eq(name))
            .one(&self.db)
            .await?;

        model.map(|m| m.try_into()).transpose()
    }

    async fn find_by_repo_branch(
        &self,
        repository: &str,
        branch: &str,
    ) -> AppResult<Vec<Environment>> {
        let models = EnvironmentEntity::find()
            .filter(Column::Repository.eq(repository))
            .filter(Column::Branch.eq(branch))
            .order_by_asc(Column::Name)
            .all(&self.db)
            .await?;

        models.into_iter().map(|m| m.try_into()).collect()
    }

    async fn list(&self) -> AppResult<Vec<Environment>> {
        let models = EnvironmentEntity::find()
            .order_by_desc(Column::CreatedAt)
            .all(&self.db)
            .await?;

        models.into_iter().map(|m| m.try_into()).collect()
    }

    async fn count(&self) -> AppResult<u64> {
        let count = EnvironmentEntity::find().count(&self.db).await?;
        Ok(count)
    }

    async fn set_status(&self, name: &str, status: EnvStatus) -> AppResult<Environment> {
        let model = self.fetch(name).await?;
        let mut active: ActiveModel = model.into();
        active.status = Set(status.as_str().to_string());
        active.updated_at = Set(time::OffsetDateTime::now_utc());

        let result = active.update(&self.db).await?;
        result.try_into()
    }

    async fn compare_and_set_status(
        &self,
        name: &str,
        expected: EnvStatus,
        status: EnvStatus,
    ) -> AppResult<bool> {
        let result = EnvironmentEntity::update_many()
            .col_expr(Column::Status, Expr::value(status.as_str()))
            .col_expr(Column::UpdatedAt, Expr::value(time::OffsetDateTime::now_utc()))
            .filter(Column::Name.eq(name))
            .filter(Column::Status.eq(expected.as_str()))
            .exec(&self.db)
            .await?;

        Ok(result.rows_affected > 0)
    }

    async fn set_sha(&self, name: &str, sha: &str) -> AppResult<Environment> {
        let model = self.fetch(name).await?;
        let mut active: ActiveModel = model.into();
        active.sha = Set(sha.to_string());
        active.updated_at = Set(time::OffsetDateTime::now_utc());

        let result = active.update(&self.db).await?;
        result.try_into()
    }

    async fn update_source(
        &self,
        name: &str,
        repository: &str,
        branch: &str,
        sha: &str,
    ) -> AppResult<Environment> {
        let model = self.fetch(name).await?;
        let mut active: ActiveModel = model.into();
        active.repository = Set(repository.to_string());
        active.branch = Set(branch.to_string());
        active.sha = Set(sha.to_string());
        active.updated_at = Set(time::OffsetDateTime::now_utc());

        let result = active.update(&self.db).await?;
        result.try_into()
    }

    async fn set_credentials(
        &self,
        name: &str,
        credentials: &DbCredentials,
    ) -> AppResult<Environment> {
        let model = self.fetch(name).await?;
        let mut active: ActiveModel = model.into();
        active.db_name = Set(Some(credentials.name.clone()));
        active.db_user = Set(Some(credentials.user.clone()));
        active.db_pass = Set(Some(credentials.pass.clone()));
        active.updated_at = Set(time::OffsetDateTime::now_utc());

        let result = active.update(&self.db).await?;
        result.try_into()
    }

    async fn clear_credentials(&self, name: &str) -> AppResult<Environment> {
        let model = self.fetch(name).await?;
        let mut active: ActiveModel = model.into();
        active.db_name = Set(None);
        active.db_user = Set(None);
        active.db_pass = Set(None);
        active.updated_at = Set(time::OffsetDateTime::now_utc());

        let result = active.update(&self.db).await?;
        result.try_into()
    }

    async fn remove(&self, name: &str) -> AppResult<()> {
        let result = EnvironmentEntity::delete_many()
            .filter(Column::Name.eq(name))
            .exec(&self.db)
            .await?;

        if result.rows_affected == 0 {
            return Err(AppError::NotFound(format!("Environment '{}'", name)));
        }

        Ok(())
    }

    async fn repository_allowed(&self, url: &str) -> AppResult<bool> {
        let count = RepoEntity::find()
            .filter(RepoColumn::Url.eq(url))
            .count(&self.db)
            .await?;

        Ok(count > 0)
    }

    async fn insert_allowed_repository(
        &self,
        input: &NewAllowedRepository,
    ) -> AppResult<AllowedRepository> {
        if self.repository_allowed(&input.url).await? {
            return Err(AppError::Conflict(format!("Repository '{}'", input.url)));
        }

        let now = time::OffsetDateTime::now_utc();
        let model = RepoActiveModel {
            id: Set(Uuid::new_v4()),
            url: Set(input.url.clone()),
            allowed_by: Set(input.allowed_by.clone()),
            created_at: Set(now),
            updated_at: Set(now),
        };

        let result = model.insert(&self.db).await?;
        Ok(result.into())
    }

    async fn list_allowed_repositories(&self) -> AppResult<Vec<AllowedRepository>> {
        let models = RepoEntity::find()
            .order_by_asc(RepoColumn::Url)
            .all(&self.db)
            .await?;

        Ok(models.into_iter().map(|m| m.into()).collect())
    }

    async fn remove_allowed_repository(&self, url: &str) -> AppResult<()> {
        let result = RepoEntity::delete_many()
            .filter(RepoColumn::Url.eq(url))
            .exec(&self.db)
            .await?;

        if result.rows_affected == 0 {
            return Err(AppError::NotFound(format!("Repository '{}'", url)));
        }

        Ok(())
    }
}

// Conversions from SeaORM models to our domain models

impl TryFrom<environment::Model> for Environment {
    type Error = AppError;

    fn try_from(m: environment::Model) -> Result<Self, Self::Error> {
        let status = EnvStatus::parse(&m.status)
            .ok_or_else(|| AppError::Database(format!("Unknown status '{}'", m.status)))?;
        let protocol = Protocol::parse(&m.protocol)
            .ok_or_else(|| AppError::Database(format!("Unknown protocol '{}'", m.protocol)))?;

        Ok(Self {
            id: m.id,
            name: m.name,
            status,
            repository: m.repository,
            branch: m.branch,
            sha: m.sha,
            protocol,
            db_name: m.db_name,
            db_user: m.db_user,
            db_pass: m.db_pass,
            created_at: m.created_at,
            updated_at: m.updated_at,
        })
    }
}

impl From<RepoModel> for AllowedRepository {
    fn from(m: RepoModel) -> Self {
        Self {
            id: m.id,
            url: m.url,
            allowed_by: m.allowed_by,
            created_at: m.created_at,
            updated_at: m.updated_at,
        }
    }
}
