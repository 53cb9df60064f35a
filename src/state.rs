use std::sync::Arc;

use redis::aio::ConnectionManager as RedisConnectionManager;
use sea_orm::{ConnectOptions, Database};
use sqlx::postgres::PgPool;

use crate::config::Config;
use crate::queue::{JobQueue, RedisQueue};
use crate::registry::{EnvironmentRegistry, PgRegistry};
use crate::services::LeaseMap;

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    /// Durable store of environment and allow-list records
    pub registry: Arc<dyn EnvironmentRegistry>,
    /// Queue for async lifecycle workflows
    pub job_queue: Arc<dyn JobQueue>,
    /// Per-environment-name workflow leases
    pub leases: LeaseMap,
}

impl AppState {
    /// Create a new AppState by connecting to Postgres and Redis
    pub async fn new(config: Config) -> Result<Self, AppStateError> {
        // Connect to PostgreSQL with SQLx (for migrations)
        let pg_pool = PgPool::connect(&config.database_url)
            .await
            .map_err(|e| AppStateError::Postgres(e.to_string()))?;

        // Run migrations
        sqlx::migrate!("./migrations")
            .run(&pg_pool)
            .await
            .map_err(|e| AppStateError::Migration(e.to_string()))?;

        // Connect to PostgreSQL with SeaORM
        let mut opt = ConnectOptions::new(&config.database_url);
        opt.max_connections(100)
            .min_connections(5)
            .sqlx_logging(true);

        let db = Database::connect(opt)
            .await
            .map_err(|e| AppStateError::Postgres(e.to_string()))?;

        // Connect to Redis
        let redis_client = redis::Client::open(config.redis_url.as_str())
            .map_err(|e| AppStateError::Redis(e.to_string()))?;
        let redis = RedisConnectionManager::new(redis_client)
            .await
            .map_err(|e| AppStateError::Redis(e.to_string()))?;

        let registry: Arc<dyn EnvironmentRegistry> = Arc::new(PgRegistry::new(db));
        let job_queue: Arc<dyn JobQueue> = Arc::new(RedisQueue::new(redis));

        Ok(Self {
            config,
            registry,
            job_queue,
            leases: LeaseMap::new(),
        })
    }

    /// Create AppState from explicit components (for testing)
    pub fn with_parts(
        config: Config,
        registry: Arc<dyn EnvironmentRegistry>,
        job_queue: Arc<dyn JobQueue>,
    ) -> Self {
        Self {
            config,
            registry,
            job_queue,
            leases: LeaseMap::new(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AppStateError {
    #[error("PostgreSQL connection error: {0}")]
    Postgres(String),

    #[error("Migration error: {0}")]
    Migration(String),

    #[error("Redis connection error: {0}")]
    Redis(String),
}
