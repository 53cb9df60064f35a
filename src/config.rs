use std::env;
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct Config {
    // Database
    pub database_url: String,
    pub redis_url: String,

    // Server
    pub host: String,
    pub port: u16,

    // Staging environments
    /// Domain under which environment hostnames live
    /// (environment `pr-42` becomes `pr-42.<domain>`).
    pub domain: String,
    /// Directory holding one checkout per environment.
    pub checkouts_dir: PathBuf,
    /// Directory nginx reads site files from.
    pub nginx_sites_dir: PathBuf,
    /// Directory the app server reads process descriptors from.
    pub uwsgi_apps_dir: PathBuf,
    /// Directory for per-environment unix sockets.
    pub socket_dir: PathBuf,
    /// Baseline data dump imported into every fresh database.
    pub baseline_dump: PathBuf,
    /// Generic service account granted read/write on every database.
    pub db_service_user: String,

    // Workflows
    /// Upper bound for a single provisioning command.
    pub command_timeout_secs: u64,

    /// Token for commit-status notifications; absent disables them.
    pub github_token: Option<String>,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok(); // Load .env file if exists

        Ok(Self {
            // Database
            database_url: env::var("DATABASE_URL")
                .map_err(|_| ConfigError::Missing("DATABASE_URL"))?,
            redis_url: env::var("REDIS_URL").map_err(|_| ConfigError::Missing("REDIS_URL"))?,

            // Server
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: env::var("PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse()
                .map_err(|_| ConfigError::Invalid("PORT"))?,

            // Staging environments
            domain: env::var("STAGING_DOMAIN")
                .map_err(|_| ConfigError::Missing("STAGING_DOMAIN"))?,
            checkouts_dir: env::var("CHECKOUTS_DIR")
                .unwrap_or_else(|_| "/srv/staging/checkouts".to_string())
                .into(),
            nginx_sites_dir: env::var("NGINX_SITES_DIR")
                .unwrap_or_else(|_| "/etc/nginx/sites-enabled".to_string())
                .into(),
            uwsgi_apps_dir: env::var("UWSGI_APPS_DIR")
                .unwrap_or_else(|_| "/etc/uwsgi/apps-enabled".to_string())
                .into(),
            socket_dir: env::var("SOCKET_DIR")
                .unwrap_or_else(|_| "/run/staging".to_string())
                .into(),
            baseline_dump: env::var("BASELINE_DUMP")
                .map_err(|_| ConfigError::Missing("BASELINE_DUMP"))?
                .into(),
            db_service_user: env::var("DB_SERVICE_USER").unwrap_or_else(|_| "staging".to_string()),

            // Workflows
            command_timeout_secs: env::var("COMMAND_TIMEOUT_SECS")
                .unwrap_or_else(|_| "600".to_string())
                .parse()
                .map_err(|_| ConfigError::Invalid("COMMAND_TIMEOUT_SECS"))?,

            github_token: env::var("GITHUB_TOKEN").ok(),
        })
    }

    /// Get server address as "host:port"
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid environment variable: {0}")]
    Invalid(&'static str),
}
