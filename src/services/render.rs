use std::path::{Path, PathBuf};

use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::models::{DbCredentials, Environment};

const UWSGI_PROCESSES: u32 = 2;
const UWSGI_THREADS: u32 = 4;

/// Renders the per-environment configuration artifacts: the nginx
/// site file, the uwsgi process descriptor and the database client
/// credentials file. All three are keyed by environment name and
/// written as whole-file replacements, so repeated renders are
/// idempotent and order-independent.
#[derive(Clone)]
pub struct ConfigRenderer {
    domain: String,
    checkouts_dir: PathBuf,
    nginx_sites_dir: PathBuf,
    uwsgi_apps_dir: PathBuf,
    socket_dir: PathBuf,
}

impl ConfigRenderer {
    pub fn new(config: &Config) -> Self {
        Self {
            domain: config.domain.clone(),
            checkouts_dir: config.checkouts_dir.clone(),
            nginx_sites_dir: config.nginx_sites_dir.clone(),
            uwsgi_apps_dir: config.uwsgi_apps_dir.clone(),
            socket_dir: config.socket_dir.clone(),
        }
    }

    // Path layout, all keyed by environment name

    pub fn checkout_dir(&self, name: &str) -> PathBuf {
        self.checkouts_dir.join(name)
    }

    pub fn venv_dir(&self, name: &str) -> PathBuf {
        self.checkout_dir(name).join("venv")
    }

    pub fn static_dir(&self, name: &str) -> PathBuf {
        self.checkout_dir(name).join("static")
    }

    pub fn socket_path(&self, name: &str) -> PathBuf {
        self.socket_dir.join(format!("{}.sock", name))
    }

    pub fn nginx_site_path(&self, name: &str) -> PathBuf {
        self.nginx_sites_dir.join(format!("{}.conf", name))
    }

    pub fn uwsgi_descriptor_path(&self, name: &str) -> PathBuf {
        self.uwsgi_apps_dir.join(format!("{}.ini", name))
    }

    pub fn database_config_path(&self, name: &str) -> PathBuf {
        self.checkout_dir(name).join("database.conf")
    }

    // Artifact contents

    /// Reverse-proxy site file binding the environment's hostname and
    /// static path to the upstream unix socket.
    pub fn nginx_site(&self, env: &Environment) -> String {
        format!(
            r#"# Site file managed by stagehand; do not edit manually.
# Deleting the environment removes this file.

upstream {name} {{
    server unix://{socket};
}}

server {{
    listen          8000;
    server_name     {host_name};
    charset         utf-8;

    client_max_body_size 75M;

    location /static {{
        alias {static_dir};
    }}

    location / {{
        uwsgi_pass  {name};

        uwsgi_param  QUERY_STRING       $query_string;
        uwsgi_param  REQUEST_METHOD     $request_method;
        uwsgi_param  CONTENT_TYPE       $content_type;
        uwsgi_param  CONTENT_LENGTH     $content_length;
        uwsgi_param  REQUEST_URI        $request_uri;
        uwsgi_param  PATH_INFO          $document_uri;
        uwsgi_param  DOCUMENT_ROOT      $document_root;
        uwsgi_param  SERVER_PROTOCOL    $server_protocol;
        uwsgi_param  REQUEST_SCHEME     $scheme;
        uwsgi_param  HTTPS              $https if_not_empty;
        uwsgi_param  REMOTE_ADDR        $remote_addr;
        uwsgi_param  REMOTE_PORT       $remote_port;
        uwsgi_param  SERVER_PORT        $server_port;
        uwsgi_param  SERVER_NAME        $server_name;
    }}
}}
"#,
            name = env.name,
            socket = self.socket_path(&env.name).display(),
            host_name = env.host(&self.domain),
            static_dir = self.static_dir(&env.name).display(),
        )
    }

    /// App-server process descriptor: virtualenv, working directory,
    /// socket and process/thread counts.
    pub fn uwsgi_descriptor(&self, env: &Environment) -> String {
        format!(
            r#"[uwsgi]
# Descriptor managed by stagehand; do not edit manually.
chdir = {checkout}
home = {venv}
module = wsgi:application
socket = {socket}
chmod-socket = 664
processes = {processes}
threads = {threads}
vacuum = true
"#,
            checkout = self.checkout_dir(&env.name).display(),
            venv = self.venv_dir(&env.name).display(),
            socket = self.socket_path(&env.name).display(),
            processes = UWSGI_PROCESSES,
            threads = UWSGI_THREADS,
        )
    }

    /// Database client credentials file placed inside the checkout.
    pub fn database_config(&self, creds: &DbCredentials) -> String {
        format!(
            r#"[database]
# Credentials file managed by stagehand; do not edit manually.
name = {name}
user = {user}
password = {pass}
host = localhost
port = 5432
"#,
            name = creds.name,
            user = creds.user,
            pass = creds.pass,
        )
    }

    // File operations

    pub async fn write_nginx_site(&self, env: &Environment) -> AppResult<PathBuf> {
        let path = self.nginx_site_path(&env.name);
        atomic_write(&path, &self.nginx_site(env)).await?;
        Ok(path)
    }

    pub async fn write_uwsgi_descriptor(&self, env: &Environment) -> AppResult<PathBuf> {
        let path = self.uwsgi_descriptor_path(&env.name);
        atomic_write(&path, &self.uwsgi_descriptor(env)).await?;
        Ok(path)
    }

    pub async fn write_database_config(
        &self,
        env: &Environment,
        creds: &DbCredentials,
    ) -> AppResult<PathBuf> {
        let path = self.database_config_path(&env.name);
        atomic_write(&path, &self.database_config(creds)).await?;
        Ok(path)
    }

    pub async fn remove_nginx_site(&self, name: &str) -> AppResult<()> {
        remove_if_exists(&self.nginx_site_path(name)).await
    }

    pub async fn remove_uwsgi_descriptor(&self, name: &str) -> AppResult<()> {
        remove_if_exists(&self.uwsgi_descriptor_path(name)).await
    }
}

/// Whole-file replacement: write a sibling temp file, then rename
/// over the target.
async fn atomic_write(path: &Path, contents: &str) -> AppResult<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| AppError::Internal(format!("Failed to create {}: {}", parent.display(), e)))?;
    }
    let tmp = path.with_extension("tmp");
    tokio::fs::write(&tmp, contents)
        .await
        .map_err(|e| AppError::Internal(format!("Failed to write {}: {}", tmp.display(), e)))?;
    tokio::fs::rename(&tmp, path)
        .await
        .map_err(|e| AppError::Internal(format!("Failed to replace {}: {}", path.display(), e)))?;
    Ok(())
}

/// Removal tolerating an already-absent file, so teardown steps stay
/// individually idempotent.
async fn remove_if_exists(path: &Path) -> AppResult<()> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(AppError::Internal(format!(
            "Failed to remove {}: {}",
            path.display(),
            e
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{EnvStatus, Protocol};
    use time::OffsetDateTime;
    use uuid::Uuid;

    fn test_config(base: &Path) -> Config {
        Config {
            database_url: "postgres://localhost/test".to_string(),
            redis_url: "redis://localhost".to_string(),
            host: "127.0.0.1".to_string(),
            port: 0,
            domain: "staging.example.com".to_string(),
            checkouts_dir: base.join("checkouts"),
            nginx_sites_dir: base.join("nginx"),
            uwsgi_apps_dir: base.join("uwsgi"),
            socket_dir: base.join("run"),
            baseline_dump: base.join("baseline.dump"),
            db_service_user: "staging".to_string(),
            command_timeout_secs: 600,
            github_token: None,
        }
    }

    fn test_env(name: &str) -> Environment {
        Environment {
            id: Uuid::new_v4(),
            name: name.to_string(),
            status: EnvStatus::Creating,
            repository: "git@example.com:acme/app.git".to_string(),
            branch: "feature-x".to_string(),
            sha: "abc123".to_string(),
            protocol: Protocol::Http,
            db_name: None,
            db_user: None,
            db_pass: None,
            created_at: OffsetDateTime::now_utc(),
            updated_at: OffsetDateTime::now_utc(),
        }
    }

    fn temp_base() -> PathBuf {
        std::env::temp_dir().join(format!("stagehand-test-{}", Uuid::new_v4()))
    }

    #[test]
    fn test_paths_keyed_by_name() {
        let base = temp_base();
        let renderer = ConfigRenderer::new(&test_config(&base));

        assert!(renderer
            .nginx_site_path("pr-42")
            .ends_with("nginx/pr-42.conf"));
        assert!(renderer
            .uwsgi_descriptor_path("pr-42")
            .ends_with("uwsgi/pr-42.ini"));
        assert!(renderer
            .database_config_path("pr-42")
            .ends_with("checkouts/pr-42/database.conf"));
    }

    #[test]
    fn test_nginx_site_contents() {
        let base = temp_base();
        let renderer = ConfigRenderer::new(&test_config(&base));
        let env = test_env("pr-42");

        let site = renderer.nginx_site(&env);
        assert!(site.contains("server_name     pr-42.staging.example.com;"));
        assert!(site.contains("pr-42.sock"));
        assert!(site.contains("location /static"));
        assert!(site.contains("uwsgi_param  REQUEST_METHOD"));
    }

    #[test]
    fn test_uwsgi_descriptor_contents() {
        let base = temp_base();
        let renderer = ConfigRenderer::new(&test_config(&base));
        let env = test_env("pr-42");

        let ini = renderer.uwsgi_descriptor(&env);
        assert!(ini.contains("[uwsgi]"));
        assert!(ini.ends_with("vacuum = true\n"));
        assert!(ini.contains(&format!("home = {}", renderer.venv_dir("pr-42").display())));
    }

    #[test]
    fn test_database_config_contents() {
        let base = temp_base();
        let renderer = ConfigRenderer::new(&test_config(&base));
        let creds = DbCredentials {
            name: "dbxyzabc".to_string(),
            user: "usrxyzab".to_string(),
            pass: "s3cretS3cretAbcd".to_string(),
        };

        let conf = renderer.database_config(&creds);
        assert!(conf.contains("name = dbxyzabc"));
        assert!(conf.contains("user = usrxyzab"));
        assert!(conf.contains("password = s3cretS3cretAbcd"));
    }

    #[tokio::test]
    async fn test_write_is_idempotent() {
        let base = temp_base();
        let config = test_config(&base);
        tokio::fs::create_dir_all(&config.nginx_sites_dir)
            .await
            .unwrap();
        let renderer = ConfigRenderer::new(&config);
        let env = test_env("pr-42");

        let path = renderer.write_nginx_site(&env).await.unwrap();
        let first = tokio::fs::read_to_string(&path).await.unwrap();

        // Repeat render replaces the whole file with identical contents
        renderer.write_nginx_site(&env).await.unwrap();
        let second = tokio::fs::read_to_string(&path).await.unwrap();
        assert_eq!(first, second);

        tokio::fs::remove_dir_all(&base).await.unwrap();
    }

    #[tokio::test]
    async fn test_remove_tolerates_absence() {
        let base = temp_base();
        let config = test_config(&base);
        tokio::fs::create_dir_all(&config.nginx_sites_dir)
            .await
            .unwrap();
        let renderer = ConfigRenderer::new(&config);

        // Nothing was ever written for this name
        renderer.remove_nginx_site("pr-404").await.unwrap();
        renderer.remove_nginx_site("pr-404").await.unwrap();

        tokio::fs::remove_dir_all(&base).await.unwrap();
    }
}
