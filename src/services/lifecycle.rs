use std::path::PathBuf;
use std::sync::Arc;

use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::models::{validate_environment_name, DbCredentials, EnvStatus, Environment};
use crate::queue::LifecycleAction;
use crate::registry::EnvironmentRegistry;
use crate::services::command::{CommandRunner, CommandSpec};
use crate::services::credentials;
use crate::services::github::StatusNotifier;
use crate::services::lease::LeaseMap;
use crate::services::render::ConfigRenderer;

/// Owns the provisioning/teardown workflows and every status
/// transition. Statuses are mutated here and nowhere else once a job
/// is dequeued; external code only reads them.
///
/// Collaborators are injected at construction; there is no ambient
/// queue or registry state.
pub struct LifecycleOrchestrator {
    registry: Arc<dyn EnvironmentRegistry>,
    runner: Arc<dyn CommandRunner>,
    renderer: ConfigRenderer,
    leases: LeaseMap,
    notifier: Option<StatusNotifier>,
    domain: String,
    baseline_dump: PathBuf,
    db_service_user: String,
}

impl LifecycleOrchestrator {
    pub fn new(
        registry: Arc<dyn EnvironmentRegistry>,
        runner: Arc<dyn CommandRunner>,
        leases: LeaseMap,
        notifier: Option<StatusNotifier>,
        config: &Config,
    ) -> Self {
        Self {
            registry,
            runner,
            renderer: ConfigRenderer::new(config),
            leases,
            notifier,
            domain: config.domain.clone(),
            baseline_dump: config.baseline_dump.clone(),
            db_service_user: config.db_service_user.clone(),
        }
    }

    /// Execute one workflow for one environment, holding the
    /// per-name lease for the whole run. At most one workflow runs
    /// per environment name at any time; later jobs for the same
    /// name wait here.
    pub async fn run(&self, action: LifecycleAction, name: &str) -> AppResult<()> {
        let _lease = self.leases.acquire(name).await;

        // Re-fetch under the lease; a cached record could be stale.
        let env = match self.registry.find_by_name(name).await? {
            Some(env) => env,
            None if action == LifecycleAction::Delete => {
                // Teardown of an already-removed record is a no-op
                tracing::warn!(environment = %name, "Delete requested for missing record; nothing to do");
                return Ok(());
            }
            None => return Err(AppError::NotFound(format!("Environment '{}'", name))),
        };

        tracing::info!(
            environment = %name,
            action = action.as_str(),
            status = env.status.as_str(),
            "Workflow started"
        );

        if action != LifecycleAction::Delete {
            if let Some(notifier) = &self.notifier {
                notifier.pending(&env.repository, &env.sha).await;
            }
        }

        let in_flight = env.status;
        let result = match action {
            LifecycleAction::Create => self.do_create(&env).await,
            LifecycleAction::Update => self.do_update(&env).await,
            LifecycleAction::Refresh => self.do_refresh(&env).await,
            LifecycleAction::Recreate => self.do_recreate(&env).await,
            LifecycleAction::Delete => self.do_delete(&env).await,
        };

        match &result {
            Ok(()) => {
                if action != LifecycleAction::Delete {
                    // A failed swap means another action was queued
                    // meanwhile; its workflow owns the status now.
                    let swapped = self
                        .registry
                        .compare_and_set_status(name, in_flight, EnvStatus::Active)
                        .await?;
                    if !swapped {
                        tracing::warn!(environment = %name, "Status changed during workflow; not marking active");
                    }

                    if let Some(notifier) = &self.notifier {
                        let url = env.url(&self.domain);
                        notifier.success(&env.repository, &env.sha, &url).await;
                    }
                }
                tracing::info!(environment = %name, action = action.as_str(), "Workflow finished");
            }
            Err(e) => {
                // Leave the in-flight status in place: a stale
                // Creating/Updating marker is the operator's signal.
                tracing::error!(
                    environment = %name,
                    action = action.as_str(),
                    error = %e,
                    "Workflow failed; status left in-flight"
                );
                if action != LifecycleAction::Delete {
                    if let Some(notifier) = &self.notifier {
                        notifier.error(&env.repository, &env.sha).await;
                    }
                }
            }
        }

        result
    }

    // Workflows

    /// checkout, dependency environment, database with fresh
    /// credentials and baseline data, config files, migrations,
    /// static assets, reverse proxy.
    async fn do_create(&self, env: &Environment) -> AppResult<()> {
        if !validate_environment_name(&env.name) {
            return Err(AppError::Validation(format!(
                "Invalid environment name '{}'",
                env.name
            )));
        }

        let checkout = self.renderer.checkout_dir(&env.name);
        tokio::fs::create_dir_all(&checkout)
            .await
            .map_err(|e| AppError::step("checkout", e.to_string()))?;

        self.step(
            "checkout",
            CommandSpec::new(format!(
                "git clone --branch {} {} .",
                env.branch, env.repository
            ))
            .in_dir(&checkout),
        )
        .await?;
        self.step(
            "checkout",
            CommandSpec::new(format!("git checkout {}", env.sha)).in_dir(&checkout),
        )
        .await?;

        self.step(
            "virtualenv",
            CommandSpec::new("python3 -m venv venv").in_dir(&checkout),
        )
        .await?;
        self.step(
            "install-deps",
            CommandSpec::new("pip install -r requirements.txt")
                .in_dir(&checkout)
                .with_venv(self.renderer.venv_dir(&env.name)),
        )
        .await?;

        let creds = self.provision_database(env).await?;
        let env = self.registry.set_credentials(&env.name, &creds).await?;

        self.renderer.write_database_config(&env, &creds).await?;
        self.renderer.write_uwsgi_descriptor(&env).await?;

        self.migrate(&env).await?;
        self.collect_static(&env).await?;

        self.renderer.write_nginx_site(&env).await?;
        self.reload_nginx().await?;

        Ok(())
    }

    /// Fetch the latest revision on the existing checkout, refresh
    /// static assets, then run the refresh workflow.
    async fn do_update(&self, env: &Environment) -> AppResult<()> {
        let checkout = self.renderer.checkout_dir(&env.name);

        self.step(
            "fetch",
            CommandSpec::new("git fetch origin").in_dir(&checkout),
        )
        .await?;
        self.step(
            "fetch",
            CommandSpec::new(format!("git reset --hard {}", env.sha)).in_dir(&checkout),
        )
        .await?;

        self.collect_static(env).await?;

        self.do_refresh(env).await
    }

    /// Tear down and re-provision the database with fresh
    /// credentials, re-render config, re-apply migrations.
    async fn do_refresh(&self, env: &Environment) -> AppResult<()> {
        self.teardown_database(env).await?;

        let creds = self.provision_database(env).await?;
        let env = self.registry.set_credentials(&env.name, &creds).await?;

        self.renderer.write_database_config(&env, &creds).await?;
        self.renderer.write_uwsgi_descriptor(&env).await?;

        self.migrate(&env).await?;

        // uwsgi reloads the app when its descriptor is touched
        self.step(
            "reload-app",
            CommandSpec::new(format!(
                "touch {}",
                self.renderer.uwsgi_descriptor_path(&env.name).display()
            )),
        )
        .await?;

        Ok(())
    }

    /// Full teardown keeping the record, then a fresh creation.
    async fn do_recreate(&self, env: &Environment) -> AppResult<()> {
        self.teardown(env, true).await?;

        // Credentials were cleared by the teardown
        let env = self
            .registry
            .find_by_name(&env.name)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Environment '{}'", env.name)))?;

        self.do_create(&env).await
    }

    async fn do_delete(&self, env: &Environment) -> AppResult<()> {
        self.teardown(env, false).await
    }

    // Shared step groups

    /// Create role and database, import the baseline dump with
    /// elevated rights, then hand ownership to the generated role and
    /// grant the service account access.
    async fn provision_database(&self, env: &Environment) -> AppResult<DbCredentials> {
        let creds = credentials::generate();

        self.step(
            "create-role",
            CommandSpec::new(format!(
                "sudo -u postgres psql -c \"CREATE ROLE {} LOGIN PASSWORD '{}'\"",
                creds.user, creds.pass
            )),
        )
        .await?;
        self.step(
            "create-database",
            CommandSpec::new(format!(
                "sudo -u postgres createdb -O {} {}",
                creds.user, creds.name
            )),
        )
        .await?;

        // The dump may restore objects under arbitrary owners, so the
        // import itself runs as the superuser.
        self.step(
            "import-dump",
            CommandSpec::new(format!(
                "sudo -u postgres pg_restore -d {} {}",
                creds.name,
                self.baseline_dump.display()
            )),
        )
        .await?;

        self.step(
            "own-objects",
            CommandSpec::new(format!(
                "sudo -u postgres psql -d {db} -c \"ALTER SCHEMA public OWNER TO {user}\" \
                 -c \"GRANT ALL ON ALL TABLES IN SCHEMA public TO {user}\" \
                 -c \"GRANT ALL ON ALL SEQUENCES IN SCHEMA public TO {user}\"",
                db = creds.name,
                user = creds.user
            )),
        )
        .await?;
        self.step(
            "grant-service",
            CommandSpec::new(format!(
                "sudo -u postgres psql -d {db} -c \"GRANT ALL ON ALL TABLES IN SCHEMA public TO {svc}\" \
                 -c \"GRANT ALL ON ALL SEQUENCES IN SCHEMA public TO {svc}\"",
                db = creds.name,
                svc = self.db_service_user
            )),
        )
        .await?;

        tracing::info!(environment = %env.name, db_name = %creds.name, "Database provisioned");

        Ok(creds)
    }

    /// Drop the environment's database and role. A no-op when nothing
    /// was ever provisioned, so half-created environments tear down
    /// cleanly.
    async fn teardown_database(&self, env: &Environment) -> AppResult<()> {
        let (Some(db_name), Some(db_user)) = (&env.db_name, &env.db_user) else {
            tracing::debug!(environment = %env.name, "No database provisioned; skipping teardown");
            return Ok(());
        };

        self.step(
            "drop-database",
            CommandSpec::new(format!(
                "sudo -u postgres psql -c \"DROP DATABASE IF EXISTS {}\"",
                db_name
            )),
        )
        .await?;
        self.step(
            "drop-role",
            CommandSpec::new(format!(
                "sudo -u postgres psql -c \"DROP ROLE IF EXISTS {}\"",
                db_user
            )),
        )
        .await?;

        Ok(())
    }

    /// Remove the reverse-proxy binding, the app-server descriptor,
    /// the database and the checkout; then remove or reset the
    /// record.
    async fn teardown(&self, env: &Environment, keep_record: bool) -> AppResult<()> {
        self.renderer.remove_nginx_site(&env.name).await?;
        self.reload_nginx().await?;
        self.renderer.remove_uwsgi_descriptor(&env.name).await?;

        self.teardown_database(env).await?;

        self.step(
            "remove-checkout",
            CommandSpec::new(format!(
                "rm -rf {}",
                self.renderer.checkout_dir(&env.name).display()
            )),
        )
        .await?;

        if keep_record {
            self.registry.clear_credentials(&env.name).await?;
        } else {
            self.registry.remove(&env.name).await?;
        }

        Ok(())
    }

    async fn migrate(&self, env: &Environment) -> AppResult<()> {
        self.step(
            "migrate",
            CommandSpec::new("python manage.py migrate --noinput")
                .in_dir(self.renderer.checkout_dir(&env.name))
                .with_venv(self.renderer.venv_dir(&env.name)),
        )
        .await
    }

    async fn collect_static(&self, env: &Environment) -> AppResult<()> {
        self.step(
            "collectstatic",
            CommandSpec::new("python manage.py collectstatic --noinput")
                .in_dir(self.renderer.checkout_dir(&env.name))
                .with_venv(self.renderer.venv_dir(&env.name)),
        )
        .await
    }

    async fn reload_nginx(&self) -> AppResult<()> {
        self.step(
            "reload-nginx",
            CommandSpec::new("sudo service nginx reload"),
        )
        .await
    }

    /// Run one external command and branch on its exit status. A
    /// non-zero exit or a timeout aborts the workflow.
    async fn step(&self, name: &'static str, spec: CommandSpec) -> AppResult<()> {
        let output = self.runner.run(&spec).await?;
        if output.success {
            return Ok(());
        }

        let detail = if output.timed_out {
            output.stderr
        } else {
            format!(
                "exit code {:?}: {}",
                output.exit_code,
                output.stderr.trim()
            )
        };
        Err(AppError::step(name, detail))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{NewEnvironment, Protocol};
    use crate::registry::InMemoryRegistry;
    use crate::services::command::{CommandOutput, RecordingRunner};
    use async_trait::async_trait;
    use std::path::Path;
    use std::sync::atomic::{AtomicU32, Ordering};
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

    struct Harness {
        base: PathBuf,
        registry: Arc<InMemoryRegistry>,
        runner: Arc<RecordingRunner>,
        orchestrator: LifecycleOrchestrator,
    }

    impl Harness {
        fn new() -> Self {
            let base = std::env::temp_dir().join(format!("stagehand-test-{}", Uuid::new_v4()));
            let config = test_config(&base);
            let registry = Arc::new(InMemoryRegistry::new());
            let runner = Arc::new(RecordingRunner::new());
            let orchestrator = LifecycleOrchestrator::new(
                registry.clone(),
                runner.clone(),
                LeaseMap::new(),
                None,
                &config,
            );
            Self {
                base,
                registry,
                runner,
                orchestrator,
            }
        }

        async fn seed(&self, name: &str) {
            self.registry
                .insert(&NewEnvironment {
                    name: name.to_string(),
                    repository: "git@example.com:acme/app.git".to_string(),
                    branch: "feature-x".to_string(),
                    sha: "abc123".to_string(),
                    protocol: Protocol::Http,
                })
                .await
                .unwrap();
        }

        async fn cleanup(&self) {
            let _ = tokio::fs::remove_dir_all(&self.base).await;
        }
    }

    #[tokio::test]
    async fn test_create_runs_steps_in_order_and_activates() {
        let h = Harness::new();
        h.seed("pr-1").await;

        h.orchestrator
            .run(LifecycleAction::Create, "pr-1")
            .await
            .unwrap();

        let commands = h.runner.recorded_commands().await;
        let position = |needle: &str| {
            commands
                .iter()
                .position(|c| c.contains(needle))
                .unwrap_or_else(|| panic!("missing command containing '{}'", needle))
        };

        assert!(position("git clone") < position("python3 -m venv"));
        assert!(position("python3 -m venv") < position("pip install"));
        assert!(position("CREATE ROLE") < position("createdb"));
        assert!(position("createdb") < position("pg_restore"));
        assert!(position("pg_restore") < position("manage.py migrate"));
        assert!(position("manage.py migrate") < position("collectstatic"));
        assert!(position("collectstatic") < position("nginx reload"));

        let env = h.registry.find_by_name("pr-1").await.unwrap().unwrap();
        assert_eq!(env.status, EnvStatus::Active);
        assert!(env.db_name.is_some());
        assert!(env.db_pass.is_some());

        h.cleanup().await;
    }

    #[tokio::test]
    async fn test_failed_step_aborts_and_keeps_inflight_status() {
        let h = Harness::new();
        h.seed("pr-1").await;
        h.runner.fail_matching("pg_restore").await;

        let result = h.orchestrator.run(LifecycleAction::Create, "pr-1").await;
        assert!(matches!(
            result,
            Err(AppError::StepExecution { step: "import-dump", .. })
        ));

        // Status never advanced to Active
        let env = h.registry.find_by_name("pr-1").await.unwrap().unwrap();
        assert_eq!(env.status, EnvStatus::Creating);

        // No step after the failed import ran
        let commands = h.runner.recorded_commands().await;
        assert!(!commands.iter().any(|c| c.contains("migrate")));
        assert!(!commands.iter().any(|c| c.contains("nginx")));

        h.cleanup().await;
    }

    #[tokio::test]
    async fn test_create_rejects_invalid_name() {
        let h = Harness::new();
        // Bypass dispatcher validation by inserting directly
        h.registry
            .insert(&NewEnvironment {
                name: "Pr-42-".to_string(),
                repository: "git@example.com:acme/app.git".to_string(),
                branch: "feature-x".to_string(),
                sha: "abc123".to_string(),
                protocol: Protocol::Http,
            })
            .await
            .unwrap();

        let result = h.orchestrator.run(LifecycleAction::Create, "Pr-42-").await;
        assert!(matches!(result, Err(AppError::Validation(_))));
        assert!(h.runner.recorded_commands().await.is_empty());

        h.cleanup().await;
    }

    #[tokio::test]
    async fn test_delete_without_database_skips_db_teardown() {
        let h = Harness::new();
        h.seed("pr-1").await;

        h.orchestrator
            .run(LifecycleAction::Delete, "pr-1")
            .await
            .unwrap();

        let commands = h.runner.recorded_commands().await;
        assert!(!commands.iter().any(|c| c.contains("DROP DATABASE")));
        assert!(!commands.iter().any(|c| c.contains("DROP ROLE")));
        assert!(commands.iter().any(|c| c.contains("rm -rf")));

        // Record is gone; a second teardown is a harmless no-op
        assert!(h.registry.find_by_name("pr-1").await.unwrap().is_none());
        h.orchestrator
            .run(LifecycleAction::Delete, "pr-1")
            .await
            .unwrap();

        h.cleanup().await;
    }

    #[tokio::test]
    async fn test_delete_drops_provisioned_database() {
        let h = Harness::new();
        h.seed("pr-1").await;
        h.registry
            .set_credentials(
                "pr-1",
                &DbCredentials {
                    name: "olddbabc".to_string(),
                    user: "olduserx".to_string(),
                    pass: "oldpass123456789".to_string(),
                },
            )
            .await
            .unwrap();

        h.orchestrator
            .run(LifecycleAction::Delete, "pr-1")
            .await
            .unwrap();

        let commands = h.runner.recorded_commands().await;
        assert!(commands
            .iter()
            .any(|c| c.contains("DROP DATABASE IF EXISTS olddbabc")));
        assert!(commands
            .iter()
            .any(|c| c.contains("DROP ROLE IF EXISTS olduserx")));

        h.cleanup().await;
    }

    #[tokio::test]
    async fn test_recreate_rotates_credentials() {
        let h = Harness::new();
        h.seed("pr-1").await;
        h.registry
            .set_credentials(
                "pr-1",
                &DbCredentials {
                    name: "olddbabc".to_string(),
                    user: "olduserx".to_string(),
                    pass: "oldpass123456789".to_string(),
                },
            )
            .await
            .unwrap();

        h.orchestrator
            .run(LifecycleAction::Recreate, "pr-1")
            .await
            .unwrap();

        let env = h.registry.find_by_name("pr-1").await.unwrap().unwrap();
        assert_eq!(env.status, EnvStatus::Active);
        assert_ne!(env.db_user.as_deref(), Some("olduserx"));
        assert_ne!(env.db_pass.as_deref(), Some("oldpass123456789"));

        // Old role was dropped before the new one was created
        let commands = h.runner.recorded_commands().await;
        let drop_pos = commands
            .iter()
            .position(|c| c.contains("DROP ROLE IF EXISTS olduserx"))
            .unwrap();
        let create_pos = commands
            .iter()
            .position(|c| c.contains("CREATE ROLE"))
            .unwrap();
        assert!(drop_pos < create_pos);

        h.cleanup().await;
    }

    #[tokio::test]
    async fn test_refresh_generates_fresh_credentials() {
        let h = Harness::new();
        h.seed("pr-1").await;
        h.registry
            .set_credentials(
                "pr-1",
                &DbCredentials {
                    name: "olddbabc".to_string(),
                    user: "olduserx".to_string(),
                    pass: "oldpass123456789".to_string(),
                },
            )
            .await
            .unwrap();
        h.registry
            .set_status("pr-1", EnvStatus::Refreshing)
            .await
            .unwrap();

        h.orchestrator
            .run(LifecycleAction::Refresh, "pr-1")
            .await
            .unwrap();

        let env = h.registry.find_by_name("pr-1").await.unwrap().unwrap();
        assert_eq!(env.status, EnvStatus::Active);
        assert_ne!(env.db_name.as_deref(), Some("olddbabc"));
        assert_ne!(env.db_user.as_deref(), Some("olduserx"));

        h.cleanup().await;
    }

    /// Runner that tracks how many commands run at once; with the
    /// per-name lease the answer must be one.
    struct GaugeRunner {
        current: AtomicU32,
        max_seen: AtomicU32,
    }

    #[async_trait]
    impl CommandRunner for GaugeRunner {
        async fn run(&self, _spec: &CommandSpec) -> AppResult<CommandOutput> {
            let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_seen.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(std::time::Duration::from_millis(2)).await;
            self.current.fetch_sub(1, Ordering::SeqCst);
            Ok(CommandOutput {
                success: true,
                exit_code: Some(0),
                stdout: String::new(),
                stderr: String::new(),
                timed_out: false,
            })
        }
    }

    #[tokio::test]
    async fn test_concurrent_workflows_serialize_per_name() {
        let base = std::env::temp_dir().join(format!("stagehand-test-{}", Uuid::new_v4()));
        let config = test_config(&base);
        let registry = Arc::new(InMemoryRegistry::new());
        let runner = Arc::new(GaugeRunner {
            current: AtomicU32::new(0),
            max_seen: AtomicU32::new(0),
        });
        let orchestrator = Arc::new(LifecycleOrchestrator::new(
            registry.clone(),
            runner.clone(),
            LeaseMap::new(),
            None,
            &config,
        ));

        registry
            .insert(&NewEnvironment {
                name: "pr-1".to_string(),
                repository: "git@example.com:acme/app.git".to_string(),
                branch: "feature-x".to_string(),
                sha: "abc123".to_string(),
                protocol: Protocol::Http,
            })
            .await
            .unwrap();

        let a = {
            let orchestrator = orchestrator.clone();
            tokio::spawn(async move { orchestrator.run(LifecycleAction::Update, "pr-1").await })
        };
        let b = {
            let orchestrator = orchestrator.clone();
            tokio::spawn(async move { orchestrator.run(LifecycleAction::Update, "pr-1").await })
        };

        a.await.unwrap().unwrap();
        b.await.unwrap().unwrap();

        assert_eq!(runner.max_seen.load(Ordering::SeqCst), 1);

        let _ = tokio::fs::remove_dir_all(&base).await;
    }
}
