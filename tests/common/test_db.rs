use gentree_core::config::{DatabaseConfig, GentreeConfig};
use gentree_core::database::{DatabaseConnection, DatabaseMigrations, DbPool};
use std::path::PathBuf;
use tempfile::TempDir;

/// A migrated SQLite store living in its own temporary directory
pub struct TestDb {
    pub pool: DbPool,
    dir: TempDir,
}

impl TestDb {
    pub async fn new() -> Self {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let config = DatabaseConfig {
            url: format!("sqlite://{}", dir.path().join("gentree.db").display()),
            max_connections: 4,
            busy_timeout_ms: 5_000,
        };
        let db = DatabaseConnection::new(&config)
            .await
            .expect("Failed to open test database");
        DatabaseMigrations::run_all(db.pool())
            .await
            .expect("Failed to run migrations");

        Self {
            pool: db.into_pool(),
            dir,
        }
    }

    pub fn artifact_root(&self) -> PathBuf {
        self.dir.path().join("output")
    }
}

/// Defaults with intervals short enough for loop tests
pub fn test_config(artifact_root: PathBuf) -> GentreeConfig {
    let mut config = GentreeConfig::default();
    config.scheduler.submit_interval_ms = 20;
    config.poller.poll_interval_ms = 20;
    config.poller.reconcile_interval_ms = 200;
    config.compute.max_retries = 2;
    config.artifacts.root = artifact_root;
    config
}
