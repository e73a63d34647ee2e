//! # Database Migration System
//!
//! Migrations live in `migrations/` using the `YYYYMMDDHHMMSS_description.sql`
//! naming convention and are embedded into the binary at compile time. sqlx
//! records applied versions in `_sqlx_migrations`, so running them again is a
//! no-op.

use crate::database::DbPool;
use crate::error::Result;
use sqlx::migrate::Migrator;
use tracing::info;

static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

/// Manages database schema migrations.
pub struct DatabaseMigrations;

impl DatabaseMigrations {
    /// Apply every outstanding migration in version order
    pub async fn run_all(pool: &DbPool) -> Result<()> {
        MIGRATOR.run(pool).await?;
        info!(
            migrations = MIGRATOR.iter().count(),
            "📦 Tree store schema up to date"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DatabaseConfig;
    use crate::database::DatabaseConnection;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_migrations_are_idempotent() {
        let dir = TempDir::new().unwrap();
        let config = DatabaseConfig {
            url: format!("sqlite://{}", dir.path().join("m.db").display()),
            ..DatabaseConfig::default()
        };
        let db = DatabaseConnection::new(&config).await.unwrap();

        DatabaseMigrations::run_all(db.pool()).await.unwrap();
        DatabaseMigrations::run_all(db.pool()).await.unwrap();

        let tables: Vec<(String,)> = sqlx::query_as(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name IN ('candidates', 'jobs', 'votes') ORDER BY name",
        )
        .fetch_all(db.pool())
        .await
        .unwrap();
        assert_eq!(tables.len(), 3);
    }
}
