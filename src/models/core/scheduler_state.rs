//! Persisted scheduler key/value rows.
//!
//! Holds the fairness cursor (`last_serviced_run_id`). Writes are
//! last-commit-wins: a lost update only shifts fairness ordering.

use crate::constants::scheduler_keys::LAST_SERVICED_RUN;
use crate::error::Result;
use chrono::Utc;
use sqlx::SqliteConnection;

pub struct SchedulerState;

impl SchedulerState {
    pub async fn get(conn: &mut SqliteConnection, key: &str) -> Result<Option<String>> {
        let value = sqlx::query_scalar::<_, String>("SELECT value FROM scheduler_state WHERE key = ?")
            .bind(key)
            .fetch_optional(&mut *conn)
            .await?;

        Ok(value)
    }

    pub async fn set(conn: &mut SqliteConnection, key: &str, value: &str) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO scheduler_state (key, value, updated_at)
            VALUES (?, ?, ?)
            ON CONFLICT (key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at
            "#,
        )
        .bind(key)
        .bind(value)
        .bind(Utc::now())
        .execute(&mut *conn)
        .await?;

        Ok(())
    }

    /// Run serviced by the most recent submittable selection; unparsable values read as unset
    pub async fn last_serviced_run_id(conn: &mut SqliteConnection) -> Result<Option<i64>> {
        Ok(Self::get(conn, LAST_SERVICED_RUN)
            .await?
            .and_then(|raw| raw.parse().ok()))
    }

    pub async fn set_last_serviced_run_id(conn: &mut SqliteConnection, run_id: i64) -> Result<()> {
        Self::set(conn, LAST_SERVICED_RUN, &run_id.to_string()).await
    }
}
