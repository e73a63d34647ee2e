use crate::error::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqliteConnection};

/// A named pipeline template owning an ordered list of steps.
/// Maps to `pipelines` table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Pipeline {
    pub id: i64,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

impl Pipeline {
    /// Create a new pipeline
    pub async fn create(conn: &mut SqliteConnection, name: &str) -> Result<Pipeline> {
        let pipeline = sqlx::query_as::<_, Pipeline>(
            r#"
            INSERT INTO pipelines (name, created_at)
            VALUES (?, ?)
            RETURNING id, name, created_at
            "#,
        )
        .bind(name)
        .bind(Utc::now())
        .fetch_one(&mut *conn)
        .await?;

        Ok(pipeline)
    }

    /// Find a pipeline by ID
    pub async fn find_by_id(conn: &mut SqliteConnection, id: i64) -> Result<Option<Pipeline>> {
        let pipeline = sqlx::query_as::<_, Pipeline>(
            "SELECT id, name, created_at FROM pipelines WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;

        Ok(pipeline)
    }

    /// Find a pipeline by its unique name
    pub async fn find_by_name(conn: &mut SqliteConnection, name: &str) -> Result<Option<Pipeline>> {
        let pipeline = sqlx::query_as::<_, Pipeline>(
            "SELECT id, name, created_at FROM pipelines WHERE name = ?",
        )
        .bind(name)
        .fetch_optional(&mut *conn)
        .await?;

        Ok(pipeline)
    }
}
