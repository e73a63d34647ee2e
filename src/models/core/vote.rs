use crate::error::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqliteConnection};
use std::collections::HashSet;

/// Append-only audit of one pairwise comparison.
/// Maps to `votes` table; unique per ordered (winner, loser) pair
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Vote {
    pub id: i64,
    pub winner_id: i64,
    pub loser_id: i64,
    pub created_at: DateTime<Utc>,
}

impl Vote {
    /// Record a comparison. A repeated ordered pair fails with `Consistency`.
    pub async fn create(conn: &mut SqliteConnection, winner_id: i64, loser_id: i64) -> Result<Vote> {
        let vote = sqlx::query_as::<_, Vote>(
            r#"
            INSERT INTO votes (winner_id, loser_id, created_at)
            VALUES (?, ?, ?)
            RETURNING id, winner_id, loser_id, created_at
            "#,
        )
        .bind(winner_id)
        .bind(loser_id)
        .bind(Utc::now())
        .fetch_one(&mut *conn)
        .await?;

        Ok(vote)
    }

    /// Whether the two candidates were compared in either order
    pub async fn exists_between(conn: &mut SqliteConnection, a: i64, b: i64) -> Result<bool> {
        let count = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*) FROM votes
            WHERE (winner_id = ? AND loser_id = ?) OR (winner_id = ? AND loser_id = ?)
            "#,
        )
        .bind(a)
        .bind(b)
        .bind(b)
        .bind(a)
        .fetch_one(&mut *conn)
        .await?;

        Ok(count > 0)
    }

    /// Unordered pairs already compared within one (run, step), as `(min_id, max_id)`
    pub async fn voted_pairs_for_step(
        conn: &mut SqliteConnection,
        run_id: i64,
        step_id: i64,
    ) -> Result<HashSet<(i64, i64)>> {
        let rows = sqlx::query_as::<_, (i64, i64)>(
            r#"
            SELECT v.winner_id, v.loser_id
            FROM votes v
            JOIN candidates w ON w.id = v.winner_id
            WHERE w.run_id = ? AND w.step_id = ?
            "#,
        )
        .bind(run_id)
        .bind(step_id)
        .fetch_all(&mut *conn)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(winner, loser)| (winner.min(loser), winner.max(loser)))
            .collect())
    }
}
