//! # Candidate Model
//!
//! A node in the per-run generation tree.
//!
//! ## Counter Cache
//!
//! `child_count` caches the number of **active** children. It is only ever
//! changed inside the transaction that creates or rejects a child
//! ([`Candidate::create`], [`Candidate::decrement_child_count`]) and repaired
//! by [`Candidate::child_count_drift`] plus [`Candidate::set_child_count`]
//! during reconciliation. The scheduler reads the cached value and never
//! recomputes it in the hot path.

use crate::constants::CandidateStatus;
use crate::error::{GentreeError, Result};
use crate::state_machine::{candidate_target_state, CandidateEvent};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqliteConnection};

/// Maps to `candidates` table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Candidate {
    pub id: i64,
    pub run_id: i64,
    pub step_id: i64,
    /// `None` only for base-step nodes
    pub parent_id: Option<i64>,
    pub artifact_path: String,
    #[sqlx(try_from = "String")]
    pub status: CandidateStatus,
    pub elo_score: i64,
    pub vote_count: i64,
    pub failure_count: i64,
    pub child_count: i64,
    pub winner: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// New Candidate for creation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewCandidate {
    pub run_id: i64,
    pub step_id: i64,
    pub parent_id: Option<i64>,
    pub artifact_path: String,
}

/// A candidate whose cached `child_count` disagrees with its live active children
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct ChildCountDrift {
    pub candidate_id: i64,
    pub cached: i64,
    pub live: i64,
}

const CANDIDATE_COLUMNS: &str = "id, run_id, step_id, parent_id, artifact_path, status, elo_score, \
     vote_count, failure_count, child_count, winner, created_at, updated_at";

impl Candidate {
    /// Insert a candidate and bump its parent's `child_count`.
    ///
    /// Both writes must share the caller's transaction.
    pub async fn create(conn: &mut SqliteConnection, new_candidate: NewCandidate) -> Result<Candidate> {
        let now = Utc::now();
        let candidate = sqlx::query_as::<_, Candidate>(&format!(
            r#"
            INSERT INTO candidates (
                run_id, step_id, parent_id, artifact_path, status, created_at, updated_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?)
            RETURNING {CANDIDATE_COLUMNS}
            "#
        ))
        .bind(new_candidate.run_id)
        .bind(new_candidate.step_id)
        .bind(new_candidate.parent_id)
        .bind(&new_candidate.artifact_path)
        .bind(CandidateStatus::Active.as_str())
        .bind(now)
        .bind(now)
        .fetch_one(&mut *conn)
        .await?;

        if let Some(parent_id) = new_candidate.parent_id {
            Self::increment_child_count(conn, parent_id).await?;
        }

        Ok(candidate)
    }

    pub async fn find_by_id(conn: &mut SqliteConnection, id: i64) -> Result<Option<Candidate>> {
        let candidate = sqlx::query_as::<_, Candidate>(&format!(
            "SELECT {CANDIDATE_COLUMNS} FROM candidates WHERE id = ?"
        ))
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;

        Ok(candidate)
    }

    /// Find a candidate by ID, failing with `NotFound` when absent
    pub async fn get(conn: &mut SqliteConnection, id: i64) -> Result<Candidate> {
        Self::find_by_id(conn, id)
            .await?
            .ok_or_else(|| GentreeError::not_found("candidate", id))
    }

    /// Active candidates of one (run, step), least-compared first
    pub async fn active_for_step(
        conn: &mut SqliteConnection,
        run_id: i64,
        step_id: i64,
    ) -> Result<Vec<Candidate>> {
        let candidates = sqlx::query_as::<_, Candidate>(&format!(
            r#"
            SELECT {CANDIDATE_COLUMNS} FROM candidates
            WHERE run_id = ? AND step_id = ? AND status = ?
            ORDER BY vote_count ASC, id ASC
            "#
        ))
        .bind(run_id)
        .bind(step_id)
        .bind(CandidateStatus::Active.as_str())
        .fetch_all(&mut *conn)
        .await?;

        Ok(candidates)
    }

    pub async fn count_active_for_step(
        conn: &mut SqliteConnection,
        run_id: i64,
        step_id: i64,
    ) -> Result<i64> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM candidates WHERE run_id = ? AND step_id = ? AND status = ?",
        )
        .bind(run_id)
        .bind(step_id)
        .bind(CandidateStatus::Active.as_str())
        .fetch_one(&mut *conn)
        .await?;

        Ok(count)
    }

    /// The `k` highest-rated active candidates of one (run, step).
    ///
    /// Ordered by `elo_score` descending then id ascending, so equal scores
    /// always resolve the same way.
    pub async fn top_k(
        conn: &mut SqliteConnection,
        run_id: i64,
        step_id: i64,
        k: i64,
    ) -> Result<Vec<Candidate>> {
        let candidates = sqlx::query_as::<_, Candidate>(&format!(
            r#"
            SELECT {CANDIDATE_COLUMNS} FROM candidates
            WHERE run_id = ? AND step_id = ? AND status = ?
            ORDER BY elo_score DESC, id ASC
            LIMIT ?
            "#
        ))
        .bind(run_id)
        .bind(step_id)
        .bind(CandidateStatus::Active.as_str())
        .bind(k.max(0))
        .fetch_all(&mut *conn)
        .await?;

        Ok(candidates)
    }

    /// Active children of a node, ordered by id
    pub async fn active_children(conn: &mut SqliteConnection, parent_id: i64) -> Result<Vec<Candidate>> {
        let children = sqlx::query_as::<_, Candidate>(&format!(
            "SELECT {CANDIDATE_COLUMNS} FROM candidates WHERE parent_id = ? AND status = ? ORDER BY id ASC"
        ))
        .bind(parent_id)
        .bind(CandidateStatus::Active.as_str())
        .fetch_all(&mut *conn)
        .await?;

        Ok(children)
    }

    /// Live count of active children, bypassing the cache
    pub async fn count_active_children(conn: &mut SqliteConnection, parent_id: i64) -> Result<i64> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM candidates WHERE parent_id = ? AND status = ?",
        )
        .bind(parent_id)
        .bind(CandidateStatus::Active.as_str())
        .fetch_one(&mut *conn)
        .await?;

        Ok(count)
    }

    pub async fn for_run(conn: &mut SqliteConnection, run_id: i64) -> Result<Vec<Candidate>> {
        let candidates = sqlx::query_as::<_, Candidate>(&format!(
            "SELECT {CANDIDATE_COLUMNS} FROM candidates WHERE run_id = ? ORDER BY id ASC"
        ))
        .bind(run_id)
        .fetch_all(&mut *conn)
        .await?;

        Ok(candidates)
    }

    pub async fn increment_child_count(conn: &mut SqliteConnection, id: i64) -> Result<()> {
        let updated = sqlx::query(
            "UPDATE candidates SET child_count = child_count + 1, updated_at = ? WHERE id = ?",
        )
        .bind(Utc::now())
        .bind(id)
        .execute(&mut *conn)
        .await?;

        if updated.rows_affected() == 0 {
            return Err(GentreeError::not_found("candidate", id));
        }
        Ok(())
    }

    /// Decrement `child_count` by exactly one.
    ///
    /// A decrement from zero is a `Consistency` error, never a clamp.
    pub async fn decrement_child_count(conn: &mut SqliteConnection, id: i64) -> Result<i64> {
        let current = sqlx::query_scalar::<_, i64>("SELECT child_count FROM candidates WHERE id = ?")
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?
            .ok_or_else(|| GentreeError::not_found("candidate", id))?;

        if current <= 0 {
            return Err(GentreeError::consistency(format!(
                "child_count of candidate {id} would become negative (currently {current})"
            )));
        }

        sqlx::query("UPDATE candidates SET child_count = child_count - 1, updated_at = ? WHERE id = ?")
            .bind(Utc::now())
            .bind(id)
            .execute(&mut *conn)
            .await?;

        Ok(current - 1)
    }

    /// Overwrite the cached count; reconciliation only
    pub async fn set_child_count(conn: &mut SqliteConnection, id: i64, value: i64) -> Result<()> {
        sqlx::query("UPDATE candidates SET child_count = ?, updated_at = ? WHERE id = ?")
            .bind(value)
            .bind(Utc::now())
            .bind(id)
            .execute(&mut *conn)
            .await?;
        Ok(())
    }

    /// Every candidate whose cached `child_count` differs from its live count
    pub async fn child_count_drift(conn: &mut SqliteConnection) -> Result<Vec<ChildCountDrift>> {
        let drift = sqlx::query_as::<_, ChildCountDrift>(
            r#"
            SELECT candidate_id, cached, live FROM (
                SELECT c.id AS candidate_id,
                       c.child_count AS cached,
                       (SELECT COUNT(*) FROM candidates ch
                         WHERE ch.parent_id = c.id AND ch.status = ?) AS live
                FROM candidates c
            )
            WHERE cached <> live
            ORDER BY candidate_id ASC
            "#,
        )
        .bind(CandidateStatus::Active.as_str())
        .fetch_all(&mut *conn)
        .await?;

        Ok(drift)
    }

    /// Move an active candidate to `rejected` through the transition table
    pub async fn reject(conn: &mut SqliteConnection, id: i64) -> Result<Candidate> {
        let candidate = Self::get(conn, id).await?;
        let target = candidate_target_state(id, candidate.status, CandidateEvent::Reject)?;

        let updated = sqlx::query(
            "UPDATE candidates SET status = ?, updated_at = ? WHERE id = ? AND status = ?",
        )
        .bind(target.as_str())
        .bind(Utc::now())
        .bind(id)
        .bind(candidate.status.as_str())
        .execute(&mut *conn)
        .await?;

        if updated.rows_affected() == 0 {
            return Err(GentreeError::consistency(format!(
                "candidate {id} changed status concurrently while rejecting"
            )));
        }

        Self::get(conn, id).await
    }

    /// Count one more failed attempt to produce a child from this node
    pub async fn record_failure(conn: &mut SqliteConnection, id: i64) -> Result<i64> {
        let failure_count = sqlx::query_scalar::<_, i64>(
            r#"
            UPDATE candidates SET failure_count = failure_count + 1, updated_at = ?
            WHERE id = ?
            RETURNING failure_count
            "#,
        )
        .bind(Utc::now())
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| GentreeError::not_found("candidate", id))?;

        Ok(failure_count)
    }

    /// Apply one vote outcome: shift the score and count the comparison
    pub async fn apply_vote(conn: &mut SqliteConnection, id: i64, elo_delta: i64) -> Result<()> {
        let updated = sqlx::query(
            r#"
            UPDATE candidates
            SET elo_score = elo_score + ?, vote_count = vote_count + 1, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(elo_delta)
        .bind(Utc::now())
        .bind(id)
        .execute(&mut *conn)
        .await?;

        if updated.rows_affected() == 0 {
            return Err(GentreeError::not_found("candidate", id));
        }
        Ok(())
    }

    pub async fn set_winner(conn: &mut SqliteConnection, id: i64, winner: bool) -> Result<()> {
        sqlx::query("UPDATE candidates SET winner = ?, updated_at = ? WHERE id = ?")
            .bind(winner)
            .bind(Utc::now())
            .bind(id)
            .execute(&mut *conn)
            .await?;
        Ok(())
    }

    /// Clear the winner flag on every candidate of a run, returning how many were cleared
    pub async fn clear_winners(conn: &mut SqliteConnection, run_id: i64) -> Result<u64> {
        let cleared = sqlx::query(
            "UPDATE candidates SET winner = 0, updated_at = ? WHERE run_id = ? AND winner = 1",
        )
        .bind(Utc::now())
        .bind(run_id)
        .execute(&mut *conn)
        .await?;
        Ok(cleared.rows_affected())
    }

    pub async fn winners_for_run(conn: &mut SqliteConnection, run_id: i64) -> Result<Vec<Candidate>> {
        let winners = sqlx::query_as::<_, Candidate>(&format!(
            "SELECT {CANDIDATE_COLUMNS} FROM candidates WHERE run_id = ? AND winner = 1 ORDER BY id ASC"
        ))
        .bind(run_id)
        .fetch_all(&mut *conn)
        .await?;

        Ok(winners)
    }

    pub fn is_active(&self) -> bool {
        self.status == CandidateStatus::Active
    }
}
