//! # Approval Gate Model
//!
//! Per (run, step) human checkpoint. Rows are created lazily by the first
//! edit; a missing row reads as unapproved with the default `top_k_count`.

use crate::constants::DEFAULT_TOP_K_COUNT;
use crate::error::{GentreeError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqliteConnection};

/// Maps to `approval_gates` table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct ApprovalGate {
    pub id: i64,
    pub run_id: i64,
    pub step_id: i64,
    pub approved: bool,
    pub approved_at: Option<DateTime<Utc>>,
    pub top_k_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

const GATE_COLUMNS: &str =
    "id, run_id, step_id, approved, approved_at, top_k_count, created_at, updated_at";

fn validate_top_k(top_k_count: i64) -> Result<()> {
    if top_k_count < 1 {
        return Err(GentreeError::validation(format!(
            "top_k_count must be >= 1, got {top_k_count}"
        )));
    }
    Ok(())
}

impl ApprovalGate {
    pub async fn find(conn: &mut SqliteConnection, run_id: i64, step_id: i64) -> Result<Option<ApprovalGate>> {
        let gate = sqlx::query_as::<_, ApprovalGate>(&format!(
            "SELECT {GATE_COLUMNS} FROM approval_gates WHERE run_id = ? AND step_id = ?"
        ))
        .bind(run_id)
        .bind(step_id)
        .fetch_optional(&mut *conn)
        .await?;

        Ok(gate)
    }

    /// A step without a gate row is unapproved
    pub async fn is_approved(conn: &mut SqliteConnection, run_id: i64, step_id: i64) -> Result<bool> {
        Ok(Self::find(conn, run_id, step_id)
            .await?
            .is_some_and(|gate| gate.approved))
    }

    pub async fn top_k_count_for(conn: &mut SqliteConnection, run_id: i64, step_id: i64) -> Result<i64> {
        Ok(Self::find(conn, run_id, step_id)
            .await?
            .map_or(DEFAULT_TOP_K_COUNT, |gate| gate.top_k_count))
    }

    /// Approve the step and fix `top_k_count` at this moment
    pub async fn approve(
        conn: &mut SqliteConnection,
        run_id: i64,
        step_id: i64,
        top_k_count: i64,
    ) -> Result<ApprovalGate> {
        validate_top_k(top_k_count)?;
        let now = Utc::now();

        let gate = sqlx::query_as::<_, ApprovalGate>(&format!(
            r#"
            INSERT INTO approval_gates (run_id, step_id, approved, approved_at, top_k_count, created_at, updated_at)
            VALUES (?, ?, 1, ?, ?, ?, ?)
            ON CONFLICT (run_id, step_id) DO UPDATE SET
                approved = 1,
                approved_at = excluded.approved_at,
                top_k_count = excluded.top_k_count,
                updated_at = excluded.updated_at
            RETURNING {GATE_COLUMNS}
            "#
        ))
        .bind(run_id)
        .bind(step_id)
        .bind(now)
        .bind(top_k_count)
        .bind(now)
        .bind(now)
        .fetch_one(&mut *conn)
        .await?;

        Ok(gate)
    }

    /// Change `top_k_count` without touching the approval flag
    pub async fn set_top_k(
        conn: &mut SqliteConnection,
        run_id: i64,
        step_id: i64,
        top_k_count: i64,
    ) -> Result<ApprovalGate> {
        validate_top_k(top_k_count)?;
        let now = Utc::now();

        let gate = sqlx::query_as::<_, ApprovalGate>(&format!(
            r#"
            INSERT INTO approval_gates (run_id, step_id, approved, top_k_count, created_at, updated_at)
            VALUES (?, ?, 0, ?, ?, ?)
            ON CONFLICT (run_id, step_id) DO UPDATE SET
                top_k_count = excluded.top_k_count,
                updated_at = excluded.updated_at
            RETURNING {GATE_COLUMNS}
            "#
        ))
        .bind(run_id)
        .bind(step_id)
        .bind(top_k_count)
        .bind(now)
        .bind(now)
        .fetch_one(&mut *conn)
        .await?;

        Ok(gate)
    }

    /// Withdraw approval; the step stops providing parents on the next pass
    pub async fn revoke(conn: &mut SqliteConnection, run_id: i64, step_id: i64) -> Result<ApprovalGate> {
        let now = Utc::now();

        let gate = sqlx::query_as::<_, ApprovalGate>(&format!(
            r#"
            INSERT INTO approval_gates (run_id, step_id, approved, top_k_count, created_at, updated_at)
            VALUES (?, ?, 0, ?, ?, ?)
            ON CONFLICT (run_id, step_id) DO UPDATE SET
                approved = 0,
                approved_at = NULL,
                updated_at = excluded.updated_at
            RETURNING {GATE_COLUMNS}
            "#
        ))
        .bind(run_id)
        .bind(step_id)
        .bind(DEFAULT_TOP_K_COUNT)
        .bind(now)
        .bind(now)
        .fetch_one(&mut *conn)
        .await?;

        Ok(gate)
    }
}
