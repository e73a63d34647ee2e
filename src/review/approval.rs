//! Approval gate edits and the predicates the scheduler consumes.

use super::ReviewService;
use crate::error::{GentreeError, Result};
use crate::logging::log_tree_operation;
use crate::models::{ApprovalGate, Candidate, PipelineStep, Run};
use sqlx::SqliteConnection;
use tracing::instrument;

/// Reject gate edits for a step outside the run's pipeline
async fn ensure_step_in_run(conn: &mut SqliteConnection, run_id: i64, step_id: i64) -> Result<()> {
    let run = Run::get(conn, run_id).await?;
    let step = PipelineStep::get(conn, step_id).await?;
    if step.pipeline_id != run.pipeline_id {
        return Err(GentreeError::validation(format!(
            "step {step_id} belongs to pipeline {}, run {run_id} uses pipeline {}",
            step.pipeline_id, run.pipeline_id
        )));
    }
    Ok(())
}

impl ReviewService {
    /// Approve a step as a parent source, fixing `top_k_count` now
    #[instrument(skip(self))]
    pub async fn approve(&self, run_id: i64, step_id: i64, top_k_count: i64) -> Result<ApprovalGate> {
        let mut tx = self.pool.begin().await?;
        ensure_step_in_run(&mut *tx, run_id, step_id).await?;
        let gate = ApprovalGate::approve(&mut *tx, run_id, step_id, top_k_count).await?;
        tx.commit().await?;

        log_tree_operation(
            "approve",
            Some(run_id),
            None,
            None,
            "approved",
            Some(&format!("step {step_id}, top_k_count {top_k_count}")),
        );
        Ok(gate)
    }

    /// Change how many top candidates pass the gate; takes effect on the next scheduler pass
    #[instrument(skip(self))]
    pub async fn set_top_k(&self, run_id: i64, step_id: i64, top_k_count: i64) -> Result<ApprovalGate> {
        let mut tx = self.pool.begin().await?;
        ensure_step_in_run(&mut *tx, run_id, step_id).await?;
        let gate = ApprovalGate::set_top_k(&mut *tx, run_id, step_id, top_k_count).await?;
        tx.commit().await?;

        log_tree_operation(
            "set_top_k",
            Some(run_id),
            None,
            None,
            "updated",
            Some(&format!("step {step_id}, top_k_count {top_k_count}")),
        );
        Ok(gate)
    }

    #[instrument(skip(self))]
    pub async fn revoke(&self, run_id: i64, step_id: i64) -> Result<ApprovalGate> {
        let mut tx = self.pool.begin().await?;
        ensure_step_in_run(&mut *tx, run_id, step_id).await?;
        let gate = ApprovalGate::revoke(&mut *tx, run_id, step_id).await?;
        tx.commit().await?;

        log_tree_operation("revoke", Some(run_id), None, None, "revoked", Some(&format!("step {step_id}")));
        Ok(gate)
    }

    pub async fn is_approved(&self, run_id: i64, step_id: i64) -> Result<bool> {
        let mut conn = self.pool.acquire().await?;
        ApprovalGate::is_approved(&mut conn, run_id, step_id).await
    }

    /// Ids of the `top_k_count` highest-rated active candidates, best first
    pub async fn top_k(&self, run_id: i64, step_id: i64) -> Result<Vec<i64>> {
        let mut conn = self.pool.acquire().await?;
        let k = ApprovalGate::top_k_count_for(&mut conn, run_id, step_id).await?;
        let top = Candidate::top_k(&mut conn, run_id, step_id, k).await?;
        Ok(top.into_iter().map(|candidate| candidate.id).collect())
    }
}
