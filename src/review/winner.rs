//! Winner selection and run completion.

use super::ReviewService;
use crate::error::{GentreeError, Result};
use crate::logging::log_tree_operation;
use crate::models::{Candidate, Run};
use crate::state_machine::{RunEvent, RunState};
use tracing::instrument;

impl ReviewService {
    /// Make `candidate_id` the single winner of its run and complete the run
    #[instrument(skip(self))]
    pub async fn mark_winner(&self, candidate_id: i64) -> Result<Candidate> {
        let mut tx = self.pool.begin().await?;

        let candidate = Candidate::get(&mut *tx, candidate_id).await?;
        if !candidate.is_active() {
            return Err(GentreeError::validation(format!(
                "candidate {candidate_id} is {} and cannot win",
                candidate.status
            )));
        }

        let existing = Candidate::winners_for_run(&mut *tx, candidate.run_id).await?;
        if existing.len() > 1 {
            return Err(GentreeError::consistency(format!(
                "run {} has {} winners",
                candidate.run_id,
                existing.len()
            )));
        }
        let previous = existing.first().map(|winner| winner.id);

        Candidate::clear_winners(&mut *tx, candidate.run_id).await?;
        Candidate::set_winner(&mut *tx, candidate_id, true).await?;

        let run = Run::get(&mut *tx, candidate.run_id).await?;
        if run.status != RunState::Completed {
            Run::transition(&mut *tx, run.id, RunEvent::Complete).await?;
        }

        let winner = Candidate::get(&mut *tx, candidate_id).await?;
        tx.commit().await?;

        log_tree_operation(
            "mark_winner",
            Some(winner.run_id),
            Some(candidate_id),
            winner.parent_id,
            "completed",
            previous
                .filter(|id| *id != candidate_id)
                .map(|id| format!("replaced winner {id}"))
                .as_deref(),
        );
        Ok(winner)
    }

    /// Clear the winner flag and reopen the run
    #[instrument(skip(self))]
    pub async fn unmark_winner(&self, candidate_id: i64) -> Result<Candidate> {
        let mut tx = self.pool.begin().await?;

        let candidate = Candidate::get(&mut *tx, candidate_id).await?;
        if !candidate.winner {
            return Err(GentreeError::validation(format!(
                "candidate {candidate_id} is not the winner of run {}",
                candidate.run_id
            )));
        }

        Candidate::set_winner(&mut *tx, candidate_id, false).await?;
        let run = Run::get(&mut *tx, candidate.run_id).await?;
        if run.status == RunState::Completed {
            Run::transition(&mut *tx, run.id, RunEvent::Reopen).await?;
        }

        let candidate = Candidate::get(&mut *tx, candidate_id).await?;
        tx.commit().await?;

        log_tree_operation(
            "unmark_winner",
            Some(candidate.run_id),
            Some(candidate_id),
            candidate.parent_id,
            "reopened",
            None,
        );
        Ok(candidate)
    }

    /// Operator abandons a pending or running run; the scheduler stops serving it
    #[instrument(skip(self))]
    pub async fn abandon_run(&self, run_id: i64) -> Result<RunState> {
        let mut conn = self.pool.acquire().await?;
        let state = Run::transition(&mut conn, run_id, RunEvent::Fail).await?;

        log_tree_operation("abandon_run", Some(run_id), None, None, state.as_str(), None);
        Ok(state)
    }
}
