//! RecordVote: one atomic ELO update plus the audit row.

use super::elo::compute_elo_update;
use super::TournamentEngine;
use crate::error::{GentreeError, Result};
use crate::logging::log_tree_operation;
use crate::models::{Candidate, Vote};
use serde::Serialize;
use tracing::instrument;

/// Scores after a recorded vote
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VoteOutcome {
    pub vote_id: i64,
    pub winner_id: i64,
    pub loser_id: i64,
    pub winner_score: i64,
    pub loser_score: i64,
    pub winner_delta: i64,
    pub loser_delta: i64,
}

impl TournamentEngine {
    /// Record that `winner_id` beat `loser_id`.
    ///
    /// Both candidates must be active and share run and step. Scores, counts
    /// and the vote row commit together or not at all; a repeated ordered
    /// pair is a `Consistency` error.
    #[instrument(skip(self))]
    pub async fn record_vote(&self, winner_id: i64, loser_id: i64) -> Result<VoteOutcome> {
        if winner_id == loser_id {
            return Err(GentreeError::validation(format!(
                "candidate {winner_id} cannot be voted against itself"
            )));
        }

        let mut tx = self.pool.begin().await?;
        let winner = Candidate::get(&mut *tx, winner_id).await?;
        let loser = Candidate::get(&mut *tx, loser_id).await?;

        if !winner.is_active() || !loser.is_active() {
            return Err(GentreeError::validation(format!(
                "only active candidates can be compared ({winner_id}: {}, {loser_id}: {})",
                winner.status, loser.status
            )));
        }
        if winner.run_id != loser.run_id || winner.step_id != loser.step_id {
            return Err(GentreeError::validation(format!(
                "candidates {winner_id} and {loser_id} are not in the same run and step"
            )));
        }

        let update = compute_elo_update(winner.elo_score, loser.elo_score);
        let vote = Vote::create(&mut *tx, winner_id, loser_id).await?;
        Candidate::apply_vote(&mut *tx, winner_id, update.winner_delta).await?;
        Candidate::apply_vote(&mut *tx, loser_id, update.loser_delta).await?;
        tx.commit().await?;

        let outcome = VoteOutcome {
            vote_id: vote.id,
            winner_id,
            loser_id,
            winner_score: winner.elo_score + update.winner_delta,
            loser_score: loser.elo_score + update.loser_delta,
            winner_delta: update.winner_delta,
            loser_delta: update.loser_delta,
        };

        log_tree_operation(
            "vote",
            Some(winner.run_id),
            Some(winner_id),
            None,
            "recorded",
            Some(&format!(
                "beat {loser_id}: {} -> {}, {} -> {}",
                winner.elo_score, outcome.winner_score, loser.elo_score, outcome.loser_score
            )),
        );
        Ok(outcome)
    }
}
