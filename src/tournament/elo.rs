use crate::constants::{ELO_K_FACTOR, ELO_SCALE};
use serde::{Deserialize, Serialize};

/// Score changes produced by one vote
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EloUpdate {
    /// Added to the winner's score (non-negative)
    pub winner_delta: i64,
    /// Added to the loser's score (non-positive)
    pub loser_delta: i64,
}

/// Logistic expected score of `own` against `opponent`
pub fn expected_score(own: i64, opponent: i64) -> f64 {
    1.0 / (1.0 + 10f64.powf((opponent - own) as f64 / ELO_SCALE))
}

/// Rounded K=32 update for a decided comparison.
///
/// Each side is rounded independently, so the two deltas need not cancel.
pub fn compute_elo_update(winner_score: i64, loser_score: i64) -> EloUpdate {
    let winner_expected = expected_score(winner_score, loser_score);
    let loser_expected = expected_score(loser_score, winner_score);

    EloUpdate {
        winner_delta: (ELO_K_FACTOR * (1.0 - winner_expected)).round() as i64,
        loser_delta: (ELO_K_FACTOR * (0.0 - loser_expected)).round() as i64,
    }
}
