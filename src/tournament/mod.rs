//! # Tournament Engine
//!
//! Pairwise human comparison of candidates within one (run, step), rated with
//! ELO. Votes are an append-only audit used both for rating updates and to
//! avoid presenting the same pair twice.

pub mod elo;
pub mod pairing;
pub mod voting;

use crate::database::DbPool;
use crate::models::Candidate;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;
use std::sync::Mutex;

pub use elo::{compute_elo_update, expected_score, EloUpdate};
pub use pairing::select_unvoted_pair;
pub use voting::VoteOutcome;

/// Two candidates to compare, least-compared first
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CandidatePair {
    pub a: Candidate,
    pub b: Candidate,
}

pub struct TournamentEngine {
    pool: DbPool,
    rng: Mutex<StdRng>,
}

impl TournamentEngine {
    pub fn new(pool: DbPool) -> Self {
        Self {
            pool,
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    /// Deterministic pair draws, for reproducible tests
    pub fn with_seed(pool: DbPool, seed: u64) -> Self {
        Self {
            pool,
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }
}
