//! # Human Review Operations
//!
//! Gate edits, branch pruning and winner selection. Each operation runs in
//! its own transaction and may interleave freely with the background loops.

pub mod approval;
pub mod pruning;
pub mod winner;

use crate::database::DbPool;

pub use pruning::NavigationHint;

/// Entry point for every review action other than voting
#[derive(Debug, Clone)]
pub struct ReviewService {
    pool: DbPool,
}

impl ReviewService {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }
}
