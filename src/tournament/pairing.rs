//! Unvoted pair selection and triage-right ordering across steps.

use super::{CandidatePair, TournamentEngine};
use crate::error::Result;
use crate::models::{Candidate, PipelineStep, Run, Vote};
use rand::seq::SliceRandom;
use rand::Rng;
use std::collections::HashSet;
use tracing::debug;

/// Pick an uncompared pair, uniformly among those with the lowest combined `vote_count`.
///
/// `voted` holds already-compared pairs as `(min_id, max_id)`. The returned
/// indices point into `candidates`.
pub fn select_unvoted_pair<R: Rng + ?Sized>(
    candidates: &[Candidate],
    voted: &HashSet<(i64, i64)>,
    rng: &mut R,
) -> Option<(usize, usize)> {
    let mut lowest = i64::MAX;
    let mut best = Vec::new();

    for (i, a) in candidates.iter().enumerate() {
        for (j, b) in candidates.iter().enumerate().skip(i + 1) {
            if voted.contains(&(a.id.min(b.id), a.id.max(b.id))) {
                continue;
            }
            let combined = a.vote_count + b.vote_count;
            if combined < lowest {
                lowest = combined;
                best.clear();
            }
            if combined == lowest {
                best.push((i, j));
            }
        }
    }

    best.choose(rng).copied()
}

impl TournamentEngine {
    /// An uncompared pair of active candidates in one (run, step), if any
    pub async fn next_unvoted_pair(&self, run_id: i64, step_id: i64) -> Result<Option<CandidatePair>> {
        let mut conn = self.pool.acquire().await?;
        let candidates = Candidate::active_for_step(&mut conn, run_id, step_id).await?;
        if candidates.len() < 2 {
            return Ok(None);
        }
        let voted = Vote::voted_pairs_for_step(&mut conn, run_id, step_id).await?;

        let picked = {
            let mut rng = self.rng.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            select_unvoted_pair(&candidates, &voted, &mut *rng)
        };

        Ok(picked.map(|(i, j)| {
            let (a, b) = (&candidates[i], &candidates[j]);
            // Least-compared side first
            let (a, b) = if (b.vote_count, b.id) < (a.vote_count, a.id) { (b, a) } else { (a, b) };
            CandidatePair {
                a: a.clone(),
                b: b.clone(),
            }
        }))
    }

    /// Triage-right: the most advanced step with an unvoted pair wins
    pub async fn next_pair_for_run(&self, run_id: i64) -> Result<Option<CandidatePair>> {
        let steps = {
            let mut conn = self.pool.acquire().await?;
            let run = Run::get(&mut conn, run_id).await?;
            PipelineStep::for_pipeline(&mut conn, run.pipeline_id).await?
        };

        for step in steps.iter().rev() {
            if let Some(pair) = self.next_unvoted_pair(run_id, step.id).await? {
                debug!(run_id, step_id = step.id, position = step.position, "Next comparison selected");
                return Ok(Some(pair));
            }
        }
        Ok(None)
    }
}
