//! Score-proportional random selection.
//!
//! Higher-rated parents are favored without starving lower-rated ones: each
//! candidate's chance is its `elo_score` over the sum of scores. Negative
//! scores weigh zero; if every weight is zero the pick is uniform.

use crate::models::Candidate;
use rand::Rng;

/// Pick one item with probability proportional to `weight(item)`.
///
/// Returns `None` only for an empty slice.
pub fn weighted_pick<'a, T, R, F>(items: &'a [T], weight: F, rng: &mut R) -> Option<&'a T>
where
    R: Rng + ?Sized,
    F: Fn(&T) -> i64,
{
    match items {
        [] => None,
        [only] => Some(only),
        _ => {
            let weights: Vec<u64> = items.iter().map(|item| weight(item).max(0) as u64).collect();
            let total: u64 = weights.iter().sum();
            if total == 0 {
                return items.get(rng.gen_range(0..items.len()));
            }

            let mut ticket = rng.gen_range(0..total);
            for (item, w) in items.iter().zip(&weights) {
                if ticket < *w {
                    return Some(item);
                }
                ticket -= w;
            }
            items.last()
        }
    }
}

/// Weighted raffle over candidate parents by `elo_score`
pub fn weighted_raffle<'a, R: Rng + ?Sized>(candidates: &'a [Candidate], rng: &mut R) -> Option<&'a Candidate> {
    weighted_pick(candidates, |c| c.elo_score, rng)
}
