//! Branch pruning.
//!
//! Rejection never cascades: active children of a rejected node stay active
//! and are reported as `orphaned_children` in the hint.

use super::ReviewService;
use crate::error::Result;
use crate::logging::log_tree_operation;
use crate::models::{Candidate, Run};
use crate::state_machine::{RunEvent, RunState};
use serde::{Deserialize, Serialize};
use tracing::{instrument, warn};

/// Where a reviewer can resume after a rejection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NavigationHint {
    pub rejected_id: i64,
    pub parent_id: Option<i64>,
    /// Another active child of the same parent, if one remains
    pub sibling_id: Option<i64>,
    /// Active children left under the rejected node
    pub orphaned_children: i64,
}

impl ReviewService {
    /// Reject an active candidate and release its slot on the parent.
    ///
    /// A parent whose cached `child_count` is already 0 aborts the whole
    /// operation with a `Consistency` error.
    #[instrument(skip(self))]
    pub async fn reject(&self, candidate_id: i64) -> Result<NavigationHint> {
        let mut tx = self.pool.begin().await?;

        let rejected = Candidate::reject(&mut *tx, candidate_id).await?;
        if let Some(parent_id) = rejected.parent_id {
            Candidate::decrement_child_count(&mut *tx, parent_id).await?;
        }

        let mut reopened = false;
        if rejected.winner {
            Candidate::set_winner(&mut *tx, candidate_id, false).await?;
            let run = Run::get(&mut *tx, rejected.run_id).await?;
            if run.status == RunState::Completed {
                Run::transition(&mut *tx, run.id, RunEvent::Reopen).await?;
                reopened = true;
            }
        }

        let orphaned_children = Candidate::count_active_children(&mut *tx, candidate_id).await?;
        let sibling_id = match rejected.parent_id {
            Some(parent_id) => Candidate::active_children(&mut *tx, parent_id)
                .await?
                .first()
                .map(|sibling| sibling.id),
            None => None,
        };

        tx.commit().await?;

        if orphaned_children > 0 {
            warn!(
                candidate_id,
                orphaned_children, "Rejected candidate still has active children"
            );
        }

        log_tree_operation(
            "reject",
            Some(rejected.run_id),
            Some(candidate_id),
            rejected.parent_id,
            "rejected",
            reopened.then_some("winner cleared, run reopened"),
        );

        Ok(NavigationHint {
            rejected_id: candidate_id,
            parent_id: rejected.parent_id,
            sibling_id,
            orphaned_children,
        })
    }

    /// Count a failed child attempt against a parent, returning the new failure count
    #[instrument(skip(self))]
    pub async fn record_parent_failure(&self, candidate_id: i64) -> Result<i64> {
        let mut conn = self.pool.acquire().await?;
        let failure_count = Candidate::record_failure(&mut conn, candidate_id).await?;

        log_tree_operation(
            "record_parent_failure",
            None,
            Some(candidate_id),
            None,
            "recorded",
            Some(&format!("failure_count {failure_count}")),
        );
        Ok(failure_count)
    }
}
