//! # Maintenance
//!
//! Safety nets that run beside the main loops:
//!
//! - [`MaintenanceService::reconcile_child_counts`] recomputes every cached
//!   `child_count` from live rows and repairs drift.
//! - [`MaintenanceService::reclaim_stale_jobs`] fails jobs that have stayed
//!   in flight longer than the configured timeout.

use crate::database::DbPool;
use crate::error::{GentreeError, Result};
use crate::logging::log_tree_operation;
use crate::models::{Candidate, ChildCountDrift, Job};
use chrono::{DateTime, Utc};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Error recorded on reclaimed jobs
pub const STALE_JOB_MESSAGE: &str = "reclaimed: no progress within timeout";

pub struct MaintenanceService {
    pool: DbPool,
    stale_job_timeout: Option<Duration>,
}

impl MaintenanceService {
    /// `stale_job_timeout` of `None` disables reclamation
    pub fn new(pool: DbPool, stale_job_timeout: Option<Duration>) -> Self {
        Self {
            pool,
            stale_job_timeout,
        }
    }

    /// Repair every drifted `child_count` in one transaction, returning the repairs
    pub async fn reconcile_child_counts(&self) -> Result<Vec<ChildCountDrift>> {
        let mut tx = self.pool.begin().await?;
        let drift = Candidate::child_count_drift(&mut *tx).await?;

        for repair in &drift {
            Candidate::set_child_count(&mut *tx, repair.candidate_id, repair.live).await?;
            warn!(
                candidate_id = repair.candidate_id,
                cached = repair.cached,
                live = repair.live,
                "Repaired child_count drift"
            );
        }
        tx.commit().await?;

        if drift.is_empty() {
            debug!("child_count reconciliation found no drift");
        } else {
            log_tree_operation(
                "reconcile",
                None,
                None,
                None,
                "repaired",
                Some(&format!("{} candidates", drift.len())),
            );
        }
        Ok(drift)
    }

    /// Fail in-flight jobs older than the stale timeout
    pub async fn reclaim_stale_jobs(&self) -> Result<Vec<Job>> {
        self.reclaim_stale_jobs_as_of(Utc::now()).await
    }

    /// Same as [`Self::reclaim_stale_jobs`] with an explicit clock
    pub async fn reclaim_stale_jobs_as_of(&self, as_of: DateTime<Utc>) -> Result<Vec<Job>> {
        let Some(timeout) = self.stale_job_timeout else {
            return Ok(Vec::new());
        };

        let mut conn = self.pool.acquire().await?;
        let in_flight = Job::in_flight(&mut conn).await?;

        let mut reclaimed = Vec::new();
        for job in in_flight {
            let is_stale = (as_of - job.in_flight_since())
                .to_std()
                .is_ok_and(|age| age > timeout);
            if !is_stale {
                continue;
            }

            match Job::mark_failed(&mut conn, job.id, STALE_JOB_MESSAGE).await {
                Ok(failed) => {
                    warn!(
                        job_id = failed.id,
                        run_id = failed.run_id,
                        since = %job.in_flight_since(),
                        "Reclaimed stale job"
                    );
                    reclaimed.push(failed);
                }
                // Finished between the read and the write
                Err(e) if e.is_consistency() || matches!(e, GentreeError::StateTransition { .. }) => {
                    debug!(job_id = job.id, "Job finished before it could be reclaimed");
                }
                Err(e) => return Err(e),
            }
        }

        if !reclaimed.is_empty() {
            info!(count = reclaimed.len(), "Stale job reclamation complete");
        }
        Ok(reclaimed)
    }
}
