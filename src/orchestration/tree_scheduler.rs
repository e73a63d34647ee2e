//! # Tree Scheduler
//!
//! Selects the single next unit of work across all active runs.
//!
//! ## Algorithm
//!
//! 1. **Run fairness**: schedulable runs are scanned in id order, resuming
//!    after the last run that received submittable work (wrap-around).
//! 2. **Base replenishment**: the first step is topped up while its active
//!    candidates plus in-flight jobs stay below the step's cap.
//! 3. **Breadth-first expansion**: for each later step, the previous step's
//!    approved top-K candidates with spare capacity are eligible parents. The
//!    least-loaded of them enter a weighted raffle by `elo_score`, so every
//!    parent gets a child before any parent gets another.
//! 4. **Waiting vs. exhausted**: an unapproved parent-providing step that
//!    already has active candidates means `waiting_for_approval`; otherwise
//!    the run has no work.
//!
//! Real work from any run wins over waiting. The only write is the fairness
//! cursor, and only when submittable work is returned.

use super::types::{ScheduledUnit, SchedulingMode};
use super::weighted_raffle::weighted_raffle;
use crate::config::SchedulerConfig;
use crate::database::DbPool;
use crate::error::Result;
use crate::models::{ApprovalGate, Candidate, Job, PipelineStep, Run, SchedulerState};
use rand::rngs::StdRng;
use rand::SeedableRng;
use sqlx::SqliteConnection;
use std::sync::Mutex;
use tracing::{debug, info, instrument};

pub struct TreeScheduler {
    pool: DbPool,
    config: SchedulerConfig,
    rng: Mutex<StdRng>,
}

/// An eligible parent and how many children it has or has on the way
struct ParentLoad {
    candidate: Candidate,
    load: i64,
}

impl TreeScheduler {
    pub fn new(pool: DbPool, config: SchedulerConfig) -> Self {
        Self {
            pool,
            config,
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    /// Deterministic raffle draws, for reproducible tests
    pub fn with_seed(pool: DbPool, config: SchedulerConfig, seed: u64) -> Self {
        Self {
            pool,
            config,
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Decide the next unit of work. Reads happen in one transaction together
    /// with the fairness cursor update.
    #[instrument(skip(self))]
    pub async fn select_next_unit(&self) -> Result<ScheduledUnit> {
        let mut tx = self.pool.begin().await?;

        let runs = Run::schedulable(&mut *tx).await?;
        if runs.is_empty() {
            tx.commit().await?;
            debug!("No schedulable runs");
            return Ok(ScheduledUnit::no_work());
        }

        let last_serviced = SchedulerState::last_serviced_run_id(&mut *tx).await?;
        let start = rotation_start(runs.iter().map(|r| r.id), last_serviced);

        let mut waiting = None;
        for run in runs[start..].iter().chain(runs[..start].iter()) {
            let unit = self.evaluate_run(&mut *tx, run).await?;
            if unit.is_submittable() {
                SchedulerState::set_last_serviced_run_id(&mut *tx, run.id).await?;
                tx.commit().await?;
                info!(
                    mode = %unit.mode,
                    run_id = run.id,
                    step_id = ?unit.step_id,
                    parent_id = ?unit.parent_id,
                    "🎯 Scheduled next unit of work"
                );
                return Ok(unit);
            }
            if waiting.is_none() && unit.mode == SchedulingMode::WaitingForApproval {
                waiting = Some(unit);
            }
        }

        tx.commit().await?;
        let unit = waiting.unwrap_or_else(ScheduledUnit::no_work);
        debug!(mode = %unit.mode, run_id = ?unit.run_id, step_id = ?unit.step_id, "No submittable work");
        Ok(unit)
    }

    /// Evaluate one run: base replenishment, then breadth-first expansion, then waiting
    async fn evaluate_run(&self, conn: &mut SqliteConnection, run: &Run) -> Result<ScheduledUnit> {
        let steps = PipelineStep::for_pipeline(conn, run.pipeline_id).await?;
        let Some(base) = steps.first() else {
            debug!(run_id = run.id, "Pipeline has no steps");
            return Ok(ScheduledUnit::no_work());
        };

        let base_cap = base.effective_max_children(self.config.max_branching_factor);
        let active = Candidate::count_active_for_step(conn, run.id, base.id).await?;
        if active < base_cap {
            // Active and in-flight are bounded separately, each against the cap
            let in_flight = Job::count_in_flight_for_step(conn, run.id, base.id).await?;
            if in_flight < base_cap {
                return Ok(ScheduledUnit::base_generation(run.id, base.id));
            }
            debug!(run_id = run.id, active, in_flight, cap = base_cap, "Base step saturated by in-flight jobs");
        }

        for pair in steps.windows(2) {
            let (source, target) = (&pair[0], &pair[1]);
            let eligible = self.eligible_parents(conn, run.id, source, target).await?;
            if eligible.is_empty() {
                continue;
            }

            let min_load = eligible.iter().map(|p| p.load).min().unwrap_or_default();
            let least_loaded: Vec<Candidate> = eligible
                .into_iter()
                .filter(|p| p.load == min_load)
                .map(|p| p.candidate)
                .collect();

            let parent_id = {
                let mut rng = self.rng.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
                weighted_raffle(&least_loaded, &mut *rng).map(|c| c.id)
            };

            if let Some(parent_id) = parent_id {
                return Ok(ScheduledUnit::child_generation(run.id, target.id, parent_id));
            }
        }

        for pair in steps.windows(2) {
            let source = &pair[0];
            if !ApprovalGate::is_approved(conn, run.id, source.id).await?
                && Candidate::count_active_for_step(conn, run.id, source.id).await? > 0
            {
                return Ok(ScheduledUnit::waiting_for_approval(run.id, source.id));
            }
        }

        Ok(ScheduledUnit::no_work())
    }

    /// Parents at `source` allowed to spawn a child at `target`: approved gate,
    /// within top-K, under the failure ceiling and below `target`'s cap.
    async fn eligible_parents(
        &self,
        conn: &mut SqliteConnection,
        run_id: i64,
        source: &PipelineStep,
        target: &PipelineStep,
    ) -> Result<Vec<ParentLoad>> {
        let Some(gate) = ApprovalGate::find(conn, run_id, source.id).await? else {
            return Ok(Vec::new());
        };
        if !gate.approved {
            return Ok(Vec::new());
        }

        let cap = target.effective_max_children(self.config.max_branching_factor);
        let top_k = Candidate::top_k(conn, run_id, source.id, gate.top_k_count).await?;

        let mut eligible = Vec::with_capacity(top_k.len());
        for candidate in top_k {
            if candidate.failure_count > self.config.max_parent_failures {
                debug!(candidate_id = candidate.id, failures = candidate.failure_count, "Parent over failure ceiling");
                continue;
            }
            let in_flight = Job::count_in_flight_for_parent(conn, candidate.id).await?;
            let load = candidate.child_count + in_flight;
            if load < cap {
                eligible.push(ParentLoad { candidate, load });
            }
        }

        Ok(eligible)
    }
}

/// Index of the first run to scan: the first id after `last_serviced`, wrapping to 0
fn rotation_start(run_ids: impl Iterator<Item = i64>, last_serviced: Option<i64>) -> usize {
    let Some(last) = last_serviced else {
        return 0;
    };
    run_ids.enumerate().find(|(_, id)| *id > last).map_or(0, |(idx, _)| idx)
}
