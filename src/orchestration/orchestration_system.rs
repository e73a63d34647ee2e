//! # Orchestration System
//!
//! Owns the background loops that drive the generation tree:
//!
//! - **submitter**: asks the [`TreeScheduler`] for the next unit and hands
//!   submittable units to the [`JobLifecycleManager`]
//! - **poller**: reclaims stale jobs, retries pending ingests, then polls every
//!   in-flight job and ingests completions
//! - **reconciler**: periodic `child_count` reconciliation
//!
//! Each loop is a tokio task on its own interval. A tick logs its own errors
//! and never ends the loop; only the shutdown channel does.

use super::job_lifecycle::{JobLifecycleManager, LifecycleConfig};
use super::maintenance::MaintenanceService;
use super::tree_scheduler::TreeScheduler;
use super::types::ScheduledUnit;
use crate::compute::ComputeService;
use crate::config::GentreeConfig;
use crate::constants::JobStatus;
use crate::database::DbPool;
use crate::error::Result;
use crate::logging::log_error;
use crate::models::{Candidate, Job};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

/// What one submitter tick did
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmitterTick {
    pub unit: ScheduledUnit,
    /// Job created for a submittable unit
    pub job_id: Option<i64>,
}

/// Counters from one poller tick
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PollerTickSummary {
    pub reclaimed: usize,
    pub polled: usize,
    pub completed: usize,
    pub failed: usize,
    pub ingested: usize,
    pub parent_failures_recorded: usize,
    pub errors: usize,
}

/// Join handles of the spawned loops
pub struct OrchestrationHandles {
    pub submitter: JoinHandle<()>,
    pub poller: JoinHandle<()>,
    pub reconciler: JoinHandle<()>,
}

impl OrchestrationHandles {
    /// Wait for every loop to observe shutdown
    pub async fn join(self) {
        let (submitter, poller, reconciler) = tokio::join!(self.submitter, self.poller, self.reconciler);
        for (name, result) in [("submitter", submitter), ("poller", poller), ("reconciler", reconciler)] {
            if let Err(e) = result {
                warn!(loop_name = name, error = %e, "Background loop ended abnormally");
            }
        }
    }
}

pub struct OrchestrationSystem {
    pool: DbPool,
    scheduler: TreeScheduler,
    lifecycle: JobLifecycleManager,
    maintenance: MaintenanceService,
    submit_interval: Duration,
    poll_interval: Duration,
    reconcile_interval: Duration,
}

impl OrchestrationSystem {
    pub fn new(pool: DbPool, compute: Arc<dyn ComputeService>, config: &GentreeConfig) -> Self {
        let scheduler = TreeScheduler::new(pool.clone(), config.scheduler.clone());
        Self::with_scheduler(pool, compute, config, scheduler)
    }

    /// Build around a caller-supplied scheduler (e.g. a seeded one)
    pub fn with_scheduler(
        pool: DbPool,
        compute: Arc<dyn ComputeService>,
        config: &GentreeConfig,
        scheduler: TreeScheduler,
    ) -> Self {
        let lifecycle = JobLifecycleManager::new(
            pool.clone(),
            compute,
            LifecycleConfig {
                max_retries: config.compute.max_retries,
                artifact_root: config.artifacts.root.clone(),
            },
        );
        let maintenance = MaintenanceService::new(pool.clone(), config.poller.stale_job_timeout());

        Self {
            pool,
            scheduler,
            lifecycle,
            maintenance,
            submit_interval: config.scheduler.submit_interval(),
            poll_interval: config.poller.poll_interval(),
            reconcile_interval: config.poller.reconcile_interval(),
        }
    }

    pub fn scheduler(&self) -> &TreeScheduler {
        &self.scheduler
    }

    pub fn lifecycle(&self) -> &JobLifecycleManager {
        &self.lifecycle
    }

    pub fn maintenance(&self) -> &MaintenanceService {
        &self.maintenance
    }

    /// One submitter pass: schedule, then submit if there is work
    pub async fn run_submitter_tick(&self) -> Result<SubmitterTick> {
        let unit = self.scheduler.select_next_unit().await?;

        let (Some(run_id), Some(step_id)) = (unit.run_id, unit.step_id) else {
            return Ok(SubmitterTick { unit, job_id: None });
        };
        if !unit.is_submittable() {
            return Ok(SubmitterTick { unit, job_id: None });
        }

        let job = self.lifecycle.submit(run_id, step_id, unit.parent_id).await?;
        Ok(SubmitterTick {
            unit,
            job_id: Some(job.id),
        })
    }

    /// One poller pass. Failures are isolated per job and counted, never returned.
    pub async fn run_poller_tick(&self) -> PollerTickSummary {
        let mut summary = PollerTickSummary::default();

        match self.maintenance.reclaim_stale_jobs().await {
            Ok(reclaimed) => {
                summary.reclaimed = reclaimed.len();
                for job in &reclaimed {
                    self.record_parent_failure(job, &mut summary).await;
                }
            }
            Err(e) => {
                summary.errors += 1;
                log_error("poller", "reclaim_stale_jobs", &e.to_string(), None);
            }
        }

        // Completions whose ingest failed on an earlier tick
        match self.jobs_pending_ingest().await {
            Ok(pending_ingest) => {
                for job in pending_ingest {
                    self.ingest_job(job.id, &mut summary).await;
                }
            }
            Err(e) => {
                summary.errors += 1;
                log_error("poller", "completed_without_candidate", &e.to_string(), None);
            }
        }

        let jobs = match self.pollable_jobs().await {
            Ok(jobs) => jobs,
            Err(e) => {
                summary.errors += 1;
                log_error("poller", "pollable", &e.to_string(), None);
                return summary;
            }
        };

        for job in jobs {
            summary.polled += 1;
            match self.lifecycle.poll(job.id).await {
                Ok(outcome) => {
                    if outcome.needs_processing {
                        summary.completed += 1;
                        self.ingest_job(job.id, &mut summary).await;
                    }
                    if outcome.status == JobStatus::Failed {
                        summary.failed += 1;
                        self.record_parent_failure(&job, &mut summary).await;
                    }
                }
                Err(e) => {
                    summary.errors += 1;
                    log_error("poller", "poll", &e.to_string(), Some(&format!("job_id={}", job.id)));
                }
            }
        }

        if summary != PollerTickSummary::default() {
            debug!(?summary, "Poller tick complete");
        }
        summary
    }

    async fn jobs_pending_ingest(&self) -> Result<Vec<Job>> {
        let mut conn = self.pool.acquire().await?;
        Job::completed_without_candidate(&mut conn).await
    }

    async fn pollable_jobs(&self) -> Result<Vec<Job>> {
        let mut conn = self.pool.acquire().await?;
        Job::pollable(&mut conn).await
    }

    async fn increment_parent_failures(&self, parent_id: i64) -> Result<i64> {
        let mut conn = self.pool.acquire().await?;
        Candidate::record_failure(&mut conn, parent_id).await
    }

    async fn ingest_job(&self, job_id: i64, summary: &mut PollerTickSummary) {
        match self.lifecycle.ingest(job_id).await {
            Ok(_) => summary.ingested += 1,
            Err(e) => {
                summary.errors += 1;
                log_error("poller", "ingest", &e.to_string(), Some(&format!("job_id={job_id}")));
            }
        }
    }

    async fn record_parent_failure(&self, job: &Job, summary: &mut PollerTickSummary) {
        let Some(parent_id) = job.parent_candidate_id else {
            return;
        };
        match self.increment_parent_failures(parent_id).await {
            Ok(failures) => {
                summary.parent_failures_recorded += 1;
                debug!(parent_id, failures, job_id = job.id, "Recorded parent failure");
            }
            Err(e) => {
                summary.errors += 1;
                log_error("poller", "record_failure", &e.to_string(), Some(&format!("parent_id={parent_id}")));
            }
        }
    }

    /// Spawn the submitter, poller and reconciler loops.
    ///
    /// Send `true` on the shutdown channel (or drop its sender) to stop them.
    pub fn start(self: Arc<Self>, shutdown: watch::Receiver<bool>) -> OrchestrationHandles {
        info!(
            submit_interval_ms = self.submit_interval.as_millis() as u64,
            poll_interval_ms = self.poll_interval.as_millis() as u64,
            reconcile_interval_ms = self.reconcile_interval.as_millis() as u64,
            "🚀 Starting generation tree orchestration loops"
        );

        let submitter = {
            let system = Arc::clone(&self);
            let shutdown = shutdown.clone();
            tokio::spawn(async move { system.submitter_loop(shutdown).await })
        };
        let poller = {
            let system = Arc::clone(&self);
            let shutdown = shutdown.clone();
            tokio::spawn(async move { system.poller_loop(shutdown).await })
        };
        let reconciler = {
            let system = Arc::clone(&self);
            tokio::spawn(async move { system.reconcile_loop(shutdown).await })
        };

        OrchestrationHandles {
            submitter,
            poller,
            reconciler,
        }
    }

    async fn submitter_loop(&self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = interval(self.submit_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match self.run_submitter_tick().await {
                        Ok(tick) => debug!(mode = %tick.unit.mode, job_id = ?tick.job_id, "Submitter tick"),
                        Err(e) => log_error("submitter", "tick", &e.to_string(), None),
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        info!("Submitter loop stopped");
    }

    async fn poller_loop(&self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.run_poller_tick().await;
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        info!("Poller loop stopped");
    }

    async fn reconcile_loop(&self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = interval(self.reconcile_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.maintenance.reconcile_child_counts().await {
                        log_error("reconciler", "reconcile_child_counts", &e.to_string(), None);
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        info!("Reconcile loop stopped");
    }
}
