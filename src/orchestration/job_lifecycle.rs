//! # Job Lifecycle Manager
//!
//! Submits work to the external compute service, polls it, and materializes
//! completed jobs as candidates.
//!
//! ## State Machine
//!
//! ```text
//! pending -> submitted -> running -> completed | failed
//!               |-------------------> completed | failed
//! pending -> failed
//! ```
//!
//! Submit persists the job before calling out, so a failed call leaves a
//! `failed` job with the error instead of nothing. Poll only touches the job
//! row. Ingest creates the candidate and bumps the parent's `child_count` in
//! one transaction.

use super::payload_builder::{build_payload, NonceValues, PayloadContext};
use super::types::PollOutcome;
use crate::compute::{ComputeService, ExternalJobStatus, OutputEntry};
use crate::constants::JobStatus;
use crate::database::DbPool;
use crate::error::{GentreeError, Result};
use crate::logging::{log_job_operation, log_tree_operation};
use crate::models::{Candidate, Job, NewCandidate, NewJob, PipelineStep, Run};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};

/// Settings the lifecycle reads from configuration
#[derive(Debug, Clone)]
pub struct LifecycleConfig {
    /// Connection failures tolerated per job before it is failed
    pub max_retries: u32,
    /// Directory artifact paths are resolved against
    pub artifact_root: PathBuf,
}

pub struct JobLifecycleManager {
    pool: DbPool,
    compute: Arc<dyn ComputeService>,
    config: LifecycleConfig,
}

impl JobLifecycleManager {
    pub fn new(pool: DbPool, compute: Arc<dyn ComputeService>, config: LifecycleConfig) -> Self {
        Self {
            pool,
            compute,
            config,
        }
    }

    /// Build the payload, persist a pending job, submit it and record the external id.
    ///
    /// Payload validation errors abort before any row is written. A failed
    /// external call marks the job `failed` and is returned to the caller.
    #[instrument(skip(self))]
    pub async fn submit(&self, run_id: i64, step_id: i64, parent_id: Option<i64>) -> Result<Job> {
        let mut conn = self.pool.acquire().await?;
        let run = Run::get(&mut conn, run_id).await?;
        let step = PipelineStep::get(&mut conn, step_id).await?;
        if step.pipeline_id != run.pipeline_id {
            return Err(GentreeError::validation(format!(
                "step {step_id} does not belong to the pipeline of run {run_id}"
            )));
        }
        let parent = match parent_id {
            Some(id) => Some(Candidate::get(&mut conn, id).await?),
            None => None,
        };

        let nonce = NonceValues::generate();
        let payload = build_payload(&PayloadContext {
            run: &run,
            step: &step,
            parent: parent.as_ref(),
            nonce: &nonce,
        })?;

        let job = Job::create(
            &mut conn,
            NewJob {
                run_id,
                step_id,
                parent_candidate_id: parent_id,
                payload: payload.clone(),
            },
        )
        .await?;
        drop(conn);

        match self.compute.submit(&payload).await {
            Ok(external_id) => {
                let mut tx = self.pool.begin().await?;
                let job = Job::mark_submitted(&mut *tx, job.id, &external_id).await?;
                Run::mark_started(&mut *tx, run_id).await?;
                tx.commit().await?;

                log_job_operation(
                    "submit",
                    Some(job.id),
                    Some(run_id),
                    Some(step_id),
                    job.status.as_str(),
                    Some(&external_id),
                );
                Ok(job)
            }
            Err(e) => {
                error!(job_id = job.id, run_id, step_id, error = %e, "Job submission failed");
                let mut conn = self.pool.acquire().await?;
                Job::mark_failed(&mut conn, job.id, &e.to_string()).await?;
                Err(e)
            }
        }
    }

    /// Query the external status of one job and record it on the job row
    #[instrument(skip(self))]
    pub async fn poll(&self, job_id: i64) -> Result<PollOutcome> {
        let mut conn = self.pool.acquire().await?;
        let job = Job::get(&mut conn, job_id).await?;

        if job.status.is_terminal() {
            return Ok(PollOutcome {
                job_id,
                status: job.status,
                needs_processing: job.status == JobStatus::Completed && job.candidate_id.is_none(),
            });
        }

        let Some(external_id) = job.external_job_id.clone() else {
            debug!(job_id, "Job has not been submitted yet");
            return Ok(PollOutcome {
                job_id,
                status: job.status,
                needs_processing: false,
            });
        };
        drop(conn);

        let status = self.compute.get_status(&external_id).await;
        let mut conn = self.pool.acquire().await?;

        match status {
            Ok(ExternalJobStatus::Running) => {
                let status = if job.status == JobStatus::Submitted {
                    Job::mark_running(&mut conn, job_id).await?.status
                } else {
                    job.status
                };
                Ok(PollOutcome {
                    job_id,
                    status,
                    needs_processing: false,
                })
            }
            Ok(ExternalJobStatus::Completed { outputs }) => {
                let result = ExternalJobStatus::result_metadata(&outputs);
                let job = Job::mark_completed(&mut conn, job_id, &result).await?;
                log_job_operation(
                    "poll",
                    Some(job_id),
                    Some(job.run_id),
                    Some(job.step_id),
                    job.status.as_str(),
                    None,
                );
                Ok(PollOutcome {
                    job_id,
                    status: job.status,
                    needs_processing: true,
                })
            }
            Ok(ExternalJobStatus::Failed { error }) => {
                let job = Job::mark_failed(&mut conn, job_id, &error).await?;
                warn!(job_id, run_id = job.run_id, error = %error, "External job failed");
                Ok(PollOutcome {
                    job_id,
                    status: job.status,
                    needs_processing: false,
                })
            }
            Err(e) if e.is_connection() => {
                let retries = Job::increment_retry_count(&mut conn, job_id).await?;
                if retries > i64::from(self.config.max_retries) {
                    let message = format!("compute service unreachable after {retries} attempts: {e}");
                    let job = Job::mark_failed(&mut conn, job_id, &message).await?;
                    error!(job_id, retries, "Job failed: polling budget exhausted");
                    return Ok(PollOutcome {
                        job_id,
                        status: job.status,
                        needs_processing: false,
                    });
                }
                warn!(job_id, retries, max_retries = self.config.max_retries, error = %e, "Poll failed, will retry next tick");
                Ok(PollOutcome {
                    job_id,
                    status: job.status,
                    needs_processing: false,
                })
            }
            Err(e) if e.is_protocol() => {
                let job = Job::mark_failed(&mut conn, job_id, &e.to_string()).await?;
                error!(job_id, error = %e, "Job failed: unexpected response from compute service");
                Ok(PollOutcome {
                    job_id,
                    status: job.status,
                    needs_processing: false,
                })
            }
            Err(e) => Err(e),
        }
    }

    /// Materialize the candidate produced by a completed job.
    ///
    /// Idempotent: a job already linked returns its candidate.
    #[instrument(skip(self))]
    pub async fn ingest(&self, job_id: i64) -> Result<Candidate> {
        let mut tx = self.pool.begin().await?;
        let job = Job::get(&mut *tx, job_id).await?;

        if let Some(candidate_id) = job.candidate_id {
            let candidate = Candidate::get(&mut *tx, candidate_id).await?;
            tx.commit().await?;
            return Ok(candidate);
        }

        if job.status != JobStatus::Completed {
            return Err(GentreeError::validation(format!(
                "job {job_id} is {}, only completed jobs can be ingested",
                job.status
            )));
        }

        let output = first_output(&job)?;
        let artifact_path = output.artifact_path(&self.config.artifact_root);

        let candidate = Candidate::create(
            &mut *tx,
            NewCandidate {
                run_id: job.run_id,
                step_id: job.step_id,
                parent_id: job.parent_candidate_id,
                artifact_path,
            },
        )
        .await?;
        Job::link_candidate(&mut *tx, job_id, candidate.id).await?;
        tx.commit().await?;

        log_tree_operation(
            "ingest",
            Some(candidate.run_id),
            Some(candidate.id),
            candidate.parent_id,
            candidate.status.as_str(),
            Some(&candidate.artifact_path),
        );
        info!(job_id, candidate_id = candidate.id, "✅ Candidate materialized");
        Ok(candidate)
    }
}

/// First output entry of the job's stored result metadata
fn first_output(job: &Job) -> Result<OutputEntry> {
    let entry = job
        .result
        .as_ref()
        .and_then(|result| result.0.get("outputs"))
        .and_then(|outputs| outputs.as_array())
        .and_then(|outputs| outputs.first())
        .ok_or_else(|| {
            GentreeError::protocol(format!("job {} has no output entries in its result", job.id))
        })?;

    serde_json::from_value(entry.clone())
        .map_err(|e| GentreeError::protocol(format!("job {} has a malformed output entry: {e}", job.id)))
}
