//! # Job Model
//!
//! One external asynchronous compute request, tied to exactly one (run, step)
//! and optionally a parent candidate.
//!
//! ## State Machine Integration
//!
//! Status changes go through [`Job::transition`], which resolves the target
//! state with the job transition table and writes it conditionally on the
//! status it read. Timestamps follow the event: `submitted_at` on submit,
//! `completed_at` on complete or fail.

use crate::constants::{status_groups, JobStatus};
use crate::error::{GentreeError, Result};
use crate::state_machine::{job_target_state, JobEvent};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::types::Json;
use sqlx::{FromRow, SqliteConnection};

/// Maps to `jobs` table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Job {
    pub id: i64,
    pub run_id: i64,
    pub step_id: i64,
    pub parent_candidate_id: Option<i64>,
    /// Candidate produced on successful ingest
    pub candidate_id: Option<i64>,
    #[sqlx(try_from = "String")]
    pub status: JobStatus,
    pub external_job_id: Option<String>,
    /// Fully substituted request body sent to the compute service
    pub payload: Json<Value>,
    /// Normalized output metadata from the compute service
    pub result: Option<Json<Value>>,
    pub error_message: Option<String>,
    pub retry_count: i64,
    pub submitted_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// New Job for creation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewJob {
    pub run_id: i64,
    pub step_id: i64,
    pub parent_candidate_id: Option<i64>,
    pub payload: Value,
}

/// Column values written alongside a status change
#[derive(Debug, Clone, Default)]
pub struct JobTransitionData<'a> {
    pub external_job_id: Option<&'a str>,
    pub result: Option<&'a Value>,
    pub error_message: Option<&'a str>,
}

const JOB_COLUMNS: &str = "id, run_id, step_id, parent_candidate_id, candidate_id, status, \
     external_job_id, payload, result, error_message, retry_count, submitted_at, completed_at, \
     created_at, updated_at";

fn in_flight_placeholders() -> String {
    vec!["?"; status_groups::IN_FLIGHT_JOB_STATES.len()].join(", ")
}

impl Job {
    /// Persist a `pending` job
    pub async fn create(conn: &mut SqliteConnection, new_job: NewJob) -> Result<Job> {
        let now = Utc::now();
        let job = sqlx::query_as::<_, Job>(&format!(
            r#"
            INSERT INTO jobs (run_id, step_id, parent_candidate_id, status, payload, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            RETURNING {JOB_COLUMNS}
            "#
        ))
        .bind(new_job.run_id)
        .bind(new_job.step_id)
        .bind(new_job.parent_candidate_id)
        .bind(JobStatus::Pending.as_str())
        .bind(Json(&new_job.payload))
        .bind(now)
        .bind(now)
        .fetch_one(&mut *conn)
        .await?;

        Ok(job)
    }

    pub async fn find_by_id(conn: &mut SqliteConnection, id: i64) -> Result<Option<Job>> {
        let job = sqlx::query_as::<_, Job>(&format!("SELECT {JOB_COLUMNS} FROM jobs WHERE id = ?"))
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?;

        Ok(job)
    }

    /// Find a job by ID, failing with `NotFound` when absent
    pub async fn get(conn: &mut SqliteConnection, id: i64) -> Result<Job> {
        Self::find_by_id(conn, id)
            .await?
            .ok_or_else(|| GentreeError::not_found("job", id))
    }

    /// Apply a job event through the transition table and return the updated row
    pub async fn transition(
        conn: &mut SqliteConnection,
        id: i64,
        event: JobEvent,
        data: JobTransitionData<'_>,
    ) -> Result<Job> {
        let job = Self::get(conn, id).await?;
        let target = job_target_state(id, job.status, event)?;
        let now = Utc::now();

        let submitted_at = (event == JobEvent::Submit).then_some(now);
        let completed_at = matches!(event, JobEvent::Complete | JobEvent::Fail).then_some(now);

        let updated = sqlx::query(
            r#"
            UPDATE jobs SET
                status = ?,
                external_job_id = COALESCE(?, external_job_id),
                result = COALESCE(?, result),
                error_message = COALESCE(?, error_message),
                submitted_at = COALESCE(?, submitted_at),
                completed_at = COALESCE(?, completed_at),
                updated_at = ?
            WHERE id = ? AND status = ?
            "#,
        )
        .bind(target.as_str())
        .bind(data.external_job_id)
        .bind(data.result.map(Json))
        .bind(data.error_message)
        .bind(submitted_at)
        .bind(completed_at)
        .bind(now)
        .bind(id)
        .bind(job.status.as_str())
        .execute(&mut *conn)
        .await?;

        if updated.rows_affected() == 0 {
            return Err(GentreeError::consistency(format!(
                "job {id} changed status concurrently while applying '{event}'"
            )));
        }

        Self::get(conn, id).await
    }

    pub async fn mark_submitted(conn: &mut SqliteConnection, id: i64, external_job_id: &str) -> Result<Job> {
        Self::transition(
            conn,
            id,
            JobEvent::Submit,
            JobTransitionData {
                external_job_id: Some(external_job_id),
                ..Default::default()
            },
        )
        .await
    }

    pub async fn mark_running(conn: &mut SqliteConnection, id: i64) -> Result<Job> {
        Self::transition(conn, id, JobEvent::Start, JobTransitionData::default()).await
    }

    pub async fn mark_completed(conn: &mut SqliteConnection, id: i64, result: &Value) -> Result<Job> {
        Self::transition(
            conn,
            id,
            JobEvent::Complete,
            JobTransitionData {
                result: Some(result),
                ..Default::default()
            },
        )
        .await
    }

    pub async fn mark_failed(conn: &mut SqliteConnection, id: i64, error_message: &str) -> Result<Job> {
        Self::transition(
            conn,
            id,
            JobEvent::Fail,
            JobTransitionData {
                error_message: Some(error_message),
                ..Default::default()
            },
        )
        .await
    }

    /// In-flight jobs for one (run, step)
    pub async fn count_in_flight_for_step(
        conn: &mut SqliteConnection,
        run_id: i64,
        step_id: i64,
    ) -> Result<i64> {
        let sql = format!(
            "SELECT COUNT(*) FROM jobs WHERE run_id = ? AND step_id = ? AND status IN ({})",
            in_flight_placeholders()
        );
        let mut query = sqlx::query_scalar::<_, i64>(&sql).bind(run_id).bind(step_id);
        for state in status_groups::IN_FLIGHT_JOB_STATES {
            query = query.bind(state.as_str());
        }
        Ok(query.fetch_one(&mut *conn).await?)
    }

    /// In-flight jobs that will produce a child of `parent_id`
    pub async fn count_in_flight_for_parent(conn: &mut SqliteConnection, parent_id: i64) -> Result<i64> {
        let sql = format!(
            "SELECT COUNT(*) FROM jobs WHERE parent_candidate_id = ? AND status IN ({})",
            in_flight_placeholders()
        );
        let mut query = sqlx::query_scalar::<_, i64>(&sql).bind(parent_id);
        for state in status_groups::IN_FLIGHT_JOB_STATES {
            query = query.bind(state.as_str());
        }
        Ok(query.fetch_one(&mut *conn).await?)
    }

    /// All jobs not yet finished on the external service, oldest first
    pub async fn in_flight(conn: &mut SqliteConnection) -> Result<Vec<Job>> {
        let sql = format!(
            "SELECT {JOB_COLUMNS} FROM jobs WHERE status IN ({}) ORDER BY id ASC",
            in_flight_placeholders()
        );
        let mut query = sqlx::query_as::<_, Job>(&sql);
        for state in status_groups::IN_FLIGHT_JOB_STATES {
            query = query.bind(state.as_str());
        }
        Ok(query.fetch_all(&mut *conn).await?)
    }

    /// Jobs with an external id that the poller should query
    pub async fn pollable(conn: &mut SqliteConnection) -> Result<Vec<Job>> {
        let jobs = sqlx::query_as::<_, Job>(&format!(
            r#"
            SELECT {JOB_COLUMNS} FROM jobs
            WHERE status IN (?, ?) AND external_job_id IS NOT NULL
            ORDER BY id ASC
            "#
        ))
        .bind(status_groups::POLLABLE_JOB_STATES[0].as_str())
        .bind(status_groups::POLLABLE_JOB_STATES[1].as_str())
        .fetch_all(&mut *conn)
        .await?;

        Ok(jobs)
    }

    /// Completed jobs whose candidate has not been materialized yet
    pub async fn completed_without_candidate(conn: &mut SqliteConnection) -> Result<Vec<Job>> {
        let jobs = sqlx::query_as::<_, Job>(&format!(
            r#"
            SELECT {JOB_COLUMNS} FROM jobs
            WHERE status = ? AND candidate_id IS NULL
            ORDER BY id ASC
            "#
        ))
        .bind(JobStatus::Completed.as_str())
        .fetch_all(&mut *conn)
        .await?;

        Ok(jobs)
    }

    pub async fn for_run(conn: &mut SqliteConnection, run_id: i64) -> Result<Vec<Job>> {
        let jobs = sqlx::query_as::<_, Job>(&format!(
            "SELECT {JOB_COLUMNS} FROM jobs WHERE run_id = ? ORDER BY id ASC"
        ))
        .bind(run_id)
        .fetch_all(&mut *conn)
        .await?;

        Ok(jobs)
    }

    /// Count one more failed poll, returning the new total
    pub async fn increment_retry_count(conn: &mut SqliteConnection, id: i64) -> Result<i64> {
        let retry_count = sqlx::query_scalar::<_, i64>(
            r#"
            UPDATE jobs SET retry_count = retry_count + 1, updated_at = ?
            WHERE id = ?
            RETURNING retry_count
            "#,
        )
        .bind(Utc::now())
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| GentreeError::not_found("job", id))?;

        Ok(retry_count)
    }

    /// Attach the produced candidate; a job links at most once
    pub async fn link_candidate(conn: &mut SqliteConnection, id: i64, candidate_id: i64) -> Result<()> {
        let updated = sqlx::query(
            "UPDATE jobs SET candidate_id = ?, updated_at = ? WHERE id = ? AND candidate_id IS NULL",
        )
        .bind(candidate_id)
        .bind(Utc::now())
        .bind(id)
        .execute(&mut *conn)
        .await?;

        if updated.rows_affected() == 0 {
            return Err(GentreeError::consistency(format!(
                "job {id} is already linked to a candidate"
            )));
        }
        Ok(())
    }

    /// When the job entered flight: submission time, or creation if never submitted
    pub fn in_flight_since(&self) -> DateTime<Utc> {
        self.submitted_at.unwrap_or(self.created_at)
    }
}
