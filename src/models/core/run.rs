//! # Run Model
//!
//! One instantiation of a pipeline with concrete variables. Runs are created
//! by an external collaborator; the scheduler reads them and moves their
//! status through the run transition table.

use crate::constants::status_groups::SCHEDULABLE_RUN_STATES;
use crate::error::{GentreeError, Result};
use crate::state_machine::{run_target_state, RunEvent, RunState};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sqlx::types::Json;
use sqlx::{FromRow, SqliteConnection};
use tracing::debug;

/// Maps to `runs` table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Run {
    pub id: i64,
    pub pipeline_id: i64,
    pub name: String,
    /// Free-form run-scoped key/value map (e.g. `prompt`)
    pub variables: Json<Value>,
    #[sqlx(try_from = "String")]
    pub status: RunState,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// New Run for creation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewRun {
    pub pipeline_id: i64,
    pub name: String,
    pub variables: Value,
}

const RUN_COLUMNS: &str = "id, pipeline_id, name, variables, status, created_at, updated_at";

impl Run {
    pub async fn create(conn: &mut SqliteConnection, new_run: NewRun) -> Result<Run> {
        if !new_run.variables.is_object() {
            return Err(GentreeError::validation("run variables must be a JSON object"));
        }

        let now = Utc::now();
        let run = sqlx::query_as::<_, Run>(&format!(
            r#"
            INSERT INTO runs (pipeline_id, name, variables, status, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?)
            RETURNING {RUN_COLUMNS}
            "#
        ))
        .bind(new_run.pipeline_id)
        .bind(&new_run.name)
        .bind(Json(&new_run.variables))
        .bind(RunState::Pending.as_str())
        .bind(now)
        .bind(now)
        .fetch_one(&mut *conn)
        .await?;

        Ok(run)
    }

    pub async fn find_by_id(conn: &mut SqliteConnection, id: i64) -> Result<Option<Run>> {
        let run = sqlx::query_as::<_, Run>(&format!("SELECT {RUN_COLUMNS} FROM runs WHERE id = ?"))
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?;

        Ok(run)
    }

    /// Find a run by ID, failing with `NotFound` when absent
    pub async fn get(conn: &mut SqliteConnection, id: i64) -> Result<Run> {
        Self::find_by_id(conn, id)
            .await?
            .ok_or_else(|| GentreeError::not_found("run", id))
    }

    /// Runs the scheduler still considers, ordered by id
    pub async fn schedulable(conn: &mut SqliteConnection) -> Result<Vec<Run>> {
        let runs = sqlx::query_as::<_, Run>(&format!(
            "SELECT {RUN_COLUMNS} FROM runs WHERE status IN (?, ?) ORDER BY id ASC"
        ))
        .bind(SCHEDULABLE_RUN_STATES[0].as_str())
        .bind(SCHEDULABLE_RUN_STATES[1].as_str())
        .fetch_all(&mut *conn)
        .await?;

        Ok(runs)
    }

    /// Apply a run event through the transition table.
    ///
    /// The update is conditional on the status read, so a concurrent change
    /// surfaces as a `Consistency` error instead of being overwritten.
    pub async fn transition(conn: &mut SqliteConnection, id: i64, event: RunEvent) -> Result<RunState> {
        let run = Self::get(conn, id).await?;
        let target = run_target_state(id, run.status, event)?;

        let updated = sqlx::query("UPDATE runs SET status = ?, updated_at = ? WHERE id = ? AND status = ?")
            .bind(target.as_str())
            .bind(Utc::now())
            .bind(id)
            .bind(run.status.as_str())
            .execute(&mut *conn)
            .await?;

        if updated.rows_affected() == 0 {
            return Err(GentreeError::consistency(format!(
                "run {id} changed status concurrently while applying '{event}'"
            )));
        }

        debug!(run_id = id, from = %run.status, to = %target, event = %event, "Run transitioned");
        Ok(target)
    }

    /// Move a pending run to `running`; a no-op for any other status
    pub async fn mark_started(conn: &mut SqliteConnection, id: i64) -> Result<()> {
        let run = Self::get(conn, id).await?;
        if run.status == RunState::Pending {
            Self::transition(conn, id, RunEvent::Start).await?;
        }
        Ok(())
    }

    /// The run variables as a JSON object
    pub fn variable_map(&self) -> Map<String, Value> {
        self.variables.0.as_object().cloned().unwrap_or_default()
    }

    pub fn variable(&self, key: &str) -> Option<&Value> {
        self.variables.0.get(key)
    }

    /// Filesystem-safe name used in output prefixes, e.g. `Autumn Forest` -> `autumn_forest_r12`
    pub fn synthesized_name(&self) -> String {
        let mut slug = String::with_capacity(self.name.len());
        let mut last_was_separator = false;
        for ch in self.name.trim().chars() {
            if ch.is_ascii_alphanumeric() {
                slug.push(ch.to_ascii_lowercase());
                last_was_separator = false;
            } else if !last_was_separator && !slug.is_empty() {
                slug.push('_');
                last_was_separator = true;
            }
        }
        let slug = slug.trim_end_matches('_');
        if slug.is_empty() {
            format!("run_r{}", self.id)
        } else {
            format!("{slug}_r{}", self.id)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(name: &str) -> Run {
        Run {
            id: 12,
            pipeline_id: 1,
            name: name.to_string(),
            variables: Json(serde_json::json!({"prompt": "a fox"})),
            status: RunState::Pending,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_synthesized_name() {
        assert_eq!(run("Autumn Forest").synthesized_name(), "autumn_forest_r12");
        assert_eq!(run("  fox -- v2!! ").synthesized_name(), "fox_v2_r12");
        assert_eq!(run("***").synthesized_name(), "run_r12");
    }

    #[test]
    fn test_variable_access() {
        let run = run("x");
        assert_eq!(run.variable("prompt"), Some(&Value::String("a fox".into())));
        assert!(run.variable("missing").is_none());
        assert_eq!(run.variable_map().len(), 1);
    }
}
