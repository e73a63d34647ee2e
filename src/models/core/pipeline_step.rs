//! # Pipeline Step Model
//!
//! One ordinal stage of a pipeline template. Steps are immutable after
//! creation: the job template, the declared dynamic inputs and the branching
//! cap never change under a running tree.

use crate::constants::BASE_STEP_POSITION;
use crate::error::{GentreeError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::types::Json;
use sqlx::{FromRow, SqliteConnection};

/// Maps to `pipeline_steps` table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct PipelineStep {
    pub id: i64,
    pub pipeline_id: i64,
    /// 1-based ordinal within the pipeline
    pub position: i64,
    pub name: String,
    /// External job template containing `{{placeholder}}` strings
    pub job_template: Json<Value>,
    pub needs_prompt: bool,
    pub needs_parent_image: bool,
    pub needs_variables: bool,
    /// Per-step branching cap
    pub max_children: i64,
    pub created_at: DateTime<Utc>,
}

/// New PipelineStep for creation (without generated fields)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewPipelineStep {
    pub pipeline_id: i64,
    pub position: i64,
    pub name: String,
    pub job_template: Value,
    pub needs_prompt: bool,
    pub needs_parent_image: bool,
    pub needs_variables: bool,
    pub max_children: i64,
}

const STEP_COLUMNS: &str = "id, pipeline_id, position, name, job_template, needs_prompt, \
     needs_parent_image, needs_variables, max_children, created_at";

impl PipelineStep {
    pub async fn create(conn: &mut SqliteConnection, new_step: NewPipelineStep) -> Result<PipelineStep> {
        if new_step.position < BASE_STEP_POSITION {
            return Err(GentreeError::validation(format!(
                "step position must be >= {BASE_STEP_POSITION}, got {}",
                new_step.position
            )));
        }
        if new_step.max_children < 1 {
            return Err(GentreeError::validation(format!(
                "max_children must be >= 1, got {}",
                new_step.max_children
            )));
        }

        let step = sqlx::query_as::<_, PipelineStep>(&format!(
            r#"
            INSERT INTO pipeline_steps (
                pipeline_id, position, name, job_template, needs_prompt,
                needs_parent_image, needs_variables, max_children, created_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            RETURNING {STEP_COLUMNS}
            "#
        ))
        .bind(new_step.pipeline_id)
        .bind(new_step.position)
        .bind(&new_step.name)
        .bind(Json(&new_step.job_template))
        .bind(new_step.needs_prompt)
        .bind(new_step.needs_parent_image)
        .bind(new_step.needs_variables)
        .bind(new_step.max_children)
        .bind(Utc::now())
        .fetch_one(&mut *conn)
        .await?;

        Ok(step)
    }

    pub async fn find_by_id(conn: &mut SqliteConnection, id: i64) -> Result<Option<PipelineStep>> {
        let step = sqlx::query_as::<_, PipelineStep>(&format!(
            "SELECT {STEP_COLUMNS} FROM pipeline_steps WHERE id = ?"
        ))
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;

        Ok(step)
    }

    /// Find a step by ID, failing with `NotFound` when absent
    pub async fn get(conn: &mut SqliteConnection, id: i64) -> Result<PipelineStep> {
        Self::find_by_id(conn, id)
            .await?
            .ok_or_else(|| GentreeError::not_found("step", id))
    }

    /// All steps of a pipeline in ascending position order
    pub async fn for_pipeline(conn: &mut SqliteConnection, pipeline_id: i64) -> Result<Vec<PipelineStep>> {
        let steps = sqlx::query_as::<_, PipelineStep>(&format!(
            "SELECT {STEP_COLUMNS} FROM pipeline_steps WHERE pipeline_id = ? ORDER BY position ASC"
        ))
        .bind(pipeline_id)
        .fetch_all(&mut *conn)
        .await?;

        Ok(steps)
    }

    pub fn is_base(&self) -> bool {
        self.position == BASE_STEP_POSITION
    }

    /// Branching cap after applying the global `max_branching_factor`
    pub fn effective_max_children(&self, max_branching_factor: i64) -> i64 {
        self.max_children.min(max_branching_factor)
    }
}
