//! Shared orchestration types.

use crate::constants::JobStatus;
use serde::{Deserialize, Serialize};
use std::fmt;

/// What the scheduler decided for one tick
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchedulingMode {
    /// Replenish the base step; no parent
    BaseGeneration,
    /// Expand one eligible parent into the next step
    ChildGeneration,
    /// Work exists but an unapproved gate blocks it
    WaitingForApproval,
    /// Every tree is fully expanded under the current gates
    NoWork,
}

impl fmt::Display for SchedulingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::BaseGeneration => "base_generation",
            Self::ChildGeneration => "child_generation",
            Self::WaitingForApproval => "waiting_for_approval",
            Self::NoWork => "no_work",
        };
        f.write_str(name)
    }
}

/// The single next unit of work across all runs.
///
/// For `WaitingForApproval`, `step_id` names the step whose gate blocks progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduledUnit {
    pub mode: SchedulingMode,
    pub run_id: Option<i64>,
    pub step_id: Option<i64>,
    pub parent_id: Option<i64>,
}

impl ScheduledUnit {
    pub fn no_work() -> Self {
        Self {
            mode: SchedulingMode::NoWork,
            run_id: None,
            step_id: None,
            parent_id: None,
        }
    }

    pub fn base_generation(run_id: i64, step_id: i64) -> Self {
        Self {
            mode: SchedulingMode::BaseGeneration,
            run_id: Some(run_id),
            step_id: Some(step_id),
            parent_id: None,
        }
    }

    pub fn child_generation(run_id: i64, step_id: i64, parent_id: i64) -> Self {
        Self {
            mode: SchedulingMode::ChildGeneration,
            run_id: Some(run_id),
            step_id: Some(step_id),
            parent_id: Some(parent_id),
        }
    }

    pub fn waiting_for_approval(run_id: i64, gated_step_id: i64) -> Self {
        Self {
            mode: SchedulingMode::WaitingForApproval,
            run_id: Some(run_id),
            step_id: Some(gated_step_id),
            parent_id: None,
        }
    }

    /// Whether the submitter should hand this unit to the job lifecycle
    pub fn is_submittable(&self) -> bool {
        matches!(
            self.mode,
            SchedulingMode::BaseGeneration | SchedulingMode::ChildGeneration
        )
    }
}

/// Result of polling one job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollOutcome {
    pub job_id: i64,
    pub status: JobStatus,
    /// The job completed and its candidate still has to be ingested
    pub needs_processing: bool,
}
