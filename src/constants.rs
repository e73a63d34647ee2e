//! # System Constants
//!
//! Core constants and status groupings that define the operational boundaries
//! of the generation tree scheduler.

// Re-export state types for convenience
pub use crate::state_machine::{
    CandidateState as CandidateStatus, JobState as JobStatus, RunState as RunStatus,
};

/// Starting rating for every new candidate
pub const DEFAULT_ELO_SCORE: i64 = 1000;

/// ELO K-factor used for every vote
pub const ELO_K_FACTOR: f64 = 32.0;

/// Logistic scale of the ELO expected-score curve
pub const ELO_SCALE: f64 = 400.0;

/// Default number of top-rated candidates an approval gate lets through
pub const DEFAULT_TOP_K_COUNT: i64 = 3;

/// Ordinal position of the base-generation step in every pipeline
pub const BASE_STEP_POSITION: i64 = 1;

/// Status groupings used by scheduler and poller queries
pub mod status_groups {
    use super::{JobStatus, RunStatus};

    /// Jobs that occupy capacity: not yet finished on the external service
    pub const IN_FLIGHT_JOB_STATES: &[JobStatus] =
        &[JobStatus::Pending, JobStatus::Submitted, JobStatus::Running];

    /// Jobs that have an external id and can be polled
    pub const POLLABLE_JOB_STATES: &[JobStatus] = &[JobStatus::Submitted, JobStatus::Running];

    /// Runs the scheduler still considers for new work
    pub const SCHEDULABLE_RUN_STATES: &[RunStatus] = &[RunStatus::Pending, RunStatus::Running];
}

/// Keys of the persisted scheduler key/value rows
pub mod scheduler_keys {
    pub const LAST_SERVICED_RUN: &str = "last_serviced_run_id";
}

/// Placeholder names understood by the payload builder
pub mod placeholders {
    pub const PROMPT: &str = "prompt";
    pub const PARENT_IMAGE: &str = "parent_image";
    pub const VARIABLES: &str = "variables";
    pub const RUN_NAME: &str = "run_name";
    pub const RUN_ID: &str = "run_id";
    pub const STEP_POSITION: &str = "step_position";
    pub const TIMESTAMP: &str = "timestamp";
    pub const SEED: &str = "seed";
    pub const NONCE: &str = "nonce";
    /// Run variables are reachable as `var.<key>`
    pub const VARIABLE_NAMESPACE: &str = "var";
}
