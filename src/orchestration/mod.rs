//! # Orchestration
//!
//! Scheduling and job lifecycle for the generation tree.
//!
//! ## Components
//!
//! - [`tree_scheduler`] - picks the single next unit of work across runs
//! - [`weighted_raffle`] - score-proportional parent selection
//! - [`payload_builder`] - `{{placeholder}}` substitution into job templates
//! - [`job_lifecycle`] - submit, poll and ingest against the compute service
//! - [`maintenance`] - child_count reconciliation and stale job reclamation
//! - [`orchestration_system`] - the submitter, poller and reconcile loops

pub mod job_lifecycle;
pub mod maintenance;
pub mod orchestration_system;
pub mod payload_builder;
pub mod tree_scheduler;
pub mod types;
pub mod weighted_raffle;

pub use job_lifecycle::{JobLifecycleManager, LifecycleConfig};
pub use maintenance::{MaintenanceService, STALE_JOB_MESSAGE};
pub use orchestration_system::{
    OrchestrationHandles, OrchestrationSystem, PollerTickSummary, SubmitterTick,
};
pub use payload_builder::{build_payload, NonceValues, PayloadContext};
pub use tree_scheduler::TreeScheduler;
pub use types::{PollOutcome, ScheduledUnit, SchedulingMode};
pub use weighted_raffle::{weighted_pick, weighted_raffle};
