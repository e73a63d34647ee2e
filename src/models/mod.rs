//! # Tree Store Models
//!
//! Row types and persistence operations for the generation tree.
//!
//! Every operation takes a `&mut SqliteConnection` so callers decide the
//! transaction scope: pass `&mut *tx` inside a transaction or a pooled
//! connection for single-statement reads.

pub mod core;

// Re-export core models for easy access
pub use self::core::{
    approval_gate::ApprovalGate,
    candidate::{Candidate, ChildCountDrift, NewCandidate},
    job::{Job, NewJob},
    pipeline::Pipeline,
    pipeline_step::{NewPipelineStep, PipelineStep},
    run::{NewRun, Run},
    scheduler_state::SchedulerState,
    vote::Vote,
};
