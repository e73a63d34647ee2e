//! Explicit allowed-transition tables.
//!
//! Every status mutation in the store resolves its target state here first;
//! anything not listed is rejected with [`GentreeError::StateTransition`].

use super::events::{CandidateEvent, JobEvent, RunEvent};
use super::states::{CandidateState, JobState, RunState};
use crate::error::{GentreeError, Result};

/// `(from, event, to)` rows for jobs
pub const JOB_TRANSITIONS: &[(JobState, JobEvent, JobState)] = &[
    (JobState::Pending, JobEvent::Submit, JobState::Submitted),
    (JobState::Pending, JobEvent::Fail, JobState::Failed),
    (JobState::Submitted, JobEvent::Start, JobState::Running),
    (JobState::Submitted, JobEvent::Complete, JobState::Completed),
    (JobState::Submitted, JobEvent::Fail, JobState::Failed),
    (JobState::Running, JobEvent::Complete, JobState::Completed),
    (JobState::Running, JobEvent::Fail, JobState::Failed),
];

/// `(from, event, to)` rows for candidates
pub const CANDIDATE_TRANSITIONS: &[(CandidateState, CandidateEvent, CandidateState)] = &[(
    CandidateState::Active,
    CandidateEvent::Reject,
    CandidateState::Rejected,
)];

/// `(from, event, to)` rows for runs
pub const RUN_TRANSITIONS: &[(RunState, RunEvent, RunState)] = &[
    (RunState::Pending, RunEvent::Start, RunState::Running),
    (RunState::Pending, RunEvent::Complete, RunState::Completed),
    (RunState::Running, RunEvent::Complete, RunState::Completed),
    (RunState::Completed, RunEvent::Reopen, RunState::Running),
    (RunState::Pending, RunEvent::Fail, RunState::Failed),
    (RunState::Running, RunEvent::Fail, RunState::Failed),
];

fn lookup<S: Copy + PartialEq, E: PartialEq>(table: &[(S, E, S)], from: S, event: &E) -> Option<S> {
    table
        .iter()
        .find(|(state, ev, _)| *state == from && ev == event)
        .map(|(_, _, to)| *to)
}

/// Resolve the target state of a job transition
pub fn job_target_state(job_id: i64, from: JobState, event: JobEvent) -> Result<JobState> {
    lookup(JOB_TRANSITIONS, from, &event).ok_or_else(|| GentreeError::StateTransition {
        entity: "job",
        id: job_id,
        from: from.to_string(),
        event: event.to_string(),
    })
}

/// Resolve the target state of a candidate transition
pub fn candidate_target_state(
    candidate_id: i64,
    from: CandidateState,
    event: CandidateEvent,
) -> Result<CandidateState> {
    lookup(CANDIDATE_TRANSITIONS, from, &event).ok_or_else(|| GentreeError::StateTransition {
        entity: "candidate",
        id: candidate_id,
        from: from.to_string(),
        event: event.to_string(),
    })
}

/// Resolve the target state of a run transition
pub fn run_target_state(run_id: i64, from: RunState, event: RunEvent) -> Result<RunState> {
    lookup(RUN_TRANSITIONS, from, &event).ok_or_else(|| GentreeError::StateTransition {
        entity: "run",
        id: run_id,
        from: from.to_string(),
        event: event.to_string(),
    })
}
