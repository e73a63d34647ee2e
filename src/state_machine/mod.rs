// State machine module for the generation tree
//
// Job, candidate and run statuses are closed enums whose legal moves are listed
// in explicit transition tables. Model code resolves every status change through
// these tables before touching a row.

pub mod events;
pub mod states;
pub mod transitions;

pub use events::{CandidateEvent, JobEvent, RunEvent};
pub use states::{CandidateState, InvalidStateError, JobState, RunState};
pub use transitions::{candidate_target_state, job_target_state, run_target_state};
