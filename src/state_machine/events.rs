use serde::{Deserialize, Serialize};
use std::fmt;

/// Events that can trigger job state transitions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobEvent {
    /// External service acknowledged the submission
    Submit,
    /// External service reports the job executing
    Start,
    /// External service produced output
    Complete,
    /// Submission, execution, polling budget or stale reclamation failure
    Fail,
}

/// Events that can trigger candidate state transitions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CandidateEvent {
    Reject,
}

/// Events that can trigger run state transitions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunEvent {
    /// First job of the run was submitted
    Start,
    /// A winner was marked
    Complete,
    /// The winner was unmarked or rejected
    Reopen,
    /// Operator abandoned the run
    Fail,
}

impl JobEvent {
    /// Get a string representation of the event type for logging
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Submit => "submit",
            Self::Start => "start",
            Self::Complete => "complete",
            Self::Fail => "fail",
        }
    }
}

impl CandidateEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Reject => "reject",
        }
    }
}

impl RunEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Complete => "complete",
            Self::Reopen => "reopen",
            Self::Fail => "fail",
        }
    }
}

impl fmt::Display for JobEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.event_type())
    }
}

impl fmt::Display for CandidateEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.event_type())
    }
}

impl fmt::Display for RunEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.event_type())
    }
}
