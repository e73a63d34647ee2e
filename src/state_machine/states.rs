use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// A persisted status string that does not name a known state
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Invalid {kind} state: {value}")]
pub struct InvalidStateError {
    pub kind: &'static str,
    pub value: String,
}

/// Job lifecycle states for one external compute request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    /// Row persisted, external submission not yet acknowledged
    #[default]
    Pending,
    /// External service accepted the job and returned an id
    Submitted,
    /// External service reported the job as executing
    Running,
    /// External service produced output
    Completed,
    /// Submission or execution failed
    Failed,
}

impl JobState {
    /// Check if this is a terminal state (no further transitions allowed)
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Check if the job still occupies scheduling capacity
    pub fn is_in_flight(&self) -> bool {
        matches!(self, Self::Pending | Self::Submitted | Self::Running)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Submitted => "submitted",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

/// Candidate node states; `Rejected` is terminal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CandidateState {
    #[default]
    Active,
    Rejected,
}

impl CandidateState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Rejected)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Rejected => "rejected",
        }
    }
}

/// Overall run states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    #[default]
    Pending,
    Running,
    Completed,
    Failed,
}

impl RunState {
    /// Whether the scheduler should still look for work in this run
    pub fn is_schedulable(&self) -> bool {
        matches!(self, Self::Pending | Self::Running)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

macro_rules! impl_state_strings {
    ($state:ty, $kind:literal, [$($variant:ident => $name:literal),+ $(,)?]) => {
        impl fmt::Display for $state {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $state {
            type Err = InvalidStateError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($name => Ok(Self::$variant),)+
                    _ => Err(InvalidStateError {
                        kind: $kind,
                        value: s.to_string(),
                    }),
                }
            }
        }

        /// Row decoding hook used by `#[sqlx(try_from = "String")]`
        impl TryFrom<String> for $state {
            type Error = InvalidStateError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                value.parse()
            }
        }
    };
}

impl_state_strings!(JobState, "job", [
    Pending => "pending",
    Submitted => "submitted",
    Running => "running",
    Completed => "completed",
    Failed => "failed",
]);

impl_state_strings!(CandidateState, "candidate", [
    Active => "active",
    Rejected => "rejected",
]);

impl_state_strings!(RunState, "run", [
    Pending => "pending",
    Running => "running",
    Completed => "completed",
    Failed => "failed",
]);
