//! # Error Types
//!
//! Structured error handling for the generation tree scheduler using thiserror.
//!
//! The four externally meaningful kinds are kept distinct so callers can react
//! to them differently:
//!
//! - [`GentreeError::Connection`]: the compute service could not be reached.
//!   Retried by the next loop tick, never in-loop.
//! - [`GentreeError::Protocol`]: the compute service answered with something
//!   malformed or unexpected. The affected job is failed with the message.
//! - [`GentreeError::Consistency`]: a tree invariant would be violated
//!   (negative `child_count`, self-vote, double winner). The operation aborts
//!   and its transaction rolls back.
//! - [`GentreeError::Validation`]: bad input at an edit boundary
//!   (`top_k_count < 1`, undeclared template needs).

use thiserror::Error;

#[derive(Error, Debug)]
pub enum GentreeError {
    #[error("Connection error: {message}")]
    Connection { message: String },

    #[error("Protocol error: {message}")]
    Protocol { message: String },

    #[error("Consistency error: {message}")]
    Consistency { message: String },

    #[error("Validation error: {message}")]
    Validation { message: String },

    #[error("State transition error: {entity} {id}: cannot apply '{event}' from '{from}'")]
    StateTransition {
        entity: &'static str,
        id: i64,
        from: String,
        event: String,
    },

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: i64 },

    #[error("Database error: {0}")]
    Database(sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl GentreeError {
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    pub fn consistency(message: impl Into<String>) -> Self {
        Self::Consistency {
            message: message.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    pub fn not_found(entity: &'static str, id: i64) -> Self {
        Self::NotFound { entity, id }
    }

    /// Service unreachable or timed out
    pub fn is_connection(&self) -> bool {
        matches!(self, Self::Connection { .. })
    }

    /// Service reachable but the response could not be understood
    pub fn is_protocol(&self) -> bool {
        matches!(self, Self::Protocol { .. })
    }

    pub fn is_consistency(&self) -> bool {
        matches!(self, Self::Consistency { .. })
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation { .. })
    }

    /// Whether a later tick may succeed without operator intervention
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Connection { .. } => true,
            Self::Database(err) => matches!(
                err,
                sqlx::Error::PoolTimedOut | sqlx::Error::Io(_) | sqlx::Error::WorkerCrashed
            ),
            _ => false,
        }
    }
}

/// Unique and check constraint violations are invariant breaches, not transport failures.
impl From<sqlx::Error> for GentreeError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &err {
            if db_err.is_unique_violation() || db_err.is_check_violation() {
                return GentreeError::consistency(db_err.message().to_string());
            }
        }
        GentreeError::Database(err)
    }
}

pub type Result<T> = std::result::Result<T, GentreeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        assert!(GentreeError::connection("refused").is_connection());
        assert!(GentreeError::connection("refused").is_retryable());
        assert!(GentreeError::protocol("bad json").is_protocol());
        assert!(!GentreeError::protocol("bad json").is_retryable());
        assert!(GentreeError::consistency("negative child_count").is_consistency());
        assert!(GentreeError::validation("top_k_count").is_validation());
    }

    #[test]
    fn test_error_display() {
        let err = GentreeError::StateTransition {
            entity: "job",
            id: 7,
            from: "completed".to_string(),
            event: "fail".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "State transition error: job 7: cannot apply 'fail' from 'completed'"
        );
        assert_eq!(
            GentreeError::not_found("candidate", 3).to_string(),
            "candidate not found: 3"
        );
    }

    #[test]
    fn test_row_not_found_maps_to_database() {
        let err: GentreeError = sqlx::Error::RowNotFound.into();
        assert!(matches!(err, GentreeError::Database(_)));
    }
}
