//! Typed domain errors
//!
//! Operation boundaries return `anyhow::Result`; these variants are the
//! failures callers may want to match on (via `downcast_ref`).

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BoardError {
    #[error("column '{0}' does not exist")]
    UnknownColumn(String),

    #[error("card {0} not found")]
    CardNotFound(uuid::Uuid),

    #[error("invalid task status transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    #[error("invalid sort key range: '{lower}' is not before '{upper}'")]
    InvalidSortKey { lower: String, upper: String },

    #[error("agent '{0}' is not registered")]
    UnknownAgent(String),

    #[error("task timed out after {0}s")]
    TaskTimeout(u64),

    #[error("task cancelled")]
    Cancelled,

    #[error("no active session")]
    NoSession,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_messages() {
        assert_eq!(
            BoardError::UnknownColumn("ideas".into()).to_string(),
            "column 'ideas' does not exist"
        );
        assert_eq!(
            BoardError::TaskTimeout(120).to_string(),
            "task timed out after 120s"
        );
        assert_eq!(BoardError::Cancelled.to_string(), "task cancelled");
    }

    #[test]
    fn test_downcast_through_anyhow() {
        let err: anyhow::Error = BoardError::NoSession.into();
        assert_eq!(err.downcast_ref::<BoardError>(), Some(&BoardError::NoSession));
    }
}
