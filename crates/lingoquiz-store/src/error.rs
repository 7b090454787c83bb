//! Store error types.

use thiserror::Error;
use uuid::Uuid;

/// Errors raised by the bundled collaborator implementations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// No quiz with this id is known to the store.
    #[error("quiz not found: {0}")]
    QuizNotFound(String),

    /// No attempt with this id has been allocated by the store.
    #[error("attempt not found: {0}")]
    AttemptNotFound(Uuid),

    /// A write was refused, either injected by a test or by the backend.
    #[error("{operation} unavailable: {reason}")]
    Unavailable {
        operation: &'static str,
        reason: String,
    },

    /// A persisted record does not belong to the quiz it was filed under.
    #[error("record for attempt {attempt_id} is corrupt: {reason}")]
    Corrupt { attempt_id: Uuid, reason: String },
}
