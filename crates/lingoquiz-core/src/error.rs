//! Quiz engine error types.
//!
//! Every failure surfaces at a boundary: loading a quiz, starting an attempt,
//! writing an answer, submitting, or applying a manual grade. Scoring itself is
//! total over structurally valid input and has no error type.

use std::fmt;

use thiserror::Error;
use uuid::Uuid;

use crate::model::AttemptStatus;

/// Errors raised by the quiz engine.
#[derive(Debug, Error)]
pub enum QuizError {
    /// The quiz definition is malformed. Fatal: no attempt may start.
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    /// A start was requested beyond the quiz's attempt allowance.
    #[error("attempt {attempt_number} exceeds the limit of {max_attempts} attempts")]
    AttemptLimitExceeded {
        attempt_number: u32,
        max_attempts: u32,
    },

    /// The attempt has already left `in_progress`.
    #[error("attempt {attempt_id} has already been submitted")]
    AlreadySubmitted { attempt_id: Uuid },

    /// The answer's shape does not match its question. The ledger is unchanged.
    #[error(transparent)]
    StructuralAnswer(#[from] StructuralAnswerError),

    /// The operation is not permitted in the attempt's current status.
    #[error("cannot {action} while the attempt is {status}")]
    InvalidTransition {
        status: AttemptStatus,
        action: &'static str,
    },

    /// Navigation outside the quiz's question list.
    #[error("question index {index} is out of range (quiz has {len} questions)")]
    QuestionIndexOutOfRange { index: usize, len: usize },

    /// No question with this id exists in the quiz.
    #[error("unknown question: {0}")]
    UnknownQuestion(String),

    /// A manual grade that cannot be applied.
    #[error("invalid manual grade for question {question_id}: {reason}")]
    InvalidManualGrade { question_id: String, reason: String },

    /// An external collaborator failed while loading or starting an attempt.
    #[error("collaborator failure: {0:#}")]
    Collaborator(#[from] anyhow::Error),
}

impl QuizError {
    /// Returns `true` for the losing side of a submission race.
    ///
    /// Callers treat this as an idempotent no-op rather than a user-facing failure.
    pub fn is_already_submitted(&self) -> bool {
        matches!(self, QuizError::AlreadySubmitted { .. })
    }
}

/// A single problem found while validating a quiz definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigIssue {
    /// The offending question, if the issue is question-scoped.
    pub question_id: Option<String>,
    /// Human-readable description.
    pub message: String,
}

impl ConfigIssue {
    pub fn quiz(message: impl Into<String>) -> Self {
        Self {
            question_id: None,
            message: message.into(),
        }
    }

    pub fn question(question_id: &str, message: impl Into<String>) -> Self {
        Self {
            question_id: Some(question_id.to_string()),
            message: message.into(),
        }
    }
}

impl fmt::Display for ConfigIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.question_id {
            Some(id) => write!(f, "question {id}: {}", self.message),
            None => write!(f, "{}", self.message),
        }
    }
}

/// A quiz definition failed validation. Carries every issue found, not just the first.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid quiz configuration '{quiz_id}': {}", join_issues(.issues))]
pub struct ConfigurationError {
    pub quiz_id: String,
    pub issues: Vec<ConfigIssue>,
}

fn join_issues(issues: &[ConfigIssue]) -> String {
    issues
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Reasons an answer is rejected at the ledger boundary.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StructuralAnswerError {
    #[error("answer for question {question_id} targets a different question ({answer_question_id})")]
    QuestionMismatch {
        question_id: String,
        answer_question_id: String,
    },

    #[error("question {question_id} expects a selected option, not text")]
    TextOnChoiceQuestion { question_id: String },

    #[error("question {question_id} expects text, not a selected option")]
    OptionOnTextQuestion { question_id: String },

    #[error("question {question_id} has no option '{option_id}'")]
    UnknownOption {
        question_id: String,
        option_id: String,
    },

    #[error("question {question_id} has {expected} blanks but {submitted} were submitted")]
    TooManyBlanks {
        question_id: String,
        expected: usize,
        submitted: usize,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn configuration_error_lists_every_issue() {
        let err = ConfigurationError {
            quiz_id: "vocab-1".into(),
            issues: vec![
                ConfigIssue::quiz("max_attempts must be at least 1"),
                ConfigIssue::question("q2", "points must be positive"),
            ],
        };
        let msg = QuizError::from(err).to_string();
        assert!(msg.contains("vocab-1"));
        assert!(msg.contains("max_attempts must be at least 1"));
        assert!(msg.contains("question q2: points must be positive"));
    }

    #[test]
    fn already_submitted_is_classified() {
        let err = QuizError::AlreadySubmitted {
            attempt_id: Uuid::nil(),
        };
        assert!(err.is_already_submitted());
        assert!(!QuizError::UnknownQuestion("q1".into()).is_already_submitted());
    }
}
