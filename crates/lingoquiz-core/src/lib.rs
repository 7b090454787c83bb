//! lingoquiz-core: Quiz attempt lifecycle, scoring, and correction.
//!
//! This crate defines the quiz data model, the answer ledger, the scoring and
//! grading rules, the correction visibility policy, and the attempt session
//! controller that ties them together. Persistence and quiz lookup sit behind
//! the async traits in [`traits`].

pub mod analytics;
pub mod error;
pub mod grade;
pub mod ledger;
pub mod model;
pub mod parser;
pub mod scoring;
pub mod session;
pub mod traits;
pub mod visibility;

pub use error::{ConfigurationError, QuizError, StructuralAnswerError};
pub use session::{AttemptSession, SessionConfig, SubmissionOutcome};
