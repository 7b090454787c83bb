//! External collaborator contracts.
//!
//! The engine owns no transport or database. These async traits are
//! implemented by the `lingoquiz-store` crate, or by an application boundary.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::ledger::LedgerSnapshot;
use crate::model::{Attempt, QuizConfig};
use crate::scoring::AggregateResult;
use crate::visibility::VisibleResult;

/// Supplies quiz definitions.
#[async_trait]
pub trait QuizSource: Send + Sync {
    /// Load a quiz. The engine validates it before any attempt may start.
    async fn quiz_configuration(&self, quiz_id: &str) -> anyhow::Result<QuizConfig>;
}

/// Allocates attempts and their 1-based numbers.
#[async_trait]
pub trait AttemptRegistry: Send + Sync {
    /// Create a `not_started` attempt with the next attempt number for this student.
    async fn start_attempt(&self, quiz_id: &str, student_id: &str) -> anyhow::Result<Attempt>;
}

/// Durable storage for drafts, submissions and correction updates.
#[async_trait]
pub trait AttemptStore: Send + Sync {
    /// Persist an in-progress ledger snapshot for crash recovery. Fire-and-forget.
    async fn persist_draft(&self, draft: &DraftSnapshot) -> anyhow::Result<()>;

    /// Persist a submitted attempt. Must tolerate being called again with the same payload.
    async fn submit_attempt(&self, submission: &AttemptSubmission) -> anyhow::Result<()>;

    /// Persist a result recomputed after a manual grade, with the view it now releases.
    async fn record_correction(
        &self,
        attempt: &Attempt,
        result: &AggregateResult,
        visible: &VisibleResult,
    ) -> anyhow::Result<()>;
}

/// Supplies the set of class results for percentile and rank statistics.
#[async_trait]
pub trait ClassResults: Send + Sync {
    async fn class_results(&self, quiz_id: &str) -> anyhow::Result<Vec<AggregateResult>>;
}

/// Autosave payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DraftSnapshot {
    pub attempt_id: Uuid,
    pub quiz_id: String,
    pub ledger: LedgerSnapshot,
    /// Navigation cursor at the time of the save.
    pub cursor: usize,
}

/// Submission payload: the attempt record, the ledger it was scored from, and both results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttemptSubmission {
    pub attempt: Attempt,
    pub ledger: LedgerSnapshot,
    pub result: AggregateResult,
    pub visible: VisibleResult,
}
