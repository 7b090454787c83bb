//! In-memory collaborator for tests and embedding.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use uuid::Uuid;

use lingoquiz_core::model::{Attempt, QuizConfig};
use lingoquiz_core::scoring::AggregateResult;
use lingoquiz_core::traits::{
    AttemptRegistry, AttemptStore, AttemptSubmission, ClassResults, DraftSnapshot, QuizSource,
};
use lingoquiz_core::visibility::VisibleResult;

use crate::error::StoreError;

#[derive(Default)]
struct Inner {
    quizzes: BTreeMap<String, QuizConfig>,
    /// Attempts allocated so far per (quiz id, student id).
    allocated: BTreeMap<(String, String), u32>,
    attempts: BTreeMap<Uuid, Attempt>,
    drafts: BTreeMap<Uuid, DraftSnapshot>,
    submissions: BTreeMap<Uuid, AttemptSubmission>,
}

/// Implements every collaborator trait over process memory.
///
/// Counts writes and can be told to refuse them, so tests can observe
/// autosave cadence and persistence failures.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
    draft_writes: AtomicU32,
    submission_writes: AtomicU32,
    correction_writes: AtomicU32,
    fail_drafts: AtomicBool,
    fail_submissions: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store whose catalogue holds the given quizzes.
    pub fn with_quizzes(quizzes: impl IntoIterator<Item = QuizConfig>) -> Self {
        let store = Self::new();
        for quiz in quizzes {
            store.insert_quiz(quiz);
        }
        store
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Add or replace a quiz in the catalogue.
    pub fn insert_quiz(&self, quiz: QuizConfig) {
        self.lock().quizzes.insert(quiz.id.clone(), quiz);
    }

    /// Make subsequent draft writes fail (or succeed again).
    pub fn fail_drafts(&self, fail: bool) {
        self.fail_drafts.store(fail, Ordering::Relaxed);
    }

    /// Make subsequent submission writes fail (or succeed again).
    pub fn fail_submissions(&self, fail: bool) {
        self.fail_submissions.store(fail, Ordering::Relaxed);
    }

    /// Number of draft writes attempted, including failed ones.
    pub fn draft_writes(&self) -> u32 {
        self.draft_writes.load(Ordering::Relaxed)
    }

    /// Number of submission writes attempted, including failed ones.
    pub fn submission_writes(&self) -> u32 {
        self.submission_writes.load(Ordering::Relaxed)
    }

    pub fn correction_writes(&self) -> u32 {
        self.correction_writes.load(Ordering::Relaxed)
    }

    /// Latest draft for an attempt.
    pub fn draft(&self, attempt_id: Uuid) -> Option<DraftSnapshot> {
        self.lock().drafts.get(&attempt_id).cloned()
    }

    /// Stored submission for an attempt, including any correction applied since.
    pub fn submission(&self, attempt_id: Uuid) -> Option<AttemptSubmission> {
        self.lock().submissions.get(&attempt_id).cloned()
    }

    /// Number of distinct attempts with a stored submission.
    pub fn submission_count(&self) -> usize {
        self.lock().submissions.len()
    }

    /// Attempt record as last seen by the store.
    pub fn attempt(&self, attempt_id: Uuid) -> Option<Attempt> {
        self.lock().attempts.get(&attempt_id).cloned()
    }

    /// Attempts allocated so far to a student for a quiz.
    pub fn attempts_allocated(&self, quiz_id: &str, student_id: &str) -> u32 {
        self.lock()
            .allocated
            .get(&(quiz_id.to_string(), student_id.to_string()))
            .copied()
            .unwrap_or(0)
    }
}

#[async_trait]
impl QuizSource for MemoryStore {
    async fn quiz_configuration(&self, quiz_id: &str) -> anyhow::Result<QuizConfig> {
        self.lock()
            .quizzes
            .get(quiz_id)
            .cloned()
            .ok_or_else(|| StoreError::QuizNotFound(quiz_id.to_string()).into())
    }
}

#[async_trait]
impl AttemptRegistry for MemoryStore {
    async fn start_attempt(&self, quiz_id: &str, student_id: &str) -> anyhow::Result<Attempt> {
        let mut inner = self.lock();
        if !inner.quizzes.contains_key(quiz_id) {
            return Err(StoreError::QuizNotFound(quiz_id.to_string()).into());
        }
        let count = inner
            .allocated
            .entry((quiz_id.to_string(), student_id.to_string()))
            .or_insert(0);
        *count += 1;
        let attempt = Attempt::new(quiz_id, student_id, *count);
        inner.attempts.insert(attempt.id, attempt.clone());
        tracing::debug!(attempt_id = %attempt.id, quiz_id, student_id, attempt_number = attempt.attempt_number, "attempt allocated");
        Ok(attempt)
    }
}

#[async_trait]
impl AttemptStore for MemoryStore {
    async fn persist_draft(&self, draft: &DraftSnapshot) -> anyhow::Result<()> {
        self.draft_writes.fetch_add(1, Ordering::Relaxed);
        if self.fail_drafts.load(Ordering::Relaxed) {
            return Err(StoreError::Unavailable {
                operation: "draft write",
                reason: "injected failure".into(),
            }
            .into());
        }
        self.lock().drafts.insert(draft.attempt_id, draft.clone());
        Ok(())
    }

    async fn submit_attempt(&self, submission: &AttemptSubmission) -> anyhow::Result<()> {
        self.submission_writes.fetch_add(1, Ordering::Relaxed);
        if self.fail_submissions.load(Ordering::Relaxed) {
            return Err(StoreError::Unavailable {
                operation: "submission write",
                reason: "injected failure".into(),
            }
            .into());
        }
        let mut inner = self.lock();
        let id = submission.attempt.id;
        inner.attempts.insert(id, submission.attempt.clone());
        inner.submissions.insert(id, submission.clone());
        Ok(())
    }

    async fn record_correction(
        &self,
        attempt: &Attempt,
        result: &AggregateResult,
        visible: &VisibleResult,
    ) -> anyhow::Result<()> {
        self.correction_writes.fetch_add(1, Ordering::Relaxed);
        let mut inner = self.lock();
        let submission = inner
            .submissions
            .get_mut(&attempt.id)
            .ok_or(StoreError::AttemptNotFound(attempt.id))?;
        submission.attempt = attempt.clone();
        submission.result = result.clone();
        submission.visible = visible.clone();
        inner.attempts.insert(attempt.id, attempt.clone());
        Ok(())
    }
}

#[async_trait]
impl ClassResults for MemoryStore {
    async fn class_results(&self, quiz_id: &str) -> anyhow::Result<Vec<AggregateResult>> {
        Ok(self
            .lock()
            .submissions
            .values()
            .filter(|s| s.attempt.quiz_id == quiz_id)
            .map(|s| s.result.clone())
            .collect())
    }
}
