//! Attempt session controller.
//!
//! Owns one attempt's lifecycle: `not_started -> in_progress -> submitted ->
//! corrected`. While `in_progress` it runs two independent background tasks, a
//! countdown that auto-submits when the time limit expires and a periodic
//! autosave. Both are cancelled when the attempt leaves `in_progress`.
//!
//! Submission is the one point of mutual exclusion: the countdown and an
//! explicit submit may race, and only the first to take the state lock wins.
//! The loser gets [`QuizError::AlreadySubmitted`].

use std::sync::{Arc, Weak};
use std::time::Duration;

use chrono::Utc;
use tokio::sync::Mutex;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::error::{ConfigIssue, ConfigurationError, QuizError};
use crate::grade::GradeScale;
use crate::ledger::{AnswerLedger, LedgerSnapshot};
use crate::model::{Answer, AnswerValue, Attempt, AttemptStatus, Question, QuizConfig, SubmitTrigger};
use crate::scoring::{regrade, score_attempt, AggregateResult, ManualGrade};
use crate::traits::{AttemptRegistry, AttemptStore, AttemptSubmission, DraftSnapshot, QuizSource};
use crate::visibility::{visible_result, VisibleResult};

/// Tunables for a session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Countdown check period.
    pub tick_interval: Duration,
    /// Autosave period. `None` disables autosave.
    pub autosave_interval: Option<Duration>,
    pub grade_scale: GradeScale,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(1),
            autosave_interval: Some(Duration::from_secs(30)),
            grade_scale: GradeScale::default(),
        }
    }
}

/// What a successful submission returns.
#[derive(Debug, Clone)]
pub struct SubmissionOutcome {
    pub attempt: Attempt,
    pub result: AggregateResult,
    /// `result` filtered by the quiz's correction mode.
    pub visible: VisibleResult,
    /// Whether the store accepted the submission. See [`AttemptSession::retry_persist`].
    pub persisted: bool,
}

struct SessionState {
    attempt: Attempt,
    ledger: AnswerLedger,
    cursor: usize,
    started: Option<Instant>,
    result: Option<AggregateResult>,
    submitted_ledger: Option<LedgerSnapshot>,
    last_saved_revision: Option<u64>,
}

struct Shared {
    quiz: QuizConfig,
    config: SessionConfig,
    store: Arc<dyn AttemptStore>,
    state: Mutex<SessionState>,
    shutdown: CancellationToken,
}

impl Drop for Shared {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

/// Handle to one attempt. Cheap to clone; clones share the same attempt.
#[derive(Clone)]
pub struct AttemptSession {
    shared: Arc<Shared>,
}

impl AttemptSession {
    /// Create a session for an allocated attempt.
    ///
    /// Fails with [`QuizError::Configuration`] if the quiz or grade scale is malformed.
    pub fn new(
        quiz: QuizConfig,
        attempt: Attempt,
        store: Arc<dyn AttemptStore>,
        config: SessionConfig,
    ) -> Result<Self, QuizError> {
        quiz.validate()?;
        config.grade_scale.validate()?;
        if attempt.status != AttemptStatus::NotStarted {
            return Err(QuizError::InvalidTransition {
                status: attempt.status,
                action: "open a session",
            });
        }

        Ok(Self {
            shared: Arc::new(Shared {
                quiz,
                config,
                store,
                state: Mutex::new(SessionState {
                    attempt,
                    ledger: AnswerLedger::new(),
                    cursor: 0,
                    started: None,
                    result: None,
                    submitted_ledger: None,
                    last_saved_revision: None,
                }),
                shutdown: CancellationToken::new(),
            }),
        })
    }

    /// Load the quiz, allocate an attempt, and create a session for it.
    pub async fn open(
        source: &dyn QuizSource,
        registry: &dyn AttemptRegistry,
        store: Arc<dyn AttemptStore>,
        quiz_id: &str,
        student_id: &str,
        config: SessionConfig,
    ) -> Result<Self, QuizError> {
        let quiz = source.quiz_configuration(quiz_id).await?;
        quiz.validate()?;
        let attempt = registry.start_attempt(quiz_id, student_id).await?;
        Self::new(quiz, attempt, store, config)
    }

    pub fn quiz(&self) -> &QuizConfig {
        &self.shared.quiz
    }

    pub async fn attempt(&self) -> Attempt {
        self.shared.state.lock().await.attempt.clone()
    }

    pub async fn status(&self) -> AttemptStatus {
        self.shared.state.lock().await.attempt.status
    }

    /// `not_started -> in_progress`. Arms the countdown and autosave tasks.
    pub async fn start(&self) -> Result<Attempt, QuizError> {
        let mut state = self.shared.state.lock().await;
        if state.attempt.status != AttemptStatus::NotStarted {
            return Err(QuizError::InvalidTransition {
                status: state.attempt.status,
                action: "start",
            });
        }

        let max_attempts = self.shared.quiz.max_attempts;
        if state.attempt.attempt_number > max_attempts {
            return Err(QuizError::AttemptLimitExceeded {
                attempt_number: state.attempt.attempt_number,
                max_attempts,
            });
        }

        let now = Instant::now();
        let deadline = match self.shared.quiz.time_limit_seconds {
            Some(limit) => Some(now.checked_add(Duration::from_secs(limit)).ok_or_else(|| {
                ConfigurationError {
                    quiz_id: self.shared.quiz.id.clone(),
                    issues: vec![ConfigIssue::quiz(format!(
                        "time_limit_seconds {limit} cannot be scheduled"
                    ))],
                }
            })?),
            None => None,
        };

        state.attempt.status = AttemptStatus::InProgress;
        state.attempt.started_at = Some(Utc::now());
        state.started = Some(now);

        if let Some(deadline) = deadline {
            self.spawn_countdown(deadline);
        }
        if let Some(period) = self.shared.config.autosave_interval {
            self.spawn_autosave(period);
        }

        tracing::info!(
            attempt_id = %state.attempt.id,
            quiz_id = %state.attempt.quiz_id,
            attempt_number = state.attempt.attempt_number,
            time_limit_seconds = ?self.shared.quiz.time_limit_seconds,
            "attempt started"
        );

        Ok(state.attempt.clone())
    }

    fn spawn_countdown(&self, deadline: Instant) {
        let weak: Weak<Shared> = Arc::downgrade(&self.shared);
        let token = self.shared.shutdown.clone();
        let mut ticker = tokio::time::interval(self.shared.config.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        if Instant::now() < deadline {
                            continue;
                        }
                        let Some(shared) = weak.upgrade() else { break };
                        let session = AttemptSession { shared };
                        match session.submit_with(SubmitTrigger::Timeout).await {
                            Ok(_) => {}
                            Err(e) if e.is_already_submitted() => {
                                tracing::debug!("countdown lost the submission race");
                            }
                            Err(e) => tracing::warn!("timeout submission failed: {e}"),
                        }
                        break;
                    }
                }
            }
        });
    }

    fn spawn_autosave(&self, period: Duration) {
        let weak: Weak<Shared> = Arc::downgrade(&self.shared);
        let token = self.shared.shutdown.clone();
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        let Some(shared) = weak.upgrade() else { break };
                        AttemptSession { shared }.autosave().await;
                    }
                }
            }
        });
    }

    async fn require_in_progress(&self, action: &'static str) -> Result<tokio::sync::MutexGuard<'_, SessionState>, QuizError> {
        let state = self.shared.state.lock().await;
        if state.attempt.status != AttemptStatus::InProgress {
            return Err(QuizError::InvalidTransition {
                status: state.attempt.status,
                action,
            });
        }
        Ok(state)
    }

    /// Move the cursor. Has no effect on scoring.
    pub async fn navigate_to(&self, index: usize) -> Result<Question, QuizError> {
        let mut state = self.require_in_progress("navigate").await?;
        let question = self
            .shared
            .quiz
            .questions
            .get(index)
            .ok_or(QuizError::QuestionIndexOutOfRange {
                index,
                len: self.shared.quiz.questions.len(),
            })?;
        state.cursor = index;
        tracing::debug!(attempt_id = %state.attempt.id, index, "navigated");
        Ok(question.clone())
    }

    /// Advance the cursor; stays on the last question.
    pub async fn next(&self) -> Result<Question, QuizError> {
        let cursor = self.cursor().await;
        let last = self.shared.quiz.questions.len().saturating_sub(1);
        self.navigate_to((cursor + 1).min(last)).await
    }

    /// Step the cursor back; stays on the first question.
    pub async fn previous(&self) -> Result<Question, QuizError> {
        let cursor = self.cursor().await;
        self.navigate_to(cursor.saturating_sub(1)).await
    }

    pub async fn cursor(&self) -> usize {
        self.shared.state.lock().await.cursor
    }

    pub async fn current_question(&self) -> Option<Question> {
        let cursor = self.cursor().await;
        self.shared.quiz.questions.get(cursor).cloned()
    }

    /// Write an answer. Only accepted while `in_progress`; malformed answers are rejected.
    pub async fn upsert_answer(&self, answer: Answer) -> Result<Option<AnswerValue>, QuizError> {
        let mut state = self.require_in_progress("write an answer").await?;
        let question_id = answer.question_id.clone();
        let previous = state.ledger.upsert(&self.shared.quiz, answer)?;
        tracing::debug!(
            attempt_id = %state.attempt.id,
            question_id = %question_id,
            revision = state.ledger.revision(),
            "answer recorded"
        );
        Ok(previous)
    }

    pub async fn ledger_snapshot(&self) -> LedgerSnapshot {
        self.shared.state.lock().await.ledger.snapshot()
    }

    pub async fn answered_count(&self) -> usize {
        self.shared
            .state
            .lock()
            .await
            .ledger
            .answered_count(&self.shared.quiz)
    }

    /// Time left before auto-submission. `None` without a time limit or outside `in_progress`.
    pub async fn remaining_time(&self) -> Option<Duration> {
        let state = self.shared.state.lock().await;
        if state.attempt.status != AttemptStatus::InProgress {
            return None;
        }
        let limit = Duration::from_secs(self.shared.quiz.time_limit_seconds?);
        let elapsed = state.started?.elapsed();
        Some(limit.saturating_sub(elapsed))
    }

    /// Persist the current ledger for crash recovery.
    ///
    /// Skipped when nothing changed since the last successful save. Failures are
    /// logged and swallowed; the next tick tries again. Returns whether a draft was written.
    pub async fn autosave(&self) -> bool {
        let draft = {
            let state = self.shared.state.lock().await;
            if state.attempt.status != AttemptStatus::InProgress {
                return false;
            }
            if state.last_saved_revision == Some(state.ledger.revision()) {
                return false;
            }
            DraftSnapshot {
                attempt_id: state.attempt.id,
                quiz_id: state.attempt.quiz_id.clone(),
                ledger: state.ledger.snapshot(),
                cursor: state.cursor,
            }
        };

        match self.shared.store.persist_draft(&draft).await {
            Ok(()) => {
                let mut state = self.shared.state.lock().await;
                let saved = state.last_saved_revision.unwrap_or(0).max(draft.ledger.revision);
                state.last_saved_revision = Some(saved);
                tracing::debug!(attempt_id = %draft.attempt_id, revision = draft.ledger.revision, "draft saved");
                true
            }
            Err(e) => {
                tracing::warn!(attempt_id = %draft.attempt_id, "autosave failed: {e:#}");
                false
            }
        }
    }

    /// Explicit student submission.
    pub async fn submit(&self) -> Result<SubmissionOutcome, QuizError> {
        self.submit_with(SubmitTrigger::Student).await
    }

    /// `in_progress -> submitted`. Exactly one call per attempt succeeds.
    pub async fn submit_with(&self, trigger: SubmitTrigger) -> Result<SubmissionOutcome, QuizError> {
        let submission = {
            let mut state = self.shared.state.lock().await;
            match state.attempt.status {
                AttemptStatus::InProgress => {}
                AttemptStatus::NotStarted => {
                    return Err(QuizError::InvalidTransition {
                        status: AttemptStatus::NotStarted,
                        action: "submit",
                    })
                }
                AttemptStatus::Submitted | AttemptStatus::Corrected => {
                    return Err(QuizError::AlreadySubmitted {
                        attempt_id: state.attempt.id,
                    })
                }
            }

            let quiz = &self.shared.quiz;
            let elapsed = state.started.map(|s| s.elapsed()).unwrap_or_default().as_secs();
            let mut trigger = trigger;
            let time_taken = match quiz.time_limit_seconds {
                Some(limit) if trigger == SubmitTrigger::Timeout || elapsed >= limit => {
                    trigger = SubmitTrigger::Timeout;
                    elapsed.min(limit)
                }
                _ => elapsed,
            };

            let snapshot = state.ledger.snapshot();
            let result = score_attempt(quiz, &snapshot, &self.shared.config.grade_scale);

            state.attempt.status = AttemptStatus::Submitted;
            state.attempt.submitted_at = Some(Utc::now());
            state.attempt.time_taken_seconds = Some(time_taken);
            state.attempt.submit_trigger = Some(trigger);
            state.result = Some(result.clone());
            state.submitted_ledger = Some(snapshot.clone());

            let visible = visible_result(
                quiz.correction_mode,
                state.attempt.status,
                Some(&result),
                quiz.questions.len(),
                result.questions_answered,
            );

            tracing::info!(
                attempt_id = %state.attempt.id,
                trigger = ?trigger,
                total_score = result.total_score,
                max_possible_score = result.max_possible_score,
                time_taken_seconds = time_taken,
                "attempt submitted"
            );

            AttemptSubmission {
                attempt: state.attempt.clone(),
                ledger: snapshot,
                result,
                visible,
            }
        };

        self.shared.shutdown.cancel();
        let persisted = self.persist(&submission).await;

        Ok(SubmissionOutcome {
            attempt: submission.attempt,
            result: submission.result,
            visible: submission.visible,
            persisted,
        })
    }

    async fn persist(&self, submission: &AttemptSubmission) -> bool {
        match self.shared.store.submit_attempt(submission).await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(attempt_id = %submission.attempt.id, "submission write failed: {e:#}");
                false
            }
        }
    }

    /// Re-send the stored submission after a failed write. The result is not recomputed.
    pub async fn retry_persist(&self) -> Result<bool, QuizError> {
        let submission = {
            let state = self.shared.state.lock().await;
            let (Some(result), Some(ledger)) = (&state.result, &state.submitted_ledger) else {
                return Err(QuizError::InvalidTransition {
                    status: state.attempt.status,
                    action: "persist a submission",
                });
            };
            AttemptSubmission {
                attempt: state.attempt.clone(),
                ledger: ledger.clone(),
                result: result.clone(),
                visible: self.visible_for(&state),
            }
        };
        Ok(self.persist(&submission).await)
    }

    /// Apply a teacher grade to a subjective question and recompute the result.
    ///
    /// Moves the attempt to `corrected` once every subjective question is graded.
    pub async fn apply_manual_grade(
        &self,
        question_id: &str,
        grade: ManualGrade,
    ) -> Result<AggregateResult, QuizError> {
        let (attempt, result, visible) = {
            let mut state = self.shared.state.lock().await;
            let current = match (&state.result, state.attempt.status.is_submitted()) {
                (Some(result), true) => result,
                _ => {
                    return Err(QuizError::InvalidTransition {
                        status: state.attempt.status,
                        action: "apply a manual grade",
                    })
                }
            };
            let updated = regrade(
                &self.shared.quiz,
                current,
                question_id,
                grade,
                &self.shared.config.grade_scale,
            )?;

            if updated.has_manual_questions() && updated.is_fully_graded() {
                if state.attempt.status != AttemptStatus::Corrected {
                    tracing::info!(attempt_id = %state.attempt.id, total_score = updated.total_score, "attempt corrected");
                }
                state.attempt.status = AttemptStatus::Corrected;
            }
            state.result = Some(updated.clone());
            (state.attempt.clone(), updated, self.visible_for(&state))
        };

        if let Err(e) = self
            .shared
            .store
            .record_correction(&attempt, &result, &visible)
            .await
        {
            tracing::warn!(attempt_id = %attempt.id, "correction write failed: {e:#}");
        }
        Ok(result)
    }

    /// The stored result, unfiltered. `None` before submission.
    pub async fn result(&self) -> Option<AggregateResult> {
        self.shared.state.lock().await.result.clone()
    }

    /// The result as a student may see it.
    pub async fn visible_result(&self) -> VisibleResult {
        let state = self.shared.state.lock().await;
        self.visible_for(&state)
    }

    fn visible_for(&self, state: &SessionState) -> VisibleResult {
        visible_result(
            self.shared.quiz.correction_mode,
            state.attempt.status,
            state.result.as_ref(),
            self.shared.quiz.questions.len(),
            state.ledger.answered_count(&self.shared.quiz),
        )
    }
}
