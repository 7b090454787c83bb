//! Answer ledger: the student's current raw answer per question.
//!
//! Writes replace the whole value for a question; there is no partial merge.
//! Every write is validated against the question before it is accepted.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::QuizError;
use crate::model::{check_answer_structure, Answer, AnswerValue, QuizConfig};

/// Mutable per-attempt answer store keyed by question id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnswerLedger {
    answers: BTreeMap<String, AnswerValue>,
    /// Bumped on every accepted write.
    revision: u64,
}

impl AnswerLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate and store an answer, replacing any previous value.
    ///
    /// Returns the replaced value. On error the ledger is unchanged.
    pub fn upsert(&mut self, quiz: &QuizConfig, answer: Answer) -> Result<Option<AnswerValue>, QuizError> {
        let question = quiz
            .question(&answer.question_id)
            .ok_or_else(|| QuizError::UnknownQuestion(answer.question_id.clone()))?;
        check_answer_structure(question, &answer)?;

        self.revision += 1;
        Ok(self.answers.insert(answer.question_id, answer.value))
    }

    /// Current value for a question; `Unanswered` if never written.
    pub fn get(&self, question_id: &str) -> &AnswerValue {
        static UNANSWERED: AnswerValue = AnswerValue::Unanswered;
        self.answers.get(question_id).unwrap_or(&UNANSWERED)
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Number of questions of `quiz` that carry an answer.
    pub fn answered_count(&self, quiz: &QuizConfig) -> usize {
        quiz.questions
            .iter()
            .filter(|q| self.get(&q.id).is_answered(q.question_type()))
            .count()
    }

    /// Ids of questions still unanswered, in quiz order.
    pub fn unanswered<'a>(&self, quiz: &'a QuizConfig) -> Vec<&'a str> {
        quiz.questions
            .iter()
            .filter(|q| !self.get(&q.id).is_answered(q.question_type()))
            .map(|q| q.id.as_str())
            .collect()
    }

    pub fn is_complete(&self, quiz: &QuizConfig) -> bool {
        self.answered_count(quiz) == quiz.questions.len()
    }

    /// Immutable copy for scoring or persistence.
    pub fn snapshot(&self) -> LedgerSnapshot {
        LedgerSnapshot {
            revision: self.revision,
            answers: self.answers.clone(),
        }
    }

    /// Rebuild a ledger from a persisted draft, re-validating every answer.
    ///
    /// Answers that no longer fit the quiz are dropped and reported.
    pub fn restore(quiz: &QuizConfig, snapshot: &LedgerSnapshot) -> (Self, Vec<QuizError>) {
        let mut ledger = Self::new();
        let mut rejected = Vec::new();
        for (question_id, value) in &snapshot.answers {
            if let Err(e) = ledger.upsert(quiz, Answer::new(question_id.clone(), value.clone())) {
                rejected.push(e);
            }
        }
        ledger.revision = snapshot.revision.max(ledger.revision);
        (ledger, rejected)
    }
}

/// Point-in-time copy of a ledger.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerSnapshot {
    pub revision: u64,
    pub answers: BTreeMap<String, AnswerValue>,
}

impl LedgerSnapshot {
    pub fn get(&self, question_id: &str) -> &AnswerValue {
        static UNANSWERED: AnswerValue = AnswerValue::Unanswered;
        self.answers.get(question_id).unwrap_or(&UNANSWERED)
    }

    pub fn answered_count(&self, quiz: &QuizConfig) -> usize {
        quiz.questions
            .iter()
            .filter(|q| self.get(&q.id).is_answered(q.question_type()))
            .count()
    }
}
