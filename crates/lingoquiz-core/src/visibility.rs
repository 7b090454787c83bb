//! Correction visibility policy.
//!
//! The single point where a stored result is shaped for a student caller.
//! Before submission nothing is scored, so nothing can leak in any mode. In
//! manual mode the per-question outcome stays withheld until the attempt is
//! corrected.

use serde::{Deserialize, Serialize};

use crate::model::{AttemptStatus, CorrectionMode};
use crate::scoring::AggregateResult;

/// Why a result is not shown in full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WithholdReason {
    /// The attempt has not been submitted yet.
    NotSubmitted,
    /// Manual correction mode and the teacher has not finished grading.
    ManualGradePending,
}

/// The redacted payload: status and progress only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WithheldResult {
    pub status: AttemptStatus,
    pub reason: WithholdReason,
    pub question_count: usize,
    pub questions_answered: usize,
}

/// What a student caller may see.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "visibility", rename_all = "snake_case")]
pub enum VisibleResult {
    Full(AggregateResult),
    Withheld(WithheldResult),
}

impl VisibleResult {
    pub fn is_full(&self) -> bool {
        matches!(self, VisibleResult::Full(_))
    }

    pub fn full(&self) -> Option<&AggregateResult> {
        match self {
            VisibleResult::Full(result) => Some(result),
            VisibleResult::Withheld(_) => None,
        }
    }

    pub fn withheld(&self) -> Option<&WithheldResult> {
        match self {
            VisibleResult::Withheld(withheld) => Some(withheld),
            VisibleResult::Full(_) => None,
        }
    }
}

/// Shape a stored result for a student according to the correction mode.
///
/// `result` is `None` until the attempt is submitted. `question_count` and
/// `questions_answered` describe the attempt when no result exists yet.
///
/// In `manual` mode only a `corrected` attempt is released, and an attempt
/// becomes `corrected` when its last subjective question is graded. A manual
/// quiz with no short answer or essay questions never becomes `corrected`, so
/// its result stays withheld for good. Use `end_of_quiz` for such quizzes.
pub fn visible_result(
    mode: CorrectionMode,
    status: AttemptStatus,
    result: Option<&AggregateResult>,
    question_count: usize,
    questions_answered: usize,
) -> VisibleResult {
    let withheld = |reason| {
        VisibleResult::Withheld(WithheldResult {
            status,
            reason,
            question_count: result.map_or(question_count, |r| r.question_count),
            questions_answered: result.map_or(questions_answered, |r| r.questions_answered),
        })
    };

    let Some(result) = result.filter(|_| status.is_submitted()) else {
        return withheld(WithholdReason::NotSubmitted);
    };

    match mode {
        CorrectionMode::Immediate | CorrectionMode::EndOfQuiz => VisibleResult::Full(result.clone()),
        CorrectionMode::Manual if status == AttemptStatus::Corrected => {
            VisibleResult::Full(result.clone())
        }
        CorrectionMode::Manual => withheld(WithholdReason::ManualGradePending),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grade::GradeScale;
    use crate::ledger::LedgerSnapshot;
    use crate::model::{AnswerValue, Question, QuestionKind, QuizConfig};
    use crate::scoring::score_attempt;

    fn result() -> AggregateResult {
        let quiz = QuizConfig {
            id: "q".into(),
            title: String::new(),
            questions: vec![
                Question {
                    id: "blank".into(),
                    text: "Ich ___ müde".into(),
                    points: 2,
                    kind: QuestionKind::FillBlank {
                        expected_blanks: vec!["bin".into()],
                    },
                    explanation: Some("sein, first person".into()),
                    difficulty: None,
                },
                Question {
                    id: "essay".into(),
                    text: "Beschreibe dein Haus".into(),
                    points: 4,
                    kind: QuestionKind::ShortAnswer,
                    explanation: None,
                    difficulty: None,
                },
            ],
            time_limit_seconds: None,
            passing_score_percent: 50,
            max_attempts: 1,
            correction_mode: CorrectionMode::Manual,
        };
        let mut snapshot = LedgerSnapshot::default();
        snapshot.answers.insert("blank".into(), AnswerValue::text("bin"));
        score_attempt(&quiz, &snapshot, &GradeScale::default())
    }

    #[test]
    fn nothing_is_visible_before_submission() {
        for mode in [CorrectionMode::Immediate, CorrectionMode::EndOfQuiz, CorrectionMode::Manual] {
            let visible = visible_result(mode, AttemptStatus::InProgress, None, 2, 1);
            let withheld = visible.withheld().unwrap();
            assert_eq!(withheld.reason, WithholdReason::NotSubmitted);
            assert_eq!(withheld.questions_answered, 1);
        }
    }

    #[test]
    fn immediate_and_end_of_quiz_show_everything_once_submitted() {
        let result = result();
        for mode in [CorrectionMode::Immediate, CorrectionMode::EndOfQuiz] {
            let visible = visible_result(mode, AttemptStatus::Submitted, Some(&result), 0, 0);
            let full = visible.full().unwrap();
            let blank = full.evaluation("blank").unwrap();
            assert_eq!(blank.correct_answer_display, "bin");
            assert_eq!(blank.explanation.as_deref(), Some("sein, first person"));
        }
    }

    #[test]
    fn manual_mode_withholds_until_corrected() {
        let result = result();
        let visible = visible_result(CorrectionMode::Manual, AttemptStatus::Submitted, Some(&result), 0, 0);
        let withheld = visible.withheld().unwrap();
        assert_eq!(withheld.reason, WithholdReason::ManualGradePending);
        assert_eq!(withheld.question_count, 2);
        assert_eq!(withheld.questions_answered, 1);

        let json = serde_json::to_string(&visible).unwrap();
        for field in ["points_earned", "is_correct", "correct_answer_display"] {
            assert!(!json.contains(field), "{field} leaked: {json}");
        }

        let visible = visible_result(CorrectionMode::Manual, AttemptStatus::Corrected, Some(&result), 0, 0);
        assert!(visible.is_full());
    }
}
