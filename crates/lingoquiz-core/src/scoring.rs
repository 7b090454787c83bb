//! Scoring engine: per-question evaluation and reduction into an aggregate result.
//!
//! Everything here is deterministic and side-effect free. Inputs are assumed to
//! be structurally valid (the ledger rejects anything else), so no function in
//! the evaluation path can fail. The only fallible entry point is
//! [`apply_manual_grade`], which validates a teacher-supplied grade.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::QuizError;
use crate::grade::GradeScale;
use crate::ledger::LedgerSnapshot;
use crate::model::{split_blanks, AnswerValue, Difficulty, Question, QuestionKind, QuestionType, QuizConfig};

/// Placeholder feedback for questions a teacher must grade.
pub const MANUAL_REVIEW_DISPLAY: &str = "Manual review required";

/// Scored outcome for a single question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Evaluation {
    pub question_id: String,
    pub question_type: QuestionType,
    #[serde(default)]
    pub difficulty: Option<Difficulty>,
    /// Objective types: full marks. Fill-blank: every blank matched.
    pub is_correct: bool,
    pub points_earned: u32,
    pub max_points: u32,
    pub correct_answer_display: String,
    #[serde(default)]
    pub explanation: Option<String>,
    /// True only for short answer and essay questions.
    pub requires_manual_grading: bool,
    /// Set once a teacher grade has replaced the placeholder.
    #[serde(default)]
    pub manually_graded: bool,
    /// Fill-blank only: number of blanks that matched.
    #[serde(default)]
    pub matched_blanks: Option<usize>,
    pub answered: bool,
}

impl Evaluation {
    /// Still waiting for a teacher grade.
    pub fn is_pending(&self) -> bool {
        self.requires_manual_grading && !self.manually_graded
    }
}

/// Per-type or per-difficulty tally.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Breakdown {
    pub question_count: usize,
    pub correct_count: usize,
    pub points_earned: u32,
    pub max_points: u32,
}

impl Breakdown {
    fn record(&mut self, evaluation: &Evaluation) {
        self.question_count += 1;
        if evaluation.is_correct {
            self.correct_count += 1;
        }
        self.points_earned = self.points_earned.saturating_add(evaluation.points_earned);
        self.max_points = self.max_points.saturating_add(evaluation.max_points);
    }
}

/// Rolled-up score and grade for one attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateResult {
    pub quiz_id: String,
    pub total_score: u32,
    pub max_possible_score: u32,
    pub percentage: f64,
    pub is_passed: bool,
    pub grade_letter: String,
    pub question_count: usize,
    pub questions_answered: usize,
    /// Subjective evaluations still awaiting a teacher grade.
    pub pending_manual_grades: usize,
    pub per_question_evaluations: Vec<Evaluation>,
    pub breakdown_by_type: BTreeMap<QuestionType, Breakdown>,
    /// Empty when no question carries difficulty metadata.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub breakdown_by_difficulty: BTreeMap<Difficulty, Breakdown>,
}

impl AggregateResult {
    pub fn evaluation(&self, question_id: &str) -> Option<&Evaluation> {
        self.per_question_evaluations
            .iter()
            .find(|e| e.question_id == question_id)
    }

    /// At least one subjective evaluation exists.
    pub fn has_manual_questions(&self) -> bool {
        self.per_question_evaluations
            .iter()
            .any(|e| e.requires_manual_grading)
    }

    /// Every subjective evaluation has received a teacher grade.
    pub fn is_fully_graded(&self) -> bool {
        self.pending_manual_grades == 0
    }
}

/// A teacher-supplied grade for a subjective question.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManualGrade {
    pub points_earned: u32,
    pub is_correct: bool,
}

/// Normalize a blank for comparison: trimmed and lower-cased.
fn normalize_blank(s: &str) -> String {
    s.trim().to_lowercase()
}

/// `round(points * matched / blanks)` with round-half-up, in exact integer arithmetic.
pub fn partial_points(points: u32, matched: usize, blanks: usize) -> u32 {
    if blanks == 0 {
        return 0;
    }
    let numerator = 2 * u64::from(points) * matched as u64 + blanks as u64;
    let denominator = 2 * blanks as u64;
    (numerator / denominator) as u32
}

/// Count positions where the submitted blank equals the expected one.
///
/// Missing submitted blanks count as empty strings; surplus ones are ignored
/// (the ledger already rejects them).
pub fn matched_blanks(expected: &[String], submitted: &str) -> usize {
    let submitted = split_blanks(submitted);
    expected
        .iter()
        .enumerate()
        .filter(|(i, want)| {
            let got = submitted.get(*i).copied().unwrap_or("");
            normalize_blank(got) == normalize_blank(want)
        })
        .count()
}

/// Evaluate one answer against its question.
pub fn evaluate(question: &Question, answer: &AnswerValue) -> Evaluation {
    let mut evaluation = Evaluation {
        question_id: question.id.clone(),
        question_type: question.question_type(),
        difficulty: question.difficulty,
        is_correct: false,
        points_earned: 0,
        max_points: question.points,
        correct_answer_display: String::new(),
        explanation: question.explanation.clone(),
        requires_manual_grading: false,
        manually_graded: false,
        matched_blanks: None,
        answered: answer.is_answered(question.question_type()),
    };

    match &question.kind {
        QuestionKind::SingleChoice { .. } | QuestionKind::TrueFalse { .. } => {
            let correct = question.correct_option();
            evaluation.correct_answer_display = correct.map(|o| o.text.clone()).unwrap_or_default();
            if let (Some(correct), AnswerValue::SelectedOptionId(selected)) = (correct, answer) {
                if &correct.id == selected {
                    evaluation.is_correct = true;
                    evaluation.points_earned = question.points;
                }
            }
        }
        QuestionKind::FillBlank { expected_blanks } => {
            let submitted = match answer {
                AnswerValue::Text(text) => text.as_str(),
                _ => "",
            };
            let matched = matched_blanks(expected_blanks, submitted);
            evaluation.matched_blanks = Some(matched);
            evaluation.points_earned = partial_points(question.points, matched, expected_blanks.len());
            evaluation.is_correct = matched == expected_blanks.len();
            evaluation.correct_answer_display = expected_blanks.join(", ");
        }
        QuestionKind::ShortAnswer | QuestionKind::Essay => {
            evaluation.requires_manual_grading = true;
            evaluation.correct_answer_display = MANUAL_REVIEW_DISPLAY.to_string();
        }
    }

    evaluation
}

/// Evaluate every question of the quiz against a ledger snapshot, in quiz order.
pub fn evaluate_all(quiz: &QuizConfig, snapshot: &LedgerSnapshot) -> Vec<Evaluation> {
    quiz.questions
        .iter()
        .map(|q| evaluate(q, snapshot.get(&q.id)))
        .collect()
}

/// Fold evaluations into an aggregate result.
pub fn aggregate(
    quiz: &QuizConfig,
    evaluations: Vec<Evaluation>,
    questions_answered: usize,
    scale: &GradeScale,
) -> AggregateResult {
    // Validated quizzes never saturate.
    let total_score = evaluations
        .iter()
        .fold(0u32, |acc, e| acc.saturating_add(e.points_earned));
    let max_possible_score = evaluations
        .iter()
        .fold(0u32, |acc, e| acc.saturating_add(e.max_points));
    let percentage = if max_possible_score == 0 {
        0.0
    } else {
        100.0 * f64::from(total_score) / f64::from(max_possible_score)
    };

    let mut breakdown_by_type: BTreeMap<QuestionType, Breakdown> = BTreeMap::new();
    let mut breakdown_by_difficulty: BTreeMap<Difficulty, Breakdown> = BTreeMap::new();
    for evaluation in &evaluations {
        breakdown_by_type
            .entry(evaluation.question_type)
            .or_default()
            .record(evaluation);
        if let Some(difficulty) = evaluation.difficulty {
            breakdown_by_difficulty
                .entry(difficulty)
                .or_default()
                .record(evaluation);
        }
    }

    AggregateResult {
        quiz_id: quiz.id.clone(),
        total_score,
        max_possible_score,
        percentage,
        is_passed: percentage >= f64::from(quiz.passing_score_percent),
        grade_letter: scale.letter_for(percentage).to_string(),
        question_count: evaluations.len(),
        questions_answered,
        pending_manual_grades: evaluations.iter().filter(|e| e.is_pending()).count(),
        per_question_evaluations: evaluations,
        breakdown_by_type,
        breakdown_by_difficulty,
    }
}

/// Score a whole attempt from a ledger snapshot.
///
/// Recomputing from the same snapshot always yields an identical result.
pub fn score_attempt(quiz: &QuizConfig, snapshot: &LedgerSnapshot, scale: &GradeScale) -> AggregateResult {
    let evaluations = evaluate_all(quiz, snapshot);
    aggregate(quiz, evaluations, snapshot.answered_count(quiz), scale)
}

/// Replace a subjective placeholder evaluation with a teacher grade.
///
/// This is the only way a short answer or essay evaluation changes.
pub fn apply_manual_grade(evaluation: &Evaluation, grade: ManualGrade) -> Result<Evaluation, QuizError> {
    if !evaluation.requires_manual_grading {
        return Err(QuizError::InvalidManualGrade {
            question_id: evaluation.question_id.clone(),
            reason: format!("{} questions are graded automatically", evaluation.question_type),
        });
    }
    if grade.points_earned > evaluation.max_points {
        return Err(QuizError::InvalidManualGrade {
            question_id: evaluation.question_id.clone(),
            reason: format!(
                "{} points exceeds the maximum of {}",
                grade.points_earned, evaluation.max_points
            ),
        });
    }

    Ok(Evaluation {
        points_earned: grade.points_earned,
        is_correct: grade.is_correct,
        manually_graded: true,
        ..evaluation.clone()
    })
}

/// Apply a teacher grade to a stored result and recompute the aggregate.
pub fn regrade(
    quiz: &QuizConfig,
    result: &AggregateResult,
    question_id: &str,
    grade: ManualGrade,
    scale: &GradeScale,
) -> Result<AggregateResult, QuizError> {
    let index = result
        .per_question_evaluations
        .iter()
        .position(|e| e.question_id == question_id)
        .ok_or_else(|| QuizError::UnknownQuestion(question_id.to_string()))?;

    let mut evaluations = result.per_question_evaluations.clone();
    evaluations[index] = apply_manual_grade(&evaluations[index], grade)?;
    Ok(aggregate(quiz, evaluations, result.questions_answered, scale))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::AnswerLedger;
    use crate::model::{Answer, AnswerOption, CorrectionMode};

    fn choice_question(id: &str, points: u32) -> Question {
        Question {
            id: id.into(),
            text: "¿Cómo se dice 'cat'?".into(),
            points,
            kind: QuestionKind::SingleChoice {
                options: vec![
                    AnswerOption {
                        id: "perro".into(),
                        text: "perro".into(),
                        is_correct: false,
                    },
                    AnswerOption {
                        id: "gato".into(),
                        text: "gato".into(),
                        is_correct: true,
                    },
                ],
            },
            explanation: Some("Gato is cat.".into()),
            difficulty: Some(Difficulty::Easy),
        }
    }

    fn fill_question() -> Question {
        Question {
            id: "capital".into(),
            text: "___ is the capital of ___".into(),
            points: 4,
            kind: QuestionKind::FillBlank {
                expected_blanks: vec!["paris".into(), "france".into()],
            },
            explanation: None,
            difficulty: Some(Difficulty::Medium),
        }
    }

    fn essay_question() -> Question {
        Question {
            id: "essay".into(),
            text: "Write about your city".into(),
            points: 10,
            kind: QuestionKind::Essay,
            explanation: None,
            difficulty: None,
        }
    }

    fn quiz(questions: Vec<Question>) -> QuizConfig {
        QuizConfig {
            id: "spanish-1".into(),
            title: "Spanish 1".into(),
            questions,
            time_limit_seconds: None,
            passing_score_percent: 60,
            max_attempts: 2,
            correction_mode: CorrectionMode::Immediate,
        }
    }

    #[test]
    fn choice_scoring_is_all_or_nothing() {
        let q = choice_question("c", 3);
        let right = evaluate(&q, &AnswerValue::option("gato"));
        assert_eq!(right.points_earned, 3);
        assert!(right.is_correct);
        assert_eq!(right.correct_answer_display, "gato");

        let wrong = evaluate(&q, &AnswerValue::option("perro"));
        assert_eq!(wrong.points_earned, 0);
        assert!(!wrong.is_correct);

        let blank = evaluate(&q, &AnswerValue::Unanswered);
        assert_eq!(blank.points_earned, 0);
        assert!(!blank.answered);
        assert!(!blank.requires_manual_grading);
    }

    #[test]
    fn fill_blank_partial_credit() {
        let q = fill_question();

        let full = evaluate(&q, &AnswerValue::text("Paris|france"));
        assert_eq!(full.matched_blanks, Some(2));
        assert_eq!(full.points_earned, 4);
        assert!(full.is_correct);

        let half = evaluate(&q, &AnswerValue::text("Lyon|France"));
        assert_eq!(half.matched_blanks, Some(1));
        assert_eq!(half.points_earned, 2);
        assert!(!half.is_correct);

        let empty = evaluate(&q, &AnswerValue::text(""));
        assert_eq!(empty.matched_blanks, Some(0));
        assert_eq!(empty.points_earned, 0);

        let unanswered = evaluate(&q, &AnswerValue::Unanswered);
        assert_eq!(unanswered.points_earned, 0);
        assert_eq!(full.correct_answer_display, "paris, france");
    }

    #[test]
    fn huge_point_totals_saturate_instead_of_wrapping() {
        let mut big = essay_question();
        big.points = u32::MAX;
        let mut small = essay_question();
        small.id = "essay-2".into();
        small.points = 2;
        let q = quiz(vec![big, small]);
        assert!(q.validate().is_err());

        let result = score_attempt(&q, &LedgerSnapshot::default(), &GradeScale::default());
        assert_eq!(result.max_possible_score, u32::MAX);
        assert_eq!(result.breakdown_by_type[&QuestionType::Essay].max_points, u32::MAX);
    }

    #[test]
    fn fill_blank_normalizes_whitespace_and_case() {
        let q = fill_question();
        let e = evaluate(&q, &AnswerValue::text("  PARIS |\tFrance "));
        assert_eq!(e.matched_blanks, Some(2));
    }

    #[test]
    fn fill_blank_pads_short_submissions() {
        let q = fill_question();
        let e = evaluate(&q, &AnswerValue::text("paris"));
        assert_eq!(e.matched_blanks, Some(1));
        assert_eq!(e.points_earned, 2);
    }

    #[test]
    fn partial_points_rounds_half_up() {
        assert_eq!(partial_points(3, 1, 2), 2);
        assert_eq!(partial_points(1, 1, 2), 1);
        assert_eq!(partial_points(1, 1, 3), 0);
        assert_eq!(partial_points(1, 2, 3), 1);
        assert_eq!(partial_points(5, 0, 4), 0);
        assert_eq!(partial_points(5, 4, 4), 5);
        assert_eq!(partial_points(5, 0, 0), 0);
    }

    #[test]
    fn partial_points_is_monotonic_in_matches() {
        for points in 1..=12 {
            for blanks in 1..=7 {
                let mut previous = 0;
                for matched in 0..=blanks {
                    let earned = partial_points(points, matched, blanks);
                    assert!(earned >= previous, "points={points} blanks={blanks} matched={matched}");
                    assert!(earned <= points);
                    previous = earned;
                }
                assert_eq!(previous, points);
            }
        }
    }

    #[test]
    fn subjective_questions_wait_for_a_teacher() {
        let e = evaluate(&essay_question(), &AnswerValue::text("Madrid is big"));
        assert!(e.requires_manual_grading);
        assert!(e.is_pending());
        assert_eq!(e.points_earned, 0);

        let unanswered = evaluate(&essay_question(), &AnswerValue::Unanswered);
        assert!(unanswered.requires_manual_grading);
        assert_eq!(unanswered.points_earned, 0);
    }

    #[test]
    fn aggregate_totals_and_breakdowns() {
        let quiz = quiz(vec![choice_question("c1", 2), choice_question("c2", 2), fill_question()]);
        let mut ledger = AnswerLedger::new();
        ledger.upsert(&quiz, Answer::new("c1", AnswerValue::option("gato"))).unwrap();
        ledger.upsert(&quiz, Answer::new("capital", AnswerValue::text("lyon|france"))).unwrap();

        let result = score_attempt(&quiz, &ledger.snapshot(), &GradeScale::default());
        assert_eq!(result.total_score, 4);
        assert_eq!(result.max_possible_score, 8);
        assert_eq!(result.percentage, 50.0);
        assert!(!result.is_passed);
        assert_eq!(result.grade_letter, "F");
        assert_eq!(result.questions_answered, 2);
        assert_eq!(result.question_count, 3);

        let choice = result.breakdown_by_type[&QuestionType::SingleChoice];
        assert_eq!(choice.question_count, 2);
        assert_eq!(choice.correct_count, 1);
        assert_eq!(result.breakdown_by_difficulty[&Difficulty::Medium].points_earned, 2);
    }

    #[test]
    fn difficulty_breakdown_is_empty_without_metadata() {
        let quiz = quiz(vec![essay_question()]);
        let result = score_attempt(&quiz, &LedgerSnapshot::default(), &GradeScale::default());
        assert!(result.breakdown_by_difficulty.is_empty());
        let json = serde_json::to_string(&result).unwrap();
        assert!(!json.contains("breakdown_by_difficulty"));
    }

    #[test]
    fn empty_quiz_never_divides_by_zero() {
        let mut quiz = quiz(vec![]);
        let result = score_attempt(&quiz, &LedgerSnapshot::default(), &GradeScale::default());
        assert_eq!(result.percentage, 0.0);
        assert!(!result.is_passed);

        quiz.passing_score_percent = 0;
        let result = score_attempt(&quiz, &LedgerSnapshot::default(), &GradeScale::default());
        assert!(result.is_passed);
    }

    #[test]
    fn scoring_is_idempotent() {
        let quiz = quiz(vec![choice_question("c1", 2), fill_question(), essay_question()]);
        let mut ledger = AnswerLedger::new();
        ledger.upsert(&quiz, Answer::new("c1", AnswerValue::option("perro"))).unwrap();
        ledger.upsert(&quiz, Answer::new("capital", AnswerValue::text("Paris|"))).unwrap();
        let snapshot = ledger.snapshot();

        let a = score_attempt(&quiz, &snapshot, &GradeScale::default());
        let b = score_attempt(&quiz, &snapshot, &GradeScale::default());
        assert_eq!(a, b);
        assert_eq!(serde_json::to_vec(&a).unwrap(), serde_json::to_vec(&b).unwrap());
    }

    #[test]
    fn manual_grade_replaces_placeholder_and_recomputes() {
        let quiz = quiz(vec![choice_question("c1", 10), essay_question()]);
        let mut ledger = AnswerLedger::new();
        ledger.upsert(&quiz, Answer::new("c1", AnswerValue::option("gato"))).unwrap();
        ledger.upsert(&quiz, Answer::new("essay", AnswerValue::text("..."))).unwrap();
        let scale = GradeScale::default();
        let result = score_attempt(&quiz, &ledger.snapshot(), &scale);
        assert_eq!(result.pending_manual_grades, 1);
        assert_eq!(result.percentage, 50.0);

        let grade = ManualGrade {
            points_earned: 9,
            is_correct: true,
        };
        let graded = regrade(&quiz, &result, "essay", grade, &scale).unwrap();
        assert!(graded.is_fully_graded());
        assert_eq!(graded.total_score, 19);
        assert_eq!(graded.percentage, 95.0);
        assert_eq!(graded.grade_letter, "A");
        let essay = graded.evaluation("essay").unwrap();
        assert!(essay.manually_graded);
        assert!(essay.requires_manual_grading);
    }

    #[test]
    fn manual_grade_is_validated() {
        let quiz = quiz(vec![choice_question("c1", 10), essay_question()]);
        let scale = GradeScale::default();
        let result = score_attempt(&quiz, &LedgerSnapshot::default(), &scale);

        let too_many = ManualGrade {
            points_earned: 11,
            is_correct: true,
        };
        assert!(matches!(
            regrade(&quiz, &result, "essay", too_many, &scale),
            Err(QuizError::InvalidManualGrade { .. })
        ));

        let fine = ManualGrade {
            points_earned: 1,
            is_correct: false,
        };
        assert!(matches!(
            regrade(&quiz, &result, "c1", fine, &scale),
            Err(QuizError::InvalidManualGrade { .. })
        ));
        assert!(matches!(
            regrade(&quiz, &result, "nope", fine, &scale),
            Err(QuizError::UnknownQuestion(_))
        ));
    }
}
