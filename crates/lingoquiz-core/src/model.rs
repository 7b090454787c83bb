//! Core data model types for lingoquiz.
//!
//! Questions and quiz configurations are immutable for the lifetime of an
//! attempt. They are validated once at load time; a quiz that fails validation
//! can never start an attempt.

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{ConfigIssue, ConfigurationError, StructuralAnswerError};

/// Separator between blanks in a stored fill-blank answer.
///
/// Reserved: expected answers may not contain it.
pub const BLANK_DELIMITER: char = '|';

/// Minimum run of underscores in question text that marks one blank.
pub const BLANK_MARKER_MIN_LEN: usize = 3;

/// Longest accepted time limit: seven days.
pub const MAX_TIME_LIMIT_SECONDS: u64 = 7 * 24 * 60 * 60;

/// A single quiz question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Question {
    /// Unique within its quiz.
    pub id: String,
    /// Prompt shown to the student. Fill-blank prompts carry `___` markers.
    #[serde(default)]
    pub text: String,
    /// Points awarded for a fully correct answer. Always positive.
    pub points: u32,
    /// Type tag together with the type's answer specification.
    #[serde(flatten)]
    pub kind: QuestionKind,
    /// Display-only explanation shown with corrections.
    #[serde(default)]
    pub explanation: Option<String>,
    /// Optional difficulty metadata used by breakdowns.
    #[serde(default)]
    pub difficulty: Option<Difficulty>,
}

/// Question type plus the data needed to score it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum QuestionKind {
    SingleChoice { options: Vec<AnswerOption> },
    TrueFalse { options: Vec<AnswerOption> },
    FillBlank { expected_blanks: Vec<String> },
    ShortAnswer,
    Essay,
}

impl QuestionKind {
    pub fn question_type(&self) -> QuestionType {
        match self {
            QuestionKind::SingleChoice { .. } => QuestionType::SingleChoice,
            QuestionKind::TrueFalse { .. } => QuestionType::TrueFalse,
            QuestionKind::FillBlank { .. } => QuestionType::FillBlank,
            QuestionKind::ShortAnswer => QuestionType::ShortAnswer,
            QuestionKind::Essay => QuestionType::Essay,
        }
    }
}

/// One selectable option of a choice question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnswerOption {
    pub id: String,
    pub text: String,
    #[serde(default)]
    pub is_correct: bool,
}

/// Question type without payload, used as a breakdown key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionType {
    SingleChoice,
    TrueFalse,
    FillBlank,
    ShortAnswer,
    Essay,
}

impl QuestionType {
    /// Objective types are scored automatically and never need a teacher.
    pub fn is_objective(self) -> bool {
        !self.is_subjective()
    }

    pub fn is_subjective(self) -> bool {
        matches!(self, QuestionType::ShortAnswer | QuestionType::Essay)
    }

    pub fn is_choice(self) -> bool {
        matches!(self, QuestionType::SingleChoice | QuestionType::TrueFalse)
    }
}

impl fmt::Display for QuestionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QuestionType::SingleChoice => write!(f, "single_choice"),
            QuestionType::TrueFalse => write!(f, "true_false"),
            QuestionType::FillBlank => write!(f, "fill_blank"),
            QuestionType::ShortAnswer => write!(f, "short_answer"),
            QuestionType::Essay => write!(f, "essay"),
        }
    }
}

impl FromStr for QuestionType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "single_choice" | "single" => Ok(QuestionType::SingleChoice),
            "true_false" => Ok(QuestionType::TrueFalse),
            "fill_blank" | "fill_in_the_blank" => Ok(QuestionType::FillBlank),
            "short_answer" => Ok(QuestionType::ShortAnswer),
            "essay" => Ok(QuestionType::Essay),
            other => Err(format!("unknown question type: {other}")),
        }
    }
}

/// Difficulty metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
}

impl FromStr for Difficulty {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "easy" => Ok(Difficulty::Easy),
            "medium" => Ok(Difficulty::Medium),
            "hard" => Ok(Difficulty::Hard),
            other => Err(format!("unknown difficulty: {other}")),
        }
    }
}

impl Question {
    pub fn question_type(&self) -> QuestionType {
        self.kind.question_type()
    }

    /// The options of a choice question; empty for other types.
    pub fn options(&self) -> &[AnswerOption] {
        match &self.kind {
            QuestionKind::SingleChoice { options } | QuestionKind::TrueFalse { options } => {
                options
            }
            _ => &[],
        }
    }

    /// The unique correct option of a choice question.
    pub fn correct_option(&self) -> Option<&AnswerOption> {
        self.options().iter().find(|o| o.is_correct)
    }

    /// Collect every validation problem with this question.
    pub fn validation_issues(&self) -> Vec<ConfigIssue> {
        let mut issues = Vec::new();
        let id = self.id.as_str();

        if id.trim().is_empty() {
            issues.push(ConfigIssue::quiz("question with an empty id"));
        }
        if self.points == 0 {
            issues.push(ConfigIssue::question(id, "points must be positive"));
        }

        match &self.kind {
            QuestionKind::SingleChoice { options } | QuestionKind::TrueFalse { options } => {
                if options.is_empty() {
                    issues.push(ConfigIssue::question(id, "choice question has no options"));
                }
                if matches!(self.kind, QuestionKind::TrueFalse { .. }) && options.len() != 2 {
                    issues.push(ConfigIssue::question(
                        id,
                        format!("true_false question needs 2 options, found {}", options.len()),
                    ));
                }
                let correct = options.iter().filter(|o| o.is_correct).count();
                if correct != 1 {
                    issues.push(ConfigIssue::question(
                        id,
                        format!("exactly one option must be correct, found {correct}"),
                    ));
                }
                let mut seen = HashSet::new();
                for option in options {
                    if !seen.insert(option.id.as_str()) {
                        issues.push(ConfigIssue::question(
                            id,
                            format!("duplicate option id: {}", option.id),
                        ));
                    }
                }
            }
            QuestionKind::FillBlank { expected_blanks } => {
                if expected_blanks.is_empty() {
                    issues.push(ConfigIssue::question(id, "fill_blank question has no blanks"));
                }
                let markers = count_blank_markers(&self.text);
                if markers != expected_blanks.len() {
                    issues.push(ConfigIssue::question(
                        id,
                        format!(
                            "text has {markers} blank markers but {} expected answers",
                            expected_blanks.len()
                        ),
                    ));
                }
                for (i, blank) in expected_blanks.iter().enumerate() {
                    if blank.trim().is_empty() {
                        issues.push(ConfigIssue::question(
                            id,
                            format!("expected answer for blank {} is empty", i + 1),
                        ));
                    }
                    if blank.contains(BLANK_DELIMITER) {
                        issues.push(ConfigIssue::question(
                            id,
                            format!(
                                "expected answer for blank {} contains the reserved '{}'",
                                i + 1,
                                BLANK_DELIMITER
                            ),
                        ));
                    }
                }
            }
            QuestionKind::ShortAnswer | QuestionKind::Essay => {}
        }

        issues
    }
}

/// Count blank markers: each maximal run of at least three underscores is one blank.
pub fn count_blank_markers(text: &str) -> usize {
    let mut count = 0;
    let mut run = 0;
    for c in text.chars().chain(std::iter::once('\0')) {
        if c == '_' {
            run += 1;
        } else {
            if run >= BLANK_MARKER_MIN_LEN {
                count += 1;
            }
            run = 0;
        }
    }
    count
}

/// Split a stored fill-blank answer into its per-blank segments.
pub fn split_blanks(text: &str) -> Vec<&str> {
    if text.is_empty() {
        return Vec::new();
    }
    text.split(BLANK_DELIMITER).collect()
}

/// Join per-blank segments into the stored fill-blank representation.
pub fn join_blanks<S: AsRef<str>>(blanks: &[S]) -> String {
    blanks
        .iter()
        .map(AsRef::as_ref)
        .collect::<Vec<_>>()
        .join(&BLANK_DELIMITER.to_string())
}

/// When and how much correction feedback a student sees.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CorrectionMode {
    Immediate,
    EndOfQuiz,
    Manual,
}

impl fmt::Display for CorrectionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CorrectionMode::Immediate => write!(f, "immediate"),
            CorrectionMode::EndOfQuiz => write!(f, "end_of_quiz"),
            CorrectionMode::Manual => write!(f, "manual"),
        }
    }
}

impl FromStr for CorrectionMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "immediate" => Ok(CorrectionMode::Immediate),
            "end_of_quiz" => Ok(CorrectionMode::EndOfQuiz),
            "manual" => Ok(CorrectionMode::Manual),
            other => Err(format!("unknown correction mode: {other}")),
        }
    }
}

/// A quiz definition, immutable for the lifetime of an attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuizConfig {
    pub id: String,
    #[serde(default)]
    pub title: String,
    /// Questions in presentation order.
    #[serde(default)]
    pub questions: Vec<Question>,
    #[serde(default)]
    pub time_limit_seconds: Option<u64>,
    /// Minimum percentage required to pass, 0 to 100.
    pub passing_score_percent: u32,
    pub max_attempts: u32,
    pub correction_mode: CorrectionMode,
}

impl QuizConfig {
    pub fn question(&self, question_id: &str) -> Option<&Question> {
        self.questions.iter().find(|q| q.id == question_id)
    }

    pub fn question_index(&self, question_id: &str) -> Option<usize> {
        self.questions.iter().position(|q| q.id == question_id)
    }

    /// Sum of question points. Validation guarantees this fits in a `u32`.
    pub fn max_possible_score(&self) -> u32 {
        self.questions
            .iter()
            .fold(0u32, |acc, q| acc.saturating_add(q.points))
    }

    /// Collect every validation problem with this quiz and its questions.
    pub fn validation_issues(&self) -> Vec<ConfigIssue> {
        let mut issues = Vec::new();

        if self.id.trim().is_empty() {
            issues.push(ConfigIssue::quiz("quiz id is empty"));
        }
        if self.passing_score_percent > 100 {
            issues.push(ConfigIssue::quiz(format!(
                "passing_score_percent must be within 0..=100, got {}",
                self.passing_score_percent
            )));
        }
        if self.max_attempts == 0 {
            issues.push(ConfigIssue::quiz("max_attempts must be at least 1"));
        }
        match self.time_limit_seconds {
            Some(0) => {
                issues.push(ConfigIssue::quiz("time_limit_seconds must be positive when set"));
            }
            Some(limit) if limit > MAX_TIME_LIMIT_SECONDS => {
                issues.push(ConfigIssue::quiz(format!(
                    "time_limit_seconds must be at most {MAX_TIME_LIMIT_SECONDS}, got {limit}"
                )));
            }
            _ => {}
        }
        let total_points = self
            .questions
            .iter()
            .try_fold(0u32, |acc, q| acc.checked_add(q.points));
        if total_points.is_none() {
            issues.push(ConfigIssue::quiz(format!(
                "total points across questions exceed {}",
                u32::MAX
            )));
        }

        let mut seen = HashSet::new();
        for question in &self.questions {
            if !seen.insert(question.id.as_str()) {
                issues.push(ConfigIssue::question(&question.id, "duplicate question id"));
            }
            issues.extend(question.validation_issues());
        }

        issues
    }

    /// Reject a malformed definition. Nothing is coerced.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        let issues = self.validation_issues();
        if issues.is_empty() {
            Ok(())
        } else {
            Err(ConfigurationError {
                quiz_id: self.id.clone(),
                issues,
            })
        }
    }
}

/// Lifecycle status of an attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptStatus {
    NotStarted,
    InProgress,
    Submitted,
    Corrected,
}

impl AttemptStatus {
    /// `submitted` or `corrected`.
    pub fn is_submitted(self) -> bool {
        matches!(self, AttemptStatus::Submitted | AttemptStatus::Corrected)
    }
}

impl fmt::Display for AttemptStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttemptStatus::NotStarted => write!(f, "not_started"),
            AttemptStatus::InProgress => write!(f, "in_progress"),
            AttemptStatus::Submitted => write!(f, "submitted"),
            AttemptStatus::Corrected => write!(f, "corrected"),
        }
    }
}

/// What caused the `in_progress -> submitted` transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmitTrigger {
    Student,
    Timeout,
}

/// One timed instance of a student taking a quiz.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attempt {
    pub id: Uuid,
    pub quiz_id: String,
    pub student_id: String,
    /// 1-based.
    pub attempt_number: u32,
    pub status: AttemptStatus,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub submitted_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub time_taken_seconds: Option<u64>,
    #[serde(default)]
    pub submit_trigger: Option<SubmitTrigger>,
}

impl Attempt {
    /// A fresh `not_started` attempt.
    pub fn new(quiz_id: impl Into<String>, student_id: impl Into<String>, attempt_number: u32) -> Self {
        Self {
            id: Uuid::new_v4(),
            quiz_id: quiz_id.into(),
            student_id: student_id.into(),
            attempt_number,
            status: AttemptStatus::NotStarted,
            started_at: None,
            submitted_at: None,
            time_taken_seconds: None,
            submit_trigger: None,
        }
    }
}

/// A student's raw response to one question.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnswerValue {
    /// Nothing given yet. A legal state, scored as zero.
    #[default]
    Unanswered,
    /// Choice types.
    SelectedOptionId(String),
    /// Fill-blank (blanks joined by [`BLANK_DELIMITER`]), short answer and essay.
    Text(String),
}

impl AnswerValue {
    pub fn option(id: impl Into<String>) -> Self {
        AnswerValue::SelectedOptionId(id.into())
    }

    pub fn text(text: impl Into<String>) -> Self {
        AnswerValue::Text(text.into())
    }

    /// Fill-blank answer from individual blanks.
    pub fn blanks<S: AsRef<str>>(blanks: &[S]) -> Self {
        AnswerValue::Text(join_blanks(blanks))
    }

    /// Whether this counts as answered for a question of `question_type`.
    ///
    /// Whitespace-only text does not. Fill-blank text is answered when any blank is.
    pub fn is_answered(&self, question_type: QuestionType) -> bool {
        match self {
            AnswerValue::Unanswered => false,
            AnswerValue::SelectedOptionId(_) => true,
            AnswerValue::Text(text) if question_type == QuestionType::FillBlank => !text
                .split(BLANK_DELIMITER)
                .all(|segment| segment.trim().is_empty()),
            AnswerValue::Text(text) => !text.trim().is_empty(),
        }
    }
}

/// An answer keyed by question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Answer {
    pub question_id: String,
    #[serde(default)]
    pub value: AnswerValue,
}

impl Answer {
    pub fn new(question_id: impl Into<String>, value: AnswerValue) -> Self {
        Self {
            question_id: question_id.into(),
            value,
        }
    }

    pub fn unanswered(question_id: impl Into<String>) -> Self {
        Self::new(question_id, AnswerValue::Unanswered)
    }
}

/// Check that an answer has the shape its question's type requires.
pub fn check_answer_structure(
    question: &Question,
    answer: &Answer,
) -> Result<(), StructuralAnswerError> {
    if answer.question_id != question.id {
        return Err(StructuralAnswerError::QuestionMismatch {
            question_id: question.id.clone(),
            answer_question_id: answer.question_id.clone(),
        });
    }

    match (&question.kind, &answer.value) {
        (_, AnswerValue::Unanswered) => Ok(()),
        (
            QuestionKind::SingleChoice { options } | QuestionKind::TrueFalse { options },
            AnswerValue::SelectedOptionId(option_id),
        ) => {
            if options.iter().any(|o| &o.id == option_id) {
                Ok(())
            } else {
                Err(StructuralAnswerError::UnknownOption {
                    question_id: question.id.clone(),
                    option_id: option_id.clone(),
                })
            }
        }
        (QuestionKind::SingleChoice { .. } | QuestionKind::TrueFalse { .. }, AnswerValue::Text(_)) => {
            Err(StructuralAnswerError::TextOnChoiceQuestion {
                question_id: question.id.clone(),
            })
        }
        (QuestionKind::FillBlank { expected_blanks }, AnswerValue::Text(text)) => {
            let submitted = split_blanks(text).len();
            if submitted > expected_blanks.len() {
                Err(StructuralAnswerError::TooManyBlanks {
                    question_id: question.id.clone(),
                    expected: expected_blanks.len(),
                    submitted,
                })
            } else {
                Ok(())
            }
        }
        (QuestionKind::ShortAnswer | QuestionKind::Essay, AnswerValue::Text(_)) => Ok(()),
        (
            QuestionKind::FillBlank { .. } | QuestionKind::ShortAnswer | QuestionKind::Essay,
            AnswerValue::SelectedOptionId(_),
        ) => Err(StructuralAnswerError::OptionOnTextQuestion {
            question_id: question.id.clone(),
        }),
    }
}

/// Predicate form of [`check_answer_structure`].
pub fn is_answer_structurally_valid(question: &Question, answer: &Answer) -> bool {
    check_answer_structure(question, answer).is_ok()
}
