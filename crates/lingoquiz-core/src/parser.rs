//! TOML quiz parser.
//!
//! Loads quiz configurations from TOML files and directories. Every parsed
//! quiz is validated; a malformed definition is an error, never coerced.

use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::error::{ConfigIssue, ConfigurationError};
use crate::model::{
    AnswerOption, CorrectionMode, Difficulty, Question, QuestionKind, QuestionType, QuizConfig,
};

/// Intermediate TOML structure for parsing quiz files.
#[derive(Debug, Deserialize)]
struct TomlQuizFile {
    quiz: TomlQuizHeader,
    #[serde(default)]
    questions: Vec<TomlQuestion>,
}

#[derive(Debug, Deserialize)]
struct TomlQuizHeader {
    id: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    time_limit_seconds: Option<u64>,
    #[serde(default = "default_passing_score")]
    passing_score_percent: u32,
    #[serde(default = "default_max_attempts")]
    max_attempts: u32,
    #[serde(default = "default_correction_mode")]
    correction_mode: String,
}

fn default_passing_score() -> u32 {
    60
}

fn default_max_attempts() -> u32 {
    1
}

fn default_correction_mode() -> String {
    "end_of_quiz".to_string()
}

#[derive(Debug, Deserialize)]
struct TomlQuestion {
    id: String,
    #[serde(rename = "type")]
    question_type: String,
    #[serde(default)]
    text: String,
    points: u32,
    #[serde(default)]
    options: Vec<TomlOption>,
    #[serde(default)]
    expected_blanks: Vec<String>,
    #[serde(default)]
    explanation: Option<String>,
    #[serde(default)]
    difficulty: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TomlOption {
    id: String,
    text: String,
    #[serde(default)]
    is_correct: bool,
}

/// Parse and validate a single TOML quiz file.
pub fn parse_quiz(path: &Path) -> Result<QuizConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read quiz file: {}", path.display()))?;

    parse_quiz_str(&content, path)
}

/// Parse and validate a TOML string (useful for testing).
pub fn parse_quiz_str(content: &str, source_path: &Path) -> Result<QuizConfig> {
    let parsed: TomlQuizFile = toml::from_str(content)
        .with_context(|| format!("failed to parse TOML: {}", source_path.display()))?;

    let correction_mode: CorrectionMode = parsed
        .quiz
        .correction_mode
        .parse()
        .map_err(|e: String| anyhow::anyhow!("{}", e))?;

    let mut stray_fields = Vec::new();
    let questions = parsed
        .questions
        .into_iter()
        .map(|q| {
            let question_type: QuestionType = q
                .question_type
                .parse()
                .map_err(|e: String| anyhow::anyhow!("question {}: {}", q.id, e))?;
            let difficulty: Option<Difficulty> = q
                .difficulty
                .map(|d| d.parse().map_err(|e: String| anyhow::anyhow!("question {}: {}", q.id, e)))
                .transpose()?;

            if !q.options.is_empty() && !question_type.is_choice() {
                stray_fields.push(ConfigIssue::question(
                    &q.id,
                    format!("{question_type} question does not take options"),
                ));
            }
            if !q.expected_blanks.is_empty() && question_type != QuestionType::FillBlank {
                stray_fields.push(ConfigIssue::question(
                    &q.id,
                    format!("{question_type} question does not take expected_blanks"),
                ));
            }

            let options: Vec<AnswerOption> = q
                .options
                .into_iter()
                .map(|o| AnswerOption {
                    id: o.id,
                    text: o.text,
                    is_correct: o.is_correct,
                })
                .collect();

            let kind = match question_type {
                QuestionType::SingleChoice => QuestionKind::SingleChoice { options },
                QuestionType::TrueFalse => QuestionKind::TrueFalse { options },
                QuestionType::FillBlank => QuestionKind::FillBlank {
                    expected_blanks: q.expected_blanks,
                },
                QuestionType::ShortAnswer => QuestionKind::ShortAnswer,
                QuestionType::Essay => QuestionKind::Essay,
            };

            Ok(Question {
                id: q.id,
                text: q.text,
                points: q.points,
                kind,
                explanation: q.explanation,
                difficulty,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    let quiz = QuizConfig {
        id: parsed.quiz.id,
        title: parsed.quiz.title,
        questions,
        time_limit_seconds: parsed.quiz.time_limit_seconds,
        passing_score_percent: parsed.quiz.passing_score_percent,
        max_attempts: parsed.quiz.max_attempts,
        correction_mode,
    };

    let mut issues = stray_fields;
    issues.extend(quiz.validation_issues());
    if !issues.is_empty() {
        return Err(ConfigurationError {
            quiz_id: quiz.id,
            issues,
        })
        .with_context(|| format!("invalid quiz: {}", source_path.display()));
    }
    Ok(quiz)
}

/// Recursively load all `.toml` quiz files from a directory.
///
/// Files that fail to parse or validate are skipped with a warning.
pub fn load_quiz_directory(dir: &Path) -> Result<Vec<QuizConfig>> {
    let mut quizzes = Vec::new();

    if !dir.is_dir() {
        anyhow::bail!("not a directory: {}", dir.display());
    }

    for entry in std::fs::read_dir(dir)
        .with_context(|| format!("failed to read directory: {}", dir.display()))?
    {
        let entry = entry?;
        let path = entry.path();

        if path.is_dir() {
            quizzes.extend(load_quiz_directory(&path)?);
        } else if path.extension().is_some_and(|ext| ext == "toml") {
            match parse_quiz(&path) {
                Ok(quiz) => quizzes.push(quiz),
                Err(e) => {
                    tracing::warn!("skipping {}: {:#}", path.display(), e);
                }
            }
        }
    }

    quizzes.sort_by(|a, b| a.id.cmp(&b.id));
    Ok(quizzes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    const VALID_TOML: &str = r#"
[quiz]
id = "spanish-a1-unit3"
title = "Spanish A1 - Unit 3"
time_limit_seconds = 600
passing_score_percent = 70
max_attempts = 3
correction_mode = "immediate"

[[questions]]
id = "greeting"
type = "single_choice"
text = "How do you say 'good morning'?"
points = 2
difficulty = "easy"
explanation = "Buenos días is used until midday."
options = [
    { id = "a", text = "Buenas noches" },
    { id = "b", text = "Buenos días", is_correct = true },
    { id = "c", text = "Hasta luego" },
]

[[questions]]
id = "ser"
type = "true_false"
text = "'Soy' is the first person of 'ser'."
points = 1
options = [
    { id = "true", text = "True", is_correct = true },
    { id = "false", text = "False" },
]

[[questions]]
id = "capital"
type = "fill_blank"
text = "___ es la capital de ___."
points = 4
difficulty = "medium"
expected_blanks = ["Madrid", "España"]

[[questions]]
id = "weekend"
type = "essay"
text = "Describe tu fin de semana."
points = 10
"#;

    #[test]
    fn parse_valid_toml() {
        let quiz = parse_quiz_str(VALID_TOML, &PathBuf::from("unit3.toml")).unwrap();
        assert_eq!(quiz.id, "spanish-a1-unit3");
        assert_eq!(quiz.time_limit_seconds, Some(600));
        assert_eq!(quiz.correction_mode, CorrectionMode::Immediate);
        assert_eq!(quiz.questions.len(), 4);
        assert_eq!(quiz.questions[0].correct_option().unwrap().id, "b");
        assert_eq!(quiz.questions[0].difficulty, Some(Difficulty::Easy));
        assert_eq!(quiz.questions[2].question_type(), QuestionType::FillBlank);
        assert_eq!(quiz.questions[3].kind, QuestionKind::Essay);
        assert_eq!(quiz.max_possible_score(), 17);
    }

    #[test]
    fn parse_missing_optional_fields() {
        let toml = r#"
[quiz]
id = "minimal"

[[questions]]
id = "q1"
type = "short_answer"
points = 3
"#;
        let quiz = parse_quiz_str(toml, &PathBuf::from("minimal.toml")).unwrap();
        assert_eq!(quiz.passing_score_percent, 60);
        assert_eq!(quiz.max_attempts, 1);
        assert_eq!(quiz.correction_mode, CorrectionMode::EndOfQuiz);
        assert!(quiz.time_limit_seconds.is_none());
    }

    #[test]
    fn invalid_quiz_is_a_configuration_error() {
        let toml = r#"
[quiz]
id = "broken"

[[questions]]
id = "q1"
type = "single_choice"
points = 1
options = [
    { id = "a", text = "A", is_correct = true },
    { id = "b", text = "B", is_correct = true },
]
"#;
        let err = parse_quiz_str(toml, &PathBuf::from("broken.toml")).unwrap_err();
        let config = err.downcast_ref::<ConfigurationError>().unwrap();
        assert_eq!(config.quiz_id, "broken");
        assert!(config.issues[0].message.contains("exactly one option"));
    }

    #[test]
    fn fields_of_another_question_type_are_rejected() {
        let toml = r#"
[quiz]
id = "stray"

[[questions]]
id = "blank"
type = "fill_blank"
text = "Ich ___ müde."
points = 1
expected_blanks = ["bin"]
options = [{ id = "a", text = "A", is_correct = true }]

[[questions]]
id = "choice"
type = "single_choice"
points = 1
expected_blanks = ["bin"]
options = [
    { id = "a", text = "A", is_correct = true },
    { id = "b", text = "B" },
]

[[questions]]
id = "essay"
type = "essay"
points = 5
options = [{ id = "a", text = "A" }]
"#;
        let err = parse_quiz_str(toml, &PathBuf::from("stray.toml")).unwrap_err();
        let config = err.downcast_ref::<ConfigurationError>().unwrap();
        let flagged: Vec<_> = config
            .issues
            .iter()
            .map(|i| (i.question_id.as_deref().unwrap(), i.message.as_str()))
            .collect();
        assert_eq!(
            flagged,
            vec![
                ("blank", "fill_blank question does not take options"),
                ("choice", "single_choice question does not take expected_blanks"),
                ("essay", "essay question does not take options"),
            ]
        );
    }

    #[test]
    fn unknown_question_type_is_rejected() {
        let toml = r#"
[quiz]
id = "x"

[[questions]]
id = "q1"
type = "matching"
points = 1
"#;
        let err = parse_quiz_str(toml, &PathBuf::from("x.toml")).unwrap_err();
        assert!(err.to_string().contains("unknown question type"));
    }

    #[test]
    fn parse_malformed_toml() {
        let bad = "this is not [valid toml }{";
        assert!(parse_quiz_str(bad, &PathBuf::from("bad.toml")).is_err());
    }

    #[test]
    fn load_directory_skips_invalid_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("unit3.toml"), VALID_TOML).unwrap();
        std::fs::write(dir.path().join("broken.toml"), "[quiz]\nid = \"b\"\nmax_attempts = 0\n").unwrap();
        std::fs::create_dir(dir.path().join("nested")).unwrap();
        std::fs::write(
            dir.path().join("nested").join("mini.toml"),
            "[quiz]\nid = \"mini\"\n",
        )
        .unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let quizzes = load_quiz_directory(dir.path()).unwrap();
        let ids: Vec<&str> = quizzes.iter().map(|q| q.id.as_str()).collect();
        assert_eq!(ids, vec!["mini", "spanish-a1-unit3"]);
    }
}
