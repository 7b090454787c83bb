//! JSON-file collaborator backed by a data directory.
//!
//! Layout under the data directory:
//!
//! ```text
//! quizzes/**/*.toml            quiz definitions, loaded at open
//! attempts/<id>/attempt.json   latest attempt record
//! attempts/<id>/draft.json     latest autosaved ledger
//! attempts/<id>/submission.json
//! attempts/<id>/correction.json
//! ```
//!
//! Every write goes to a temporary file first and is renamed into place, so a
//! reader never observes a half-written record.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use uuid::Uuid;

use lingoquiz_core::model::{Attempt, QuizConfig};
use lingoquiz_core::parser::load_quiz_directory;
use lingoquiz_core::scoring::AggregateResult;
use lingoquiz_core::traits::{
    AttemptRegistry, AttemptStore, AttemptSubmission, ClassResults, DraftSnapshot, QuizSource,
};
use lingoquiz_core::visibility::VisibleResult;

use crate::config::EngineConfig;
use crate::error::StoreError;

const ATTEMPT_FILE: &str = "attempt.json";
const DRAFT_FILE: &str = "draft.json";
const SUBMISSION_FILE: &str = "submission.json";
const CORRECTION_FILE: &str = "correction.json";

/// Result recomputed after a manual grade, stored next to the original submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrectionRecord {
    pub attempt: Attempt,
    pub result: AggregateResult,
    /// What the student may see once this correction applies.
    pub visible: VisibleResult,
}

pub struct JsonFileStore {
    root: PathBuf,
    quizzes: BTreeMap<String, QuizConfig>,
    /// Serializes attempt-number allocation.
    allocation: Mutex<()>,
}

impl JsonFileStore {
    /// Open a data directory, creating it if needed, and load its quiz catalogue.
    pub fn open(data_dir: impl Into<PathBuf>) -> Result<Self> {
        let root = data_dir.into();
        std::fs::create_dir_all(root.join("attempts"))
            .with_context(|| format!("failed to create data directory: {}", root.display()))?;

        let quizzes_dir = root.join("quizzes");
        let quizzes = if quizzes_dir.is_dir() {
            load_quiz_directory(&quizzes_dir)?
        } else {
            Vec::new()
        };
        tracing::info!(data_dir = %root.display(), quizzes = quizzes.len(), "file store opened");

        Ok(Self {
            root,
            quizzes: quizzes.into_iter().map(|q| (q.id.clone(), q)).collect(),
            allocation: Mutex::new(()),
        })
    }

    /// Open the data directory named by the engine configuration.
    pub fn from_config(config: &EngineConfig) -> Result<Self> {
        Self::open(config.data_dir.clone())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Ids of the loaded quizzes, sorted.
    pub fn quiz_ids(&self) -> Vec<&str> {
        self.quizzes.keys().map(String::as_str).collect()
    }

    fn attempts_dir(&self) -> PathBuf {
        self.root.join("attempts")
    }

    pub fn attempt_dir(&self, attempt_id: Uuid) -> PathBuf {
        self.attempts_dir().join(attempt_id.to_string())
    }

    pub async fn load_attempt(&self, attempt_id: Uuid) -> Result<Option<Attempt>> {
        read_json(&self.attempt_dir(attempt_id).join(ATTEMPT_FILE)).await
    }

    pub async fn load_draft(&self, attempt_id: Uuid) -> Result<Option<DraftSnapshot>> {
        read_json(&self.attempt_dir(attempt_id).join(DRAFT_FILE)).await
    }

    pub async fn load_submission(&self, attempt_id: Uuid) -> Result<Option<AttemptSubmission>> {
        let submission: Option<AttemptSubmission> =
            read_json(&self.attempt_dir(attempt_id).join(SUBMISSION_FILE)).await?;
        if let Some(s) = &submission {
            if s.attempt.id != attempt_id {
                return Err(StoreError::Corrupt {
                    attempt_id,
                    reason: format!("submission names attempt {}", s.attempt.id),
                }
                .into());
            }
        }
        Ok(submission)
    }

    pub async fn load_correction(&self, attempt_id: Uuid) -> Result<Option<CorrectionRecord>> {
        read_json(&self.attempt_dir(attempt_id).join(CORRECTION_FILE)).await
    }

    /// Ids of every attempt directory, sorted.
    async fn attempt_ids(&self) -> Result<Vec<Uuid>> {
        let dir = self.attempts_dir();
        let mut entries = tokio::fs::read_dir(&dir)
            .await
            .with_context(|| format!("failed to read directory: {}", dir.display()))?;

        let mut ids = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            match name.to_str().map(Uuid::parse_str) {
                Some(Ok(id)) => ids.push(id),
                _ => tracing::warn!("skipping unexpected entry {}", entry.path().display()),
            }
        }
        ids.sort();
        Ok(ids)
    }
}

async fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    let content = match tokio::fs::read_to_string(path).await {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => {
            return Err(e).with_context(|| format!("failed to read {}", path.display()));
        }
    };
    let value = serde_json::from_str(&content)
        .with_context(|| format!("failed to parse {}", path.display()))?;
    Ok(Some(value))
}

async fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    let tmp = path.with_extension("json.tmp");
    tokio::fs::write(&tmp, json)
        .await
        .with_context(|| format!("failed to write {}", tmp.display()))?;
    tokio::fs::rename(&tmp, path)
        .await
        .with_context(|| format!("failed to move {} into place", path.display()))?;
    Ok(())
}

#[async_trait]
impl QuizSource for JsonFileStore {
    async fn quiz_configuration(&self, quiz_id: &str) -> Result<QuizConfig> {
        self.quizzes
            .get(quiz_id)
            .cloned()
            .ok_or_else(|| StoreError::QuizNotFound(quiz_id.to_string()).into())
    }
}

#[async_trait]
impl AttemptRegistry for JsonFileStore {
    async fn start_attempt(&self, quiz_id: &str, student_id: &str) -> Result<Attempt> {
        if !self.quizzes.contains_key(quiz_id) {
            return Err(StoreError::QuizNotFound(quiz_id.to_string()).into());
        }

        let _guard = self.allocation.lock().await;
        let mut previous = 0;
        for id in self.attempt_ids().await? {
            if let Some(attempt) = self.load_attempt(id).await? {
                if attempt.quiz_id == quiz_id && attempt.student_id == student_id {
                    previous = previous.max(attempt.attempt_number);
                }
            }
        }

        let attempt = Attempt::new(quiz_id, student_id, previous + 1);
        write_json(&self.attempt_dir(attempt.id).join(ATTEMPT_FILE), &attempt).await?;
        tracing::debug!(attempt_id = %attempt.id, quiz_id, student_id, attempt_number = attempt.attempt_number, "attempt allocated");
        Ok(attempt)
    }
}

#[async_trait]
impl AttemptStore for JsonFileStore {
    async fn persist_draft(&self, draft: &DraftSnapshot) -> Result<()> {
        write_json(&self.attempt_dir(draft.attempt_id).join(DRAFT_FILE), draft).await
    }

    async fn submit_attempt(&self, submission: &AttemptSubmission) -> Result<()> {
        let dir = self.attempt_dir(submission.attempt.id);
        write_json(&dir.join(SUBMISSION_FILE), submission).await?;
        write_json(&dir.join(ATTEMPT_FILE), &submission.attempt).await
    }

    async fn record_correction(
        &self,
        attempt: &Attempt,
        result: &AggregateResult,
        visible: &VisibleResult,
    ) -> Result<()> {
        let dir = self.attempt_dir(attempt.id);
        if !tokio::fs::try_exists(dir.join(SUBMISSION_FILE)).await? {
            return Err(StoreError::AttemptNotFound(attempt.id).into());
        }
        let record = CorrectionRecord {
            attempt: attempt.clone(),
            result: result.clone(),
            visible: visible.clone(),
        };
        write_json(&dir.join(CORRECTION_FILE), &record).await?;
        write_json(&dir.join(ATTEMPT_FILE), attempt).await
    }
}

#[async_trait]
impl ClassResults for JsonFileStore {
    /// Latest result of every submitted attempt for the quiz; corrections supersede submissions.
    async fn class_results(&self, quiz_id: &str) -> Result<Vec<AggregateResult>> {
        let mut results = Vec::new();
        for id in self.attempt_ids().await? {
            let Some(submission) = self.load_submission(id).await? else {
                continue;
            };
            if submission.attempt.quiz_id != quiz_id {
                continue;
            }
            let result = match self.load_correction(id).await? {
                Some(correction) => correction.result,
                None => submission.result,
            };
            results.push(result);
        }
        Ok(results)
    }
}
