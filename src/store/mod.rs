//! Collaborator interfaces: profile persistence, question corpus, attempt history.
//!
//! All calls are blocking and carry no retry policy; failures propagate to the
//! caller as [`StoreError`].

pub mod file;
pub mod memory;

use serde::{Deserialize, Serialize};

use crate::mastery::types::{AttemptRecord, KnowledgeProfile, QuestionRecord};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("invalid key: {0}")]
    InvalidKey(String),
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

pub trait ProfileStore: Send + Sync {
    /// `Ok(None)` for a student that has no profile yet.
    fn read(&self, student_id: &str) -> Result<Option<KnowledgeProfile>, StoreError>;
    fn write(&self, student_id: &str, profile: &KnowledgeProfile) -> Result<(), StoreError>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CorpusFilter {
    /// Case-insensitive substring match on the question's chapter.
    pub chapter: Option<String>,
    pub difficulty_min: f64,
    pub difficulty_max: f64,
}

pub trait QuestionCorpus: Send + Sync {
    /// Questions with `difficulty_min <= difficulty <= difficulty_max`, in corpus order.
    fn find(&self, filter: &CorpusFilter) -> Result<Vec<QuestionRecord>, StoreError>;
}

pub trait AttemptHistory: Send + Sync {
    /// Attempts of the student within the last `window_days`, most recent first.
    fn recent_attempts(&self, student_id: &str, window_days: u32) -> Result<Vec<AttemptRecord>, StoreError>;
    fn append(&self, student_id: &str, attempt: AttemptRecord) -> Result<(), StoreError>;
}
