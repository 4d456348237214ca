use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;

use crate::mastery::types::{AttemptRecord, KnowledgeProfile, QuestionRecord};
use crate::store::{AttemptHistory, CorpusFilter, ProfileStore, QuestionCorpus, StoreError};

#[derive(Debug, Default)]
pub struct MemoryProfileStore {
    profiles: RwLock<HashMap<String, KnowledgeProfile>>,
}

impl MemoryProfileStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.profiles.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.read().is_empty()
    }
}

impl ProfileStore for MemoryProfileStore {
    fn read(&self, student_id: &str) -> Result<Option<KnowledgeProfile>, StoreError> {
        Ok(self.profiles.read().get(student_id).cloned())
    }

    fn write(&self, student_id: &str, profile: &KnowledgeProfile) -> Result<(), StoreError> {
        self.profiles
            .write()
            .insert(student_id.to_string(), profile.clone());
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct MemoryCorpus {
    questions: RwLock<Vec<QuestionRecord>>,
}

impl MemoryCorpus {
    pub fn new(questions: Vec<QuestionRecord>) -> Self {
        Self {
            questions: RwLock::new(questions),
        }
    }

    pub fn insert(&self, question: QuestionRecord) {
        self.questions.write().push(question);
    }
}

impl QuestionCorpus for MemoryCorpus {
    fn find(&self, filter: &CorpusFilter) -> Result<Vec<QuestionRecord>, StoreError> {
        let chapter = filter
            .chapter
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .map(str::to_lowercase);

        Ok(self
            .questions
            .read()
            .iter()
            .filter(|q| q.difficulty >= filter.difficulty_min && q.difficulty <= filter.difficulty_max)
            .filter(|q| match &chapter {
                Some(wanted) => q
                    .chapter
                    .as_deref()
                    .map(|c| c.to_lowercase().contains(wanted.as_str()))
                    .unwrap_or(false),
                None => true,
            })
            .cloned()
            .collect())
    }
}

#[derive(Debug, Default)]
pub struct MemoryAttemptHistory {
    attempts: RwLock<HashMap<String, Vec<AttemptRecord>>>,
}

impl MemoryAttemptHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, student_id: &str, attempt: AttemptRecord) {
        self.attempts
            .write()
            .entry(student_id.to_string())
            .or_default()
            .push(attempt);
    }

    pub fn recent_attempts_at(
        &self,
        student_id: &str,
        window_days: u32,
        now: DateTime<Utc>,
    ) -> Vec<AttemptRecord> {
        // A window too large for the calendar means "everything".
        let cutoff = Duration::try_days(i64::from(window_days))
            .and_then(|window| now.checked_sub_signed(window))
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        let mut recent: Vec<AttemptRecord> = self
            .attempts
            .read()
            .get(student_id)
            .map(|all| {
                all.iter()
                    .filter(|a| a.timestamp >= cutoff)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        recent.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        recent
    }
}

impl AttemptHistory for MemoryAttemptHistory {
    fn recent_attempts(&self, student_id: &str, window_days: u32) -> Result<Vec<AttemptRecord>, StoreError> {
        Ok(self.recent_attempts_at(student_id, window_days, Utc::now()))
    }

    fn append(&self, student_id: &str, attempt: AttemptRecord) -> Result<(), StoreError> {
        self.record(student_id, attempt);
        Ok(())
    }
}
