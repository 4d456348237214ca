//! Practice orchestration: wires the mastery core to its collaborators.
//!
//! Updates for one student are serialized through a per-student lock so that the
//! read-modify-write of the profile never loses an attempt. Different students
//! proceed in parallel. A lock lives in the map only while some caller holds or
//! waits on it.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::EngineConfig;
use crate::mastery::analytics::{
    average_skill_level, skill_levels, LearningPatterns, PerformanceMetrics, ProfileSummary,
};
use crate::mastery::grade::{parse_grade, GradeError};
use crate::mastery::selector::{AdaptiveSelector, DifficultyRange, RankedQuestion, SelectionRequest};
use crate::mastery::tags::{extract_skill_tags, skill_names, TagExtraction};
use crate::mastery::types::{AttemptRecord, GradedAttempt, KnowledgeProfile};
use crate::mastery::updater::{MasteryUpdater, UpdateOutcome};
use crate::mastery::zpd::{ZpdCalculator, ZpdRecommendation};
use crate::store::{AttemptHistory, ProfileStore, QuestionCorpus, StoreError};

const UNKNOWN_SKILL_LEVEL: f64 = 50.0;
const DEFAULT_HISTORY_DAYS: u32 = 30;
const DEFAULT_EXCLUDE_RECENT_DAYS: u32 = 7;
const DEFAULT_LIMIT: usize = 10;

#[derive(Debug, thiserror::Error)]
pub enum PracticeError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("invalid grade: {0}")]
    Grade(#[from] GradeError),
}

impl PracticeError {
    /// True when the failure is confined to the attempt at hand (bad grade, a
    /// student id the store rejects, a corrupt stored profile) and later
    /// attempts can still be processed. I/O failures and unavailable
    /// collaborators are not.
    pub fn is_per_attempt(&self) -> bool {
        match self {
            PracticeError::Grade(_) => true,
            PracticeError::Store(StoreError::InvalidKey(_) | StoreError::Serialization(_)) => true,
            PracticeError::Store(StoreError::Io(_) | StoreError::Unavailable(_)) => false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RecordedAttempt {
    pub profile: KnowledgeProfile,
    pub outcome: UpdateOutcome,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PracticeRequest {
    /// Empty means "any skill".
    pub target_skills: Vec<String>,
    pub chapter: Option<String>,
    pub limit: usize,
    /// History window feeding the ZPD success rate.
    pub history_days: u32,
    pub exclude_recent_days: u32,
}

impl Default for PracticeRequest {
    fn default() -> Self {
        Self {
            target_skills: Vec::new(),
            chapter: None,
            limit: DEFAULT_LIMIT,
            history_days: DEFAULT_HISTORY_DAYS,
            exclude_recent_days: DEFAULT_EXCLUDE_RECENT_DAYS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Recommendation {
    pub target: ZpdRecommendation,
    pub difficulty_range: DifficultyRange,
    pub questions: Vec<RankedQuestion>,
    /// Nothing in the corpus fits; the caller should generate questions instead.
    pub needs_generation: bool,
}

pub struct PracticeService {
    profiles: Arc<dyn ProfileStore>,
    corpus: Arc<dyn QuestionCorpus>,
    history: Arc<dyn AttemptHistory>,
    config: EngineConfig,
    updater: MasteryUpdater,
    zpd: ZpdCalculator,
    selector: AdaptiveSelector,
    student_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl PracticeService {
    pub fn new(
        profiles: Arc<dyn ProfileStore>,
        corpus: Arc<dyn QuestionCorpus>,
        history: Arc<dyn AttemptHistory>,
        config: EngineConfig,
    ) -> Self {
        Self {
            updater: MasteryUpdater::new(config.subject.clone(), config.updater.clone()),
            zpd: ZpdCalculator::new(config.zpd.clone()),
            selector: AdaptiveSelector::new(config.selector.clone()),
            profiles,
            corpus,
            history,
            config,
            student_locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    fn student_lock(&self, student_id: &str) -> Arc<Mutex<()>> {
        self.student_locks
            .lock()
            .entry(student_id.to_string())
            .or_default()
            .clone()
    }

    fn release_student_lock(&self, student_id: &str, lock: Arc<Mutex<()>>) {
        let mut locks = self.student_locks.lock();
        // one reference in the map, one here: nobody else holds or waits on it
        if Arc::strong_count(&lock) == 2 {
            locks.remove(student_id);
        }
    }

    /// The stored profile, or a blank one for a student seen for the first time.
    pub fn load_profile(&self, student_id: &str) -> Result<KnowledgeProfile, PracticeError> {
        Ok(self
            .profiles
            .read(student_id)?
            .unwrap_or_else(|| KnowledgeProfile::blank(&self.config.subject)))
    }

    pub fn record_attempt(&self, attempt: &GradedAttempt) -> Result<RecordedAttempt, PracticeError> {
        self.record_attempt_at(attempt, Utc::now())
    }

    /// Applies the attempt to the stored profile, then appends it to the attempt
    /// history so later target and recency calculations see it. Attempts that
    /// leave the profile unchanged are still logged to the history.
    pub fn record_attempt_at(
        &self,
        attempt: &GradedAttempt,
        at: DateTime<Utc>,
    ) -> Result<RecordedAttempt, PracticeError> {
        let lock = self.student_lock(&attempt.student_id);
        let result = {
            let _guard = lock.lock();
            self.apply_and_persist(attempt, at)
        };
        self.release_student_lock(&attempt.student_id, lock);
        result
    }

    fn apply_and_persist(
        &self,
        attempt: &GradedAttempt,
        at: DateTime<Utc>,
    ) -> Result<RecordedAttempt, PracticeError> {
        let mut profile = self.load_profile(&attempt.student_id)?;
        let outcome = self.updater.apply(&mut profile, attempt, at);
        if !outcome.is_noop() {
            self.profiles.write(&attempt.student_id, &profile)?;
            tracing::info!(
                student_id = %attempt.student_id,
                question_id = %attempt.question_id,
                skills = outcome.changes.len(),
                created_topics = outcome.created_topics.len(),
                "attempt recorded"
            );
        }

        self.history
            .append(&attempt.student_id, history_record(attempt, at))?;
        Ok(RecordedAttempt { profile, outcome })
    }

    /// Parses raw grader output (`"7/10"`) and records it against the question's
    /// raw tag document.
    pub fn record_graded(
        &self,
        student_id: &str,
        question_id: &str,
        grade: &str,
        skills_tested: &Value,
    ) -> Result<RecordedAttempt, PracticeError> {
        let fractional_score = parse_grade(grade)?;
        self.record_scored_at(student_id, question_id, fractional_score, skills_tested, Utc::now())
    }

    pub fn record_scored_at(
        &self,
        student_id: &str,
        question_id: &str,
        fractional_score: f64,
        skills_tested: &Value,
        at: DateTime<Utc>,
    ) -> Result<RecordedAttempt, PracticeError> {
        let extraction = extract_skill_tags(skills_tested);
        match &extraction {
            TagExtraction::Unreadable(reason) => {
                tracing::warn!(student_id, question_id, %reason, "unreadable skill tags");
            }
            TagExtraction::Tagged { skipped, .. } if *skipped > 0 => {
                tracing::warn!(student_id, question_id, skipped, "skill tag entries dropped");
            }
            _ => {}
        }

        let attempt = GradedAttempt {
            student_id: student_id.to_string(),
            question_id: question_id.to_string(),
            fractional_score,
            skill_tags: extraction.into_tags(),
        };
        self.record_attempt_at(&attempt, at)
    }

    /// ZPD target for one skill. Only attempts tagged with that skill feed the
    /// success rate; an untracked skill starts at a mid level.
    pub fn target_difficulty(
        &self,
        student_id: &str,
        skill_name: &str,
        history_days: u32,
    ) -> Result<ZpdRecommendation, PracticeError> {
        let profile = self.load_profile(student_id)?;
        let level = profile
            .subject(&self.config.subject)
            .and_then(|subject| skill_levels(subject).get(skill_name).copied())
            .unwrap_or(UNKNOWN_SKILL_LEVEL);

        let attempts: Vec<AttemptRecord> = self
            .history
            .recent_attempts(student_id, history_days)?
            .into_iter()
            .filter(|a| tests_any_skill(a, &[skill_name.to_string()]))
            .take(self.config.zpd.window_size)
            .collect();

        Ok(self.zpd.compute_target_difficulty(level, &attempts))
    }

    /// ZPD target -> difficulty band -> adaptive selection.
    pub fn recommend_questions(
        &self,
        student_id: &str,
        request: &PracticeRequest,
    ) -> Result<Recommendation, PracticeError> {
        let profile = self.load_profile(student_id)?;
        let levels = profile
            .subject(&self.config.subject)
            .map(skill_levels)
            .unwrap_or_default();

        let level = current_level(&levels, &request.target_skills, &profile, &self.config.subject);

        let attempts: Vec<AttemptRecord> = self
            .history
            .recent_attempts(student_id, request.history_days)?
            .into_iter()
            .filter(|a| request.target_skills.is_empty() || tests_any_skill(a, &request.target_skills))
            .take(self.config.zpd.window_size)
            .collect();

        let target = self.zpd.compute_target_difficulty(level, &attempts);
        let difficulty_range = target.difficulty_range(self.config.zpd.band_half_width);

        let selection = SelectionRequest {
            required_skills: request.target_skills.clone(),
            student_skill_levels: levels,
            difficulty_range,
            exclude_recent_days: request.exclude_recent_days,
            limit: request.limit,
            chapter: request.chapter.clone(),
        };
        let questions = self.selector.select_questions(
            student_id,
            &selection,
            self.corpus.as_ref(),
            self.history.as_ref(),
        )?;

        let needs_generation = questions.is_empty() && request.limit > 0;
        if needs_generation {
            tracing::info!(
                student_id,
                optimal_difficulty = target.optimal_difficulty,
                "no stored question fits, generation needed"
            );
        }

        Ok(Recommendation {
            target,
            difficulty_range,
            questions,
            needs_generation,
        })
    }

    pub fn student_summary(&self, student_id: &str, history_days: u32) -> Result<ProfileSummary, PracticeError> {
        let profile = self.load_profile(student_id)?;
        let attempts = self.history.recent_attempts(student_id, history_days)?;
        let subject = profile.subject(&self.config.subject).cloned().unwrap_or_default();

        Ok(ProfileSummary {
            student_id: student_id.to_string(),
            subject: self.config.subject.clone(),
            total_topics: subject.len(),
            avg_skill_level: average_skill_level(&subject),
            topics: subject.topics().to_vec(),
            recent_performance: PerformanceMetrics::from_attempts(
                &attempts,
                self.config.zpd.success_threshold,
            ),
            profile_last_updated: profile.last_updated,
        })
    }

    pub fn learning_patterns(&self, student_id: &str, history_days: u32) -> Result<LearningPatterns, PracticeError> {
        let attempts = self.history.recent_attempts(student_id, history_days)?;
        Ok(LearningPatterns::from_attempts(&attempts))
    }
}

fn history_record(attempt: &GradedAttempt, at: DateTime<Utc>) -> AttemptRecord {
    let skills_tested = serde_json::to_value(&attempt.skill_tags)
        .map(|tags| serde_json::json!({ "skills": tags }))
        .unwrap_or(Value::Null);
    AttemptRecord {
        question_id: attempt.question_id.clone(),
        fractional_score: Some(attempt.fractional_score).filter(|s| s.is_finite()),
        timestamp: at,
        skills_tested,
    }
}

fn tests_any_skill(attempt: &AttemptRecord, skills: &[String]) -> bool {
    skill_names(&attempt.skills_tested)
        .map(|names| {
            names
                .iter()
                .any(|n| skills.iter().any(|s| s.eq_ignore_ascii_case(n)))
        })
        .unwrap_or(false)
}

/// Mean level of the targeted skills the profile knows; falls back to the subject
/// average, then to a mid level for an empty profile.
fn current_level(
    levels: &HashMap<String, f64>,
    target_skills: &[String],
    profile: &KnowledgeProfile,
    subject: &str,
) -> f64 {
    let known: Vec<f64> = target_skills
        .iter()
        .filter_map(|s| levels.get(s).copied())
        .collect();
    if !known.is_empty() {
        return known.iter().sum::<f64>() / known.len() as f64;
    }
    if levels.is_empty() {
        return UNKNOWN_SKILL_LEVEL;
    }
    profile
        .subject(subject)
        .map(average_skill_level)
        .unwrap_or(UNKNOWN_SKILL_LEVEL)
}
