//! Adaptive Question Selector
//!
//! Pipeline: difficulty window -> recency exclusion -> skill relevance ->
//! suitability score -> stable descending sort -> truncate.

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::mastery::matcher::SkillMatcher;
use crate::mastery::tags::skill_names;
use crate::mastery::types::QuestionRecord;
use crate::mastery::zpd::{MAX_DIFFICULTY, MIN_DIFFICULTY};
use crate::store::{AttemptHistory, CorpusFilter, QuestionCorpus, StoreError};

const DEFAULT_EXCLUDE_RECENT_DAYS: u32 = 7;
const DEFAULT_LIMIT: usize = 10;

/// Inclusive difficulty window on the 0.5-2.0 scale.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawRange")]
pub struct DifficultyRange {
    min: f64,
    max: f64,
}

#[derive(Deserialize)]
struct RawRange {
    min: f64,
    max: f64,
}

impl From<RawRange> for DifficultyRange {
    fn from(raw: RawRange) -> Self {
        DifficultyRange::new(raw.min, raw.max)
    }
}

impl Default for DifficultyRange {
    fn default() -> Self {
        Self {
            min: MIN_DIFFICULTY,
            max: MAX_DIFFICULTY,
        }
    }
}

impl DifficultyRange {
    /// Bounds are clamped to the scale and swapped when given in reverse order.
    /// A non-finite bound opens that side of the window.
    pub fn new(min: f64, max: f64) -> Self {
        let min = if min.is_finite() { min } else { MIN_DIFFICULTY };
        let max = if max.is_finite() { max } else { MAX_DIFFICULTY };
        let (lo, hi) = if min <= max { (min, max) } else { (max, min) };
        Self {
            min: lo.clamp(MIN_DIFFICULTY, MAX_DIFFICULTY),
            max: hi.clamp(MIN_DIFFICULTY, MAX_DIFFICULTY),
        }
    }

    pub fn min(&self) -> f64 {
        self.min
    }

    pub fn max(&self) -> f64 {
        self.max
    }

    pub fn contains(&self, difficulty: f64) -> bool {
        difficulty >= self.min && difficulty <= self.max
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SelectorConfig {
    pub base_score: f64,
    /// Skill levels strictly below this mark a weak skill.
    pub weak_threshold: f64,
    pub weak_bonus: f64,
    /// Skill levels strictly above this mark a mastered skill.
    pub mastered_threshold: f64,
    pub mastered_penalty: f64,
}

impl Default for SelectorConfig {
    fn default() -> Self {
        Self {
            base_score: 1.0,
            weak_threshold: 60.0,
            weak_bonus: 0.5,
            mastered_threshold: 85.0,
            mastered_penalty: 0.3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectionRequest {
    pub required_skills: Vec<String>,
    /// Skill name -> mastery 0-100. Names are matched exactly.
    pub student_skill_levels: HashMap<String, f64>,
    pub difficulty_range: DifficultyRange,
    pub exclude_recent_days: u32,
    pub limit: usize,
    #[serde(default)]
    pub chapter: Option<String>,
}

impl Default for SelectionRequest {
    fn default() -> Self {
        Self {
            required_skills: Vec::new(),
            student_skill_levels: HashMap::new(),
            difficulty_range: DifficultyRange::default(),
            exclude_recent_days: DEFAULT_EXCLUDE_RECENT_DAYS,
            limit: DEFAULT_LIMIT,
            chapter: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RankedQuestion {
    pub question: QuestionRecord,
    pub score: f64,
}

#[derive(Debug, Clone, Default)]
pub struct AdaptiveSelector {
    config: SelectorConfig,
}

impl AdaptiveSelector {
    pub fn new(config: SelectorConfig) -> Self {
        Self { config }
    }

    /// Suitability of a question for a student: weak skills raise it, mastered
    /// skills lower it, skills without a known level leave it alone.
    pub fn score_question(&self, question: &QuestionRecord, levels: &HashMap<String, f64>) -> f64 {
        let names = skill_names(&question.skills_tested).unwrap_or_default();
        names.iter().fold(self.config.base_score, |score, name| {
            match levels.get(name).filter(|l| l.is_finite()) {
                Some(&level) if level < self.config.weak_threshold => score + self.config.weak_bonus,
                Some(&level) if level > self.config.mastered_threshold => {
                    score - self.config.mastered_penalty
                }
                _ => score,
            }
        })
    }

    /// Ranks already-fetched candidates. Pure; `excluded` holds recently
    /// attempted question ids.
    pub fn rank(
        &self,
        candidates: Vec<QuestionRecord>,
        excluded: &HashSet<String>,
        request: &SelectionRequest,
    ) -> Vec<RankedQuestion> {
        if request.limit == 0 {
            return Vec::new();
        }
        let matcher = SkillMatcher::new(&request.required_skills);

        let mut ranked: Vec<RankedQuestion> = candidates
            .into_iter()
            .filter(|q| request.difficulty_range.contains(q.difficulty))
            .filter(|q| !excluded.contains(&q.id))
            .filter(|q| matcher.matches(q))
            .map(|question| {
                let score = self.score_question(&question, &request.student_skill_levels);
                RankedQuestion { question, score }
            })
            .collect();

        // Vec::sort_by is stable, so corpus order breaks ties.
        ranked.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
        ranked.truncate(request.limit);
        ranked
    }

    /// Queries the corpus and the attempt history, then ranks. An empty result is
    /// a valid outcome; only collaborator failures are errors.
    pub fn select_questions(
        &self,
        student_id: &str,
        request: &SelectionRequest,
        corpus: &dyn QuestionCorpus,
        history: &dyn AttemptHistory,
    ) -> Result<Vec<RankedQuestion>, StoreError> {
        let filter = CorpusFilter {
            chapter: request.chapter.clone(),
            difficulty_min: request.difficulty_range.min(),
            difficulty_max: request.difficulty_range.max(),
        };
        let candidates = corpus.find(&filter)?;

        let excluded: HashSet<String> = if request.exclude_recent_days > 0 {
            history
                .recent_attempts(student_id, request.exclude_recent_days)?
                .into_iter()
                .map(|a| a.question_id)
                .collect()
        } else {
            HashSet::new()
        };

        let candidate_count = candidates.len();
        let ranked = self.rank(candidates, &excluded, request);
        if ranked.is_empty() {
            tracing::info!(
                student_id,
                candidates = candidate_count,
                excluded = excluded.len(),
                "no questions matched selection"
            );
        } else {
            tracing::debug!(student_id, selected = ranked.len(), "questions selected");
        }
        Ok(ranked)
    }
}
