use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

pub const MIN_SCORE: u8 = 0;
pub const MAX_SCORE: u8 = 100;

/// Clamps any real-valued score into `[0, 100]`, truncating the fraction.
/// Non-finite input maps to 0.
pub fn clamp_score(value: f64) -> u8 {
    if !value.is_finite() {
        return MIN_SCORE;
    }
    value.clamp(MIN_SCORE as f64, MAX_SCORE as f64) as u8
}

fn deserialize_score<'de, D>(deserializer: D) -> Result<u8, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = f64::deserialize(deserializer)?;
    Ok(clamp_score(raw))
}

/// Mastery estimate for one skill.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SkillRecord {
    #[serde(deserialize_with = "deserialize_score")]
    pub score: u8,
    /// Append-only log of question ids, kept for analytics.
    #[serde(default)]
    pub questions_attempted: Vec<String>,
}

impl SkillRecord {
    pub fn new(score: u8) -> Self {
        Self {
            score: score.min(MAX_SCORE),
            questions_attempted: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TopicProfile {
    pub topic_name: String,
    #[serde(deserialize_with = "deserialize_score")]
    pub overall_proficiency: u8,
    #[serde(default)]
    pub skills: BTreeMap<String, SkillRecord>,
}

impl TopicProfile {
    pub fn new(topic_name: impl Into<String>) -> Self {
        Self {
            topic_name: topic_name.into(),
            overall_proficiency: 0,
            skills: BTreeMap::new(),
        }
    }

    /// Integer mean of the current skill scores. A topic without skills reports 0.
    pub fn mean_skill_score(&self) -> u8 {
        if self.skills.is_empty() {
            return 0;
        }
        let total: u32 = self.skills.values().map(|s| u32::from(s.score)).sum();
        (total / self.skills.len() as u32) as u8
    }

    pub fn recompute_proficiency(&mut self) {
        self.overall_proficiency = self.mean_skill_score();
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct SubjectProfileRepr {
    #[serde(default)]
    topics: Vec<TopicProfile>,
}

/// Topics of one subject in creation order, with a name index for direct lookup.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "SubjectProfileRepr", into = "SubjectProfileRepr")]
pub struct SubjectProfile {
    topics: Vec<TopicProfile>,
    index: HashMap<String, usize>,
}

impl From<SubjectProfileRepr> for SubjectProfile {
    fn from(repr: SubjectProfileRepr) -> Self {
        let mut subject = SubjectProfile::default();
        for topic in repr.topics {
            if subject.index.contains_key(&topic.topic_name) {
                tracing::warn!(topic = %topic.topic_name, "dropping duplicate topic in stored profile");
                continue;
            }
            subject.push(topic);
        }
        subject
    }
}

impl From<SubjectProfile> for SubjectProfileRepr {
    fn from(subject: SubjectProfile) -> Self {
        SubjectProfileRepr {
            topics: subject.topics,
        }
    }
}

impl SubjectProfile {
    pub fn topics(&self) -> &[TopicProfile] {
        &self.topics
    }

    pub fn len(&self) -> usize {
        self.topics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.topics.is_empty()
    }

    pub fn topic(&self, name: &str) -> Option<&TopicProfile> {
        self.index.get(name).map(|&i| &self.topics[i])
    }

    pub fn topic_mut(&mut self, name: &str) -> Option<&mut TopicProfile> {
        match self.index.get(name) {
            Some(&i) => Some(&mut self.topics[i]),
            None => None,
        }
    }

    /// Appends a topic. Returns `false` and leaves the subject untouched when the
    /// name is already present.
    pub fn insert_topic(&mut self, topic: TopicProfile) -> bool {
        if self.index.contains_key(&topic.topic_name) {
            return false;
        }
        self.push(topic);
        true
    }

    fn push(&mut self, topic: TopicProfile) {
        self.index.insert(topic.topic_name.clone(), self.topics.len());
        self.topics.push(topic);
    }

    /// Looks up a skill across all topics of the subject.
    pub fn skill(&self, skill_name: &str) -> Option<&SkillRecord> {
        self.topics.iter().find_map(|t| t.skills.get(skill_name))
    }
}

/// Per-student mastery document. This is the only durable artifact of the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KnowledgeProfile {
    pub last_updated: DateTime<Utc>,
    #[serde(default)]
    pub subjects: BTreeMap<String, SubjectProfile>,
}

impl KnowledgeProfile {
    pub fn blank(subject: &str) -> Self {
        Self::blank_at(subject, Utc::now())
    }

    pub fn blank_at(subject: &str, now: DateTime<Utc>) -> Self {
        let mut subjects = BTreeMap::new();
        subjects.insert(subject.to_string(), SubjectProfile::default());
        Self {
            last_updated: now,
            subjects,
        }
    }

    pub fn subject(&self, name: &str) -> Option<&SubjectProfile> {
        self.subjects.get(name)
    }

    pub fn subject_mut(&mut self, name: &str) -> &mut SubjectProfile {
        self.subjects.entry(name.to_string()).or_default()
    }
}

/// A question's declared contribution to one skill.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkillTag {
    pub topic: String,
    #[serde(alias = "skillName")]
    pub skill_name: String,
    /// Question-specific difficulty for this skill, 0.0-1.0.
    pub difficulty: f64,
    /// Relative contribution within the question; not normalized across tags.
    pub weight: f64,
}

impl SkillTag {
    pub fn new(topic: impl Into<String>, skill_name: impl Into<String>, difficulty: f64, weight: f64) -> Self {
        Self {
            topic: topic.into(),
            skill_name: skill_name.into(),
            difficulty,
            weight,
        }
    }
}

/// One graded attempt, the input of the mastery update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GradedAttempt {
    pub student_id: String,
    pub question_id: String,
    /// 0.0-1.0
    pub fractional_score: f64,
    #[serde(default)]
    pub skill_tags: Vec<SkillTag>,
}

/// Question as supplied by the corpus. `skills_tested` is kept raw: its shape is
/// not guaranteed and is interpreted by [`crate::mastery::tags`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionRecord {
    pub id: String,
    pub difficulty: f64,
    #[serde(default)]
    pub chapter: Option<String>,
    #[serde(default)]
    pub topic: Option<String>,
    #[serde(default)]
    pub skills_tested: Value,
    #[serde(default)]
    pub question_text: Option<String>,
}

impl QuestionRecord {
    pub fn new(id: impl Into<String>, difficulty: f64, skills_tested: Value) -> Self {
        Self {
            id: id.into(),
            difficulty,
            chapter: None,
            topic: None,
            skills_tested,
            question_text: None,
        }
    }

    pub fn with_chapter(mut self, chapter: impl Into<String>) -> Self {
        self.chapter = Some(chapter.into());
        self
    }
}

/// Entry of the attempt history. `fractional_score` is optional because history
/// rows written by older graders may lack it; such rows are skipped by consumers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttemptRecord {
    pub question_id: String,
    #[serde(default)]
    pub fractional_score: Option<f64>,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub skills_tested: Value,
}

impl AttemptRecord {
    pub fn new(question_id: impl Into<String>, fractional_score: f64, timestamp: DateTime<Utc>) -> Self {
        Self {
            question_id: question_id.into(),
            fractional_score: Some(fractional_score),
            timestamp,
            skills_tested: Value::Null,
        }
    }

    /// The score when present and usable.
    pub fn usable_score(&self) -> Option<f64> {
        self.fractional_score.filter(|s| s.is_finite())
    }
}
