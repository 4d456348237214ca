//! Read-only views over profiles and attempt history, used for dashboards and
//! to feed the selector with per-skill levels.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::mastery::tags::skill_names;
use crate::mastery::types::{AttemptRecord, SubjectProfile, TopicProfile};

const MIN_TREND_POINTS: usize = 4;
const TREND_SLOPE_THRESHOLD: f64 = 0.02;
const WEAK_SKILL_LEVEL: f64 = 60.0;
const STRONG_SKILL_LEVEL: f64 = 80.0;
const MAX_WEAK_SKILLS: usize = 5;
const MAX_STRONG_SKILLS: usize = 3;
const MAX_FOCUS_SKILLS: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Trend {
    Improving,
    Declining,
    Stable,
    NoData,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceMetrics {
    pub total_attempts: usize,
    pub avg_score: f64,
    pub success_rate: f64,
    pub trend: Trend,
}

impl PerformanceMetrics {
    pub fn empty() -> Self {
        Self {
            total_attempts: 0,
            avg_score: 0.0,
            success_rate: 0.0,
            trend: Trend::NoData,
        }
    }

    /// Records without a usable score are ignored.
    pub fn from_attempts(attempts: &[AttemptRecord], success_threshold: f64) -> Self {
        let mut scored: Vec<(DateTime<Utc>, f64)> = attempts
            .iter()
            .filter_map(|a| a.usable_score().map(|s| (a.timestamp, s)))
            .collect();
        if scored.is_empty() {
            return Self::empty();
        }
        scored.sort_by(|a, b| a.0.cmp(&b.0));

        let total = scored.len();
        let sum: f64 = scored.iter().map(|(_, s)| s).sum();
        let successes = scored.iter().filter(|(_, s)| *s >= success_threshold).count();
        let series: Vec<f64> = scored.iter().map(|(_, s)| *s).collect();

        Self {
            total_attempts: total,
            avg_score: round2(sum / total as f64),
            success_rate: round2(successes as f64 / total as f64),
            trend: trend_of(&series),
        }
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Least-squares slope of a chronological score series.
fn slope(series: &[f64]) -> f64 {
    if series.len() < 2 {
        return 0.0;
    }
    let n = series.len() as f64;
    let sum_x: f64 = (0..series.len()).map(|i| i as f64).sum();
    let sum_y: f64 = series.iter().sum();
    let sum_xy: f64 = series.iter().enumerate().map(|(i, y)| i as f64 * y).sum();
    let sum_xx: f64 = (0..series.len()).map(|i| (i as f64).powi(2)).sum();

    let denominator = n * sum_xx - sum_x.powi(2);
    if denominator.abs() < 1e-10 {
        return 0.0;
    }
    (n * sum_xy - sum_x * sum_y) / denominator
}

fn trend_of(series: &[f64]) -> Trend {
    if series.is_empty() {
        return Trend::NoData;
    }
    if series.len() < MIN_TREND_POINTS {
        return Trend::Stable;
    }
    let slope = slope(series);
    if slope > TREND_SLOPE_THRESHOLD {
        Trend::Improving
    } else if slope < -TREND_SLOPE_THRESHOLD {
        Trend::Declining
    } else {
        Trend::Stable
    }
}

/// Mean skill score over every topic of a subject; 0 without skills.
pub fn average_skill_level(subject: &SubjectProfile) -> f64 {
    let scores: Vec<f64> = subject
        .topics()
        .iter()
        .flat_map(|t| t.skills.values())
        .map(|s| f64::from(s.score))
        .collect();
    if scores.is_empty() {
        return 0.0;
    }
    scores.iter().sum::<f64>() / scores.len() as f64
}

/// Skill name -> level, the selector's view of a subject. A skill tracked under
/// several topics reports its mean.
pub fn skill_levels(subject: &SubjectProfile) -> HashMap<String, f64> {
    let mut acc: HashMap<String, (f64, usize)> = HashMap::new();
    for (name, record) in subject.topics().iter().flat_map(|t| t.skills.iter()) {
        let entry = acc.entry(name.clone()).or_insert((0.0, 0));
        entry.0 += f64::from(record.score);
        entry.1 += 1;
    }
    acc.into_iter()
        .map(|(name, (sum, count))| (name, sum / count as f64))
        .collect()
}

/// Per-skill mean of recent attempt scores on a 0-100 scale.
pub fn analyze_skill_patterns(attempts: &[AttemptRecord]) -> BTreeMap<String, f64> {
    let mut acc: BTreeMap<String, (f64, usize)> = BTreeMap::new();
    for attempt in attempts {
        let Some(score) = attempt.usable_score() else {
            continue;
        };
        let Some(names) = skill_names(&attempt.skills_tested) else {
            continue;
        };
        for name in names {
            let entry = acc.entry(name).or_insert((0.0, 0));
            entry.0 += score * 100.0;
            entry.1 += 1;
        }
    }
    acc.into_iter()
        .map(|(name, (sum, count))| (name, sum / count as f64))
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LearningPatterns {
    pub skill_analysis: BTreeMap<String, f64>,
    /// Weakest first.
    pub weak_skills: Vec<String>,
    /// Strongest first.
    pub strong_skills: Vec<String>,
    pub recommendations: Vec<String>,
    pub total_attempts: usize,
    pub avg_score: f64,
}

impl LearningPatterns {
    pub fn from_attempts(attempts: &[AttemptRecord]) -> Self {
        let usable: Vec<f64> = attempts.iter().filter_map(AttemptRecord::usable_score).collect();
        if usable.is_empty() {
            return Self {
                skill_analysis: BTreeMap::new(),
                weak_skills: Vec::new(),
                strong_skills: Vec::new(),
                recommendations: vec!["Start with fundamental topics to build confidence".to_string()],
                total_attempts: 0,
                avg_score: 0.0,
            };
        }

        let skill_analysis = analyze_skill_patterns(attempts);

        let mut weak: Vec<(&String, f64)> = skill_analysis
            .iter()
            .filter(|(_, score)| **score < WEAK_SKILL_LEVEL)
            .map(|(name, &score)| (name, score))
            .collect();
        weak.sort_by(|a, b| a.1.total_cmp(&b.1));

        let mut strong: Vec<(&String, f64)> = skill_analysis
            .iter()
            .filter(|(_, score)| **score >= STRONG_SKILL_LEVEL)
            .map(|(name, &score)| (name, score))
            .collect();
        strong.sort_by(|a, b| b.1.total_cmp(&a.1));

        let mut recommendations = Vec::new();
        if !weak.is_empty() {
            let focus: Vec<&str> = weak
                .iter()
                .take(MAX_FOCUS_SKILLS)
                .map(|(name, _)| name.as_str())
                .collect();
            recommendations.push(format!("Focus on improving: {}", focus.join(", ")));
        }

        let weak_skills = weak
            .iter()
            .take(MAX_WEAK_SKILLS)
            .map(|(name, _)| (*name).clone())
            .collect();
        let strong_skills = strong
            .iter()
            .take(MAX_STRONG_SKILLS)
            .map(|(name, _)| (*name).clone())
            .collect();

        Self {
            weak_skills,
            strong_skills,
            recommendations,
            total_attempts: usable.len(),
            avg_score: round2(usable.iter().sum::<f64>() / usable.len() as f64),
            skill_analysis,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileSummary {
    pub student_id: String,
    pub subject: String,
    pub topics: Vec<TopicProfile>,
    pub recent_performance: PerformanceMetrics,
    pub profile_last_updated: DateTime<Utc>,
    pub total_topics: usize,
    pub avg_skill_level: f64,
}
