//! Mastery Updater
//!
//! Applies one graded attempt to a knowledge profile. Each skill tag is scored
//! independently against its own difficulty:
//!
//! 1. expected performance `E` from the ability gap `score/100 - difficulty`
//! 2. performance gap `actual*100 - E`
//! 3. difficulty multiplier (harder successes reward more, easy failures cost more)
//! 4. `score += learning_rate * weight * gap * multiplier`, clamped to `[0, 100]`
//!
//! Topic proficiencies are recomputed once all tags are applied.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::DEFAULT_SUBJECT;
use crate::mastery::types::{
    clamp_score, GradedAttempt, KnowledgeProfile, SkillRecord, SkillTag, TopicProfile,
};

const DEFAULT_LEARNING_RATE: f64 = 0.2;
const DEFAULT_SUCCESS_THRESHOLD: f64 = 0.7;
const DEFAULT_NEW_SKILL_SCORE: u8 = 50;
const DEFAULT_BOOTSTRAP_MIN: u8 = 10;
const DEFAULT_BOOTSTRAP_MAX: u8 = 60;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct UpdaterConfig {
    pub learning_rate: f64,
    /// Fractional score at or above which an attempt counts as a success.
    pub success_threshold: f64,
    /// Starting score of a skill first seen under an existing topic.
    pub new_skill_score: u8,
    /// Bounds of the starting score of a skill created with a brand-new topic.
    pub bootstrap_min: u8,
    pub bootstrap_max: u8,
    /// Tag topic name -> canonical topic name.
    pub topic_aliases: BTreeMap<String, String>,
}

impl Default for UpdaterConfig {
    fn default() -> Self {
        let mut topic_aliases = BTreeMap::new();
        topic_aliases.insert(
            "Pair of Linear Equations".to_string(),
            "Pair of Linear Equations in Two Variables".to_string(),
        );
        Self {
            learning_rate: DEFAULT_LEARNING_RATE,
            success_threshold: DEFAULT_SUCCESS_THRESHOLD,
            new_skill_score: DEFAULT_NEW_SKILL_SCORE,
            bootstrap_min: DEFAULT_BOOTSTRAP_MIN,
            bootstrap_max: DEFAULT_BOOTSTRAP_MAX,
            topic_aliases,
        }
    }
}

/// Expected score (0-100) of a student with mastery `score` (0-100) on material of
/// the given `difficulty` (0-1).
pub fn expected_performance(score: f64, difficulty: f64) -> f64 {
    let ability_gap = score / 100.0 - difficulty;

    if ability_gap >= 0.3 {
        (85.0 + (ability_gap - 0.3) * 30.0).min(95.0)
    } else if ability_gap >= 0.0 {
        70.0 + ability_gap * 50.0
    } else if ability_gap >= -0.3 {
        (40.0 + (ability_gap + 0.3) * 100.0).max(10.0)
    } else {
        (10.0 + (ability_gap + 0.6) * 100.0).max(5.0)
    }
}

pub fn difficulty_multiplier(difficulty: f64, fractional_score: f64, success_threshold: f64) -> f64 {
    if fractional_score >= success_threshold {
        1.0 + difficulty * 0.5
    } else {
        1.0 + (1.0 - difficulty) * 0.3
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SkillChange {
    pub topic: String,
    pub skill: String,
    /// `None` when the skill was created together with its topic.
    pub previous: Option<u8>,
    pub new: u8,
    pub expected: f64,
    pub gap: f64,
    pub multiplier: f64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpdateOutcome {
    pub changes: Vec<SkillChange>,
    pub created_topics: Vec<String>,
    pub skipped_tags: usize,
}

impl UpdateOutcome {
    pub fn is_noop(&self) -> bool {
        self.changes.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct MasteryUpdater {
    subject: String,
    config: UpdaterConfig,
}

impl Default for MasteryUpdater {
    fn default() -> Self {
        Self::new(DEFAULT_SUBJECT, UpdaterConfig::default())
    }
}

impl MasteryUpdater {
    pub fn new(subject: impl Into<String>, config: UpdaterConfig) -> Self {
        Self {
            subject: subject.into(),
            config,
        }
    }

    pub fn config(&self) -> &UpdaterConfig {
        &self.config
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }

    /// Returns the profile with `attempt` applied. The input is not modified.
    pub fn update_profile(&self, profile: &KnowledgeProfile, attempt: &GradedAttempt) -> KnowledgeProfile {
        self.update_profile_at(profile, attempt, Utc::now())
    }

    pub fn update_profile_at(
        &self,
        profile: &KnowledgeProfile,
        attempt: &GradedAttempt,
        now: DateTime<Utc>,
    ) -> KnowledgeProfile {
        let mut updated = profile.clone();
        self.apply(&mut updated, attempt, now);
        updated
    }

    /// In-place update. The profile is left untouched (including `lastUpdated`)
    /// when no tag could be applied.
    pub fn apply(
        &self,
        profile: &mut KnowledgeProfile,
        attempt: &GradedAttempt,
        now: DateTime<Utc>,
    ) -> UpdateOutcome {
        let mut outcome = UpdateOutcome::default();

        if attempt.skill_tags.is_empty() {
            tracing::debug!(
                student_id = %attempt.student_id,
                question_id = %attempt.question_id,
                "attempt has no skill tags, profile unchanged"
            );
            return outcome;
        }

        if !attempt.fractional_score.is_finite() {
            tracing::warn!(
                student_id = %attempt.student_id,
                question_id = %attempt.question_id,
                "attempt has no usable score, skipping"
            );
            outcome.skipped_tags = attempt.skill_tags.len();
            return outcome;
        }
        let actual = attempt.fractional_score.clamp(0.0, 1.0);

        let mut touched = BTreeSet::new();
        for tag in &attempt.skill_tags {
            let Some(tag) = self.sanitize_tag(tag) else {
                tracing::warn!(
                    student_id = %attempt.student_id,
                    question_id = %attempt.question_id,
                    skill = %tag.skill_name,
                    "malformed skill tag skipped"
                );
                outcome.skipped_tags += 1;
                continue;
            };

            let change = self.apply_tag(profile, &tag, &attempt.question_id, actual, &mut outcome);
            tracing::debug!(
                student_id = %attempt.student_id,
                topic = %change.topic,
                skill = %change.skill,
                previous = ?change.previous,
                new = change.new,
                gap = change.gap,
                multiplier = change.multiplier,
                "skill score updated"
            );
            touched.insert(change.topic.clone());
            outcome.changes.push(change);
        }

        if outcome.is_noop() {
            return outcome;
        }

        let subject = profile.subject_mut(&self.subject);
        for topic_name in &touched {
            if let Some(topic) = subject.topic_mut(topic_name) {
                topic.recompute_proficiency();
            }
        }
        profile.last_updated = now;

        outcome
    }

    fn sanitize_tag(&self, tag: &SkillTag) -> Option<SkillTag> {
        let skill_name = tag.skill_name.trim();
        let topic = tag.topic.trim();
        if skill_name.is_empty() || !tag.difficulty.is_finite() || !tag.weight.is_finite() || tag.weight < 0.0 {
            return None;
        }
        let topic = if topic.is_empty() { crate::mastery::tags::DEFAULT_TOPIC } else { topic };
        let topic = self
            .config
            .topic_aliases
            .get(topic)
            .map(String::as_str)
            .unwrap_or(topic);
        Some(SkillTag::new(topic, skill_name, tag.difficulty.clamp(0.0, 1.0), tag.weight))
    }

    fn apply_tag(
        &self,
        profile: &mut KnowledgeProfile,
        tag: &SkillTag,
        question_id: &str,
        actual: f64,
        outcome: &mut UpdateOutcome,
    ) -> SkillChange {
        let subject = profile.subject_mut(&self.subject);

        let Some(topic) = subject.topic_mut(&tag.topic) else {
            let initial = self.bootstrap_score(actual);
            let mut skill = SkillRecord::new(initial);
            skill.questions_attempted.push(question_id.to_string());
            let mut topic = TopicProfile::new(tag.topic.clone());
            topic.skills.insert(tag.skill_name.clone(), skill);
            topic.recompute_proficiency();
            subject.insert_topic(topic);

            tracing::info!(topic = %tag.topic, skill = %tag.skill_name, score = initial, "created topic");
            outcome.created_topics.push(tag.topic.clone());
            return SkillChange {
                topic: tag.topic.clone(),
                skill: tag.skill_name.clone(),
                previous: None,
                new: initial,
                expected: 0.0,
                gap: 0.0,
                multiplier: 1.0,
            };
        };

        let new_skill_score = self.config.new_skill_score;
        let skill = topic
            .skills
            .entry(tag.skill_name.clone())
            .or_insert_with(|| SkillRecord::new(new_skill_score));

        let current = skill.score;
        let expected = expected_performance(f64::from(current), tag.difficulty);
        let gap = actual * 100.0 - expected;
        let multiplier = difficulty_multiplier(tag.difficulty, actual, self.config.success_threshold);
        let score_change = self.config.learning_rate * tag.weight * gap * multiplier;
        let new = clamp_score(f64::from(current) + score_change);

        skill.score = new;
        skill.questions_attempted.push(question_id.to_string());

        SkillChange {
            topic: tag.topic.clone(),
            skill: tag.skill_name.clone(),
            previous: Some(current),
            new,
            expected,
            gap,
            multiplier,
        }
    }

    fn bootstrap_score(&self, actual: f64) -> u8 {
        let lo = self.config.bootstrap_min.min(self.config.bootstrap_max);
        let hi = self.config.bootstrap_max.max(lo);
        clamp_score((actual * 100.0).round()).clamp(lo, hi)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixed_now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2024-06-01T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    fn profile_with_skill(topic: &str, skill: &str, score: u8) -> KnowledgeProfile {
        let mut profile = KnowledgeProfile::blank_at("mathematics", fixed_now());
        let mut t = TopicProfile::new(topic);
        t.skills.insert(skill.to_string(), SkillRecord::new(score));
        t.recompute_proficiency();
        profile.subject_mut("mathematics").insert_topic(t);
        profile
    }

    fn attempt(score: f64, tags: Vec<SkillTag>) -> GradedAttempt {
        GradedAttempt {
            student_id: "s1".to_string(),
            question_id: "q42".to_string(),
            fractional_score: score,
            skill_tags: tags,
        }
    }

    fn skill_score(profile: &KnowledgeProfile, topic: &str, skill: &str) -> u8 {
        profile.subject("mathematics").unwrap().topic(topic).unwrap().skills[skill].score
    }

    #[test]
    fn test_expected_performance_branches() {
        // gap 0.5 -> 85 + 0.2*30 = 91
        assert!((expected_performance(80.0, 0.3) - 91.0).abs() < 1e-9);
        // gap capped at 95
        assert!((expected_performance(100.0, 0.0) - 95.0).abs() < 1e-9);
        // gap 0.2 -> 80
        assert!((expected_performance(50.0, 0.3) - 80.0).abs() < 1e-9);
        // gap -0.1 -> 40 + 20 = 60
        assert!((expected_performance(50.0, 0.6) - 60.0).abs() < 1e-9);
        // gap -0.5 -> 10 + 10 = 20
        assert!((expected_performance(30.0, 0.8) - 20.0).abs() < 1e-9);
        // gap -1.0 floors at 5
        assert!((expected_performance(0.0, 1.0) - 5.0).abs() < 1e-9);
    }

    #[test]
    fn test_difficulty_multiplier() {
        assert!((difficulty_multiplier(0.3, 0.9, 0.7) - 1.15).abs() < 1e-12);
        assert!((difficulty_multiplier(1.0, 0.7, 0.7) - 1.5).abs() < 1e-12);
        assert!((difficulty_multiplier(0.0, 0.2, 0.7) - 1.3).abs() < 1e-12);
        assert!((difficulty_multiplier(1.0, 0.69, 0.7) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_hcf_lcm_scenario() {
        let profile = profile_with_skill("Real Numbers", "HCF and LCM", 50);
        let updater = MasteryUpdater::default();
        let tag = SkillTag::new("Real Numbers", "HCF and LCM", 0.3, 1.0);

        let mut updated = profile.clone();
        let outcome = updater.apply(&mut updated, &attempt(0.9, vec![tag]), fixed_now());

        let change = &outcome.changes[0];
        assert!((change.expected - 80.0).abs() < 1e-9);
        assert!((change.gap - 10.0).abs() < 1e-9);
        assert!((change.multiplier - 1.15).abs() < 1e-9);
        assert_eq!(change.new, 52);
        assert_eq!(skill_score(&updated, "Real Numbers", "HCF and LCM"), 52);

        let topic = updated.subject("mathematics").unwrap().topic("Real Numbers").unwrap();
        assert_eq!(topic.overall_proficiency, 52);
        assert_eq!(topic.skills["HCF and LCM"].questions_attempted, vec!["q42".to_string()]);
    }

    #[test]
    fn test_empty_tags_is_noop() {
        let profile = profile_with_skill("Real Numbers", "HCF and LCM", 50);
        let updater = MasteryUpdater::default();
        let later = fixed_now() + chrono::Duration::hours(1);
        let updated = updater.update_profile_at(&profile, &attempt(1.0, vec![]), later);
        assert_eq!(updated, profile);
    }

    #[test]
    fn test_new_topic_bootstraps_from_score() {
        let profile = KnowledgeProfile::blank_at("mathematics", fixed_now());
        let updater = MasteryUpdater::default();

        let high = updater.update_profile_at(
            &profile,
            &attempt(0.95, vec![SkillTag::new("Circles", "Tangents", 0.6, 1.0)]),
            fixed_now(),
        );
        assert_eq!(skill_score(&high, "Circles", "Tangents"), 60);

        let low = updater.update_profile_at(
            &profile,
            &attempt(0.02, vec![SkillTag::new("Circles", "Tangents", 0.6, 1.0)]),
            fixed_now(),
        );
        assert_eq!(skill_score(&low, "Circles", "Tangents"), 10);

        let mid = updater.update_profile_at(
            &profile,
            &attempt(0.29, vec![SkillTag::new("Circles", "Tangents", 0.6, 1.0)]),
            fixed_now(),
        );
        assert_eq!(skill_score(&mid, "Circles", "Tangents"), 29);
        let topic = mid.subject("mathematics").unwrap().topic("Circles").unwrap();
        assert_eq!(topic.overall_proficiency, 29);
    }

    #[test]
    fn test_new_skill_under_existing_topic_starts_at_default() {
        let profile = profile_with_skill("Real Numbers", "HCF and LCM", 80);
        let updater = MasteryUpdater::default();
        // score 50 vs difficulty 0.5 -> E = 70; actual 75 -> gap 5, M 1.25 -> 51
        let updated = updater.update_profile_at(
            &profile,
            &attempt(0.75, vec![SkillTag::new("Real Numbers", "Irrationality", 0.5, 1.0)]),
            fixed_now(),
        );
        assert_eq!(skill_score(&updated, "Real Numbers", "Irrationality"), 51);
        let topic = updated.subject("mathematics").unwrap().topic("Real Numbers").unwrap();
        assert_eq!(topic.overall_proficiency, 65);
    }

    #[test]
    fn test_failure_on_easy_material_penalized() {
        let profile = profile_with_skill("Triangles", "Similarity", 70);
        let updater = MasteryUpdater::default();
        // gap 0.6 -> E = min(95, 85 + 9) = 94; actual 20 -> gap -74; M = 1 + 0.9*0.3 = 1.27
        // change = 0.2 * -74 * 1.27 = -18.796 -> 51.204 -> 51
        let updated = updater.update_profile_at(
            &profile,
            &attempt(0.2, vec![SkillTag::new("Triangles", "Similarity", 0.1, 1.0)]),
            fixed_now(),
        );
        assert_eq!(skill_score(&updated, "Triangles", "Similarity"), 51);
    }

    #[test]
    fn test_scores_stay_in_bounds() {
        let updater = MasteryUpdater::default();
        let top = profile_with_skill("T", "S", 100);
        let up = updater.update_profile_at(&top, &attempt(1.0, vec![SkillTag::new("T", "S", 1.0, 50.0)]), fixed_now());
        assert_eq!(skill_score(&up, "T", "S"), 100);

        let bottom = profile_with_skill("T", "S", 0);
        let down = updater.update_profile_at(&bottom, &attempt(0.0, vec![SkillTag::new("T", "S", 0.0, 50.0)]), fixed_now());
        assert_eq!(skill_score(&down, "T", "S"), 0);
    }

    #[test]
    fn test_malformed_tags_skipped_others_applied() {
        let profile = profile_with_skill("Real Numbers", "HCF and LCM", 50);
        let updater = MasteryUpdater::default();
        let tags = vec![
            SkillTag::new("Real Numbers", "  ", 0.3, 1.0),
            SkillTag::new("Real Numbers", "HCF and LCM", f64::NAN, 1.0),
            SkillTag::new("Real Numbers", "HCF and LCM", 0.3, -2.0),
            SkillTag::new("Real Numbers", "HCF and LCM", 0.3, 1.0),
        ];
        let mut updated = profile.clone();
        let outcome = updater.apply(&mut updated, &attempt(0.9, tags), fixed_now());
        assert_eq!(outcome.skipped_tags, 3);
        assert_eq!(outcome.changes.len(), 1);
        assert_eq!(skill_score(&updated, "Real Numbers", "HCF and LCM"), 52);
    }

    #[test]
    fn test_unusable_score_leaves_profile_untouched() {
        let profile = profile_with_skill("Real Numbers", "HCF and LCM", 50);
        let updater = MasteryUpdater::default();
        let later = fixed_now() + chrono::Duration::days(1);
        let updated = updater.update_profile_at(
            &profile,
            &attempt(f64::NAN, vec![SkillTag::new("Real Numbers", "HCF and LCM", 0.3, 1.0)]),
            later,
        );
        assert_eq!(updated, profile);
    }

    #[test]
    fn test_topic_alias_is_canonicalized() {
        let profile = KnowledgeProfile::blank_at("mathematics", fixed_now());
        let updater = MasteryUpdater::default();
        let updated = updater.update_profile_at(
            &profile,
            &attempt(0.5, vec![SkillTag::new("Pair of Linear Equations", "Elimination", 0.5, 1.0)]),
            fixed_now(),
        );
        let subject = updated.subject("mathematics").unwrap();
        assert!(subject.topic("Pair of Linear Equations").is_none());
        assert!(subject.topic("Pair of Linear Equations in Two Variables").is_some());
    }

    #[test]
    fn test_two_tags_same_new_topic() {
        let profile = KnowledgeProfile::blank_at("mathematics", fixed_now());
        let updater = MasteryUpdater::default();
        let tags = vec![
            SkillTag::new("Statistics", "Mean", 0.4, 1.0),
            SkillTag::new("Statistics", "Median", 0.4, 1.0),
        ];
        let mut updated = profile.clone();
        let outcome = updater.apply(&mut updated, &attempt(0.8, tags), fixed_now());

        assert_eq!(outcome.created_topics, vec!["Statistics".to_string()]);
        let subject = updated.subject("mathematics").unwrap();
        assert_eq!(subject.len(), 1);
        let topic = subject.topic("Statistics").unwrap();
        assert_eq!(topic.skills["Mean"].score, 60);
        // Median starts at 50: E = 70 + 0.1*50 = 75, gap 5, M 1.2 -> +1.2 -> 51
        assert_eq!(topic.skills["Median"].score, 51);
        assert_eq!(topic.overall_proficiency, 55);
    }

    #[test]
    fn test_last_updated_set_on_mutation() {
        let profile = profile_with_skill("Real Numbers", "HCF and LCM", 50);
        let updater = MasteryUpdater::default();
        let later = fixed_now() + chrono::Duration::minutes(5);
        let updated = updater.update_profile_at(
            &profile,
            &attempt(0.9, vec![SkillTag::new("Real Numbers", "HCF and LCM", 0.3, 1.0)]),
            later,
        );
        assert_eq!(updated.last_updated, later);
    }
}
