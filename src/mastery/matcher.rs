//! Skill Matcher
//!
//! Decides whether a question exercises any of a requested skill set. The policy
//! is permissive: anything that cannot be judged (no requirement, no tags, an
//! unreadable tag document) passes. Only a question whose readable tags name
//! none of the required skills is rejected.

use std::collections::HashSet;

use serde_json::Value;

use crate::mastery::tags::skill_names;
use crate::mastery::types::QuestionRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Relevance {
    NoRequirement,
    Untagged,
    /// Tag document present but not interpretable; treated as no constraint.
    Unreadable,
    Matched,
    Unmatched,
}

impl Relevance {
    pub fn passes(self) -> bool {
        !matches!(self, Relevance::Unmatched)
    }
}

#[derive(Debug, Clone, Default)]
pub struct SkillMatcher {
    required: HashSet<String>,
}

impl SkillMatcher {
    /// Required skill names are compared case-insensitively; blank names are ignored.
    pub fn new<S: AsRef<str>>(required_skills: &[S]) -> Self {
        let required = required_skills
            .iter()
            .map(|s| s.as_ref().trim().to_lowercase())
            .filter(|s| !s.is_empty())
            .collect();
        Self { required }
    }

    pub fn is_unconstrained(&self) -> bool {
        self.required.is_empty()
    }

    pub fn relevance_of(&self, skills_tested: &Value) -> Relevance {
        if self.required.is_empty() {
            return Relevance::NoRequirement;
        }
        if is_blank(skills_tested) {
            return Relevance::Untagged;
        }

        match skill_names(skills_tested) {
            None => Relevance::Unreadable,
            Some(names) if names.is_empty() => Relevance::Untagged,
            Some(names) => {
                if names.iter().any(|n| self.required.contains(&n.to_lowercase())) {
                    Relevance::Matched
                } else {
                    Relevance::Unmatched
                }
            }
        }
    }

    pub fn matches(&self, question: &QuestionRecord) -> bool {
        self.relevance_of(&question.skills_tested).passes()
    }
}

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
        _ => false,
    }
}
