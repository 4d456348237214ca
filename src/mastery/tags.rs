//! Skill tag extraction from raw `skills_tested` documents.
//!
//! Corpus rows carry their skill tags as loosely shaped JSON: an object with a
//! `skills` array, the same object encoded as a string, or a bare array. Entries
//! may be missing fields or carry garbage. Extraction never fails; it reports
//! what it could read and how many entries it had to drop, and callers decide
//! how to treat an unreadable document (the matcher treats it as "no constraint").

use serde_json::{Map, Value};

use crate::mastery::types::SkillTag;

pub const DEFAULT_TOPIC: &str = "General";
pub const DEFAULT_DIFFICULTY: f64 = 0.5;
pub const DEFAULT_WEIGHT: f64 = 1.0;

#[derive(Debug, Clone, PartialEq)]
pub enum TagExtraction {
    /// No tag document at all (null, empty object, empty string).
    Untagged,
    /// A readable tag list. `tags` may be empty when every entry was dropped.
    Tagged { tags: Vec<SkillTag>, skipped: usize },
    /// The document exists but has no recognizable shape.
    Unreadable(String),
}

impl TagExtraction {
    pub fn tags(&self) -> &[SkillTag] {
        match self {
            TagExtraction::Tagged { tags, .. } => tags,
            _ => &[],
        }
    }

    pub fn into_tags(self) -> Vec<SkillTag> {
        match self {
            TagExtraction::Tagged { tags, .. } => tags,
            _ => Vec::new(),
        }
    }
}

pub fn extract_skill_tags(raw: &Value) -> TagExtraction {
    match raw {
        Value::Null => TagExtraction::Untagged,
        Value::String(text) => {
            let text = text.trim();
            if text.is_empty() {
                return TagExtraction::Untagged;
            }
            match serde_json::from_str::<Value>(text) {
                Ok(Value::String(_)) => {
                    TagExtraction::Unreadable("doubly encoded tag document".to_string())
                }
                Ok(inner) => extract_skill_tags(&inner),
                Err(err) => TagExtraction::Unreadable(format!("invalid JSON: {err}")),
            }
        }
        Value::Array(entries) => parse_entries(entries),
        Value::Object(map) if map.is_empty() => TagExtraction::Untagged,
        Value::Object(map) => match map.get("skills") {
            Some(Value::Array(entries)) => parse_entries(entries),
            Some(Value::Null) => TagExtraction::Untagged,
            Some(other) => TagExtraction::Unreadable(format!("`skills` is not a list: {other}")),
            None => TagExtraction::Unreadable("missing `skills` list".to_string()),
        },
        other => TagExtraction::Unreadable(format!("unexpected tag document: {other}")),
    }
}

fn parse_entries(entries: &[Value]) -> TagExtraction {
    let mut tags = Vec::with_capacity(entries.len());
    let mut skipped = 0;
    for entry in entries {
        match entry.as_object().and_then(parse_entry) {
            Some(tag) => tags.push(tag),
            None => skipped += 1,
        }
    }
    TagExtraction::Tagged { tags, skipped }
}

fn parse_entry(entry: &Map<String, Value>) -> Option<SkillTag> {
    let skill_name = entry
        .get("skill_name")
        .or_else(|| entry.get("skillName"))
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())?;

    let topic = entry
        .get("topic")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or(DEFAULT_TOPIC);

    let difficulty = number_field(entry, "difficulty", DEFAULT_DIFFICULTY)?.clamp(0.0, 1.0);
    let weight = number_field(entry, "weight", DEFAULT_WEIGHT)?;
    if weight < 0.0 {
        return None;
    }

    Some(SkillTag::new(topic, skill_name, difficulty, weight))
}

/// Absent or null fields take the default; present but non-numeric or
/// non-finite fields reject the entry.
fn number_field(entry: &Map<String, Value>, key: &str, default: f64) -> Option<f64> {
    let value = match entry.get(key) {
        None | Some(Value::Null) => return Some(default),
        Some(Value::Number(n)) => n.as_f64()?,
        Some(Value::String(s)) => s.trim().parse::<f64>().ok()?,
        Some(_) => return None,
    };
    value.is_finite().then_some(value)
}

/// Skill names declared by a document, for relevance checks. Unlike
/// [`extract_skill_tags`] this keeps entries whose numeric fields are broken,
/// since only the name matters here.
pub fn skill_names(raw: &Value) -> Option<Vec<String>> {
    let entries = match raw {
        Value::String(text) => {
            let inner = serde_json::from_str::<Value>(text.trim()).ok()?;
            return skill_names(&inner);
        }
        Value::Array(entries) => entries,
        Value::Object(map) => map.get("skills")?.as_array()?,
        _ => return None,
    };
    Some(
        entries
            .iter()
            .filter_map(|e| {
                let obj = e.as_object()?;
                obj.get("skill_name")
                    .or_else(|| obj.get("skillName"))
                    .and_then(Value::as_str)
                    .map(|s| s.trim().to_string())
            })
            .filter(|s| !s.is_empty())
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_object_with_skills_list() {
        let raw = json!({"skills": [
            {"topic": "Real Numbers", "skill_name": "HCF and LCM", "difficulty": 0.3, "weight": 1.0}
        ]});
        let extraction = extract_skill_tags(&raw);
        assert_eq!(
            extraction,
            TagExtraction::Tagged {
                tags: vec![SkillTag::new("Real Numbers", "HCF and LCM", 0.3, 1.0)],
                skipped: 0
            }
        );
    }

    #[test]
    fn test_string_encoded_document() {
        let raw = Value::String(r#"{"skills": [{"skill_name": "Zeroes"}]}"#.to_string());
        let tags = extract_skill_tags(&raw).into_tags();
        assert_eq!(tags, vec![SkillTag::new(DEFAULT_TOPIC, "Zeroes", 0.5, 1.0)]);
    }

    #[test]
    fn test_bare_array_and_camel_case_name() {
        let raw = json!([{"skillName": "Similarity", "topic": "Triangles", "weight": 0.4}]);
        let tags = extract_skill_tags(&raw).into_tags();
        assert_eq!(tags.len(), 1);
        assert_eq!(tags[0].skill_name, "Similarity");
        assert!((tags[0].weight - 0.4).abs() < 1e-12);
    }

    #[test]
    fn test_bad_entries_are_skipped_and_counted() {
        let raw = json!({"skills": [
            {"skill_name": "ok", "difficulty": "0.7"},
            {"topic": "no name"},
            {"skill_name": "bad difficulty", "difficulty": "hard"},
            {"skill_name": "negative weight", "weight": -1},
            "not an object"
        ]});
        match extract_skill_tags(&raw) {
            TagExtraction::Tagged { tags, skipped } => {
                assert_eq!(tags.len(), 1);
                assert!((tags[0].difficulty - 0.7).abs() < 1e-12);
                assert_eq!(skipped, 4);
            }
            other => panic!("unexpected extraction: {other:?}"),
        }
    }

    #[test]
    fn test_difficulty_is_clamped() {
        let raw = json!([{"skill_name": "s", "difficulty": 1.8}]);
        let tags = extract_skill_tags(&raw).into_tags();
        assert!((tags[0].difficulty - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_untagged_and_unreadable_shapes() {
        assert_eq!(extract_skill_tags(&Value::Null), TagExtraction::Untagged);
        assert_eq!(extract_skill_tags(&json!({})), TagExtraction::Untagged);
        assert_eq!(extract_skill_tags(&json!("")), TagExtraction::Untagged);
        assert!(matches!(extract_skill_tags(&json!({"other": 1})), TagExtraction::Unreadable(_)));
        assert!(matches!(extract_skill_tags(&json!("{oops")), TagExtraction::Unreadable(_)));
        assert!(matches!(extract_skill_tags(&json!(42)), TagExtraction::Unreadable(_)));
    }

    #[test]
    fn test_skill_names_ignores_numeric_garbage() {
        let raw = json!({"skills": [{"skill_name": "A", "difficulty": "??"}, {"weight": 1}]});
        assert_eq!(skill_names(&raw), Some(vec!["A".to_string()]));
        assert_eq!(skill_names(&json!(7)), None);
    }
}
