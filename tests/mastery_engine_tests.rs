//! Integration tests for the practice service over real collaborators.

use std::sync::Arc;

use chrono::{Duration, Utc};
use serde_json::{json, Value};

use mastery_engine::config::EngineConfig;
use mastery_engine::mastery::types::{SkillRecord, TopicProfile};
use mastery_engine::services::practice::{PracticeError, PracticeRequest, PracticeService};
use mastery_engine::store::file::JsonFileProfileStore;
use mastery_engine::store::memory::{MemoryAttemptHistory, MemoryCorpus, MemoryProfileStore};
use mastery_engine::{
    AttemptHistory, AttemptRecord, GradedAttempt, KnowledgeProfile, ProfileStore, QuestionCorpus,
    QuestionRecord, SkillTag, StoreError,
};

const SUBJECT: &str = "mathematics";

fn tags(topic: &str, skills: &[(&str, f64)]) -> Value {
    json!({
        "skills": skills
            .iter()
            .map(|(name, difficulty)| json!({"topic": topic, "skill_name": name, "difficulty": difficulty, "weight": 1.0}))
            .collect::<Vec<_>>()
    })
}

fn seeded_profile(topic: &str, skill: &str, score: u8) -> KnowledgeProfile {
    let mut profile = KnowledgeProfile::blank(SUBJECT);
    let mut t = TopicProfile::new(topic);
    t.skills.insert(skill.to_string(), SkillRecord::new(score));
    t.recompute_proficiency();
    profile.subject_mut(SUBJECT).insert_topic(t);
    profile
}

struct FailingStore;

impl ProfileStore for FailingStore {
    fn read(&self, _student_id: &str) -> Result<Option<KnowledgeProfile>, StoreError> {
        Err(StoreError::Unavailable("profile database offline".to_string()))
    }

    fn write(&self, _student_id: &str, _profile: &KnowledgeProfile) -> Result<(), StoreError> {
        Err(StoreError::Unavailable("profile database offline".to_string()))
    }
}

struct FailingCorpus;

impl QuestionCorpus for FailingCorpus {
    fn find(&self, _filter: &mastery_engine::store::CorpusFilter) -> Result<Vec<QuestionRecord>, StoreError> {
        Err(StoreError::Unavailable("corpus offline".to_string()))
    }
}

#[test]
fn test_hcf_attempt_persisted_in_stable_shape() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(JsonFileProfileStore::new(dir.path()));
    store
        .write("student-1", &seeded_profile("Real Numbers", "HCF and LCM", 50))
        .unwrap();

    let service = PracticeService::new(
        store.clone(),
        Arc::new(MemoryCorpus::default()),
        Arc::new(MemoryAttemptHistory::new()),
        EngineConfig::default(),
    );
    service
        .record_graded("student-1", "q42", "9/10", &tags("Real Numbers", &[("HCF and LCM", 0.3)]))
        .unwrap();

    let raw: Value =
        serde_json::from_slice(&std::fs::read(dir.path().join("student-1.json")).unwrap()).unwrap();
    assert!(raw["lastUpdated"].is_string());
    let topic = &raw["subjects"]["mathematics"]["topics"][0];
    assert_eq!(topic["topicName"], "Real Numbers");
    assert_eq!(topic["overallProficiency"], 52);
    assert_eq!(topic["skills"]["HCF and LCM"]["score"], 52);
    assert_eq!(topic["skills"]["HCF and LCM"]["questionsAttempted"], json!(["q42"]));
}

#[test]
fn test_first_attempt_creates_profile() {
    let dir = tempfile::tempdir().unwrap();
    let service = PracticeService::new(
        Arc::new(JsonFileProfileStore::new(dir.path())),
        Arc::new(MemoryCorpus::default()),
        Arc::new(MemoryAttemptHistory::new()),
        EngineConfig::default(),
    );
    let recorded = service
        .record_graded("newcomer", "q1", "0.35", &tags("Circles", &[("Tangents", 0.6)]))
        .unwrap();
    assert_eq!(recorded.outcome.created_topics, vec!["Circles".to_string()]);

    let reloaded = service.load_profile("newcomer").unwrap();
    let subject = reloaded.subject(SUBJECT).unwrap();
    assert_eq!(subject.skill("Tangents").unwrap().score, 35);
}

#[test]
fn test_concurrent_attempts_for_one_student_are_not_lost() {
    let profiles = Arc::new(MemoryProfileStore::new());
    profiles
        .write("s1", &seeded_profile("Real Numbers", "HCF and LCM", 50))
        .unwrap();
    let service = Arc::new(PracticeService::new(
        profiles.clone(),
        Arc::new(MemoryCorpus::default()),
        Arc::new(MemoryAttemptHistory::new()),
        EngineConfig::default(),
    ));

    std::thread::scope(|scope| {
        for i in 0..8 {
            let service = Arc::clone(&service);
            scope.spawn(move || {
                let attempt = GradedAttempt {
                    student_id: "s1".to_string(),
                    question_id: format!("q{i}"),
                    fractional_score: 0.8,
                    skill_tags: vec![SkillTag::new("Real Numbers", "HCF and LCM", 0.5, 1.0)],
                };
                service.record_attempt(&attempt).unwrap();
            });
        }
    });

    let profile = profiles.read("s1").unwrap().unwrap();
    let skill = profile.subject(SUBJECT).unwrap().skill("HCF and LCM").unwrap();
    assert_eq!(skill.questions_attempted.len(), 8);
}

#[test]
fn test_recommendation_excludes_recent_and_prefers_weak_skills() {
    let profiles = Arc::new(MemoryProfileStore::new());
    let mut profile = seeded_profile("Quadratic Equations", "Quadratic Formula", 40);
    profile
        .subject_mut(SUBJECT)
        .topic_mut("Quadratic Equations")
        .unwrap()
        .skills
        .insert("Factorisation".to_string(), SkillRecord::new(90));
    profiles.write("s1", &profile).unwrap();

    let corpus = Arc::new(MemoryCorpus::new(vec![
        QuestionRecord::new("mastered", 0.6, tags("Quadratic Equations", &[("Factorisation", 0.4)])),
        QuestionRecord::new("recent", 0.6, tags("Quadratic Equations", &[("Quadratic Formula", 0.4)])),
        QuestionRecord::new("weak", 0.7, tags("Quadratic Equations", &[("Quadratic Formula", 0.4)])),
        QuestionRecord::new("too-hard", 1.8, tags("Quadratic Equations", &[("Quadratic Formula", 0.9)])),
    ]));
    let history = Arc::new(MemoryAttemptHistory::new());
    history.record("s1", AttemptRecord::new("recent", 0.4, Utc::now() - Duration::days(1)));

    let service = PracticeService::new(profiles, corpus, history, EngineConfig::default());
    let rec = service
        .recommend_questions("s1", &PracticeRequest::default())
        .unwrap();

    let ids: Vec<_> = rec.questions.iter().map(|q| q.question.id.as_str()).collect();
    assert_eq!(ids, vec!["weak", "mastered"]);
    assert!(rec.questions[0].score > rec.questions[1].score);
    assert!(!rec.needs_generation);
    assert!(rec.difficulty_range.contains(rec.target.optimal_difficulty));
}

#[test]
fn test_collaborator_failures_propagate() {
    let failing = PracticeService::new(
        Arc::new(FailingStore),
        Arc::new(MemoryCorpus::default()),
        Arc::new(MemoryAttemptHistory::new()),
        EngineConfig::default(),
    );
    let err = failing
        .record_graded("s1", "q1", "1/2", &tags("T", &[("S", 0.5)]))
        .unwrap_err();
    assert!(matches!(err, PracticeError::Store(StoreError::Unavailable(_))));

    let no_corpus = PracticeService::new(
        Arc::new(MemoryProfileStore::new()),
        Arc::new(FailingCorpus),
        Arc::new(MemoryAttemptHistory::new()),
        EngineConfig::default(),
    );
    let err = no_corpus
        .recommend_questions("s1", &PracticeRequest::default())
        .unwrap_err();
    assert!(matches!(err, PracticeError::Store(StoreError::Unavailable(_))));
}

#[test]
fn test_invalid_student_id_rejected_by_file_store() {
    let dir = tempfile::tempdir().unwrap();
    let store = JsonFileProfileStore::new(dir.path());
    let err = store.read("../escape").unwrap_err();
    assert!(matches!(err, StoreError::InvalidKey(_)));
}

#[test]
fn test_summary_and_patterns_from_history() {
    let profiles = Arc::new(MemoryProfileStore::new());
    profiles
        .write("s1", &seeded_profile("Triangles", "Similarity", 70))
        .unwrap();
    let history = Arc::new(MemoryAttemptHistory::new());
    let now = Utc::now();
    for (i, score) in [0.2, 0.4, 0.9, 0.95].iter().enumerate() {
        let mut record = AttemptRecord::new(format!("q{i}"), *score, now - Duration::hours(10 - i as i64));
        record.skills_tested = if i < 2 {
            tags("Triangles", &[("Pythagoras", 0.5)])
        } else {
            tags("Triangles", &[("Similarity", 0.5)])
        };
        history.record("s1", record);
    }
    assert_eq!(history.recent_attempts("s1", 30).unwrap().len(), 4);

    let service = PracticeService::new(profiles, Arc::new(MemoryCorpus::default()), history, EngineConfig::default());

    let summary = service.student_summary("s1", 30).unwrap();
    assert_eq!(summary.total_topics, 1);
    assert!((summary.avg_skill_level - 70.0).abs() < 1e-9);
    assert_eq!(summary.recent_performance.total_attempts, 4);
    assert_eq!(summary.recent_performance.success_rate, 0.5);

    let patterns = service.learning_patterns("s1", 30).unwrap();
    assert_eq!(patterns.weak_skills, vec!["Pythagoras".to_string()]);
    assert_eq!(patterns.strong_skills, vec!["Similarity".to_string()]);
}
