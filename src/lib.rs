//! # mastery-engine
//!
//! Adaptive mastery core for a practice platform:
//!
//! - **Mastery Updater** - difficulty-aware, bounded per-skill score updates from graded attempts
//! - **ZPD Calculator** - target difficulty from current mastery and recent success rate
//! - **Adaptive Selector** - filters and ranks corpus questions against skills and a difficulty band
//! - **Skill Matcher** - tolerant skill relevance check shared by the selector
//!
//! Persistence, the question corpus and attempt history are collaborators behind the
//! traits in [`store`]; [`services::practice`] wires them together.

pub mod config;
pub mod logging;
pub mod mastery;
pub mod services;
pub mod store;

pub use config::{Config, EngineConfig};
pub use mastery::matcher::SkillMatcher;
pub use mastery::selector::{AdaptiveSelector, DifficultyRange, RankedQuestion, SelectionRequest};
pub use mastery::types::{
    AttemptRecord, GradedAttempt, KnowledgeProfile, QuestionRecord, SkillRecord, SkillTag,
    SubjectProfile, TopicProfile,
};
pub use mastery::updater::MasteryUpdater;
pub use mastery::zpd::{Confidence, ZpdCalculator, ZpdRecommendation};
pub use services::practice::{PracticeError, PracticeService};
pub use store::{AttemptHistory, ProfileStore, QuestionCorpus, StoreError};
