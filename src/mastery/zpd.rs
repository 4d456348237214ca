use serde::{Deserialize, Serialize};

use crate::mastery::selector::DifficultyRange;
use crate::mastery::types::AttemptRecord;

const DEFAULT_TARGET_SUCCESS_RATE: f64 = 0.75;
const DEFAULT_SUCCESS_THRESHOLD: f64 = 0.7;
const DEFAULT_WINDOW_SIZE: usize = 10;
const DEFAULT_BAND_HALF_WIDTH: f64 = 0.25;

pub const MIN_DIFFICULTY: f64 = 0.5;
pub const MAX_DIFFICULTY: f64 = 2.0;

const COLD_START_SCALE: f64 = 1.2;
const BASE_SCALE: f64 = 1.5;
const STRUGGLING_RATE: f64 = 0.5;
const BELOW_TARGET_RATE: f64 = 0.65;
const EXCELLING_RATE: f64 = 0.85;
const FINE_TUNE_GAIN: f64 = 0.3;
const FALLBACK_DIFFICULTY: f64 = 1.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ZpdConfig {
    pub target_success_rate: f64,
    /// Fractional score at or above which a recent attempt counts as a success.
    pub success_threshold: f64,
    /// Most recent attempts considered per calculation.
    pub window_size: usize,
    /// Half width of the difficulty band handed to the selector.
    pub band_half_width: f64,
}

impl Default for ZpdConfig {
    fn default() -> Self {
        Self {
            target_success_rate: DEFAULT_TARGET_SUCCESS_RATE,
            success_threshold: DEFAULT_SUCCESS_THRESHOLD,
            window_size: DEFAULT_WINDOW_SIZE,
            band_half_width: DEFAULT_BAND_HALF_WIDTH,
        }
    }
}

/// Anything that may carry a fractional score. Records without a usable score
/// are skipped by the calculator.
pub trait ScoredAttempt {
    fn fractional_score(&self) -> Option<f64>;
}

impl ScoredAttempt for f64 {
    fn fractional_score(&self) -> Option<f64> {
        self.is_finite().then_some(*self)
    }
}

impl ScoredAttempt for Option<f64> {
    fn fractional_score(&self) -> Option<f64> {
        self.filter(|s| s.is_finite())
    }
}

impl ScoredAttempt for AttemptRecord {
    fn fractional_score(&self) -> Option<f64> {
        self.usable_score()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ZpdRecommendation {
    /// 0.5-2.0, rounded to two decimals.
    pub optimal_difficulty: f64,
    /// 0.0 when no usable history was available.
    pub observed_success_rate: f64,
    pub rationale: String,
    pub confidence: Confidence,
    pub attempts_considered: usize,
}

impl ZpdRecommendation {
    /// Band of `optimal ± half_width`, clamped to the difficulty scale.
    pub fn difficulty_range(&self, half_width: f64) -> DifficultyRange {
        let half_width = if half_width.is_finite() { half_width.abs() } else { 0.0 };
        DifficultyRange::new(
            self.optimal_difficulty - half_width,
            self.optimal_difficulty + half_width,
        )
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[derive(Debug, Clone, Default)]
pub struct ZpdCalculator {
    config: ZpdConfig,
}

impl ZpdCalculator {
    pub fn new(config: ZpdConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ZpdConfig {
        &self.config
    }

    pub fn compute_target_difficulty<A: ScoredAttempt>(
        &self,
        current_skill_level: f64,
        recent_attempts: &[A],
    ) -> ZpdRecommendation {
        self.compute_with_target(current_skill_level, recent_attempts, self.config.target_success_rate)
    }

    /// Advisory: never fails. Unusable attempt records are skipped, and an
    /// entirely unusable history is treated as no history.
    pub fn compute_with_target<A: ScoredAttempt>(
        &self,
        current_skill_level: f64,
        recent_attempts: &[A],
        target_success_rate: f64,
    ) -> ZpdRecommendation {
        if !current_skill_level.is_finite() {
            tracing::warn!("non-finite skill level, using fallback difficulty");
            return ZpdRecommendation {
                optimal_difficulty: FALLBACK_DIFFICULTY,
                observed_success_rate: 0.0,
                rationale: "Skill level unavailable, using a medium difficulty".to_string(),
                confidence: Confidence::Low,
                attempts_considered: 0,
            };
        }
        let level = current_skill_level.clamp(0.0, 100.0) / 100.0;
        let target = if target_success_rate.is_finite() {
            target_success_rate.clamp(0.0, 1.0)
        } else {
            self.config.target_success_rate
        };

        let scores: Vec<f64> = recent_attempts
            .iter()
            .filter_map(ScoredAttempt::fractional_score)
            .collect();
        let skipped = recent_attempts.len() - scores.len();
        if skipped > 0 {
            tracing::debug!(skipped, "unusable attempt records ignored");
        }

        if scores.is_empty() {
            let optimal = (level * COLD_START_SCALE).max(MIN_DIFFICULTY);
            return ZpdRecommendation {
                optimal_difficulty: round2(optimal),
                observed_success_rate: 0.0,
                rationale: "No recent history, starting conservatively based on skill level"
                    .to_string(),
                confidence: Confidence::Low,
                attempts_considered: 0,
            };
        }

        let successes = scores
            .iter()
            .filter(|&&s| s >= self.config.success_threshold)
            .count();
        let success_rate = successes as f64 / scores.len() as f64;
        let base = level * BASE_SCALE;

        let (adjustment, rationale, confidence) = if success_rate < STRUGGLING_RATE {
            (
                -0.3,
                "Recent struggles detected, reducing difficulty significantly",
                Confidence::High,
            )
        } else if success_rate < BELOW_TARGET_RATE {
            (
                -0.15,
                "Below target success rate, reducing difficulty moderately",
                Confidence::Medium,
            )
        } else if success_rate > EXCELLING_RATE {
            (0.2, "High success rate, increasing challenge", Confidence::High)
        } else {
            (
                (target - success_rate) * FINE_TUNE_GAIN,
                "Fine-tuning difficulty based on current performance",
                Confidence::Medium,
            )
        };

        let optimal = (base + adjustment).clamp(MIN_DIFFICULTY, MAX_DIFFICULTY);

        ZpdRecommendation {
            optimal_difficulty: round2(optimal),
            observed_success_rate: round2(success_rate),
            rationale: rationale.to_string(),
            confidence,
            attempts_considered: scores.len(),
        }
    }
}
