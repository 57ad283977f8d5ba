//! Engine configuration.
//!
//! Every tunable threshold lives here so hosts can adjust pacing and adaptation
//! without touching control flow. Missing TOML keys fall back to defaults.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigError {
    #[error("invalid config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("{field} must be {expected}")]
    OutOfRange {
        field: &'static str,
        expected: &'static str,
    },
}

//
// ─── PERSISTENCE ───────────────────────────────────────────────────────────────
//

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistenceConfig {
    /// Key of the single save slot.
    pub save_key: String,
    /// Quiet period after the last mutation before an autosave is written.
    pub autosave_debounce_ms: u64,
    /// Interval of the play-time accrual tick.
    pub session_tick_secs: u64,
    /// Skip autosaves until a persona has been chosen.
    pub autosave_requires_persona: bool,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            save_key: "cat-chronicles-save".to_owned(),
            autosave_debounce_ms: 1_000,
            session_tick_secs: 60,
            autosave_requires_persona: true,
        }
    }
}

impl PersistenceConfig {
    #[must_use]
    pub fn autosave_debounce(&self) -> Duration {
        Duration::from_millis(self.autosave_debounce_ms)
    }

    #[must_use]
    pub fn session_tick(&self) -> Duration {
        Duration::from_secs(self.session_tick_secs)
    }
}

//
// ─── LESSON ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LessonConfig {
    /// Assessment tries before the learner is moved on with the floor score.
    pub max_assessment_attempts: u32,
    /// Submissions per question before the engine moves past it.
    pub max_attempts_per_question: u32,
    /// Passing percentage for lessons that do not set their own.
    pub default_passing_score: u8,
    /// Recommendations at or above this confidence apply at once; weaker ones
    /// wait for a second agreeing recommendation.
    pub apply_confidence: f64,
    /// Attempts fed to the difficulty adapter.
    pub adaptation_window: usize,
}

impl Default for LessonConfig {
    fn default() -> Self {
        Self {
            max_assessment_attempts: 3,
            max_attempts_per_question: 3,
            default_passing_score: 70,
            apply_confidence: 0.7,
            adaptation_window: 5,
        }
    }
}

//
// ─── ADAPTIVE ──────────────────────────────────────────────────────────────────
//

/// Difficulty adapter thresholds. Time ratios are actual over expected answer time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdaptiveConfig {
    pub min_attempts: usize,
    pub trend_min_attempts: usize,

    // patterns
    pub fast_accurate_ratio: f64,
    pub fast_accurate_share: f64,
    pub hint_independent_share: f64,
    pub first_attempt_success_share: f64,
    pub consistent_variance: f64,

    // struggle indicators
    pub high_hint_average: f64,
    pub multiple_attempts_average: f64,
    pub slow_ratio: f64,
    pub slow_share: f64,
    pub low_accuracy: f64,

    // mastery indicators
    pub high_accuracy: f64,
    pub fast_ratio: f64,
    pub fast_share: f64,
    pub first_attempt_mastery_share: f64,

    // increase rule
    pub increase_accuracy_with_trend: f64,
    pub increase_trend: f64,
    pub increase_accuracy_with_speed: f64,
    pub increase_speed_trend: f64,
    pub increase_mastery_indicators: usize,
    pub increase_accuracy_steady: f64,

    // decrease rule
    pub decrease_accuracy_with_trend: f64,
    pub decrease_trend: f64,
    pub decrease_struggle_indicators: usize,
    pub decrease_average_attempts: f64,
    pub decrease_accuracy_floor: f64,

    // profile fine-tuning
    pub low_confidence_accuracy: f64,
    pub persistence_accuracy: f64,
    pub hint_free_accuracy: f64,
}

impl Default for AdaptiveConfig {
    fn default() -> Self {
        Self {
            min_attempts: 2,
            trend_min_attempts: 3,

            fast_accurate_ratio: 0.8,
            fast_accurate_share: 0.6,
            hint_independent_share: 0.8,
            first_attempt_success_share: 0.7,
            consistent_variance: 0.1,

            high_hint_average: 1.5,
            multiple_attempts_average: 2.0,
            slow_ratio: 1.5,
            slow_share: 0.6,
            low_accuracy: 0.5,

            high_accuracy: 0.85,
            fast_ratio: 0.7,
            fast_share: 0.6,
            first_attempt_mastery_share: 0.8,

            increase_accuracy_with_trend: 0.85,
            increase_trend: 0.1,
            increase_accuracy_with_speed: 0.8,
            increase_speed_trend: 0.2,
            increase_mastery_indicators: 2,
            increase_accuracy_steady: 0.9,

            decrease_accuracy_with_trend: 0.4,
            decrease_trend: -0.1,
            decrease_struggle_indicators: 2,
            decrease_average_attempts: 2.5,
            decrease_accuracy_floor: 0.3,

            low_confidence_accuracy: 0.6,
            persistence_accuracy: 0.7,
            hint_free_accuracy: 0.8,
        }
    }
}

//
// ─── MASTERY ───────────────────────────────────────────────────────────────────
//

/// A mastery tier threshold: minimum accuracy and speed, maximum hints per question.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TierThreshold {
    pub accuracy: f64,
    pub speed: f64,
    pub hint_ratio: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MasteryConfig {
    pub advanced: TierThreshold,
    pub proficient: TierThreshold,
    pub developing: TierThreshold,
    pub improvement_gain: f64,
    pub struggle_accuracy: f64,
    pub consistency_insight: f64,
    pub strength_accuracy: f64,
    pub weakness_accuracy: f64,
    pub topic_min_attempts: usize,
}

impl Default for MasteryConfig {
    fn default() -> Self {
        Self {
            advanced: TierThreshold {
                accuracy: 0.9,
                speed: 2.0,
                hint_ratio: 0.5,
            },
            proficient: TierThreshold {
                accuracy: 0.8,
                speed: 1.5,
                hint_ratio: 1.0,
            },
            developing: TierThreshold {
                accuracy: 0.6,
                speed: 1.0,
                hint_ratio: f64::INFINITY,
            },
            improvement_gain: 0.1,
            struggle_accuracy: 0.5,
            consistency_insight: 0.8,
            strength_accuracy: 0.8,
            weakness_accuracy: 0.6,
            topic_min_attempts: 2,
        }
    }
}

//
// ─── ENGINE ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub persistence: PersistenceConfig,
    pub lesson: LessonConfig,
    pub adaptive: AdaptiveConfig,
    pub mastery: MasteryConfig,
}

impl EngineConfig {
    /// Parse a (possibly partial) TOML document and validate it.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Parse` for malformed TOML or `ConfigError::OutOfRange`
    /// from [`EngineConfig::validate`].
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Check value ranges.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::OutOfRange` naming the first bad field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        fn check(ok: bool, field: &'static str, expected: &'static str) -> Result<(), ConfigError> {
            if ok {
                Ok(())
            } else {
                Err(ConfigError::OutOfRange { field, expected })
            }
        }
        let unit = |v: f64| (0.0..=1.0).contains(&v);

        check(
            !self.persistence.save_key.trim().is_empty(),
            "persistence.save_key",
            "non-empty",
        )?;
        check(
            self.persistence.autosave_debounce_ms > 0,
            "persistence.autosave_debounce_ms",
            "positive",
        )?;
        check(
            self.persistence.session_tick_secs > 0,
            "persistence.session_tick_secs",
            "positive",
        )?;
        check(
            self.lesson.max_assessment_attempts > 0,
            "lesson.max_assessment_attempts",
            "positive",
        )?;
        check(
            self.lesson.max_attempts_per_question > 0,
            "lesson.max_attempts_per_question",
            "positive",
        )?;
        check(
            self.lesson.default_passing_score <= 100,
            "lesson.default_passing_score",
            "at most 100",
        )?;
        check(
            unit(self.lesson.apply_confidence),
            "lesson.apply_confidence",
            "within [0, 1]",
        )?;
        check(
            self.lesson.adaptation_window >= self.adaptive.min_attempts,
            "lesson.adaptation_window",
            "at least adaptive.min_attempts",
        )?;
        check(
            self.adaptive.min_attempts >= 1,
            "adaptive.min_attempts",
            "at least 1",
        )?;
        check(
            self.adaptive.trend_min_attempts >= 2,
            "adaptive.trend_min_attempts",
            "at least 2",
        )?;
        let mastery = &self.mastery;
        check(
            mastery.advanced.accuracy >= mastery.proficient.accuracy
                && mastery.proficient.accuracy >= mastery.developing.accuracy,
            "mastery tiers",
            "ordered by accuracy",
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        EngineConfig::default().validate().unwrap();
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config = EngineConfig::from_toml_str(
            r#"
            [persistence]
            autosave_debounce_ms = 250

            [adaptive]
            high_accuracy = 0.9
            "#,
        )
        .unwrap();
        assert_eq!(config.persistence.autosave_debounce_ms, 250);
        assert_eq!(config.persistence.session_tick_secs, 60);
        assert_eq!(config.persistence.save_key, "cat-chronicles-save");
        assert_eq!(config.adaptive.high_accuracy, 0.9);
        assert_eq!(config.adaptive.min_attempts, 2);
        assert_eq!(config.lesson.max_assessment_attempts, 3);
    }

    #[test]
    fn out_of_range_values_are_rejected() {
        let err = EngineConfig::from_toml_str("[lesson]\napply_confidence = 1.5\n").unwrap_err();
        assert!(matches!(
            err,
            ConfigError::OutOfRange {
                field: "lesson.apply_confidence",
                ..
            }
        ));

        let err = EngineConfig::from_toml_str("[persistence]\nsession_tick_secs = 0\n").unwrap_err();
        assert_eq!(err.to_string(), "persistence.session_tick_secs must be positive");
    }

    #[test]
    fn malformed_toml_is_a_parse_error() {
        let err = EngineConfig::from_toml_str("[lesson\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }
}
