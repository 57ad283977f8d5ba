//! Difficulty adaptation from a rolling window of recent attempts.
//!
//! The adapter is a pure function: it reads attempts, the active difficulty and
//! a learner profile, and recommends at most one step up or down together with
//! a confidence in `[0, 1]` and a human-readable reason.

use serde::Serialize;
use std::fmt;

use crate::analytics::{correct_share, half_split_trend, mean, rolling_accuracy_variance, share};
use crate::config::AdaptiveConfig;
use crate::model::{Attempt, Difficulty, LearnerProfile, Level};

//
// ─── SIGNALS ───────────────────────────────────────────────────────────────────
//

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Pattern {
    FastAndAccurate,
    HintIndependent,
    FirstAttemptSuccess,
    ConsistentPerformance,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StruggleIndicator {
    HighHintUsage,
    MultipleAttempts,
    SlowResponses,
    LowAccuracy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MasteryIndicator {
    HighAccuracy,
    FastResponses,
    HintIndependent,
    FirstAttemptMastery,
}

/// Signals computed over the attempt window.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WindowAnalysis {
    pub accuracy: f64,
    pub average_time_ms: f64,
    pub total_hints: u32,
    pub average_attempts: f64,
    /// Later-half accuracy minus earlier-half accuracy.
    pub accuracy_trend: f64,
    /// Earlier-half time ratio minus later-half time ratio; positive means faster.
    pub speed_trend: f64,
    pub patterns: Vec<Pattern>,
    pub struggle: Vec<StruggleIndicator>,
    pub mastery: Vec<MasteryIndicator>,
}

/// Direction of a recommended change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Increase,
    Decrease,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Recommendation {
    pub direction: Direction,
    pub to: Difficulty,
    pub reason: String,
    pub confidence: f64,
}

impl fmt::Display for Recommendation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:?} to {} ({:.2}): {}",
            self.direction, self.to, self.confidence, self.reason
        )
    }
}

//
// ─── ADAPTER ───────────────────────────────────────────────────────────────────
//

#[derive(Debug, Clone, Default)]
pub struct DifficultyAdapter {
    config: AdaptiveConfig,
}

impl DifficultyAdapter {
    #[must_use]
    pub fn new(config: AdaptiveConfig) -> Self {
        Self { config }
    }

    #[must_use]
    pub fn config(&self) -> &AdaptiveConfig {
        &self.config
    }

    /// Recommend a difficulty change, or `None` when the window is too small or
    /// no rule fires.
    #[must_use]
    pub fn recommend(
        &self,
        recent: &[Attempt],
        current: Difficulty,
        profile: &LearnerProfile,
    ) -> Option<Recommendation> {
        if recent.len() < self.config.min_attempts {
            return None;
        }
        let analysis = self.analyze(recent);

        if self.should_increase(&analysis, current) {
            return Some(Recommendation {
                direction: Direction::Increase,
                to: current.harder(),
                reason: mastery_reason(&analysis.mastery).to_owned(),
                confidence: confidence(&analysis, Direction::Increase),
            });
        }
        if self.should_decrease(&analysis, current) {
            return Some(Recommendation {
                direction: Direction::Decrease,
                to: current.easier(),
                reason: struggle_reason(&analysis.struggle).to_owned(),
                confidence: confidence(&analysis, Direction::Decrease),
            });
        }
        self.profile_adjustment(&analysis, current, profile)
    }

    /// Compute every signal over the window.
    #[must_use]
    pub fn analyze(&self, attempts: &[Attempt]) -> WindowAnalysis {
        let c = &self.config;
        let times: Vec<f64> = attempts.iter().map(|a| a.time_spent_ms as f64).collect();
        let hints: Vec<f64> = attempts.iter().map(|a| f64::from(a.hints_used)).collect();
        let numbers: Vec<f64> = attempts
            .iter()
            .map(|a| f64::from(a.attempt_number))
            .collect();

        let accuracy = correct_share(attempts);
        let average_hints = mean(&hints);
        let average_attempts = mean(&numbers);

        let (accuracy_trend, speed_trend) = if attempts.len() < c.trend_min_attempts {
            (0.0, 0.0)
        } else {
            let correctness: Vec<f64> = attempts
                .iter()
                .map(|a| if a.is_correct { 1.0 } else { 0.0 })
                .collect();
            let ratios: Vec<f64> = attempts.iter().map(Attempt::time_ratio).collect();
            // Falling time ratios mean a faster learner, so the sign is flipped.
            (half_split_trend(&correctness), -half_split_trend(&ratios))
        };

        let no_hints = share(attempts, |a| a.hints_used == 0);
        let first_try = share(attempts, |a| a.is_correct && a.attempt_number == 1);

        let mut patterns = Vec::new();
        if share(attempts, |a| a.is_correct && a.time_ratio() < c.fast_accurate_ratio)
            >= c.fast_accurate_share
        {
            patterns.push(Pattern::FastAndAccurate);
        }
        if no_hints >= c.hint_independent_share {
            patterns.push(Pattern::HintIndependent);
        }
        if first_try >= c.first_attempt_success_share {
            patterns.push(Pattern::FirstAttemptSuccess);
        }
        if rolling_accuracy_variance(attempts) < c.consistent_variance {
            patterns.push(Pattern::ConsistentPerformance);
        }

        let mut struggle = Vec::new();
        if average_hints > c.high_hint_average {
            struggle.push(StruggleIndicator::HighHintUsage);
        }
        if average_attempts > c.multiple_attempts_average {
            struggle.push(StruggleIndicator::MultipleAttempts);
        }
        if share(attempts, |a| a.time_ratio() > c.slow_ratio) >= c.slow_share {
            struggle.push(StruggleIndicator::SlowResponses);
        }
        if accuracy < c.low_accuracy {
            struggle.push(StruggleIndicator::LowAccuracy);
        }

        let mut mastery = Vec::new();
        if accuracy >= c.high_accuracy {
            mastery.push(MasteryIndicator::HighAccuracy);
        }
        if share(attempts, |a| a.time_ratio() < c.fast_ratio) >= c.fast_share {
            mastery.push(MasteryIndicator::FastResponses);
        }
        if no_hints >= c.hint_independent_share {
            mastery.push(MasteryIndicator::HintIndependent);
        }
        if first_try >= c.first_attempt_mastery_share {
            mastery.push(MasteryIndicator::FirstAttemptMastery);
        }

        WindowAnalysis {
            accuracy,
            average_time_ms: mean(&times),
            total_hints: attempts.iter().map(|a| u32::from(a.hints_used)).sum(),
            average_attempts,
            accuracy_trend,
            speed_trend,
            patterns,
            struggle,
            mastery,
        }
    }

    fn should_increase(&self, a: &WindowAnalysis, current: Difficulty) -> bool {
        if current == Difficulty::Hard {
            return false;
        }
        let c = &self.config;
        (a.accuracy >= c.increase_accuracy_with_trend && a.accuracy_trend > c.increase_trend)
            || (a.accuracy >= c.increase_accuracy_with_speed && a.speed_trend > c.increase_speed_trend)
            || a.mastery.len() >= c.increase_mastery_indicators
            || (a.accuracy >= c.increase_accuracy_steady && a.accuracy_trend >= 0.0)
    }

    fn should_decrease(&self, a: &WindowAnalysis, current: Difficulty) -> bool {
        if current == Difficulty::Easy {
            return false;
        }
        let c = &self.config;
        (a.accuracy <= c.decrease_accuracy_with_trend && a.accuracy_trend < c.decrease_trend)
            || a.struggle.len() >= c.decrease_struggle_indicators
            || a.average_attempts >= c.decrease_average_attempts
            || a.accuracy <= c.decrease_accuracy_floor
    }

    fn profile_adjustment(
        &self,
        a: &WindowAnalysis,
        current: Difficulty,
        profile: &LearnerProfile,
    ) -> Option<Recommendation> {
        let c = &self.config;

        if profile.confidence == Level::Low
            && a.accuracy < c.low_confidence_accuracy
            && current != Difficulty::Easy
        {
            return Some(Recommendation {
                direction: Direction::Decrease,
                to: Difficulty::Easy,
                reason: "Building confidence with easier questions".to_owned(),
                confidence: 0.7,
            });
        }
        if profile.persistence == Level::High
            && a.accuracy >= c.persistence_accuracy
            && current == Difficulty::Easy
        {
            return Some(Recommendation {
                direction: Direction::Increase,
                to: Difficulty::Medium,
                reason: "Ready for more challenge based on persistence".to_owned(),
                confidence: 0.6,
            });
        }
        if profile.hint_usage == Level::High
            && a.total_hints == 0
            && a.accuracy >= c.hint_free_accuracy
            && current != Difficulty::Hard
        {
            return Some(Recommendation {
                direction: Direction::Increase,
                to: current.harder(),
                reason: "Independent problem solving without hints".to_owned(),
                confidence: 0.8,
            });
        }
        None
    }
}

/// 0.5 base, weighted by accuracy, trend and indicator count in the change's direction.
fn confidence(a: &WindowAnalysis, direction: Direction) -> f64 {
    let score = match direction {
        Direction::Increase => {
            0.5 + a.accuracy * 0.3
                + a.accuracy_trend.max(0.0) * 0.2
                + a.mastery.len() as f64 * 0.1
        }
        Direction::Decrease => {
            0.5 + (1.0 - a.accuracy) * 0.3
                + (-a.accuracy_trend).max(0.0) * 0.2
                + a.struggle.len() as f64 * 0.1
        }
    };
    score.clamp(0.0, 1.0)
}

fn mastery_reason(indicators: &[MasteryIndicator]) -> &'static str {
    let has = |i| indicators.contains(&i);
    if has(MasteryIndicator::FastResponses) && has(MasteryIndicator::HighAccuracy) {
        "Demonstrating speed and accuracy mastery"
    } else if has(MasteryIndicator::FirstAttemptMastery) {
        "Consistently succeeding on first attempts"
    } else if has(MasteryIndicator::HintIndependent) {
        "Solving problems independently without hints"
    } else {
        "Strong performance indicates readiness for challenge"
    }
}

fn struggle_reason(indicators: &[StruggleIndicator]) -> &'static str {
    let has = |i| indicators.contains(&i);
    if has(StruggleIndicator::HighHintUsage) && has(StruggleIndicator::MultipleAttempts) {
        "Needs more support and practice at current level"
    } else if has(StruggleIndicator::SlowResponses) {
        "Taking longer to process questions"
    } else if has(StruggleIndicator::LowAccuracy) {
        "Accuracy indicates need for easier questions"
    } else {
        "Performance suggests need for additional support"
    }
}
