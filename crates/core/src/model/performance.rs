use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::model::ids::{LearnerId, LessonId};
use crate::model::question::Difficulty;

//
// ─── MASTERY ───────────────────────────────────────────────────────────────────
//

/// Qualitative mastery tier, ordered from lowest to highest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MasteryLevel {
    Novice,
    Developing,
    Proficient,
    Advanced,
}

impl MasteryLevel {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            MasteryLevel::Novice => "novice",
            MasteryLevel::Developing => "developing",
            MasteryLevel::Proficient => "proficient",
            MasteryLevel::Advanced => "advanced",
        }
    }
}

impl fmt::Display for MasteryLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

//
// ─── PERFORMANCE RECORD ────────────────────────────────────────────────────────
//

/// Snapshot of one finished assessment session. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceRecord {
    pub session_id: Uuid,
    pub learner_id: LearnerId,
    pub lesson_id: LessonId,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub recorded_at: DateTime<Utc>,

    pub accuracy: f64,
    /// Attempts per minute of answer time.
    pub speed: f64,
    pub efficiency: f64,
    pub consistency: f64,

    pub total_questions: usize,
    pub total_attempts: usize,
    pub hints_used: u32,
    pub average_attempts: f64,
    pub time_spent_ms: u64,

    pub initial_difficulty: Difficulty,
    pub final_difficulty: Difficulty,
    pub difficulty_adjustments: usize,

    pub mastery_level: MasteryLevel,
    pub engagement: f64,
    pub persistence: f64,

    pub topic_strengths: Vec<String>,
    pub topic_weaknesses: Vec<String>,
    pub question_kinds: Vec<String>,
    pub completion_rate: f64,
}

//
// ─── INSIGHTS ──────────────────────────────────────────────────────────────────
//

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InsightKind {
    Improvement,
    Mastery,
    Struggle,
    Consistency,
}

/// Qualitative message derived from a new record. Insights only accumulate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Insight {
    pub kind: InsightKind,
    pub message: String,
    pub confidence: f64,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub recorded_at: DateTime<Utc>,
}

//
// ─── TRENDS ────────────────────────────────────────────────────────────────────
//

/// Time slice of history a trend is computed over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrendWindow {
    Week,
    Month,
    #[default]
    All,
}

impl TrendWindow {
    /// Oldest timestamp included in the window, or `None` for all history.
    #[must_use]
    pub fn cutoff(self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            TrendWindow::Week => Some(now - chrono::Duration::days(7)),
            TrendWindow::Month => Some(now - chrono::Duration::days(30)),
            TrendWindow::All => None,
        }
    }
}

/// Mastery movement between the two most recent records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MasteryProgression {
    NoData,
    /// Only one record in the window.
    Level(MasteryLevel),
    Improving,
    Declining,
    Stable,
}

impl fmt::Display for MasteryProgression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MasteryProgression::NoData => f.write_str("No data"),
            MasteryProgression::Level(level) => write!(f, "{level}"),
            MasteryProgression::Improving => f.write_str("Improving"),
            MasteryProgression::Declining => f.write_str("Declining"),
            MasteryProgression::Stable => f.write_str("Stable"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Trend {
    pub accuracy_trend: f64,
    pub speed_trend: f64,
    pub consistency_trend: f64,
    pub engagement_trend: f64,

    pub average_accuracy: f64,
    pub average_speed: f64,
    pub average_consistency: f64,

    pub total_sessions: usize,
    pub total_time_spent_ms: u64,

    pub strongest_topics: Vec<String>,
    pub challenging_topics: Vec<String>,
    pub mastery_progression: MasteryProgression,
}

impl Trend {
    /// Trend over an empty window.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            accuracy_trend: 0.0,
            speed_trend: 0.0,
            consistency_trend: 0.0,
            engagement_trend: 0.0,
            average_accuracy: 0.0,
            average_speed: 0.0,
            average_consistency: 0.0,
            total_sessions: 0,
            total_time_spent_ms: 0,
            strongest_topics: Vec::new(),
            challenging_topics: Vec::new(),
            mastery_progression: MasteryProgression::NoData,
        }
    }
}

//
// ─── ANALYTICS REPORT ──────────────────────────────────────────────────────────
//

/// Per-session report handed to the presentation layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionReport {
    pub session_id: Uuid,
    pub accuracy: f64,
    pub speed: f64,
    pub efficiency: f64,
    pub improvement_rate: f64,
    pub consistency: f64,
    pub mastery_level: MasteryLevel,
    pub engagement: f64,
    pub frustration_indicators: Vec<String>,
    pub success_patterns: Vec<String>,
    pub next_steps: Vec<String>,
    pub review_topics: Vec<String>,
    pub strength_areas: Vec<String>,
}

//
// ─── LEARNER PROFILE ───────────────────────────────────────────────────────────
//

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Low,
    #[default]
    Medium,
    High,
}

/// Learner traits derived from accumulated history, consumed by difficulty adaptation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LearnerProfile {
    pub confidence: Level,
    pub persistence: Level,
    pub hint_usage: Level,
}
