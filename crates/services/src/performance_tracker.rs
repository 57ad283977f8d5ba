use std::collections::HashMap;
use tracing::debug;

use chronicle_core::analytics::{
    frustration_indicators, half_split_trend, improvement_rate, mastery_progression, mean,
    most_frequent_topics, next_steps, performance_record, success_patterns,
};
use chronicle_core::config::MasteryConfig;
use chronicle_core::model::{
    AssessmentSession, Insight, InsightKind, LearnerId, LearnerProfile, Level, MasteryLevel,
    PerformanceRecord, SessionReport, Trend, TrendWindow,
};
use chronicle_core::time::Clock;

/// Records looked at when deriving a learner profile.
const PROFILE_WINDOW: usize = 3;

/// Append-only performance history and insights, per learner.
///
/// Records and insights are never edited or removed once added.
#[derive(Debug, Default)]
pub struct PerformanceTracker {
    clock: Clock,
    config: MasteryConfig,
    history: HashMap<LearnerId, Vec<PerformanceRecord>>,
    insights: HashMap<LearnerId, Vec<Insight>>,
}

impl PerformanceTracker {
    #[must_use]
    pub fn new(config: MasteryConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    /// Override the clock (usually for deterministic testing).
    #[must_use]
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn clock_mut(&mut self) -> &mut Clock {
        &mut self.clock
    }

    /// Snapshot a finished session into the learner's history and derive
    /// insights from it.
    pub fn record(&mut self, learner: &LearnerId, session: &AssessmentSession) -> PerformanceRecord {
        let now = self.clock.now();
        let record = performance_record(session, learner, now, &self.config);
        let previous = self
            .history
            .get(learner)
            .and_then(|history| history.last())
            .map(|r| r.accuracy);

        let new_insights = self.derive_insights(&record, previous);
        debug!(
            learner = %learner,
            lesson = %record.lesson_id,
            mastery = %record.mastery_level,
            insights = new_insights.len(),
            "performance recorded"
        );
        self.insights
            .entry(learner.clone())
            .or_default()
            .extend(new_insights);
        self.history
            .entry(learner.clone())
            .or_default()
            .push(record.clone());
        record
    }

    fn derive_insights(
        &self,
        record: &PerformanceRecord,
        previous_accuracy: Option<f64>,
    ) -> Vec<Insight> {
        let c = &self.config;
        let now = record.recorded_at;
        let insight = |kind, message: String, confidence| Insight {
            kind,
            message,
            confidence,
            recorded_at: now,
        };
        let mut out = Vec::new();

        if let Some(previous) = previous_accuracy {
            let gain = record.accuracy - previous;
            if gain >= c.improvement_gain {
                out.push(insight(
                    InsightKind::Improvement,
                    format!(
                        "Great progress! Your accuracy improved by {}%",
                        (gain * 100.0).round()
                    ),
                    0.8,
                ));
            }
        }
        if record.mastery_level >= MasteryLevel::Proficient {
            out.push(insight(
                InsightKind::Mastery,
                format!(
                    "You've achieved {} level in {}!",
                    record.mastery_level, record.lesson_id
                ),
                0.9,
            ));
        }
        if record.accuracy < c.struggle_accuracy
            && record.hints_used as usize > record.question_kinds.len()
        {
            out.push(insight(
                InsightKind::Struggle,
                "Consider reviewing the lesson material before trying again".to_owned(),
                0.7,
            ));
        }
        if record.consistency >= c.consistency_insight {
            out.push(insight(
                InsightKind::Consistency,
                "You show consistent performance - great learning stability!".to_owned(),
                0.8,
            ));
        }
        out
    }

    /// Record the session and build the full report for it.
    pub fn analyze(&mut self, learner: &LearnerId, session: &AssessmentSession) -> SessionReport {
        let record = self.record(learner, session);
        self.report(learner, record, session)
    }

    /// Build the report for a session without adding it to the history.
    #[must_use]
    pub fn review(&self, learner: &LearnerId, session: &AssessmentSession) -> SessionReport {
        let record = performance_record(session, learner, self.clock.now(), &self.config);
        self.report(learner, record, session)
    }

    fn report(
        &self,
        learner: &LearnerId,
        record: PerformanceRecord,
        session: &AssessmentSession,
    ) -> SessionReport {
        let history = self.history(learner);

        SessionReport {
            session_id: record.session_id,
            accuracy: record.accuracy,
            speed: record.speed,
            efficiency: record.efficiency,
            improvement_rate: improvement_rate(history),
            consistency: record.consistency,
            mastery_level: record.mastery_level,
            engagement: record.engagement,
            frustration_indicators: frustration_indicators(session),
            success_patterns: success_patterns(session),
            next_steps: next_steps(session, history),
            review_topics: record.topic_weaknesses,
            strength_areas: record.topic_strengths,
        }
    }

    #[must_use]
    pub fn history(&self, learner: &LearnerId) -> &[PerformanceRecord] {
        self.history.get(learner).map_or(&[], Vec::as_slice)
    }

    #[must_use]
    pub fn insights(&self, learner: &LearnerId) -> &[Insight] {
        self.insights.get(learner).map_or(&[], Vec::as_slice)
    }

    /// Averages and slopes over the records inside `window`.
    #[must_use]
    pub fn trends(&self, learner: &LearnerId, window: TrendWindow) -> Trend {
        let cutoff = window.cutoff(self.clock.now());
        let records: Vec<&PerformanceRecord> = self
            .history(learner)
            .iter()
            .filter(|r| cutoff.is_none_or(|c| r.recorded_at >= c))
            .collect();
        if records.is_empty() {
            return Trend::empty();
        }

        let series = |f: fn(&PerformanceRecord) -> f64| -> Vec<f64> {
            records.iter().map(|r| f(r)).collect()
        };
        let accuracy = series(|r| r.accuracy);
        let speed = series(|r| r.speed);
        let consistency = series(|r| r.consistency);
        let engagement = series(|r| r.engagement);
        let owned: Vec<PerformanceRecord> = records.iter().map(|r| (*r).clone()).collect();

        Trend {
            accuracy_trend: half_split_trend(&accuracy),
            speed_trend: half_split_trend(&speed),
            consistency_trend: half_split_trend(&consistency),
            engagement_trend: half_split_trend(&engagement),
            average_accuracy: mean(&accuracy),
            average_speed: mean(&speed),
            average_consistency: mean(&consistency),
            total_sessions: records.len(),
            total_time_spent_ms: records.iter().map(|r| r.time_spent_ms).sum(),
            strongest_topics: most_frequent_topics(records.iter().flat_map(|r| &r.topic_strengths)),
            challenging_topics: most_frequent_topics(
                records.iter().flat_map(|r| &r.topic_weaknesses),
            ),
            mastery_progression: mastery_progression(&owned),
        }
    }

    /// Learner traits from the most recent records: confidence from accuracy,
    /// persistence from persistence scores, hint usage from hints per question.
    /// A learner without history gets the neutral profile.
    #[must_use]
    pub fn profile(&self, learner: &LearnerId) -> LearnerProfile {
        let history = self.history(learner);
        if history.is_empty() {
            return LearnerProfile::default();
        }
        let recent = &history[history.len().saturating_sub(PROFILE_WINDOW)..];

        let accuracy = mean(&recent.iter().map(|r| r.accuracy).collect::<Vec<_>>());
        let persistence = mean(&recent.iter().map(|r| r.persistence).collect::<Vec<_>>());
        let hints_per_question = mean(
            &recent
                .iter()
                .map(|r| f64::from(r.hints_used) / r.total_questions.max(1) as f64)
                .collect::<Vec<_>>(),
        );

        LearnerProfile {
            confidence: band(accuracy, 0.5, 0.8),
            persistence: band(persistence, 0.4, 0.7),
            hint_usage: if hints_per_question == 0.0 {
                Level::Low
            } else if hints_per_question >= 1.0 {
                Level::High
            } else {
                Level::Medium
            },
        }
    }
}

fn band(value: f64, low_below: f64, high_from: f64) -> Level {
    if value < low_below {
        Level::Low
    } else if value >= high_from {
        Level::High
    } else {
        Level::Medium
    }
}
