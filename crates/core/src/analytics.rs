//! Pure performance metrics over a finished assessment session.

use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::config::{MasteryConfig, TierThreshold};
use crate::model::{
    AssessmentSession, Attempt, LearnerId, MasteryLevel, MasteryProgression, PerformanceRecord,
};

const ROLLING_WINDOW: usize = 3;

// ─── Statistics ────────────────────────────────────────────────────────────────

#[must_use]
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Second-half mean minus first-half mean, split at `len / 2`.
#[must_use]
pub fn half_split_trend(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let (first, second) = values.split_at(values.len() / 2);
    mean(second) - mean(first)
}

/// Population variance of the accuracy over each 3-attempt rolling window.
/// Zero when there are fewer than three attempts.
#[must_use]
pub fn rolling_accuracy_variance(attempts: &[Attempt]) -> f64 {
    let accuracies: Vec<f64> = attempts
        .windows(ROLLING_WINDOW)
        .map(correct_share)
        .collect();
    if accuracies.is_empty() {
        return 0.0;
    }
    let m = mean(&accuracies);
    accuracies.iter().map(|a| (a - m).powi(2)).sum::<f64>() / accuracies.len() as f64
}

/// Share of attempts that were correct.
#[must_use]
pub fn correct_share(attempts: &[Attempt]) -> f64 {
    share(attempts, |a| a.is_correct)
}

/// Share of attempts matching `pred`; 0 for an empty slice.
pub fn share(attempts: &[Attempt], pred: impl Fn(&Attempt) -> bool) -> f64 {
    if attempts.is_empty() {
        return 0.0;
    }
    attempts.iter().filter(|a| pred(a)).count() as f64 / attempts.len() as f64
}

// ─── Session metrics ───────────────────────────────────────────────────────────

/// Attempts per minute of recorded answer time.
#[must_use]
pub fn speed(session: &AssessmentSession) -> f64 {
    let total_ms = session.time_spent_ms();
    if session.attempts().is_empty() || total_ms == 0 {
        return 0.0;
    }
    session.attempts().len() as f64 / (total_ms as f64 / 60_000.0)
}

/// Accuracy per unit of speed.
#[must_use]
pub fn efficiency(session: &AssessmentSession) -> f64 {
    let speed = speed(session);
    if speed > 0.0 {
        session.accuracy() / speed
    } else {
        0.0
    }
}

/// `1 - variance` of rolling accuracy; 1 with fewer than three attempts.
#[must_use]
pub fn consistency(session: &AssessmentSession) -> f64 {
    if session.attempts().len() < ROLLING_WINDOW {
        return 1.0;
    }
    (1.0 - rolling_accuracy_variance(session.attempts())).max(0.0)
}

/// Mean attempt number across attempts.
#[must_use]
pub fn average_attempts(attempts: &[Attempt]) -> f64 {
    if attempts.is_empty() {
        return 0.0;
    }
    attempts.iter().map(|a| f64::from(a.attempt_number)).sum::<f64>() / attempts.len() as f64
}

fn hint_ratio(session: &AssessmentSession) -> f64 {
    let questions = session.questions().len();
    if questions == 0 {
        return 0.0;
    }
    f64::from(session.total_hints_used()) / questions as f64
}

fn expected_total_ms(session: &AssessmentSession) -> u64 {
    session.questions().iter().map(|q| q.expected_time_ms).sum()
}

#[must_use]
pub fn mastery_level(session: &AssessmentSession, config: &MasteryConfig) -> MasteryLevel {
    let accuracy = session.accuracy();
    let speed = speed(session);
    let hints = hint_ratio(session);
    let meets = |t: &TierThreshold| {
        accuracy >= t.accuracy && speed >= t.speed && hints <= t.hint_ratio
    };

    if meets(&config.advanced) {
        MasteryLevel::Advanced
    } else if meets(&config.proficient) {
        MasteryLevel::Proficient
    } else if meets(&config.developing) {
        MasteryLevel::Developing
    } else {
        MasteryLevel::Novice
    }
}

/// Base 0.5, plus sane pacing, completion and moderate hint use. Capped at 1.
#[must_use]
pub fn engagement(session: &AssessmentSession) -> f64 {
    let mut score = 0.5;

    let attempts = session.attempts().len();
    let questions = session.questions().len();
    if attempts > 0 && questions > 0 {
        let average_time = session.time_spent_ms() as f64 / attempts as f64;
        let expected = expected_total_ms(session) as f64 / questions as f64;
        if expected > 0.0 {
            let ratio = average_time / expected;
            if (0.5..=2.0).contains(&ratio) {
                score += 0.2;
            }
        }
    }
    if session.is_complete() {
        score += 0.2;
    }
    let hints = hint_ratio(session);
    if hints > 0.0 && hints <= 1.0 {
        score += 0.1;
    }
    f64::min(1.0, score)
}

/// Base 0.5, plus retries, finishing despite low accuracy, and time invested. Capped at 1.
#[must_use]
pub fn persistence(session: &AssessmentSession) -> f64 {
    let mut score = 0.5;

    let avg = average_attempts(session.attempts());
    if avg > 1.0 {
        score += f64::min(0.3, (avg - 1.0) * 0.1);
    }
    if session.is_complete() && session.accuracy() < 0.7 {
        score += 0.2;
    }
    let expected = expected_total_ms(session) as f64;
    if session.time_spent_ms() as f64 >= expected * 0.8 {
        score += 0.1;
    }
    f64::min(1.0, score)
}

/// (correct, total) attempts per question topic.
fn topic_tallies(session: &AssessmentSession) -> BTreeMap<&str, (usize, usize)> {
    let mut tallies = BTreeMap::new();
    for attempt in session.attempts() {
        if let Some(question) = session.question(&attempt.question_id) {
            let entry = tallies.entry(question.topic.as_str()).or_insert((0, 0));
            entry.1 += 1;
            if attempt.is_correct {
                entry.0 += 1;
            }
        }
    }
    tallies
}

/// Topics at or above the strength threshold, and at or below the weakness threshold.
#[must_use]
pub fn topic_strengths_and_weaknesses(
    session: &AssessmentSession,
    config: &MasteryConfig,
) -> (Vec<String>, Vec<String>) {
    let mut strengths = Vec::new();
    let mut weaknesses = Vec::new();
    for (topic, (correct, total)) in topic_tallies(session) {
        if total < config.topic_min_attempts {
            continue;
        }
        let accuracy = correct as f64 / total as f64;
        if accuracy >= config.strength_accuracy {
            strengths.push(topic.to_owned());
        }
        if accuracy <= config.weakness_accuracy {
            weaknesses.push(topic.to_owned());
        }
    }
    (strengths, weaknesses)
}

#[must_use]
pub fn completion_rate(session: &AssessmentSession) -> f64 {
    if session.is_complete() {
        return 1.0;
    }
    let questions = session.questions().len();
    if questions == 0 {
        return 0.0;
    }
    f64::min(1.0, session.attempts().len() as f64 / questions as f64)
}

/// Build the immutable snapshot for a finished session.
#[must_use]
pub fn performance_record(
    session: &AssessmentSession,
    learner: &LearnerId,
    now: DateTime<Utc>,
    config: &MasteryConfig,
) -> PerformanceRecord {
    let (topic_strengths, topic_weaknesses) = topic_strengths_and_weaknesses(session, config);
    let question_kinds: BTreeSet<String> = session
        .questions()
        .iter()
        .filter_map(|q| serde_json::to_value(q.kind).ok())
        .filter_map(|v| v.as_str().map(str::to_owned))
        .collect();

    PerformanceRecord {
        session_id: session.id(),
        learner_id: learner.clone(),
        lesson_id: session.lesson_id().clone(),
        recorded_at: session.ended_at().unwrap_or(now),
        accuracy: session.accuracy(),
        speed: speed(session),
        efficiency: efficiency(session),
        consistency: consistency(session),
        total_questions: session.questions().len(),
        total_attempts: session.attempts().len(),
        hints_used: session.total_hints_used(),
        average_attempts: average_attempts(session.attempts()),
        time_spent_ms: session.time_spent_ms(),
        initial_difficulty: session.initial_difficulty(),
        final_difficulty: session.current_difficulty(),
        difficulty_adjustments: session.difficulty_changes().len(),
        mastery_level: mastery_level(session, config),
        engagement: engagement(session),
        persistence: persistence(session),
        topic_strengths,
        topic_weaknesses,
        question_kinds: question_kinds.into_iter().collect(),
        completion_rate: completion_rate(session),
    }
}

// ─── Report helpers ────────────────────────────────────────────────────────────

/// Accuracy change per record across the last five records.
#[must_use]
pub fn improvement_rate(history: &[PerformanceRecord]) -> f64 {
    let recent = &history[history.len().saturating_sub(5)..];
    match (recent.first(), recent.last()) {
        (Some(first), Some(last)) if recent.len() >= 2 => {
            (last.accuracy - first.accuracy) / recent.len() as f64
        }
        _ => 0.0,
    }
}

fn expected_ms(session: &AssessmentSession, attempt: &Attempt) -> Option<u64> {
    session
        .question(&attempt.question_id)
        .map(|q| q.expected_time_ms)
}

#[must_use]
pub fn frustration_indicators(session: &AssessmentSession) -> Vec<String> {
    let questions = session.questions().len() as f64;
    let mut indicators = Vec::new();

    if f64::from(session.total_hints_used()) > questions * 1.5 {
        indicators.push("High hint usage".to_owned());
    }
    let long = session
        .attempts()
        .iter()
        .filter(|a| expected_ms(session, a).is_some_and(|e| a.time_spent_ms > e * 2))
        .count();
    if long as f64 > questions * 0.5 {
        indicators.push("Extended time on questions".to_owned());
    }
    let retried = session
        .attempts()
        .iter()
        .filter(|a| a.attempt_number > 2)
        .count();
    if retried as f64 > questions * 0.3 {
        indicators.push("Multiple attempts needed".to_owned());
    }
    indicators
}

#[must_use]
pub fn success_patterns(session: &AssessmentSession) -> Vec<String> {
    let questions = session.questions().len() as f64;
    let mut patterns = Vec::new();

    let fast_correct = session
        .attempts()
        .iter()
        .filter(|a| {
            a.is_correct
                && expected_ms(session, a).is_some_and(|e| (a.time_spent_ms as f64) < e as f64 * 0.8)
        })
        .count();
    if fast_correct as f64 > questions * 0.4 {
        patterns.push("Quick accurate responses".to_owned());
    }
    if session.total_hints_used() == 0 && session.accuracy() > 0.7 {
        patterns.push("Independent problem solving".to_owned());
    }
    let first_try = session
        .attempts()
        .iter()
        .filter(|a| a.is_correct && a.attempt_number == 1)
        .count();
    if first_try as f64 > questions * 0.7 {
        patterns.push("First attempt success".to_owned());
    }
    patterns
}

/// Recommendations by accuracy band, plus a rest suggestion when the session
/// fell below the recent average.
#[must_use]
pub fn next_steps(session: &AssessmentSession, history: &[PerformanceRecord]) -> Vec<String> {
    let accuracy = session.accuracy();
    let mut steps: Vec<String> = if accuracy >= 0.8 {
        vec![
            "Ready for advanced topics".into(),
            "Consider exploring related concepts".into(),
        ]
    } else if accuracy >= 0.6 {
        vec!["Practice similar problems".into(), "Review key concepts".into()]
    } else {
        vec![
            "Revisit lesson materials".into(),
            "Focus on foundational concepts".into(),
            "Consider additional practice".into(),
        ]
    };

    if history.len() >= 3 {
        let recent: Vec<f64> = history[history.len() - 3..]
            .iter()
            .map(|r| r.accuracy)
            .collect();
        if mean(&recent) > accuracy {
            steps.push("Take a break and return refreshed".into());
        }
    }
    steps
}

/// Up to three most frequent topics, ties broken alphabetically.
#[must_use]
pub fn most_frequent_topics<'a>(topics: impl IntoIterator<Item = &'a String>) -> Vec<String> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for topic in topics {
        *counts.entry(topic.as_str()).or_insert(0) += 1;
    }
    let mut ranked: Vec<(&str, usize)> = counts.into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
    ranked.into_iter().take(3).map(|(t, _)| t.to_owned()).collect()
}

/// Compare the two most recent records' tiers.
#[must_use]
pub fn mastery_progression(history: &[PerformanceRecord]) -> MasteryProgression {
    match history {
        [] => MasteryProgression::NoData,
        [only] => MasteryProgression::Level(only.mastery_level),
        [.., previous, recent] => match recent.mastery_level.cmp(&previous.mastery_level) {
            std::cmp::Ordering::Greater => MasteryProgression::Improving,
            std::cmp::Ordering::Less => MasteryProgression::Declining,
            std::cmp::Ordering::Equal => MasteryProgression::Stable,
        },
    }
}
