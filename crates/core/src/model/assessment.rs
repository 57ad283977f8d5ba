use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use uuid::Uuid;

use crate::model::ids::{LessonId, QuestionId};
use crate::model::question::{Answer, Difficulty, Question};
use crate::time::elapsed_millis;

/// One recorded answer submission. Immutable once appended to a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attempt {
    pub question_id: QuestionId,
    pub selected_answer: Answer,
    pub is_correct: bool,
    pub time_spent_ms: u64,
    /// Hints requested for this question before the submission.
    pub hints_used: u8,
    /// 1-based count of submissions for this question, including this one.
    pub attempt_number: u32,
    /// Expected answer time of the question, copied for speed signals.
    pub expected_time_ms: u64,
    pub difficulty: Difficulty,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub timestamp: DateTime<Utc>,
}

impl Attempt {
    /// Actual-to-expected time ratio; 1.0 when no expectation is set.
    #[must_use]
    pub fn time_ratio(&self) -> f64 {
        if self.expected_time_ms == 0 {
            return 1.0;
        }
        self.time_spent_ms as f64 / self.expected_time_ms as f64
    }
}

/// A difficulty transition applied mid-session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DifficultyChange {
    pub from: Difficulty,
    pub to: Difficulty,
    pub confidence: f64,
    pub reason: String,
    /// Number of attempts recorded when the change was applied.
    pub after_attempts: usize,
}

/// State of one assessment phase: question order, attempts, hints, difficulty.
///
/// Only appends and forward moves are exposed; recorded attempts never change.
#[derive(Debug, Clone)]
pub struct AssessmentSession {
    id: Uuid,
    lesson_id: LessonId,
    topic: String,
    questions: Vec<Question>,
    attempts: Vec<Attempt>,
    current_index: usize,
    resolved: BTreeSet<QuestionId>,
    hints_by_question: HashMap<QuestionId, u8>,
    total_hints_used: u32,
    initial_difficulty: Difficulty,
    current_difficulty: Difficulty,
    difficulty_changes: Vec<DifficultyChange>,
    is_complete: bool,
    started_at: DateTime<Utc>,
    ended_at: Option<DateTime<Utc>>,
}

impl AssessmentSession {
    #[must_use]
    pub fn new(
        lesson_id: LessonId,
        topic: impl Into<String>,
        questions: Vec<Question>,
        initial_difficulty: Difficulty,
        now: DateTime<Utc>,
    ) -> Self {
        let mut session = Self {
            id: Uuid::new_v4(),
            lesson_id,
            topic: topic.into(),
            questions,
            attempts: Vec::new(),
            current_index: 0,
            resolved: BTreeSet::new(),
            hints_by_question: HashMap::new(),
            total_hints_used: 0,
            initial_difficulty,
            current_difficulty: initial_difficulty,
            difficulty_changes: Vec::new(),
            is_complete: false,
            started_at: now,
            ended_at: None,
        };
        session.select_next();
        session
    }

    // ─── Queries ───────────────────────────────────────────────────────────────

    #[must_use]
    pub fn id(&self) -> Uuid {
        self.id
    }

    #[must_use]
    pub fn lesson_id(&self) -> &LessonId {
        &self.lesson_id
    }

    #[must_use]
    pub fn topic(&self) -> &str {
        &self.topic
    }

    #[must_use]
    pub fn questions(&self) -> &[Question] {
        &self.questions
    }

    #[must_use]
    pub fn question(&self, id: &QuestionId) -> Option<&Question> {
        self.questions.iter().find(|q| &q.id == id)
    }

    #[must_use]
    pub fn attempts(&self) -> &[Attempt] {
        &self.attempts
    }

    /// The question currently presented, or `None` once every question is resolved.
    #[must_use]
    pub fn current_question(&self) -> Option<&Question> {
        if self.resolved.len() >= self.questions.len() {
            return None;
        }
        self.questions.get(self.current_index)
    }

    #[must_use]
    pub fn current_index(&self) -> usize {
        self.current_index
    }

    #[must_use]
    pub fn attempts_for(&self, question: &QuestionId) -> u32 {
        let count = self
            .attempts
            .iter()
            .filter(|a| &a.question_id == question)
            .count();
        u32::try_from(count).unwrap_or(u32::MAX)
    }

    #[must_use]
    pub fn hints_for(&self, question: &QuestionId) -> u8 {
        self.hints_by_question.get(question).copied().unwrap_or(0)
    }

    #[must_use]
    pub fn total_hints_used(&self) -> u32 {
        self.total_hints_used
    }

    #[must_use]
    pub fn is_resolved(&self, question: &QuestionId) -> bool {
        self.resolved.contains(question)
    }

    /// Questions answered correctly at least once.
    #[must_use]
    pub fn correct_questions(&self) -> usize {
        self.attempts
            .iter()
            .filter(|a| a.is_correct)
            .map(|a| &a.question_id)
            .collect::<BTreeSet<_>>()
            .len()
    }

    /// Correct attempts over all attempts; 0 before the first attempt.
    #[must_use]
    pub fn accuracy(&self) -> f64 {
        if self.attempts.is_empty() {
            return 0.0;
        }
        let correct = self.attempts.iter().filter(|a| a.is_correct).count();
        correct as f64 / self.attempts.len() as f64
    }

    #[must_use]
    pub fn initial_difficulty(&self) -> Difficulty {
        self.initial_difficulty
    }

    #[must_use]
    pub fn current_difficulty(&self) -> Difficulty {
        self.current_difficulty
    }

    #[must_use]
    pub fn difficulty_changes(&self) -> &[DifficultyChange] {
        &self.difficulty_changes
    }

    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.is_complete
    }

    #[must_use]
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    #[must_use]
    pub fn ended_at(&self) -> Option<DateTime<Utc>> {
        self.ended_at
    }

    /// Sum of recorded answer times.
    #[must_use]
    pub fn time_spent_ms(&self) -> u64 {
        self.attempts.iter().map(|a| a.time_spent_ms).sum()
    }

    /// Wall-clock length of the session up to `now` or its end.
    #[must_use]
    pub fn duration_ms(&self, now: DateTime<Utc>) -> u64 {
        elapsed_millis(self.started_at, self.ended_at.unwrap_or(now))
    }

    // ─── Transitions ───────────────────────────────────────────────────────────

    /// Append an attempt.
    pub fn record_attempt(&mut self, attempt: Attempt) {
        self.attempts.push(attempt);
    }

    /// Count one hint for `question`; returns the new per-question total.
    pub fn record_hint(&mut self, question: &QuestionId) -> u8 {
        self.total_hints_used = self.total_hints_used.saturating_add(1);
        let used = self.hints_by_question.entry(question.clone()).or_insert(0);
        *used = used.saturating_add(1);
        *used
    }

    /// Mark `question` as done and move to the next question.
    pub fn resolve(&mut self, question: &QuestionId) {
        self.resolved.insert(question.clone());
        self.select_next();
    }

    /// Switch the active difficulty. Returns `false` when already at `to`.
    pub fn change_difficulty(&mut self, to: Difficulty, confidence: f64, reason: String) -> bool {
        if self.current_difficulty == to {
            return false;
        }
        self.difficulty_changes.push(DifficultyChange {
            from: self.current_difficulty,
            to,
            confidence,
            reason,
            after_attempts: self.attempts.len(),
        });
        self.current_difficulty = to;
        // The presented question is kept only if it still has attempts on it.
        let current_started = self
            .questions
            .get(self.current_index)
            .is_some_and(|q| self.attempts_for(&q.id) > 0);
        if !current_started {
            self.select_next();
        }
        true
    }

    /// Close the session. Further transitions are the caller's error to prevent.
    pub fn complete(&mut self, now: DateTime<Utc>) {
        if !self.is_complete {
            self.is_complete = true;
            self.ended_at = Some(now);
        }
    }

    /// Point `current_index` at the unresolved question closest to the active
    /// difficulty, preferring definition order among equals.
    fn select_next(&mut self) {
        let target = self.current_difficulty;
        let next = self
            .questions
            .iter()
            .enumerate()
            .filter(|(_, q)| !self.resolved.contains(&q.id))
            .min_by_key(|(index, q)| (q.difficulty.distance(target), *index))
            .map(|(index, _)| index);
        if let Some(index) = next {
            self.current_index = index;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::lesson::fixtures::question;
    use crate::time::fixed_now;

    fn session(initial: Difficulty) -> AssessmentSession {
        AssessmentSession::new(
            LessonId::new("hieroglyphics"),
            "symbols",
            vec![
                question("q1", "bird", Difficulty::Easy),
                question("q2", "sun", Difficulty::Medium),
                question("q3", "eye", Difficulty::Hard),
            ],
            initial,
            fixed_now(),
        )
    }

    fn attempt(question: &str, correct: bool) -> Attempt {
        Attempt {
            question_id: QuestionId::new(question),
            selected_answer: Answer::single("x"),
            is_correct: correct,
            time_spent_ms: 10_000,
            hints_used: 0,
            attempt_number: 1,
            expected_time_ms: 30_000,
            difficulty: Difficulty::Medium,
            timestamp: fixed_now(),
        }
    }

    #[test]
    fn first_question_matches_initial_difficulty() {
        let s = session(Difficulty::Medium);
        assert_eq!(s.current_question().unwrap().id.as_str(), "q2");
        let s = session(Difficulty::Hard);
        assert_eq!(s.current_question().unwrap().id.as_str(), "q3");
    }

    #[test]
    fn resolving_falls_back_to_nearest_difficulty() {
        let mut s = session(Difficulty::Medium);
        s.resolve(&QuestionId::new("q2"));
        // Easy and Hard are both one step away; definition order wins.
        assert_eq!(s.current_question().unwrap().id.as_str(), "q1");
        s.resolve(&QuestionId::new("q1"));
        assert_eq!(s.current_question().unwrap().id.as_str(), "q3");
        s.resolve(&QuestionId::new("q3"));
        assert!(s.current_question().is_none());
    }

    #[test]
    fn difficulty_change_reorders_unstarted_question() {
        let mut s = session(Difficulty::Medium);
        assert!(s.change_difficulty(Difficulty::Hard, 0.9, "mastery".into()));
        assert_eq!(s.current_question().unwrap().id.as_str(), "q3");
        assert!(!s.change_difficulty(Difficulty::Hard, 0.9, "again".into()));
        assert_eq!(s.difficulty_changes().len(), 1);
    }

    #[test]
    fn difficulty_change_keeps_started_question() {
        let mut s = session(Difficulty::Medium);
        s.record_attempt(attempt("q2", false));
        s.change_difficulty(Difficulty::Easy, 0.8, "struggle".into());
        assert_eq!(s.current_question().unwrap().id.as_str(), "q2");
    }

    #[test]
    fn accuracy_counts_attempts_and_score_counts_questions() {
        let mut s = session(Difficulty::Medium);
        s.record_attempt(attempt("q2", false));
        s.record_attempt(attempt("q2", true));
        s.record_attempt(attempt("q1", true));
        assert!((s.accuracy() - 2.0 / 3.0).abs() < 1e-9);
        assert_eq!(s.correct_questions(), 2);
        assert_eq!(s.attempts_for(&QuestionId::new("q2")), 2);
        assert_eq!(s.time_spent_ms(), 30_000);
    }

    #[test]
    fn hints_are_tracked_per_question() {
        let mut s = session(Difficulty::Medium);
        assert_eq!(s.record_hint(&QuestionId::new("q2")), 1);
        assert_eq!(s.record_hint(&QuestionId::new("q2")), 2);
        assert_eq!(s.record_hint(&QuestionId::new("q1")), 1);
        assert_eq!(s.total_hints_used(), 3);
        assert_eq!(s.hints_for(&QuestionId::new("q3")), 0);
    }
}
