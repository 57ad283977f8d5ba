use chrono::{DateTime, Utc};
use tracing::debug;

use chronicle_core::adaptive::Recommendation;
use chronicle_core::model::{
    Answer, AssessmentSession, Attempt, Difficulty, LessonDefinition, Question, QuestionId,
};

use crate::assessment::feedback::{self, FeedbackTier};
use crate::error::{AssessmentError, SessionStateIssue};

const MAX_HINT_LEVEL: u8 = 3;

//
// ─── RESULTS ───────────────────────────────────────────────────────────────────
//

/// Evaluation of one submitted answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnswerOutcome {
    pub question_id: QuestionId,
    pub is_correct: bool,
    pub feedback: String,
    pub tier: FeedbackTier,
    /// The question is resolved and the next one is presented.
    pub should_advance: bool,
    /// Hint level suggested after a miss.
    pub hint_level: Option<u8>,
    pub attempt_number: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HintResponse {
    pub hint: String,
    pub level: u8,
    pub is_last_hint: bool,
}

/// Outcome of a finalized assessment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinalScore {
    /// Percentage of questions answered correctly, rounded.
    pub score: u8,
    pub passed: bool,
    pub feedback: String,
    pub encouragement: String,
}

//
// ─── ENGINE ────────────────────────────────────────────────────────────────────
//

/// Runs one assessment session: evaluates answers, escalates hints and
/// produces the final score.
///
/// Once finalized, every further call fails with
/// `AssessmentError::InvalidSessionState`.
#[derive(Debug, Clone)]
pub struct AssessmentEngine {
    session: AssessmentSession,
    passing_score: u8,
    max_attempts_per_question: u32,
    finalized: bool,
}

impl AssessmentEngine {
    #[must_use]
    pub fn new(
        session: AssessmentSession,
        passing_score: u8,
        max_attempts_per_question: u32,
    ) -> Self {
        Self {
            session,
            passing_score,
            max_attempts_per_question: max_attempts_per_question.max(1),
            finalized: false,
        }
    }

    /// Start an assessment over a lesson's questions. The lesson's own passing
    /// score wins over `default_passing_score`.
    #[must_use]
    pub fn for_lesson(
        lesson: &LessonDefinition,
        default_passing_score: u8,
        max_attempts_per_question: u32,
        now: DateTime<Utc>,
    ) -> Self {
        let session = AssessmentSession::new(
            lesson.id.clone(),
            lesson.topic.clone(),
            lesson.assessment.questions.clone(),
            lesson.assessment.initial_difficulty,
            now,
        );
        Self::new(
            session,
            lesson.assessment.passing_score.unwrap_or(default_passing_score),
            max_attempts_per_question,
        )
    }

    #[must_use]
    pub fn session(&self) -> &AssessmentSession {
        &self.session
    }

    #[must_use]
    pub fn into_session(self) -> AssessmentSession {
        self.session
    }

    #[must_use]
    pub fn passing_score(&self) -> u8 {
        self.passing_score
    }

    #[must_use]
    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    /// Question to present next, `None` once every question is resolved.
    #[must_use]
    pub fn current_question(&self) -> Option<&Question> {
        self.session.current_question()
    }

    /// True when every question is resolved and the session can be finalized.
    #[must_use]
    pub fn all_resolved(&self) -> bool {
        self.session.current_question().is_none()
    }

    /// Resolved questions as a percentage of all questions.
    #[must_use]
    pub fn progress_percent(&self) -> f64 {
        let total = self.session.questions().len();
        if total == 0 {
            return 100.0;
        }
        let resolved = self
            .session
            .questions()
            .iter()
            .filter(|q| self.session.is_resolved(&q.id))
            .count();
        resolved as f64 / total as f64 * 100.0
    }

    fn open_question(&self, id: &QuestionId) -> Result<Question, AssessmentError> {
        if self.finalized {
            return Err(AssessmentError::InvalidSessionState(
                SessionStateIssue::Finalized,
            ));
        }
        let Some(question) = self.session.question(id) else {
            return Err(AssessmentError::InvalidSessionState(
                SessionStateIssue::UnknownQuestion(id.clone()),
            ));
        };
        if self.session.is_resolved(id) {
            return Err(AssessmentError::InvalidSessionState(
                SessionStateIssue::QuestionResolved(id.clone()),
            ));
        }
        Ok(question.clone())
    }

    /// Evaluate and record an answer.
    ///
    /// A correct answer resolves the question. An incorrect one resolves it
    /// only once the per-question attempt limit is reached.
    ///
    /// # Errors
    ///
    /// Returns `AssessmentError::InvalidSessionState` for unknown or resolved
    /// questions and after finalization.
    pub fn submit_answer(
        &mut self,
        question_id: &QuestionId,
        selected: Answer,
        time_spent_ms: u64,
        now: DateTime<Utc>,
    ) -> Result<AnswerOutcome, AssessmentError> {
        let question = self.open_question(question_id)?;
        let is_correct = question.correct_answer.matches(&selected);
        let attempt_number = self.session.attempts_for(question_id) + 1;

        let (message, tier, hint_level) = if is_correct {
            (
                feedback::correct(&question, attempt_number),
                FeedbackTier::Success,
                None,
            )
        } else {
            let miss = feedback::incorrect(&question, &selected, attempt_number);
            (miss.message, miss.tier, miss.hint_level)
        };

        self.session.record_attempt(Attempt {
            question_id: question_id.clone(),
            selected_answer: selected,
            is_correct,
            time_spent_ms,
            hints_used: self.session.hints_for(question_id),
            attempt_number,
            expected_time_ms: question.expected_time_ms,
            difficulty: question.difficulty,
            timestamp: now,
        });

        let should_advance = is_correct || attempt_number >= self.max_attempts_per_question;
        if should_advance {
            self.session.resolve(question_id);
        }
        debug!(
            question = %question_id,
            is_correct,
            attempt_number,
            should_advance,
            "answer recorded"
        );

        Ok(AnswerOutcome {
            question_id: question_id.clone(),
            is_correct,
            feedback: message,
            tier,
            should_advance,
            hint_level,
            attempt_number,
        })
    }

    /// Reveal the next hint for a question, up to level 3. Past the last
    /// level a generic encouragement is returned at level 3.
    ///
    /// # Errors
    ///
    /// Returns `AssessmentError::InvalidSessionState` for unknown or resolved
    /// questions and after finalization.
    pub fn request_hint(&mut self, question_id: &QuestionId) -> Result<HintResponse, AssessmentError> {
        let question = self.open_question(question_id)?;
        let used = self.session.hints_for(question_id);
        let level = used.saturating_add(1).min(MAX_HINT_LEVEL);
        let hint = if used >= MAX_HINT_LEVEL {
            feedback::OUT_OF_HINTS.to_owned()
        } else {
            question
                .hints
                .at(level)
                .unwrap_or(feedback::OUT_OF_HINTS)
                .to_owned()
        };
        self.session.record_hint(question_id);
        Ok(HintResponse {
            hint,
            level,
            is_last_hint: level >= MAX_HINT_LEVEL,
        })
    }

    /// Switch to a recommended difficulty. Returns `false` when nothing changed.
    ///
    /// # Errors
    ///
    /// Returns `AssessmentError::InvalidSessionState` after finalization.
    pub fn apply_difficulty(
        &mut self,
        recommendation: &Recommendation,
    ) -> Result<bool, AssessmentError> {
        if self.finalized {
            return Err(AssessmentError::InvalidSessionState(
                SessionStateIssue::Finalized,
            ));
        }
        Ok(self.session.change_difficulty(
            recommendation.to,
            recommendation.confidence,
            recommendation.reason.clone(),
        ))
    }

    #[must_use]
    pub fn current_difficulty(&self) -> Difficulty {
        self.session.current_difficulty()
    }

    /// Close the session and score it. The score counts each question once,
    /// however many attempts it took.
    ///
    /// # Errors
    ///
    /// Returns `AssessmentError::InvalidSessionState` when already finalized.
    pub fn finalize(&mut self, now: DateTime<Utc>) -> Result<FinalScore, AssessmentError> {
        if self.finalized {
            return Err(AssessmentError::InvalidSessionState(
                SessionStateIssue::Finalized,
            ));
        }
        self.finalized = true;
        self.session.complete(now);

        let total = self.session.questions().len();
        let score = if total == 0 {
            0
        } else {
            (self.session.correct_questions() as f64 / total as f64 * 100.0).round() as u8
        };
        let passed = score >= self.passing_score;
        let feedback = if passed {
            feedback::passed()
        } else {
            feedback::not_yet()
        };
        debug!(score, passed, lesson = %self.session.lesson_id(), "assessment finalized");

        Ok(FinalScore {
            score,
            passed,
            feedback: feedback.to_owned(),
            encouragement: feedback::personalized(self.session.total_hints_used()).to_owned(),
        })
    }
}
