use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info};

use chronicle_core::adaptive::{DifficultyAdapter, Recommendation};
use chronicle_core::config::{AdaptiveConfig, LessonConfig};
use chronicle_core::model::{
    AchievementId, Answer, AreaId, AssessmentSession, InformationBlock, LearnerProfile,
    LessonDefinition, LessonId, Mutation, PageId, Phase, PracticeActivity, Question, QuestionId,
};

use crate::assessment::{AnswerOutcome, AssessmentEngine, FinalScore, HintResponse};
use crate::error::LessonError;
use crate::progress::ProgressStore;

//
// ─── SESSION STATE ─────────────────────────────────────────────────────────────
//

/// Ephemeral state of one lesson attempt. Discarded on exit.
#[derive(Debug, Clone, PartialEq)]
pub struct LessonSession {
    pub lesson_id: LessonId,
    pub phase: Phase,
    pub phase_progress: f64,
    pub attempts_on_current_phase: u32,
    pub hints_used_on_current_phase: u32,
    pub phase_entered_at: DateTime<Utc>,
}

/// What the current phase presents.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PhaseView<'a> {
    Context { line: Option<&'a str> },
    Information { block: Option<&'a InformationBlock> },
    Practice { activity: Option<&'a PracticeActivity> },
    Assessment { question: Option<&'a Question> },
    Reward { line: Option<&'a str> },
}

/// Result of a step through dialogue or content.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Still in the same phase, one item further.
    Stayed,
    /// A new phase was entered.
    Entered(Phase),
    /// The reward dialogue is exhausted; the lesson is over.
    Completed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivityOutcome {
    pub feedback: String,
    /// Offered after a failed try.
    pub hint: Option<String>,
    pub phase_advanced: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SubmitResult {
    pub answer: AnswerOutcome,
    /// Difficulty change applied after this answer.
    pub difficulty_change: Option<Recommendation>,
    /// Every question is resolved; the assessment can be finished.
    pub assessment_complete: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssessmentOutcome {
    Passed,
    /// Failed; the assessment restarted. `attempt` is the try now beginning.
    Retry { attempt: u32 },
    /// Failed on the last allowed try; moved on to the reward with the floor score.
    ForcedForward,
}

#[derive(Debug, Clone)]
pub struct AssessmentResult {
    pub outcome: AssessmentOutcome,
    pub final_score: FinalScore,
    /// Score credited to the lesson: the real score, or the passing score when forced forward.
    pub awarded_score: u8,
    /// The finished session, for performance tracking.
    pub session: AssessmentSession,
}

/// Emitted on reaching the reward phase and applied to the progress store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionPayload {
    pub lesson_id: LessonId,
    pub score: u8,
    pub unlocked_page: PageId,
    pub unlocked_area: Option<AreaId>,
    /// Achievements newly earned on completion.
    pub achievements: Vec<AchievementId>,
}

//
// ─── SEQUENCER ─────────────────────────────────────────────────────────────────
//

/// Drives one lesson through context, information, practice, assessment and
/// reward.
///
/// Side effects go to the [`ProgressStore`] passed into each event: phase
/// entry progress and, on reaching the reward, the completion payload.
/// Dropping the sequencer abandons the attempt; committed effects stay.
pub struct LessonSequencer {
    lesson: Arc<LessonDefinition>,
    config: LessonConfig,
    adapter: DifficultyAdapter,
    profile: LearnerProfile,
    session: LessonSession,
    /// Dialogue line, information block or activity index within the phase.
    step: usize,
    engine: Option<AssessmentEngine>,
    /// A low-confidence recommendation waiting for a second one in the same direction.
    pending: Option<Recommendation>,
    completion: Option<CompletionPayload>,
    finished: bool,
}

impl LessonSequencer {
    /// Start a lesson at its context phase.
    ///
    /// # Errors
    ///
    /// Returns `LessonError::UnknownLesson` when the catalog lacks the lesson,
    /// or `LessonError::Locked` when its prerequisite is not completed.
    pub fn open(
        store: &mut ProgressStore,
        lesson_id: &LessonId,
        config: LessonConfig,
        adaptive: AdaptiveConfig,
        profile: LearnerProfile,
    ) -> Result<Self, LessonError> {
        let Some(lesson) = store.catalog().get(lesson_id) else {
            return Err(LessonError::UnknownLesson(lesson_id.clone()));
        };
        if !store.is_lesson_accessible(lesson_id) {
            return Err(LessonError::Locked(lesson_id.clone()));
        }

        let now = store.now();
        debug!(lesson = %lesson_id, "lesson opened");
        Ok(Self {
            session: LessonSession {
                lesson_id: lesson_id.clone(),
                phase: Phase::Context,
                phase_progress: 0.0,
                attempts_on_current_phase: 0,
                hints_used_on_current_phase: 0,
                phase_entered_at: now,
            },
            lesson,
            config,
            adapter: DifficultyAdapter::new(adaptive),
            profile,
            step: 0,
            engine: None,
            pending: None,
            completion: None,
            finished: false,
        })
    }

    // ─── Queries ───────────────────────────────────────────────────────────────

    #[must_use]
    pub fn lesson(&self) -> &LessonDefinition {
        &self.lesson
    }

    #[must_use]
    pub fn session(&self) -> &LessonSession {
        &self.session
    }

    #[must_use]
    pub fn phase(&self) -> Phase {
        self.session.phase
    }

    #[must_use]
    pub fn phase_progress(&self) -> f64 {
        self.session.phase_progress
    }

    #[must_use]
    pub fn engine(&self) -> Option<&AssessmentEngine> {
        self.engine.as_ref()
    }

    #[must_use]
    pub fn completion(&self) -> Option<&CompletionPayload> {
        self.completion.as_ref()
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    #[must_use]
    pub fn view(&self) -> PhaseView<'_> {
        let lesson = &*self.lesson;
        match self.session.phase {
            Phase::Context => PhaseView::Context {
                line: lesson.context.dialogue.get(self.step).map(String::as_str),
            },
            Phase::Information => PhaseView::Information {
                block: lesson.information.blocks.get(self.step),
            },
            Phase::Practice => PhaseView::Practice {
                activity: lesson.practice.activities.get(self.step),
            },
            Phase::Assessment => PhaseView::Assessment {
                question: self.engine.as_ref().and_then(AssessmentEngine::current_question),
            },
            Phase::Reward => PhaseView::Reward {
                line: lesson.reward.dialogue.get(self.step).map(String::as_str),
            },
        }
    }

    /// Items in a step-through phase; 0 for practice and assessment.
    fn steps_in_phase(&self) -> usize {
        match self.session.phase {
            Phase::Context => self.lesson.context.dialogue.len(),
            Phase::Information => self.lesson.information.blocks.len(),
            Phase::Practice => self.lesson.practice.activities.len(),
            Phase::Assessment => 0,
            Phase::Reward => self.lesson.reward.dialogue.len(),
        }
    }

    fn refresh_progress(&mut self) {
        self.session.phase_progress = match (&self.engine, self.session.phase) {
            (Some(engine), Phase::Assessment) => engine.progress_percent(),
            _ => match self.steps_in_phase() {
                0 => 100.0,
                total => (self.step.min(total) as f64 / total as f64) * 100.0,
            },
        };
    }

    // ─── Events ────────────────────────────────────────────────────────────────

    fn ensure_active(&self) -> Result<(), LessonError> {
        if self.finished {
            Err(LessonError::Finished)
        } else {
            Ok(())
        }
    }

    fn invalid(&self, action: &'static str) -> LessonError {
        LessonError::InvalidTransition {
            phase: self.session.phase,
            action,
        }
    }

    /// Step to the next dialogue line or information block; past the last one,
    /// enter the next phase. In the reward phase, stepping past the last line
    /// completes the lesson.
    ///
    /// # Errors
    ///
    /// Returns `LessonError::InvalidTransition` during practice and assessment,
    /// which advance through their own events, or `LessonError::Finished`.
    pub fn advance(&mut self, store: &mut ProgressStore) -> Result<Step, LessonError> {
        self.ensure_active()?;
        match self.session.phase {
            Phase::Practice | Phase::Assessment => return Err(self.invalid("advance")),
            Phase::Context | Phase::Information | Phase::Reward => {}
        }

        self.step += 1;
        if self.step < self.steps_in_phase() {
            self.refresh_progress();
            return Ok(Step::Stayed);
        }

        if self.session.phase == Phase::Reward {
            self.session.phase_progress = 100.0;
            self.finished = true;
            info!(lesson = %self.session.lesson_id, "lesson finished");
            return Ok(Step::Completed);
        }
        let next = self.next_phase();
        self.enter(next, store);
        Ok(Step::Entered(next))
    }

    /// Skip the rest of the context or information phase.
    ///
    /// # Errors
    ///
    /// Returns `LessonError::InvalidTransition` outside those phases.
    pub fn skip(&mut self, store: &mut ProgressStore) -> Result<Phase, LessonError> {
        self.ensure_active()?;
        match self.session.phase {
            Phase::Context | Phase::Information => {
                let next = self.next_phase();
                self.enter(next, store);
                Ok(next)
            }
            _ => Err(self.invalid("skip")),
        }
    }

    /// Timer check: the context phase moves on once its duration has elapsed.
    /// Returns `true` when the phase changed.
    ///
    /// # Errors
    ///
    /// Returns `LessonError::Finished` after the lesson ended.
    pub fn tick(&mut self, store: &mut ProgressStore) -> Result<bool, LessonError> {
        self.ensure_active()?;
        if self.session.phase != Phase::Context {
            return Ok(false);
        }
        let elapsed = store.millis_since(self.session.phase_entered_at);
        if elapsed < u64::from(self.lesson.context.duration_secs) * 1_000 {
            return Ok(false);
        }
        self.enter(Phase::Information, store);
        Ok(true)
    }

    /// Report the result of the current practice activity. Success moves to
    /// the next activity, and after the last one into the assessment.
    ///
    /// # Errors
    ///
    /// Returns `LessonError::InvalidTransition` outside the practice phase.
    pub fn complete_activity(
        &mut self,
        store: &mut ProgressStore,
        success: bool,
    ) -> Result<ActivityOutcome, LessonError> {
        self.ensure_active()?;
        if self.session.phase != Phase::Practice {
            return Err(self.invalid("complete an activity"));
        }
        let Some(activity) = self.lesson.practice.activities.get(self.step) else {
            return Err(self.invalid("complete an activity"));
        };
        let feedback = activity.feedback.clone();

        if !success {
            self.session.attempts_on_current_phase += 1;
            return Ok(ActivityOutcome {
                feedback: feedback.incorrect,
                hint: Some(feedback.hint).filter(|h| !h.is_empty()),
                phase_advanced: false,
            });
        }

        self.step += 1;
        let phase_advanced = self.step >= self.lesson.practice.activities.len();
        if phase_advanced {
            self.enter(Phase::Assessment, store);
        } else {
            self.refresh_progress();
        }
        Ok(ActivityOutcome {
            feedback: feedback.correct,
            hint: None,
            phase_advanced,
        })
    }

    fn engine_mut(&mut self, action: &'static str) -> Result<&mut AssessmentEngine, LessonError> {
        self.ensure_active()?;
        if self.session.phase != Phase::Assessment {
            return Err(self.invalid(action));
        }
        let phase = self.session.phase;
        self.engine
            .as_mut()
            .ok_or(LessonError::InvalidTransition { phase, action })
    }

    /// Submit an answer, then let the difficulty adapter look at the recent
    /// attempts. Confident recommendations apply at once; weaker ones wait for
    /// a second recommendation in the same direction.
    ///
    /// # Errors
    ///
    /// Returns `LessonError::InvalidTransition` outside the assessment phase, or
    /// a wrapped `AssessmentError` for unknown or resolved questions.
    pub fn submit_answer(
        &mut self,
        store: &ProgressStore,
        question: &QuestionId,
        answer: Answer,
        time_spent_ms: u64,
    ) -> Result<SubmitResult, LessonError> {
        const ACTION: &str = "submit an answer";
        let now = store.now();
        let window = self.config.adaptation_window;
        self.engine_mut(ACTION)?;
        let phase = self.session.phase;
        let Some(engine) = self.engine.as_mut() else {
            return Err(LessonError::InvalidTransition {
                phase,
                action: ACTION,
            });
        };
        let outcome = engine.submit_answer(question, answer, time_spent_ms, now)?;

        let attempts = engine.session().attempts();
        let recent = &attempts[attempts.len().saturating_sub(window)..];
        let recommendation = self
            .adapter
            .recommend(recent, engine.current_difficulty(), &self.profile);
        let difficulty_change = self.consider(recommendation)?;

        let assessment_complete = self
            .engine
            .as_ref()
            .is_some_and(AssessmentEngine::all_resolved);
        self.refresh_progress();

        Ok(SubmitResult {
            answer: outcome,
            difficulty_change,
            assessment_complete,
        })
    }

    fn consider(
        &mut self,
        recommendation: Option<Recommendation>,
    ) -> Result<Option<Recommendation>, LessonError> {
        let Some(recommendation) = recommendation else {
            self.pending = None;
            return Ok(None);
        };

        let corroborated = self
            .pending
            .as_ref()
            .is_some_and(|p| p.direction == recommendation.direction);
        if recommendation.confidence < self.config.apply_confidence && !corroborated {
            debug!(%recommendation, "difficulty recommendation deferred");
            self.pending = Some(recommendation);
            return Ok(None);
        }

        self.pending = None;
        let Some(engine) = self.engine.as_mut() else {
            return Ok(None);
        };
        if engine.apply_difficulty(&recommendation)? {
            debug!(%recommendation, "difficulty changed");
            Ok(Some(recommendation))
        } else {
            Ok(None)
        }
    }

    /// # Errors
    ///
    /// Returns `LessonError::InvalidTransition` outside the assessment phase, or
    /// a wrapped `AssessmentError` for unknown or resolved questions.
    pub fn request_hint(&mut self, question: &QuestionId) -> Result<HintResponse, LessonError> {
        let hint = self.engine_mut("request a hint")?.request_hint(question)?;
        self.session.hints_used_on_current_phase += 1;
        Ok(hint)
    }

    /// Score the assessment. A pass moves on to the reward. A fail restarts the
    /// assessment until the attempt limit, then moves on with the passing score
    /// as a floor.
    ///
    /// # Errors
    ///
    /// Returns `LessonError::InvalidTransition` outside the assessment phase.
    pub fn finish_assessment(
        &mut self,
        store: &mut ProgressStore,
    ) -> Result<AssessmentResult, LessonError> {
        self.engine_mut("finish the assessment")?;
        let Some(mut engine) = self.engine.take() else {
            return Err(self.invalid("finish the assessment"));
        };
        let final_score = engine.finalize(store.now())?;
        let passing_score = engine.passing_score();
        let session = engine.into_session();

        let (outcome, awarded_score) = if final_score.passed {
            let perfect = session.attempts().iter().all(|a| a.is_correct)
                && session.correct_questions() == session.questions().len();
            self.enter_reward(store, final_score.score, perfect);
            (AssessmentOutcome::Passed, final_score.score)
        } else {
            self.session.attempts_on_current_phase += 1;
            if self.session.attempts_on_current_phase < self.config.max_assessment_attempts {
                self.restart_assessment(store.now());
                (
                    AssessmentOutcome::Retry {
                        attempt: self.session.attempts_on_current_phase + 1,
                    },
                    final_score.score,
                )
            } else {
                self.enter_reward(store, passing_score, false);
                (AssessmentOutcome::ForcedForward, passing_score)
            }
        };
        info!(
            lesson = %self.session.lesson_id,
            score = final_score.score,
            awarded_score,
            ?outcome,
            "assessment finished"
        );

        Ok(AssessmentResult {
            outcome,
            final_score,
            awarded_score,
            session,
        })
    }

    // ─── Transitions ───────────────────────────────────────────────────────────

    fn next_phase(&self) -> Phase {
        self.session.phase.next().unwrap_or(Phase::Reward)
    }

    fn enter(&mut self, phase: Phase, store: &mut ProgressStore) {
        let now = store.now();
        self.session.phase = phase;
        self.session.attempts_on_current_phase = 0;
        self.session.hints_used_on_current_phase = 0;
        self.session.phase_entered_at = now;
        self.step = 0;
        self.engine = (phase == Phase::Assessment).then(|| self.new_engine(now));
        self.refresh_progress();
        debug!(lesson = %self.session.lesson_id, %phase, "phase entered");

        if !store.record().is_lesson_completed(&self.session.lesson_id) {
            store.apply(Mutation::UpdateLessonProgress {
                lesson: self.session.lesson_id.clone(),
                percent: phase.entry_progress(),
            });
        }
    }

    fn new_engine(&self, now: DateTime<Utc>) -> AssessmentEngine {
        AssessmentEngine::for_lesson(
            &self.lesson,
            self.config.default_passing_score,
            self.config.max_attempts_per_question,
            now,
        )
    }

    fn restart_assessment(&mut self, now: DateTime<Utc>) {
        self.engine = Some(self.new_engine(now));
        self.pending = None;
        self.session.phase_entered_at = now;
        self.session.hints_used_on_current_phase = 0;
        self.refresh_progress();
    }

    fn enter_reward(&mut self, store: &mut ProgressStore, score: u8, perfect: bool) {
        self.enter(Phase::Reward, store);

        let lesson_id = self.session.lesson_id.clone();
        let reward = &self.lesson.reward;
        store.apply(Mutation::CompleteLesson(lesson_id.clone()));
        store.apply(Mutation::CollectPage(reward.journal_page.clone()));
        if let Some(area) = &reward.unlocks_area {
            store.apply(Mutation::UnlockArea(area.clone()));
        }

        let mut achievements = Vec::new();
        if perfect {
            if let Some(id) = &reward.perfect_achievement {
                if store.apply(Mutation::EarnAchievement(id.clone())) {
                    achievements.push(id.clone());
                }
            }
        }
        achievements.extend(store.award_achievements());
        info!(lesson = %lesson_id, score, perfect, "lesson completed");

        self.completion = Some(CompletionPayload {
            lesson_id,
            score,
            unlocked_page: reward.journal_page.clone(),
            unlocked_area: reward.unlocks_area.clone(),
            achievements,
        });
    }
}
