use std::sync::Arc;
use tracing::{debug, info};

use chronicle_core::config::EngineConfig;
use chronicle_core::model::{
    Answer, FieldRepair, Insight, LearnerId, LearnerRecord, LessonCatalog, LessonId, LocationId,
    Mutation, PerformanceRecord, PersonaId, Phase, Question, QuestionId, SessionReport, Trend,
    TrendWindow,
};
use chronicle_core::time::Clock;
use storage::repository::SaveSlotRepository;

use crate::assessment::{FinalScore, HintResponse};
use crate::error::{LessonError, ProgressionError};
use crate::lesson_sequencer::{
    ActivityOutcome, AssessmentOutcome, AssessmentResult, CompletionPayload, LessonSequencer, Step,
    SubmitResult,
};
use crate::performance_tracker::PerformanceTracker;
use crate::progress::{
    AchievementStatus, JournalProgress, LoadOutcome, ProgressService, ProgressStore,
};

/// A scored assessment together with its analysis.
#[derive(Debug, Clone)]
pub struct FinishedAssessment {
    pub outcome: AssessmentOutcome,
    pub final_score: FinalScore,
    pub awarded_score: u8,
    pub report: SessionReport,
    /// Present once the lesson reached its reward.
    pub completion: Option<CompletionPayload>,
}

/// Result of one answer submission.
#[derive(Debug, Clone)]
pub struct AnswerReport {
    pub submit: SubmitResult,
    /// Set when this answer resolved the last question and the assessment was scored.
    pub finished: Option<FinishedAssessment>,
}

/// Entry point for a presentation layer: one learner, one save slot, at most
/// one open lesson.
///
/// Progress lives behind a [`ProgressService`], so every event locks the store
/// for its whole transition and schedules an autosave when the record changed.
/// The learner is identified by the save key.
pub struct ProgressionService {
    config: EngineConfig,
    learner: LearnerId,
    progress: ProgressService,
    tracker: PerformanceTracker,
    lesson: Option<LessonSequencer>,
}

impl ProgressionService {
    /// Load the save slot and start the background autosave and play-time tasks.
    ///
    /// Must be called inside a Tokio runtime.
    pub async fn start(
        slots: Arc<dyn SaveSlotRepository>,
        catalog: Arc<LessonCatalog>,
        config: EngineConfig,
        clock: Clock,
    ) -> (Self, LoadOutcome) {
        let mut store =
            ProgressStore::new(slots, catalog, config.persistence.clone()).with_clock(clock);
        let outcome = store.load().await;
        info!(?outcome, lessons = store.catalog().len(), "progression started");

        let service = Self {
            learner: LearnerId::new(config.persistence.save_key.as_str()),
            tracker: PerformanceTracker::new(config.mastery.clone()).with_clock(clock),
            progress: ProgressService::spawn(store),
            lesson: None,
            config,
        };
        (service, outcome)
    }

    /// Move both clocks forward. Has no effect on a system clock.
    pub async fn advance_clock(&mut self, delta: chrono::Duration) {
        self.progress.lock().await.clock_mut().advance(delta);
        self.tracker.clock_mut().advance(delta);
    }

    /// Stop background work and write a final save.
    pub async fn shutdown(self) -> bool {
        self.progress.shutdown().await
    }

    //
    // ─── WORLD EVENTS ──────────────────────────────────────────────────────────
    //

    pub async fn select_persona(&self, persona: PersonaId) -> bool {
        self.progress.apply(Mutation::SelectPersona(persona)).await
    }

    pub async fn change_location(&self, location: LocationId) -> bool {
        self.progress.apply(Mutation::ChangeLocation(location)).await
    }

    /// Wipe progress and the save slot. An open lesson is abandoned.
    pub async fn reset_progress(&mut self) -> bool {
        self.lesson = None;
        self.progress.lock().await.reset().await
    }

    /// # Errors
    ///
    /// Returns `ProgressionError::Progress` if the record cannot be serialized.
    pub async fn export(&self) -> Result<String, ProgressionError> {
        Ok(self.progress.lock().await.export()?)
    }

    /// Replace progress with an exported record. Returns the repairs made to it.
    ///
    /// # Errors
    ///
    /// Returns `ProgressionError::Progress` if the payload is not a record at all.
    pub async fn import(&mut self, raw: &str) -> Result<Vec<FieldRepair>, ProgressionError> {
        self.lesson = None;
        Ok(self.progress.lock().await.import(raw).await?)
    }

    //
    // ─── LESSON EVENTS ─────────────────────────────────────────────────────────
    //

    /// Open a lesson at its context phase. A finished lesson may be replaced;
    /// one still in progress must be exited first.
    ///
    /// # Errors
    ///
    /// Returns `ProgressionError::LessonOpen` while another lesson is in progress,
    /// or a wrapped `LessonError` for unknown and locked lessons.
    pub async fn open_lesson(&mut self, lesson: &LessonId) -> Result<(), ProgressionError> {
        if let Some(open) = &self.lesson {
            if !open.is_finished() {
                return Err(ProgressionError::LessonOpen(open.session().lesson_id.clone()));
            }
        }
        let profile = self.tracker.profile(&self.learner);
        let mut store = self.progress.lock().await;
        let sequencer = LessonSequencer::open(
            &mut store,
            lesson,
            self.config.lesson.clone(),
            self.config.adaptive.clone(),
            profile,
        )?;
        self.lesson = Some(sequencer);
        Ok(())
    }

    /// Leave the current lesson. Returns `false` when none was open.
    pub fn exit_lesson(&mut self) -> bool {
        self.lesson.take().is_some()
    }

    /// # Errors
    ///
    /// Returns `ProgressionError::NoActiveLesson`, or the sequencer's error.
    pub async fn advance_phase(&mut self) -> Result<Step, ProgressionError> {
        self.with_lesson(|lesson, store| lesson.advance(store)).await
    }

    /// # Errors
    ///
    /// Returns `ProgressionError::NoActiveLesson`, or the sequencer's error.
    pub async fn skip_phase(&mut self) -> Result<Phase, ProgressionError> {
        self.with_lesson(|lesson, store| lesson.skip(store)).await
    }

    /// Timer event for phase auto-advance. Without an open lesson this is a no-op.
    ///
    /// # Errors
    ///
    /// Returns the sequencer's error.
    pub async fn tick(&mut self) -> Result<bool, ProgressionError> {
        if self.lesson.as_ref().is_none_or(LessonSequencer::is_finished) {
            return Ok(false);
        }
        self.with_lesson(|lesson, store| lesson.tick(store)).await
    }

    /// # Errors
    ///
    /// Returns `ProgressionError::NoActiveLesson`, or the sequencer's error.
    pub async fn complete_activity(
        &mut self,
        success: bool,
    ) -> Result<ActivityOutcome, ProgressionError> {
        self.with_lesson(|lesson, store| lesson.complete_activity(store, success))
            .await
    }

    /// Submit an answer. When it resolves the last question, the assessment is
    /// scored and recorded right away.
    ///
    /// # Errors
    ///
    /// Returns `ProgressionError::NoActiveLesson`, or the sequencer's error.
    pub async fn submit_answer(
        &mut self,
        question: &QuestionId,
        answer: Answer,
        time_spent_ms: u64,
    ) -> Result<AnswerReport, ProgressionError> {
        let submit = self
            .with_lesson(|lesson, store| lesson.submit_answer(store, question, answer, time_spent_ms))
            .await?;
        let finished = if submit.assessment_complete {
            Some(self.finish_assessment().await?)
        } else {
            None
        };
        Ok(AnswerReport { submit, finished })
    }

    /// # Errors
    ///
    /// Returns `ProgressionError::NoActiveLesson`, or the sequencer's error.
    pub fn request_hint(&mut self, question: &QuestionId) -> Result<HintResponse, ProgressionError> {
        let lesson = self
            .lesson
            .as_mut()
            .ok_or(ProgressionError::NoActiveLesson)?;
        Ok(lesson.request_hint(question)?)
    }

    /// Score the assessment and record it in the learner's history.
    ///
    /// Replays of an already completed lesson are reported but not recorded.
    ///
    /// # Errors
    ///
    /// Returns `ProgressionError::NoActiveLesson`, or the sequencer's error.
    pub async fn finish_assessment(&mut self) -> Result<FinishedAssessment, ProgressionError> {
        let replay = match &self.lesson {
            Some(lesson) => self
                .progress
                .lock()
                .await
                .record()
                .is_lesson_completed(&lesson.session().lesson_id),
            None => false,
        };
        let AssessmentResult {
            outcome,
            final_score,
            awarded_score,
            session,
        } = self
            .with_lesson(|lesson, store| lesson.finish_assessment(store))
            .await?;
        let report = if replay {
            debug!(lesson = %session.lesson_id(), "replayed lesson, history unchanged");
            self.tracker.review(&self.learner, &session)
        } else {
            self.tracker.analyze(&self.learner, &session)
        };
        let completion = self
            .lesson
            .as_ref()
            .and_then(LessonSequencer::completion)
            .cloned();

        Ok(FinishedAssessment {
            outcome,
            final_score,
            awarded_score,
            report,
            completion,
        })
    }

    /// Run one lesson event against the locked store, then schedule an
    /// autosave if the record changed.
    async fn with_lesson<T>(
        &mut self,
        event: impl FnOnce(&mut LessonSequencer, &mut ProgressStore) -> Result<T, LessonError>,
    ) -> Result<T, ProgressionError> {
        let lesson = self
            .lesson
            .as_mut()
            .ok_or(ProgressionError::NoActiveLesson)?;
        let mut store = self.progress.lock().await;
        let revision = store.revision();
        let result = event(lesson, &mut *store);
        let changed = store.revision() != revision;
        drop(store);

        if changed {
            self.progress.notify_changed();
        }
        Ok(result?)
    }

    //
    // ─── QUERIES ───────────────────────────────────────────────────────────────
    //

    #[must_use]
    pub fn learner(&self) -> &LearnerId {
        &self.learner
    }

    #[must_use]
    pub fn lesson(&self) -> Option<&LessonSequencer> {
        self.lesson.as_ref()
    }

    #[must_use]
    pub fn current_phase(&self) -> Option<Phase> {
        self.lesson.as_ref().map(LessonSequencer::phase)
    }

    /// Progress through the current phase, 0 to 100; 0 without an open lesson.
    #[must_use]
    pub fn phase_progress_percent(&self) -> f64 {
        self.lesson
            .as_ref()
            .map_or(0.0, LessonSequencer::phase_progress)
    }

    #[must_use]
    pub fn current_question(&self) -> Option<&Question> {
        self.lesson.as_ref()?.engine()?.current_question()
    }

    pub async fn record(&self) -> LearnerRecord {
        self.progress.lock().await.record().clone()
    }

    pub async fn is_recovered(&self) -> bool {
        self.progress.lock().await.is_recovered()
    }

    pub async fn is_lesson_accessible(&self, lesson: &LessonId) -> bool {
        self.progress.lock().await.is_lesson_accessible(lesson)
    }

    pub async fn journal_progress(&self) -> JournalProgress {
        self.progress.lock().await.journal_progress()
    }

    pub async fn topic_progress(&self, topic: &str) -> JournalProgress {
        self.progress.lock().await.topic_progress(topic)
    }

    pub async fn achievements_unlocked(&self) -> Vec<AchievementStatus> {
        self.progress.lock().await.achievements_unlocked()
    }

    /// Total play time including the running session, in milliseconds.
    pub async fn play_time(&self) -> u64 {
        self.progress.lock().await.play_time_ms()
    }

    #[must_use]
    pub fn history(&self) -> &[PerformanceRecord] {
        self.tracker.history(&self.learner)
    }

    #[must_use]
    pub fn insights(&self) -> &[Insight] {
        self.tracker.insights(&self.learner)
    }

    #[must_use]
    pub fn trends(&self, window: TrendWindow) -> Trend {
        self.tracker.trends(&self.learner, window)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::catalog;
    use chrono::Duration;
    use chronicle_core::model::MasteryLevel;
    use chronicle_core::time::fixed_clock;
    use storage::repository::InMemoryRepository;

    async fn start() -> (ProgressionService, Arc<InMemoryRepository>) {
        let repo = Arc::new(InMemoryRepository::new());
        let (service, outcome) = ProgressionService::start(
            repo.clone(),
            Arc::new(catalog()),
            EngineConfig::default(),
            fixed_clock(),
        )
        .await;
        assert_eq!(outcome, LoadOutcome::Fresh);
        (service, repo)
    }

    async fn reach_assessment(service: &mut ProgressionService) {
        service.skip_phase().await.unwrap();
        service.skip_phase().await.unwrap();
        service.complete_activity(true).await.unwrap();
        service.complete_activity(true).await.unwrap();
        assert_eq!(service.current_phase(), Some(Phase::Assessment));
    }

    /// Answer every remaining question, correctly or not.
    async fn answer_all(service: &mut ProgressionService, correct: bool) -> AnswerReport {
        loop {
            let question = service.current_question().unwrap().clone();
            let answer = if correct {
                question.correct_answer.clone()
            } else {
                Answer::single("water")
            };
            service.advance_clock(Duration::seconds(10)).await;
            let report = service
                .submit_answer(&question.id, answer, 10_000)
                .await
                .unwrap();
            if report.finished.is_some() {
                return report;
            }
        }
    }

    #[tokio::test]
    async fn lesson_events_need_an_open_lesson() {
        let (mut service, _) = start().await;
        assert!(matches!(
            service.advance_phase().await,
            Err(ProgressionError::NoActiveLesson)
        ));
        assert!(!service.tick().await.unwrap());
        assert_eq!(service.current_phase(), None);
        assert_eq!(service.phase_progress_percent(), 0.0);
        assert!(!service.exit_lesson());
    }

    #[tokio::test]
    async fn only_one_lesson_in_progress() {
        let (mut service, _) = start().await;
        let hieroglyphics = LessonId::new("hieroglyphics");
        service.open_lesson(&hieroglyphics).await.unwrap();

        let err = service
            .open_lesson(&LessonId::new("marketplace"))
            .await
            .unwrap_err();
        assert!(matches!(err, ProgressionError::LessonOpen(id) if id == hieroglyphics));

        assert!(service.exit_lesson());
        let err = service
            .open_lesson(&LessonId::new("marketplace"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ProgressionError::Lesson(LessonError::Locked(_))
        ));
    }

    #[tokio::test]
    async fn perfect_run_completes_and_records() {
        let (mut service, _) = start().await;
        service.select_persona(PersonaId::new("A")).await;
        service
            .open_lesson(&LessonId::new("hieroglyphics"))
            .await
            .unwrap();
        reach_assessment(&mut service).await;

        let report = answer_all(&mut service, true).await;
        let finished = report.finished.unwrap();
        assert_eq!(finished.outcome, AssessmentOutcome::Passed);
        assert_eq!(finished.awarded_score, 100);
        assert_eq!(finished.report.mastery_level, MasteryLevel::Advanced);
        let completion = finished.completion.unwrap();
        assert_eq!(completion.unlocked_page.as_str(), "page-hieroglyphics");

        assert_eq!(service.current_phase(), Some(Phase::Reward));
        assert_eq!(service.advance_phase().await.unwrap(), Step::Completed);
        assert!(
            service
                .is_lesson_accessible(&LessonId::new("marketplace"))
                .await
        );
        assert_eq!(service.history().len(), 1);
        assert_eq!(service.trends(TrendWindow::All).total_sessions, 1);

        // A finished lesson does not block the next one.
        service
            .open_lesson(&LessonId::new("marketplace"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn every_failed_try_is_tracked() {
        let (mut service, _) = start().await;
        service
            .open_lesson(&LessonId::new("hieroglyphics"))
            .await
            .unwrap();
        reach_assessment(&mut service).await;

        let first = answer_all(&mut service, false).await.finished.unwrap();
        assert_eq!(first.outcome, AssessmentOutcome::Retry { attempt: 2 });
        assert!(first.completion.is_none());
        assert_eq!(service.current_phase(), Some(Phase::Assessment));

        answer_all(&mut service, false).await;
        let last = answer_all(&mut service, false).await.finished.unwrap();
        assert_eq!(last.outcome, AssessmentOutcome::ForcedForward);
        assert_eq!(last.awarded_score, 80);
        assert_eq!(last.completion.unwrap().score, 80);
        assert_eq!(service.history().len(), 3);
    }

    #[tokio::test]
    async fn replaying_a_completed_lesson_keeps_history() {
        let (mut service, _) = start().await;
        let hieroglyphics = LessonId::new("hieroglyphics");
        service.open_lesson(&hieroglyphics).await.unwrap();
        reach_assessment(&mut service).await;
        answer_all(&mut service, true).await;
        assert_eq!(service.advance_phase().await.unwrap(), Step::Completed);
        let insights = service.insights().len();

        service.open_lesson(&hieroglyphics).await.unwrap();
        reach_assessment(&mut service).await;
        let finished = answer_all(&mut service, true).await.finished.unwrap();
        assert_eq!(finished.outcome, AssessmentOutcome::Passed);
        assert_eq!(finished.report.mastery_level, MasteryLevel::Advanced);
        assert!(finished.completion.is_some());

        assert_eq!(service.history().len(), 1);
        assert_eq!(service.insights().len(), insights);
        assert_eq!(service.record().await.completed_lessons().len(), 1);
    }

    #[tokio::test]
    async fn reset_abandons_lesson_and_clears_slot() {
        let (mut service, repo) = start().await;
        service.select_persona(PersonaId::new("A")).await;
        service
            .open_lesson(&LessonId::new("hieroglyphics"))
            .await
            .unwrap();
        service.skip_phase().await.unwrap();
        assert!(service.progress.lock().await.save().await);
        assert!(!repo.is_empty().unwrap());

        assert!(service.reset_progress().await);
        assert_eq!(service.current_phase(), None);
        assert!(repo.is_empty().unwrap());
        assert_eq!(service.record().await.selected_persona(), None);
    }
}
