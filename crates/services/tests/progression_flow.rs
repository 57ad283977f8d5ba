use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::Duration;
use chronicle_core::model::{
    AchievementId, Answer, LessonCatalog, LessonId, MasteryLevel, PageId, PersonaId, Phase,
    TrendWindow,
};
use chronicle_core::EngineConfig;
use chronicle_core::time::fixed_now;
use services::{AssessmentOutcome, Clock, LoadOutcome, ProgressionService, Step};
use storage::repository::{InMemoryRepository, SaveSlotRepository};

const SAVE_KEY: &str = "cat-chronicles-save";

fn catalog() -> Arc<LessonCatalog> {
    let catalog = LessonCatalog::from_json_str(include_str!("fixtures/lessons.json"))
        .expect("fixture catalog");
    Arc::new(catalog)
}

async fn start(repo: &Arc<InMemoryRepository>) -> (ProgressionService, LoadOutcome) {
    ProgressionService::start(
        repo.clone(),
        catalog(),
        EngineConfig::default(),
        Clock::fixed(fixed_now()),
    )
    .await
}

async fn walk_to_assessment(service: &mut ProgressionService) {
    assert_eq!(service.advance_phase().await.unwrap(), Step::Stayed);
    assert_eq!(
        service.advance_phase().await.unwrap(),
        Step::Entered(Phase::Information)
    );
    assert_eq!(service.skip_phase().await.unwrap(), Phase::Practice);
    let activity = service.complete_activity(true).await.unwrap();
    assert!(activity.phase_advanced);
    assert_eq!(service.current_phase(), Some(Phase::Assessment));
}

/// Answers until the assessment is scored; returns the outcome and awarded score.
async fn sit_assessment(
    service: &mut ProgressionService,
    correct: bool,
) -> (AssessmentOutcome, u8) {
    loop {
        let question = service.current_question().expect("question").clone();
        let answer = if correct {
            question.correct_answer.clone()
        } else {
            Answer::single("definitely wrong")
        };
        service.advance_clock(Duration::seconds(10)).await;
        let report = service
            .submit_answer(&question.id, answer, 10_000)
            .await
            .unwrap();
        if let Some(finished) = report.finished {
            return (finished.outcome, finished.awarded_score);
        }
    }
}

#[tokio::test]
async fn fresh_learner_completes_first_lesson() {
    let repo = Arc::new(InMemoryRepository::new());
    let (mut service, outcome) = start(&repo).await;
    assert_eq!(outcome, LoadOutcome::Fresh);

    service.select_persona(PersonaId::new("A")).await;
    assert!(!service.is_lesson_accessible(&LessonId::new("marketplace")).await);
    service
        .open_lesson(&LessonId::new("hieroglyphics"))
        .await
        .unwrap();
    walk_to_assessment(&mut service).await;

    let (outcome, score) = sit_assessment(&mut service, true).await;
    assert_eq!(outcome, AssessmentOutcome::Passed);
    assert_eq!(score, 100);
    assert_eq!(service.current_phase(), Some(Phase::Reward));
    assert_eq!(service.advance_phase().await.unwrap(), Step::Completed);

    let record = service.record().await;
    let hieroglyphics = LessonId::new("hieroglyphics");
    assert_eq!(record.completed_lessons().len(), 1);
    assert!(record.is_lesson_completed(&hieroglyphics));
    assert_eq!(record.progress_for(&hieroglyphics), 100.0);
    assert_eq!(record.collected_pages().len(), 1);
    assert!(
        record
            .collected_pages()
            .contains(&PageId::new("journal-hieroglyphics"))
    );
    assert!(
        record
            .achievements()
            .contains(&AchievementId::new("perfect-hieroglyphics"))
    );

    let history = service.history();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].mastery_level, MasteryLevel::Advanced);

    let journal = service.journal_progress().await;
    assert_eq!((journal.found, journal.completed, journal.total), (1, 1, 2));
    assert_eq!(journal.percentage, 50);
    assert!(service.is_lesson_accessible(&LessonId::new("marketplace")).await);
    assert_eq!(service.trends(TrendWindow::Week).total_sessions, 1);

    assert!(service.shutdown().await);
    let (restored, outcome) = start(&repo).await;
    assert_eq!(outcome, LoadOutcome::Loaded);
    assert!(restored.record().await.is_lesson_completed(&hieroglyphics));
}

#[tokio::test]
async fn repeated_failure_moves_on_with_passing_score() {
    let repo = Arc::new(InMemoryRepository::new());
    let (mut service, _) = start(&repo).await;
    service.select_persona(PersonaId::new("B")).await;
    service
        .open_lesson(&LessonId::new("hieroglyphics"))
        .await
        .unwrap();
    walk_to_assessment(&mut service).await;

    assert_eq!(
        sit_assessment(&mut service, false).await,
        (AssessmentOutcome::Retry { attempt: 2 }, 0)
    );
    assert_eq!(
        sit_assessment(&mut service, false).await,
        (AssessmentOutcome::Retry { attempt: 3 }, 0)
    );
    assert_eq!(
        sit_assessment(&mut service, false).await,
        (AssessmentOutcome::ForcedForward, 70)
    );

    let record = service.record().await;
    assert!(record.is_lesson_completed(&LessonId::new("hieroglyphics")));
    assert!(
        !record
            .achievements()
            .contains(&AchievementId::new("perfect-hieroglyphics"))
    );
    assert_eq!(service.history().len(), 3);
    assert!(
        service
            .history()
            .iter()
            .all(|r| r.mastery_level == MasteryLevel::Novice)
    );
}

#[tokio::test(start_paused = true)]
async fn changes_are_autosaved_after_quiet_period() {
    let repo = Arc::new(InMemoryRepository::new());
    let (mut service, _) = start(&repo).await;
    service.select_persona(PersonaId::new("A")).await;
    service
        .open_lesson(&LessonId::new("hieroglyphics"))
        .await
        .unwrap();
    service.skip_phase().await.unwrap();

    tokio::time::sleep(StdDuration::from_millis(1_500)).await;
    let slot = repo.read_slot(SAVE_KEY).await.unwrap().expect("autosaved");
    let saved: serde_json::Value = serde_json::from_str(&slot.payload).unwrap();
    assert_eq!(saved["selectedPersona"], "A");
    assert_eq!(saved["lessonProgress"]["hieroglyphics"], 20.0);
}

#[tokio::test]
async fn damaged_save_is_recovered_and_rewritten() {
    let repo = Arc::new(InMemoryRepository::new());
    repo.write_slot(
        SAVE_KEY,
        r#"{"selectedPersona":"A","completedLessons":"hieroglyphics"}"#,
        fixed_now(),
    )
    .await
    .unwrap();

    let (service, outcome) = start(&repo).await;
    assert!(matches!(outcome, LoadOutcome::Recovered { .. }));
    assert!(service.is_recovered().await);

    let record = service.record().await;
    assert_eq!(record.selected_persona(), Some(&PersonaId::new("A")));
    assert!(record.completed_lessons().is_empty());

    let slot = repo.read_slot(SAVE_KEY).await.unwrap().unwrap();
    assert!(slot.payload.contains("\"completedLessons\":[]"));
}

#[tokio::test]
async fn export_then_import_into_fresh_slot() {
    let source = Arc::new(InMemoryRepository::new());
    let (mut service, _) = start(&source).await;
    service.select_persona(PersonaId::new("A")).await;
    service
        .open_lesson(&LessonId::new("hieroglyphics"))
        .await
        .unwrap();
    walk_to_assessment(&mut service).await;
    sit_assessment(&mut service, true).await;
    let exported = service.export().await.unwrap();
    assert!(exported.contains("exportedAt"));

    let target = Arc::new(InMemoryRepository::new());
    let (mut other, _) = start(&target).await;
    let repairs = other.import(&exported).await.unwrap();
    assert!(repairs.is_empty());
    assert!(
        other
            .record()
            .await
            .is_lesson_completed(&LessonId::new("hieroglyphics"))
    );
    assert!(target.read_slot(SAVE_KEY).await.unwrap().is_some());
}
