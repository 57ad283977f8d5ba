//! Lesson fixtures shared by unit tests.

use chronicle_core::model::{
    AchievementId, ActivityFeedback, ActivityId, ActivityKind, Answer, AreaId,
    AssessmentContent, BlockKind, ContextContent, Difficulty, HintLadder, InformationBlock,
    InformationContent, LessonCatalog, LessonDefinition, LessonId, PageId, PracticeActivity,
    PracticeContent, Question, QuestionFeedback, QuestionId, QuestionKind, RewardContent,
};

pub fn question(id: &str, correct: &str, difficulty: Difficulty) -> Question {
    Question {
        id: QuestionId::new(id),
        kind: QuestionKind::MultipleChoice,
        prompt: format!("What does {id} mean?"),
        options: vec![correct.to_owned(), "water".into(), "house".into()],
        correct_answer: Answer::single(correct),
        difficulty,
        topic: "symbols".into(),
        expected_time_ms: 30_000,
        feedback: QuestionFeedback {
            correct: "That's it!".into(),
            incorrect: "Look at the shape again.".into(),
            almost_correct: None,
            encouragement: vec!["Nice try!".into()],
        },
        hints: HintLadder {
            level1: "Think about the picture.".into(),
            level2: "Look at its outline.".into(),
            level3: format!("The answer is {correct}."),
        },
        learning_objective: "read pictographs".into(),
        concept_tags: vec!["pictograph".into()],
    }
}

/// A lesson with two dialogue lines, one information block, two activities,
/// three questions (easy `bird`, medium `sun`, hard `eye`) and passing score 80.
pub fn lesson(id: &str, prerequisite: Option<&str>) -> LessonDefinition {
    let activity = |name: &str| PracticeActivity {
        id: ActivityId::new(name),
        kind: ActivityKind::Matching,
        instructions: "Match the symbols.".into(),
        data: serde_json::Value::Null,
        feedback: ActivityFeedback {
            correct: "Well matched!".into(),
            incorrect: "Not quite.".into(),
            hint: "Start with the bird.".into(),
        },
    };

    LessonDefinition {
        id: LessonId::new(id),
        title: format!("Lesson {id}"),
        topic: id.to_owned(),
        prerequisite: prerequisite.map(LessonId::new),
        context: ContextContent {
            duration_secs: 30,
            dialogue: vec!["Look at these symbols!".into(), "Let's learn.".into()],
            character_reaction: None,
        },
        information: InformationContent {
            duration_secs: 180,
            title: "Basics".into(),
            blocks: vec![InformationBlock {
                kind: BlockKind::Text,
                content: "Symbols carry sounds and ideas.".into(),
                caption: None,
            }],
        },
        practice: PracticeContent {
            duration_secs: 300,
            title: "Practice".into(),
            activities: vec![activity("matching"), activity("sorting")],
            hints: Vec::new(),
        },
        assessment: AssessmentContent {
            duration_secs: 240,
            questions: vec![
                question("q1", "bird", Difficulty::Easy),
                question("q2", "sun", Difficulty::Medium),
                question("q3", "eye", Difficulty::Hard),
            ],
            passing_score: Some(80),
            initial_difficulty: Difficulty::Medium,
        },
        reward: RewardContent {
            duration_secs: 60,
            dialogue: vec!["You found a journal page!".into()],
            journal_page: PageId::new(format!("page-{id}")),
            unlocks_area: None,
            perfect_achievement: None,
        },
    }
}

/// Three chained lessons; the first unlocks an area and has a perfect achievement.
pub fn catalog() -> LessonCatalog {
    let mut hieroglyphics = lesson("hieroglyphics", None);
    hieroglyphics.topic = "writing".into();
    hieroglyphics.reward.unlocks_area = Some(AreaId::new("egypt-marketplace"));
    hieroglyphics.reward.perfect_achievement = Some(AchievementId::new("perfect-hieroglyphics"));

    let mut marketplace = lesson("marketplace", Some("hieroglyphics"));
    marketplace.topic = "trade".into();
    let mut pyramid = lesson("pyramid", Some("marketplace"));
    pyramid.topic = "architecture".into();

    match LessonCatalog::new(vec![hieroglyphics, marketplace, pyramid]) {
        Ok(catalog) => catalog,
        Err(err) => panic!("fixture catalog is invalid: {err}"),
    }
}
