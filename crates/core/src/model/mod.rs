mod assessment;
mod ids;
mod lesson;
mod performance;
mod phase;
mod question;
mod record;
mod recovery;

pub use assessment::{AssessmentSession, Attempt, DifficultyChange};
pub use ids::{
    AchievementId, ActivityId, AreaId, LearnerId, LessonId, LocationId, PageId, ParseIdError,
    PersonaId, QuestionId,
};
pub use lesson::{
    ActivityFeedback, ActivityKind, AssessmentContent, BlockKind, CatalogError, ContextContent,
    InformationBlock, InformationContent, LessonCatalog, LessonDefinition, PracticeActivity,
    PracticeContent, RewardContent,
};
pub use performance::{
    Insight, InsightKind, LearnerProfile, Level, MasteryLevel, MasteryProgression,
    PerformanceRecord, SessionReport, Trend, TrendWindow,
};
pub use phase::Phase;
pub use question::{Answer, Difficulty, HintLadder, Question, QuestionFeedback, QuestionKind};
pub use record::{
    DEFAULT_LOCATION, LearnerRecord, Mutation, SCHEMA_VERSION, STARTING_AREA, clamp_percent,
};
pub use recovery::{FieldIssue, FieldRepair, ParsedRecord, RecordError, parse_record, sanitize};

#[cfg(test)]
pub(crate) use lesson::fixtures;
