#![forbid(unsafe_code)]

pub mod assessment;
pub mod error;
pub mod lesson_sequencer;
pub mod performance_tracker;
pub mod progress;
pub mod progression;

#[cfg(test)]
mod test_support;

pub use chronicle_core::Clock;

pub use error::{AssessmentError, LessonError, ProgressError, ProgressionError, SessionStateIssue};

pub use assessment::{AnswerOutcome, AssessmentEngine, FinalScore, HintResponse};
pub use lesson_sequencer::{
    ActivityOutcome, AssessmentOutcome, AssessmentResult, CompletionPayload, LessonSequencer,
    LessonSession, PhaseView, Step, SubmitResult,
};
pub use performance_tracker::PerformanceTracker;
pub use progress::{JournalProgress, LoadOutcome, ProgressService, ProgressStore};
pub use progression::{AnswerReport, FinishedAssessment, ProgressionService};
