//! Shared error types for the services crate.

use std::fmt;
use thiserror::Error;

use chronicle_core::model::{LessonId, Phase, QuestionId, RecordError};

/// Errors emitted by `ProgressStore` export and import.
///
/// Storage failures never appear here: saving and loading report them as
/// `bool` / `LoadOutcome` instead.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ProgressError {
    #[error("failed to serialize progress: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("import rejected: {0}")]
    Import(#[from] RecordError),
}

/// What made an assessment call invalid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionStateIssue {
    /// The session was already finalized.
    Finalized,
    /// No question with this id belongs to the session.
    UnknownQuestion(QuestionId),
    /// The question was already answered correctly or exhausted.
    QuestionResolved(QuestionId),
}

impl fmt::Display for SessionStateIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionStateIssue::Finalized => f.write_str("session already finalized"),
            SessionStateIssue::UnknownQuestion(id) => write!(f, "unknown question {id}"),
            SessionStateIssue::QuestionResolved(id) => write!(f, "question {id} already resolved"),
        }
    }
}

/// Errors emitted by `AssessmentEngine`. The session must be rebuilt, not retried.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum AssessmentError {
    #[error("invalid assessment session state: {0}")]
    InvalidSessionState(SessionStateIssue),
}

/// Errors emitted by `LessonSequencer`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum LessonError {
    #[error("unknown lesson {0}")]
    UnknownLesson(LessonId),
    #[error("lesson {0} is locked until its prerequisite is completed")]
    Locked(LessonId),
    #[error("cannot {action} during the {phase} phase")]
    InvalidTransition { phase: Phase, action: &'static str },
    #[error("lesson already finished")]
    Finished,
    #[error(transparent)]
    Assessment(#[from] AssessmentError),
}

/// Errors emitted by `ProgressionService`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ProgressionError {
    #[error("no lesson is open")]
    NoActiveLesson,
    #[error("lesson {0} is still open")]
    LessonOpen(LessonId),
    #[error(transparent)]
    Lesson(#[from] LessonError),
    #[error(transparent)]
    Progress(#[from] ProgressError),
}
