//! Assessment sessions: answer evaluation, hint escalation and scoring.

mod engine;
pub mod feedback;

pub use engine::{AnswerOutcome, AssessmentEngine, FinalScore, HintResponse};
pub use feedback::FeedbackTier;
