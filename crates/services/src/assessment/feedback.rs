//! Learner-facing feedback texts.

use rand::seq::IndexedRandom;

use chronicle_core::model::{Answer, Question};

const CORRECT_FIRST_TRY: [&str; 4] = [
    "Excellent! You've got it!",
    "Perfect! You understand this concept well!",
    "Great job! That's exactly right!",
    "Wonderful! You're really learning!",
];

const PASSED: [&str; 4] = [
    "Outstanding work! You've mastered this lesson!",
    "Excellent! You really understand these concepts!",
    "Fantastic job! You're ready to apply this knowledge!",
    "Wonderful! You've shown great understanding!",
];

const NOT_YET: [&str; 4] = [
    "You're learning so much! Every attempt helps you understand better.",
    "Great effort! Learning takes practice, and you're doing wonderfully.",
    "You're on the right track! Keep exploring and asking questions.",
    "Excellent persistence! You're building important knowledge.",
];

const FALLBACK_ENCOURAGEMENT: &str =
    "That's an interesting choice! Let's think about this differently.";
const SECOND_MISS: &str = "Let me give you a hint to help you out!";
const REPEATED_MISS: &str = "You're working hard on this! Here's some more guidance:";

/// Shown once every hint for a question has been revealed.
pub const OUT_OF_HINTS: &str =
    "You're doing great! Take your time and think about what you've learned.";

/// Visual tone of a feedback message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedbackTier {
    Success,
    Almost,
    Encouraging,
}

/// Feedback for one incorrect submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MissFeedback {
    pub message: String,
    pub tier: FeedbackTier,
    /// Hint level worth offering alongside the message.
    pub hint_level: Option<u8>,
}

fn pick(pool: &[&'static str]) -> &'static str {
    pool.choose(&mut rand::rng()).copied().unwrap_or_default()
}

#[must_use]
pub fn correct(question: &Question, attempt_number: u32) -> String {
    if attempt_number <= 1 {
        format!("{} {}", pick(&CORRECT_FIRST_TRY), question.feedback.correct)
    } else {
        format!("Nice work! You figured it out! {}", question.feedback.correct)
    }
}

/// Escalating help: gentle feedback first, then hints of rising level.
#[must_use]
pub fn incorrect(question: &Question, selected: &Answer, attempt_number: u32) -> MissFeedback {
    match attempt_number {
        0 | 1 => {
            if let Some(almost) = &question.feedback.almost_correct {
                if question.is_almost_correct(selected) {
                    return MissFeedback {
                        message: almost.clone(),
                        tier: FeedbackTier::Almost,
                        hint_level: None,
                    };
                }
            }
            let encouragement = question
                .feedback
                .encouragement
                .first()
                .map_or(FALLBACK_ENCOURAGEMENT, String::as_str);
            MissFeedback {
                message: format!("{encouragement} {}", question.feedback.incorrect),
                tier: FeedbackTier::Encouraging,
                hint_level: None,
            }
        }
        2 => MissFeedback {
            message: SECOND_MISS.to_owned(),
            tier: FeedbackTier::Encouraging,
            hint_level: Some(1),
        },
        n => MissFeedback {
            message: REPEATED_MISS.to_owned(),
            tier: FeedbackTier::Encouraging,
            hint_level: Some(u8::try_from(n - 1).unwrap_or(u8::MAX).min(3)),
        },
    }
}

#[must_use]
pub fn passed() -> &'static str {
    pick(&PASSED)
}

#[must_use]
pub fn not_yet() -> &'static str {
    pick(&NOT_YET)
}

/// Closing remark based on how many hints the whole session used.
#[must_use]
pub fn personalized(total_hints: u32) -> &'static str {
    match total_hints {
        0 => "You worked through this independently - that shows great thinking skills!",
        1..=2 => "You used hints wisely to help your learning - that's smart studying!",
        _ => "You kept trying and learning from each hint - that's the spirit of a great learner!",
    }
}
