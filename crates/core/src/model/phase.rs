use serde::{Deserialize, Serialize};
use std::fmt;

/// One of the five ordered stages a lesson passes through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    /// Story framing; auto-advances after its duration.
    Context,
    /// Teaching blocks the learner reads through or skips.
    Information,
    /// Guided activities, one after another.
    Practice,
    /// Scored questions with retries.
    Assessment,
    /// Reward dialogue; reaching it grants the lesson's unlocks.
    Reward,
}

impl Phase {
    pub const ALL: [Phase; 5] = [
        Phase::Context,
        Phase::Information,
        Phase::Practice,
        Phase::Assessment,
        Phase::Reward,
    ];

    /// Zero-based position in the lesson.
    #[must_use]
    pub fn index(self) -> usize {
        match self {
            Phase::Context => 0,
            Phase::Information => 1,
            Phase::Practice => 2,
            Phase::Assessment => 3,
            Phase::Reward => 4,
        }
    }

    /// The phase that follows this one, or `None` after `Reward`.
    #[must_use]
    pub fn next(self) -> Option<Phase> {
        Self::ALL.get(self.index() + 1).copied()
    }

    /// Lesson-level progress recorded when this phase is entered.
    #[must_use]
    pub fn entry_progress(self) -> f64 {
        let total = Self::ALL.len() as f64;
        (self.index() as f64 / total * 100.0).round()
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Phase::Context => "context",
            Phase::Information => "information",
            Phase::Practice => "practice",
            Phase::Assessment => "assessment",
            Phase::Reward => "reward",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
