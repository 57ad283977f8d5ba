use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

use crate::model::ids::QuestionId;

//
// ─── DIFFICULTY ────────────────────────────────────────────────────────────────
//

/// Three-step question difficulty.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    #[default]
    Medium,
    Hard,
}

impl Difficulty {
    /// One step harder, saturating at `Hard`.
    #[must_use]
    pub fn harder(self) -> Self {
        match self {
            Difficulty::Easy => Difficulty::Medium,
            Difficulty::Medium | Difficulty::Hard => Difficulty::Hard,
        }
    }

    /// One step easier, saturating at `Easy`.
    #[must_use]
    pub fn easier(self) -> Self {
        match self {
            Difficulty::Hard => Difficulty::Medium,
            Difficulty::Medium | Difficulty::Easy => Difficulty::Easy,
        }
    }

    /// Distance between two difficulties, in steps.
    #[must_use]
    pub fn distance(self, other: Difficulty) -> u8 {
        (self as i8 - other as i8).unsigned_abs()
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Difficulty::Easy => "easy",
            Difficulty::Medium => "medium",
            Difficulty::Hard => "hard",
        }
    }
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

//
// ─── ANSWERS ───────────────────────────────────────────────────────────────────
//

/// A submitted or expected answer: a single value or an unordered selection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Answer {
    Single(String),
    Multiple(BTreeSet<String>),
}

impl Answer {
    #[must_use]
    pub fn single(value: impl Into<String>) -> Self {
        Self::Single(value.into())
    }

    #[must_use]
    pub fn multiple<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Multiple(values.into_iter().map(Into::into).collect())
    }

    fn as_set(&self) -> BTreeSet<&str> {
        match self {
            Answer::Single(value) => std::iter::once(value.as_str()).collect(),
            Answer::Multiple(values) => values.iter().map(String::as_str).collect(),
        }
    }

    /// Exact match: every expected value selected and nothing extra.
    #[must_use]
    pub fn matches(&self, selected: &Answer) -> bool {
        self.as_set() == selected.as_set()
    }

    /// First value in display order, used for word-overlap heuristics.
    #[must_use]
    pub fn primary(&self) -> Option<&str> {
        match self {
            Answer::Single(value) => Some(value),
            Answer::Multiple(values) => values.iter().next().map(String::as_str),
        }
    }
}

impl From<&str> for Answer {
    fn from(value: &str) -> Self {
        Self::single(value)
    }
}

//
// ─── QUESTION ──────────────────────────────────────────────────────────────────
//

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum QuestionKind {
    MultipleChoice,
    DragDrop,
    Demonstration,
    Interactive,
}

/// Feedback texts authored per question.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionFeedback {
    pub correct: String,
    pub incorrect: String,
    #[serde(default)]
    pub almost_correct: Option<String>,
    #[serde(default)]
    pub encouragement: Vec<String>,
}

/// Three escalating hints: a gentle nudge, specific guidance, near-disclosure.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct HintLadder {
    pub level1: String,
    pub level2: String,
    pub level3: String,
}

impl HintLadder {
    /// Hint text for levels 1-3.
    #[must_use]
    pub fn at(&self, level: u8) -> Option<&str> {
        match level {
            1 => Some(&self.level1),
            2 => Some(&self.level2),
            3 => Some(&self.level3),
            _ => None,
        }
    }
}

fn default_expected_time_ms() -> u64 {
    30_000
}

/// Static assessment question definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Question {
    pub id: QuestionId,
    pub kind: QuestionKind,
    pub prompt: String,
    #[serde(default)]
    pub options: Vec<String>,
    pub correct_answer: Answer,
    #[serde(default)]
    pub difficulty: Difficulty,
    pub topic: String,
    /// Typical answer time; speed signals are measured against it.
    #[serde(default = "default_expected_time_ms")]
    pub expected_time_ms: u64,
    #[serde(default)]
    pub feedback: QuestionFeedback,
    #[serde(default)]
    pub hints: HintLadder,
    #[serde(default)]
    pub learning_objective: String,
    #[serde(default)]
    pub concept_tags: Vec<String>,
}

impl Question {
    /// Heuristic for "close" multiple-choice answers: any word shared with the
    /// correct answer, either containing the other.
    #[must_use]
    pub fn is_almost_correct(&self, selected: &Answer) -> bool {
        if self.kind != QuestionKind::MultipleChoice {
            return false;
        }
        let Answer::Single(selected) = selected else {
            return false;
        };
        let Some(correct) = self.correct_answer.primary() else {
            return false;
        };

        let correct = correct.to_lowercase();
        let correct_words: Vec<&str> = correct.split_whitespace().collect();
        let selected = selected.to_lowercase();
        selected.split_whitespace().any(|word| {
            correct_words
                .iter()
                .any(|c| c.contains(word) || word.contains(c))
        })
    }
}
