use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use thiserror::Error;

use crate::model::ids::{AchievementId, ActivityId, AreaId, LessonId, PageId};
use crate::model::question::{Difficulty, Question};

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CatalogError {
    #[error("lesson catalog is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("duplicate lesson id: {0}")]
    DuplicateLesson(LessonId),

    #[error("lesson {lesson} requires unknown lesson {prerequisite}")]
    UnknownPrerequisite {
        lesson: LessonId,
        prerequisite: LessonId,
    },

    #[error("lesson {0} has no assessment questions")]
    NoQuestions(LessonId),

    #[error("lesson {0} has no practice activities")]
    NoActivities(LessonId),

    #[error("lesson {lesson} passing score {score} exceeds 100")]
    InvalidPassingScore { lesson: LessonId, score: u8 },
}

//
// ─── PHASE CONTENT ─────────────────────────────────────────────────────────────
//

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextContent {
    /// Seconds before the context phase advances on its own.
    pub duration_secs: u32,
    pub dialogue: Vec<String>,
    #[serde(default)]
    pub character_reaction: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlockKind {
    Text,
    Image,
    Animation,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InformationBlock {
    pub kind: BlockKind,
    pub content: String,
    #[serde(default)]
    pub caption: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InformationContent {
    pub duration_secs: u32,
    pub title: String,
    pub blocks: Vec<InformationBlock>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ActivityKind {
    DragDrop,
    Matching,
    Selection,
    Building,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ActivityFeedback {
    pub correct: String,
    pub incorrect: String,
    pub hint: String,
}

/// A practice activity. `data` is opaque to the engine and rendered by the UI.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PracticeActivity {
    pub id: ActivityId,
    pub kind: ActivityKind,
    pub instructions: String,
    #[serde(default)]
    pub data: serde_json::Value,
    #[serde(default)]
    pub feedback: ActivityFeedback,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PracticeContent {
    pub duration_secs: u32,
    pub title: String,
    pub activities: Vec<PracticeActivity>,
    #[serde(default)]
    pub hints: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssessmentContent {
    pub duration_secs: u32,
    pub questions: Vec<Question>,
    /// Percentage needed to pass; the engine default applies when absent.
    #[serde(default)]
    pub passing_score: Option<u8>,
    #[serde(default)]
    pub initial_difficulty: Difficulty,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RewardContent {
    pub duration_secs: u32,
    pub dialogue: Vec<String>,
    pub journal_page: PageId,
    #[serde(default)]
    pub unlocks_area: Option<AreaId>,
    /// Earned when the assessment is passed with every question right first try.
    #[serde(default)]
    pub perfect_achievement: Option<AchievementId>,
}

//
// ─── LESSON ────────────────────────────────────────────────────────────────────
//

/// Read-only lesson definition supplied by static content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LessonDefinition {
    pub id: LessonId,
    pub title: String,
    pub topic: String,
    #[serde(default)]
    pub prerequisite: Option<LessonId>,
    pub context: ContextContent,
    pub information: InformationContent,
    pub practice: PracticeContent,
    pub assessment: AssessmentContent,
    pub reward: RewardContent,
}

//
// ─── CATALOG ───────────────────────────────────────────────────────────────────
//

/// Ordered, validated collection of lessons.
#[derive(Debug, Clone, Default)]
pub struct LessonCatalog {
    lessons: Vec<Arc<LessonDefinition>>,
}

impl LessonCatalog {
    /// Build a catalog, checking ids, prerequisites and phase content.
    ///
    /// # Errors
    ///
    /// Returns `CatalogError` for duplicate ids, dangling prerequisites, lessons
    /// without questions or activities, and passing scores above 100.
    pub fn new(lessons: Vec<LessonDefinition>) -> Result<Self, CatalogError> {
        let mut seen = HashSet::new();
        for lesson in &lessons {
            if !seen.insert(lesson.id.clone()) {
                return Err(CatalogError::DuplicateLesson(lesson.id.clone()));
            }
        }

        for lesson in &lessons {
            if let Some(prerequisite) = &lesson.prerequisite {
                if !seen.contains(prerequisite) {
                    return Err(CatalogError::UnknownPrerequisite {
                        lesson: lesson.id.clone(),
                        prerequisite: prerequisite.clone(),
                    });
                }
            }
            if lesson.assessment.questions.is_empty() {
                return Err(CatalogError::NoQuestions(lesson.id.clone()));
            }
            if lesson.practice.activities.is_empty() {
                return Err(CatalogError::NoActivities(lesson.id.clone()));
            }
            match lesson.assessment.passing_score {
                Some(score) if score > 100 => {
                    return Err(CatalogError::InvalidPassingScore {
                        lesson: lesson.id.clone(),
                        score,
                    });
                }
                _ => {}
            }
        }

        Ok(Self {
            lessons: lessons.into_iter().map(Arc::new).collect(),
        })
    }

    /// Parse a JSON array of lesson definitions.
    ///
    /// # Errors
    ///
    /// Returns `CatalogError::Parse` for malformed JSON, or any validation error from [`LessonCatalog::new`].
    pub fn from_json_str(json: &str) -> Result<Self, CatalogError> {
        let lessons: Vec<LessonDefinition> = serde_json::from_str(json)?;
        Self::new(lessons)
    }

    #[must_use]
    pub fn get(&self, id: &LessonId) -> Option<Arc<LessonDefinition>> {
        self.lessons.iter().find(|l| &l.id == id).cloned()
    }

    pub fn iter(&self) -> impl Iterator<Item = &LessonDefinition> {
        self.lessons.iter().map(AsRef::as_ref)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.lessons.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lessons.is_empty()
    }

    /// Every collectible journal page, one per lesson reward.
    pub fn journal_pages(&self) -> impl Iterator<Item = (&PageId, &LessonDefinition)> {
        self.iter().map(|lesson| (&lesson.reward.journal_page, lesson))
    }
}


#[cfg(test)]
mod tests {
    use super::fixtures::lesson;
    use super::*;

    #[test]
    fn catalog_rejects_duplicate_ids() {
        let err = LessonCatalog::new(vec![lesson("a", None), lesson("a", None)]).unwrap_err();
        assert!(matches!(err, CatalogError::DuplicateLesson(id) if id.as_str() == "a"));
    }

    #[test]
    fn catalog_rejects_dangling_prerequisite() {
        let err = LessonCatalog::new(vec![lesson("b", Some("missing"))]).unwrap_err();
        assert!(matches!(err, CatalogError::UnknownPrerequisite { .. }));
    }

    #[test]
    fn catalog_rejects_empty_assessment() {
        let mut empty = lesson("a", None);
        empty.assessment.questions.clear();
        let err = LessonCatalog::new(vec![empty]).unwrap_err();
        assert!(matches!(err, CatalogError::NoQuestions(_)));
    }

    #[test]
    fn catalog_round_trips_through_json() {
        let json = serde_json::to_string(&vec![lesson("a", None), lesson("b", Some("a"))]).unwrap();
        let catalog = LessonCatalog::from_json_str(&json).unwrap();
        assert_eq!(catalog.len(), 2);
        let b = catalog.get(&LessonId::new("b")).unwrap();
        assert_eq!(b.prerequisite, Some(LessonId::new("a")));
        assert_eq!(catalog.journal_pages().count(), 2);
    }
}
