use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::model::ids::{AchievementId, AreaId, LessonId, LocationId, PageId, PersonaId};
use crate::time::elapsed_millis;

/// Schema version written into every save.
pub const SCHEMA_VERSION: &str = "1.0.0";
/// Where a fresh learner starts.
pub const DEFAULT_LOCATION: &str = "character-selection";
/// Area unlocked for every learner from the start.
pub const STARTING_AREA: &str = "egypt-tomb";

/// Clamp a progress value into `[0, 100]`; non-finite input counts as 0.
#[must_use]
pub fn clamp_percent(value: f64) -> f64 {
    if value.is_nan() {
        return 0.0;
    }
    value.clamp(0.0, 100.0)
}

//
// ─── MUTATIONS ─────────────────────────────────────────────────────────────────
//

/// Closed set of state changes the learner record accepts.
///
/// Every "add to set" variant is idempotent: applying it for an element that is
/// already present leaves the record untouched.
#[derive(Debug, Clone, PartialEq)]
pub enum Mutation {
    SelectPersona(PersonaId),
    ChangeLocation(LocationId),
    CompleteLesson(LessonId),
    CollectPage(PageId),
    UpdateLessonProgress { lesson: LessonId, percent: f64 },
    UnlockArea(AreaId),
    EarnAchievement(AchievementId),
    Load(Box<LearnerRecord>),
    Reset,
}

impl Mutation {
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Mutation::SelectPersona(_) => "select-persona",
            Mutation::ChangeLocation(_) => "change-location",
            Mutation::CompleteLesson(_) => "complete-lesson",
            Mutation::CollectPage(_) => "collect-page",
            Mutation::UpdateLessonProgress { .. } => "update-lesson-progress",
            Mutation::UnlockArea(_) => "unlock-area",
            Mutation::EarnAchievement(_) => "earn-achievement",
            Mutation::Load(_) => "load",
            Mutation::Reset => "reset",
        }
    }

    /// True when the mutation names a blank identifier.
    fn targets_blank_id(&self) -> bool {
        match self {
            Mutation::SelectPersona(id) => id.is_blank(),
            Mutation::ChangeLocation(id) => id.is_blank(),
            Mutation::CompleteLesson(id) => id.is_blank(),
            Mutation::UpdateLessonProgress { lesson, .. } => lesson.is_blank(),
            Mutation::CollectPage(id) => id.is_blank(),
            Mutation::UnlockArea(id) => id.is_blank(),
            Mutation::EarnAchievement(id) => id.is_blank(),
            Mutation::Load(_) | Mutation::Reset => false,
        }
    }
}

//
// ─── LEARNER RECORD ────────────────────────────────────────────────────────────
//

/// Canonical, durable learner state for one save slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LearnerRecord {
    pub(crate) selected_persona: Option<PersonaId>,
    pub(crate) current_location: LocationId,
    pub(crate) completed_lessons: BTreeSet<LessonId>,
    pub(crate) collected_pages: BTreeSet<PageId>,
    pub(crate) lesson_progress: BTreeMap<LessonId, f64>,
    pub(crate) unlocked_areas: BTreeSet<AreaId>,
    pub(crate) achievements: BTreeSet<AchievementId>,
    pub(crate) schema_version: String,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub(crate) last_saved_at: DateTime<Utc>,
    #[serde(rename = "totalPlayTime")]
    pub(crate) total_play_time_ms: u64,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub(crate) session_started_at: DateTime<Utc>,
}

impl LearnerRecord {
    /// A fresh record: no persona, starting location and area, empty progress.
    #[must_use]
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            selected_persona: None,
            current_location: LocationId::new(DEFAULT_LOCATION),
            completed_lessons: BTreeSet::new(),
            collected_pages: BTreeSet::new(),
            lesson_progress: BTreeMap::new(),
            unlocked_areas: BTreeSet::from([AreaId::new(STARTING_AREA)]),
            achievements: BTreeSet::new(),
            schema_version: SCHEMA_VERSION.to_owned(),
            last_saved_at: now,
            total_play_time_ms: 0,
            session_started_at: now,
        }
    }

    /// Apply a mutation in place. Returns `true` when the record changed.
    ///
    /// Mutations naming a blank identifier are ignored, so every stored id
    /// survives a save and load unchanged.
    pub fn apply(&mut self, mutation: Mutation, now: DateTime<Utc>) -> bool {
        if mutation.targets_blank_id() {
            return false;
        }
        match mutation {
            Mutation::SelectPersona(persona) => {
                // Set once; only `Reset` clears it.
                if self.selected_persona.is_some() {
                    return false;
                }
                self.selected_persona = Some(persona);
                true
            }
            Mutation::ChangeLocation(location) => {
                if self.current_location == location {
                    return false;
                }
                self.current_location = location;
                true
            }
            Mutation::CompleteLesson(lesson) => {
                if !self.completed_lessons.insert(lesson.clone()) {
                    return false;
                }
                self.lesson_progress.insert(lesson, 100.0);
                true
            }
            Mutation::CollectPage(page) => self.collected_pages.insert(page),
            Mutation::UpdateLessonProgress { lesson, percent } => {
                let percent = clamp_percent(percent);
                self.lesson_progress.insert(lesson, percent) != Some(percent)
            }
            Mutation::UnlockArea(area) => self.unlocked_areas.insert(area),
            Mutation::EarnAchievement(achievement) => self.achievements.insert(achievement),
            Mutation::Load(record) => {
                *self = *record;
                self.session_started_at = now;
                true
            }
            Mutation::Reset => {
                *self = Self::new(now);
                true
            }
        }
    }

    /// Pure form of [`LearnerRecord::apply`]: returns the next record.
    #[must_use]
    pub fn reduce(&self, mutation: Mutation, now: DateTime<Utc>) -> Self {
        let mut next = self.clone();
        next.apply(mutation, now);
        next
    }

    /// Fold the running session into `total_play_time` and restart the session marker.
    pub fn accrue_session_time(&mut self, now: DateTime<Utc>) {
        self.total_play_time_ms = self
            .total_play_time_ms
            .saturating_add(elapsed_millis(self.session_started_at, now));
        self.session_started_at = now;
    }

    /// Accrue session time and stamp the save time.
    pub fn stamp_saved(&mut self, now: DateTime<Utc>) {
        self.accrue_session_time(now);
        self.last_saved_at = now;
    }

    /// Total play time including the running session.
    #[must_use]
    pub fn play_time_ms(&self, now: DateTime<Utc>) -> u64 {
        self.total_play_time_ms
            .saturating_add(elapsed_millis(self.session_started_at, now))
    }

    /// True when the learner-visible fields match, ignoring save and session timestamps.
    #[must_use]
    pub fn same_progress(&self, other: &LearnerRecord) -> bool {
        self.selected_persona == other.selected_persona
            && self.current_location == other.current_location
            && self.completed_lessons == other.completed_lessons
            && self.collected_pages == other.collected_pages
            && self.lesson_progress == other.lesson_progress
            && self.unlocked_areas == other.unlocked_areas
            && self.achievements == other.achievements
    }

    #[must_use]
    pub fn selected_persona(&self) -> Option<&PersonaId> {
        self.selected_persona.as_ref()
    }

    #[must_use]
    pub fn current_location(&self) -> &LocationId {
        &self.current_location
    }

    #[must_use]
    pub fn completed_lessons(&self) -> &BTreeSet<LessonId> {
        &self.completed_lessons
    }

    #[must_use]
    pub fn is_lesson_completed(&self, lesson: &LessonId) -> bool {
        self.completed_lessons.contains(lesson)
    }

    #[must_use]
    pub fn collected_pages(&self) -> &BTreeSet<PageId> {
        &self.collected_pages
    }

    #[must_use]
    pub fn lesson_progress(&self) -> &BTreeMap<LessonId, f64> {
        &self.lesson_progress
    }

    /// Progress for one lesson, 0 when never started.
    #[must_use]
    pub fn progress_for(&self, lesson: &LessonId) -> f64 {
        self.lesson_progress.get(lesson).copied().unwrap_or(0.0)
    }

    #[must_use]
    pub fn unlocked_areas(&self) -> &BTreeSet<AreaId> {
        &self.unlocked_areas
    }

    #[must_use]
    pub fn achievements(&self) -> &BTreeSet<AchievementId> {
        &self.achievements
    }

    #[must_use]
    pub fn schema_version(&self) -> &str {
        &self.schema_version
    }

    #[must_use]
    pub fn last_saved_at(&self) -> DateTime<Utc> {
        self.last_saved_at
    }

    #[must_use]
    pub fn total_play_time_ms(&self) -> u64 {
        self.total_play_time_ms
    }

    #[must_use]
    pub fn session_started_at(&self) -> DateTime<Utc> {
        self.session_started_at
    }
}
