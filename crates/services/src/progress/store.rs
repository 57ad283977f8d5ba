use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, warn};

use chronicle_core::config::PersistenceConfig;
use chronicle_core::model::{
    AchievementId, FieldIssue, FieldRepair, LearnerRecord, LessonCatalog, LessonId, Mutation,
    RecordError, SCHEMA_VERSION, parse_record, sanitize,
};
use chronicle_core::time::Clock;
use storage::repository::{SaveSlotRepository, StorageError};

use crate::error::ProgressError;
use crate::progress::achievements::{self, AchievementStatus};

const EXPORTED_AT: &str = "exportedAt";
const EXPORT_VERSION: &str = "exportVersion";

//
// ─── OUTCOMES ──────────────────────────────────────────────────────────────────
//

/// How the record was obtained by [`ProgressStore::load`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadOutcome {
    /// No save existed; a fresh record is in use.
    Fresh,
    /// The save was valid and is now active.
    Loaded,
    /// The save was damaged; valid fields were kept and the repaired record
    /// was written back.
    Recovered { repairs: Vec<FieldRepair> },
    /// Storage could not be read; a fresh record is in use.
    Unavailable,
}

/// Journal page counts, overall or for one topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct JournalProgress {
    /// Pages collected that belong to a lesson in the catalog.
    pub found: usize,
    /// Pages whose lesson is completed.
    pub completed: usize,
    pub total: usize,
    /// `completed / total` as a rounded percentage; 0 for an empty journal.
    pub percentage: u8,
}

impl JournalProgress {
    fn new(found: usize, completed: usize, total: usize) -> Self {
        let percentage = if total == 0 {
            0
        } else {
            (completed as f64 / total as f64 * 100.0).round() as u8
        };
        Self {
            found,
            completed,
            total,
            percentage,
        }
    }
}

//
// ─── STORE ─────────────────────────────────────────────────────────────────────
//

/// Owns the canonical learner record and persists it to a single save slot.
///
/// Storage failures are logged and reported as booleans or [`LoadOutcome`]
/// values; the in-memory record stays usable either way.
pub struct ProgressStore {
    clock: Clock,
    config: PersistenceConfig,
    slots: Arc<dyn SaveSlotRepository>,
    catalog: Arc<LessonCatalog>,
    record: LearnerRecord,
    recovered: bool,
    dirty: bool,
    revision: u64,
}

impl ProgressStore {
    #[must_use]
    pub fn new(
        slots: Arc<dyn SaveSlotRepository>,
        catalog: Arc<LessonCatalog>,
        config: PersistenceConfig,
    ) -> Self {
        let clock = Clock::default();
        Self {
            record: LearnerRecord::new(clock.now()),
            clock,
            config,
            slots,
            catalog,
            recovered: false,
            dirty: false,
            revision: 0,
        }
    }

    /// Override the clock (usually for deterministic testing).
    ///
    /// The session marker of the current record restarts at the new clock's time.
    #[must_use]
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self.record = LearnerRecord::new(clock.now());
        self
    }

    #[must_use]
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn clock_mut(&mut self) -> &mut Clock {
        &mut self.clock
    }

    #[must_use]
    pub fn millis_since(&self, from: DateTime<Utc>) -> u64 {
        self.clock.millis_since(from)
    }

    // ─── Persistence ───────────────────────────────────────────────────────────

    /// Read the save slot and make its record the active one.
    ///
    /// A damaged save is repaired field by field, flagged via
    /// [`ProgressStore::is_recovered`], and written back immediately.
    pub async fn load(&mut self) -> LoadOutcome {
        let now = self.clock.now();
        self.dirty = false;
        self.recovered = false;

        let slot = match self.slots.read_slot(&self.config.save_key).await {
            Ok(Some(slot)) => slot,
            Ok(None) => {
                self.record = LearnerRecord::new(now);
                debug!(key = %self.config.save_key, "no save found, starting fresh");
                return LoadOutcome::Fresh;
            }
            Err(err) => {
                self.record = LearnerRecord::new(now);
                warn!(error = %err, "failed to read save slot, starting fresh");
                return LoadOutcome::Unavailable;
            }
        };

        let parsed = parse_record(&slot.payload, now);
        let repairs = parsed.repairs().to_vec();
        self.record
            .apply(Mutation::Load(Box::new(parsed.into_record())), now);
        self.revision += 1;

        if repairs.is_empty() {
            info!(key = %self.config.save_key, "progress loaded");
            return LoadOutcome::Loaded;
        }

        self.recovered = true;
        warn!(
            repairs = %repairs.iter().map(ToString::to_string).collect::<Vec<_>>().join(", "),
            "save was damaged, recovered valid fields"
        );
        self.save().await;
        LoadOutcome::Recovered { repairs }
    }

    /// Write the record to the save slot, folding the running session into
    /// total play time and stamping the save time.
    ///
    /// Returns `false` when the write failed; the in-memory record is then left
    /// untouched so no play time is lost.
    pub async fn save(&mut self) -> bool {
        let now = self.clock.now();
        let mut snapshot = self.record.clone();
        snapshot.stamp_saved(now);

        let payload = match serde_json::to_string(&snapshot) {
            Ok(payload) => payload,
            Err(err) => {
                warn!(error = %err, "failed to serialize progress");
                return false;
            }
        };

        match self
            .slots
            .write_slot(&self.config.save_key, &payload, now)
            .await
        {
            Ok(()) => {
                self.record = snapshot;
                self.dirty = false;
                info!(key = %self.config.save_key, "progress saved");
                true
            }
            Err(err) => {
                warn!(error = %err, "failed to save progress");
                false
            }
        }
    }

    /// Save only if something changed since the last save and, when configured,
    /// a persona has been chosen.
    pub async fn autosave(&mut self) -> bool {
        if !self.dirty || !self.may_save_automatically() {
            return false;
        }
        self.save().await
    }

    /// Save on the way out, changed or not. Held back like an autosave until a
    /// persona is chosen, when configured.
    pub async fn final_save(&mut self) -> bool {
        if !self.may_save_automatically() {
            debug!("no persona chosen, skipping final save");
            return false;
        }
        self.save().await
    }

    fn may_save_automatically(&self) -> bool {
        !self.config.autosave_requires_persona || self.record.selected_persona().is_some()
    }

    /// Replace the record with a fresh one and delete the save slot.
    ///
    /// Returns `false` when the slot could not be removed.
    pub async fn reset(&mut self) -> bool {
        let now = self.clock.now();
        self.record.apply(Mutation::Reset, now);
        self.recovered = false;
        self.dirty = false;
        self.revision += 1;

        match self.slots.remove_slot(&self.config.save_key).await {
            Ok(()) | Err(StorageError::NotFound) => {
                info!(key = %self.config.save_key, "progress reset");
                true
            }
            Err(err) => {
                warn!(error = %err, "failed to remove save slot");
                false
            }
        }
    }

    /// Fold elapsed session time into the total without saving.
    pub fn accrue_session_time(&mut self) {
        let now = self.clock.now();
        self.record.accrue_session_time(now);
    }

    /// Periodic play-time checkpoint. When time has passed it is folded into
    /// the total and the record is marked for the next autosave.
    ///
    /// Returns `true` when the record changed.
    pub fn tick(&mut self) -> bool {
        let before = self.record.total_play_time_ms();
        self.accrue_session_time();
        let accrued = self.record.total_play_time_ms() - before;
        if accrued == 0 {
            return false;
        }
        self.dirty = true;
        self.revision += 1;
        debug!(accrued_ms = accrued, revision = self.revision, "play time accrued");
        true
    }

    // ─── Mutations ─────────────────────────────────────────────────────────────

    /// Apply a mutation. Returns `true` when the record changed, which also
    /// marks it for the next autosave.
    pub fn apply(&mut self, mutation: Mutation) -> bool {
        let kind = mutation.kind();
        let changed = self.record.apply(mutation, self.clock.now());
        if changed {
            self.dirty = true;
            self.revision += 1;
            debug!(mutation = kind, revision = self.revision, "progress changed");
        }
        changed
    }

    /// Earn every catalog achievement whose rule is now met.
    ///
    /// Returns the ids earned by this call, in definition order.
    pub fn award_achievements(&mut self) -> Vec<AchievementId> {
        let due: Vec<AchievementId> = achievements::earned(&self.record, &self.catalog)
            .into_iter()
            .filter(|id| !self.record.achievements().contains(id))
            .collect();
        for id in &due {
            self.apply(Mutation::EarnAchievement(id.clone()));
        }
        due
    }

    // ─── Export / import ───────────────────────────────────────────────────────

    /// Serialize the record with export metadata.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError::Serialize` if the record cannot be encoded.
    pub fn export(&self) -> Result<String, ProgressError> {
        let mut value = serde_json::to_value(&self.record)?;
        if let Value::Object(map) = &mut value {
            map.insert(
                EXPORTED_AT.to_owned(),
                Value::from(self.clock.now().timestamp_millis()),
            );
            map.insert(EXPORT_VERSION.to_owned(), Value::from(SCHEMA_VERSION));
        }
        Ok(serde_json::to_string_pretty(&value)?)
    }

    /// Replace the record with an exported one and save it.
    ///
    /// Damaged fields fall back to defaults like a recovered load; the repairs
    /// are returned. The save result is not part of the outcome.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError::Import` when the payload is not a JSON object.
    pub async fn import(&mut self, raw: &str) -> Result<Vec<FieldRepair>, ProgressError> {
        let now = self.clock.now();
        let mut value: Value = serde_json::from_str(raw).map_err(|_| RecordError::Unreadable)?;
        if let Value::Object(map) = &mut value {
            map.remove(EXPORTED_AT);
            map.remove(EXPORT_VERSION);
        }

        let parsed = sanitize(&value, now);
        if parsed
            .repairs()
            .iter()
            .any(|r| r.issue == FieldIssue::Unreadable)
        {
            return Err(RecordError::Unreadable.into());
        }

        let repairs = parsed.repairs().to_vec();
        self.record
            .apply(Mutation::Load(Box::new(parsed.into_record())), now);
        self.recovered = !repairs.is_empty();
        self.dirty = true;
        self.revision += 1;
        self.save().await;
        Ok(repairs)
    }

    // ─── Queries ───────────────────────────────────────────────────────────────

    #[must_use]
    pub fn record(&self) -> &LearnerRecord {
        &self.record
    }

    #[must_use]
    pub fn catalog(&self) -> &Arc<LessonCatalog> {
        &self.catalog
    }

    #[must_use]
    pub fn config(&self) -> &PersistenceConfig {
        &self.config
    }

    /// True when the active record came from a repaired save or import.
    #[must_use]
    pub fn is_recovered(&self) -> bool {
        self.recovered
    }

    /// True when the record changed since the last successful save.
    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Increments on every change to the record.
    #[must_use]
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// A lesson is open to the learner when it exists and its prerequisite,
    /// if any, is completed.
    #[must_use]
    pub fn is_lesson_accessible(&self, lesson: &LessonId) -> bool {
        let Some(definition) = self.catalog.get(lesson) else {
            return false;
        };
        definition
            .prerequisite
            .as_ref()
            .is_none_or(|prerequisite| self.record.is_lesson_completed(prerequisite))
    }

    #[must_use]
    pub fn journal_progress(&self) -> JournalProgress {
        self.journal_where(|_| true)
    }

    /// Journal progress restricted to lessons of one topic.
    #[must_use]
    pub fn topic_progress(&self, topic: &str) -> JournalProgress {
        self.journal_where(|lesson_topic| lesson_topic == topic)
    }

    fn journal_where(&self, include: impl Fn(&str) -> bool) -> JournalProgress {
        let mut found = 0;
        let mut completed = 0;
        let mut total = 0;
        for (page, lesson) in self.catalog.journal_pages() {
            if !include(&lesson.topic) {
                continue;
            }
            total += 1;
            if self.record.collected_pages().contains(page) {
                found += 1;
            }
            if self.record.is_lesson_completed(&lesson.id) {
                completed += 1;
            }
        }
        JournalProgress::new(found, completed, total)
    }

    #[must_use]
    pub fn achievements(&self) -> Vec<AchievementStatus> {
        achievements::statuses(&self.record, &self.catalog)
    }

    /// Achievements the learner holds.
    #[must_use]
    pub fn achievements_unlocked(&self) -> Vec<AchievementStatus> {
        self.achievements()
            .into_iter()
            .filter(|status| status.unlocked)
            .collect()
    }

    /// Total play time including the running session.
    #[must_use]
    pub fn play_time_ms(&self) -> u64 {
        self.record.play_time_ms(self.clock.now())
    }
}
