//! Validation and field-level recovery of persisted learner records.
//!
//! A persisted record is accepted as-is only when every field has the right
//! shape. Otherwise each field is salvaged independently: valid fields are
//! kept, invalid ones fall back to their defaults, and the caller is told which
//! fields were repaired.

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use tracing::info;

use crate::model::ids::{LessonId, LocationId, PersonaId};
use crate::model::record::{LearnerRecord, SCHEMA_VERSION};

/// Why a field was repaired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldIssue {
    /// The save was not JSON, or not a JSON object.
    Unreadable,
    Missing,
    WrongType,
    /// Right container type, but some entries were dropped.
    InvalidEntries,
}

/// One repaired field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldRepair {
    pub field: &'static str,
    pub issue: FieldIssue,
}

impl fmt::Display for FieldRepair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let issue = match self.issue {
            FieldIssue::Unreadable => "unreadable",
            FieldIssue::Missing => "missing",
            FieldIssue::WrongType => "wrong type",
            FieldIssue::InvalidEntries => "invalid entries dropped",
        };
        write!(f, "{}: {issue}", self.field)
    }
}

/// Strict validation failure for callers that refuse to repair.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum RecordError {
    #[error("record is not a readable JSON object")]
    Unreadable,

    #[error("invalid record field {0}")]
    Field(FieldRepair),
}

/// Result of reading a persisted record.
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedRecord {
    /// Every field validated; the record is used unchanged.
    Valid(LearnerRecord),
    /// Some fields were repaired; the sanitized record is canonical from now on.
    Recovered {
        record: LearnerRecord,
        repairs: Vec<FieldRepair>,
    },
}

impl ParsedRecord {
    #[must_use]
    pub fn record(&self) -> &LearnerRecord {
        match self {
            ParsedRecord::Valid(record) | ParsedRecord::Recovered { record, .. } => record,
        }
    }

    #[must_use]
    pub fn into_record(self) -> LearnerRecord {
        match self {
            ParsedRecord::Valid(record) | ParsedRecord::Recovered { record, .. } => record,
        }
    }

    #[must_use]
    pub fn is_recovered(&self) -> bool {
        matches!(self, ParsedRecord::Recovered { .. })
    }

    /// Field repairs made while parsing; empty for a valid record.
    #[must_use]
    pub fn repairs(&self) -> &[FieldRepair] {
        match self {
            ParsedRecord::Valid(_) => &[],
            ParsedRecord::Recovered { repairs, .. } => repairs,
        }
    }

    /// The record only if it validated without repairs.
    ///
    /// # Errors
    ///
    /// Returns `RecordError::Unreadable` when the input was not a JSON object,
    /// or `RecordError::Field` naming the first repaired field.
    pub fn strict(self) -> Result<LearnerRecord, RecordError> {
        match self {
            ParsedRecord::Valid(record) => Ok(record),
            ParsedRecord::Recovered { repairs, .. } => match repairs.first() {
                Some(r) if r.issue == FieldIssue::Unreadable => Err(RecordError::Unreadable),
                Some(r) => Err(RecordError::Field(*r)),
                None => Err(RecordError::Unreadable),
            },
        }
    }
}

/// Parse and validate raw save text. Never fails: unreadable input yields a
/// recovered default record.
#[must_use]
pub fn parse_record(raw: &str, now: DateTime<Utc>) -> ParsedRecord {
    match serde_json::from_str::<Value>(raw) {
        Ok(value) => sanitize(&value, now),
        Err(_) => unreadable(now),
    }
}

/// Validate a JSON value field by field.
#[must_use]
pub fn sanitize(value: &Value, now: DateTime<Utc>) -> ParsedRecord {
    let Some(obj) = value.as_object() else {
        return unreadable(now);
    };

    let mut repairs = Vec::new();
    let mut record = LearnerRecord::new(now);

    match obj.get("selectedPersona") {
        None => repairs.push(repair("selectedPersona", FieldIssue::Missing)),
        Some(Value::Null) => {}
        Some(Value::String(s)) => match PersonaId::from_str(s) {
            Ok(id) => record.selected_persona = Some(id),
            Err(_) => repairs.push(repair("selectedPersona", FieldIssue::WrongType)),
        },
        Some(_) => repairs.push(repair("selectedPersona", FieldIssue::WrongType)),
    }

    match obj.get("currentLocation") {
        None => repairs.push(repair("currentLocation", FieldIssue::Missing)),
        Some(Value::String(s)) => match LocationId::from_str(s) {
            Ok(id) => record.current_location = id,
            Err(_) => repairs.push(repair("currentLocation", FieldIssue::WrongType)),
        },
        Some(_) => repairs.push(repair("currentLocation", FieldIssue::WrongType)),
    }

    if let Some(set) = string_set(obj, "completedLessons", &mut repairs) {
        record.completed_lessons = set;
    }
    if let Some(set) = string_set(obj, "collectedPages", &mut repairs) {
        record.collected_pages = set;
    }
    if let Some(set) = string_set(obj, "unlockedAreas", &mut repairs) {
        record.unlocked_areas = set;
    }
    if let Some(set) = string_set(obj, "achievements", &mut repairs) {
        record.achievements = set;
    }
    if let Some(progress) = progress_map(obj, &mut repairs) {
        record.lesson_progress = progress;
    }

    // Metadata is optional; only a present-but-malformed value counts as damage.
    match obj.get("schemaVersion") {
        None => {}
        Some(Value::String(s)) => {
            if s != SCHEMA_VERSION {
                info!(found = %s, current = SCHEMA_VERSION, "loading save from another schema version");
            }
            record.schema_version = s.clone();
        }
        Some(_) => repairs.push(repair("schemaVersion", FieldIssue::WrongType)),
    }
    match obj.get("lastSavedAt") {
        None => {}
        Some(v) => match v.as_i64().and_then(DateTime::<Utc>::from_timestamp_millis) {
            Some(at) => record.last_saved_at = at,
            None => repairs.push(repair("lastSavedAt", FieldIssue::WrongType)),
        },
    }
    match obj.get("totalPlayTime") {
        None => {}
        Some(v) => match play_time(v) {
            Some(ms) => record.total_play_time_ms = ms,
            None => repairs.push(repair("totalPlayTime", FieldIssue::WrongType)),
        },
    }
    // The session marker always restarts at load time.
    record.session_started_at = now;

    if repairs.is_empty() {
        ParsedRecord::Valid(record)
    } else {
        ParsedRecord::Recovered { record, repairs }
    }
}

fn unreadable(now: DateTime<Utc>) -> ParsedRecord {
    ParsedRecord::Recovered {
        record: LearnerRecord::new(now),
        repairs: vec![repair("record", FieldIssue::Unreadable)],
    }
}

fn repair(field: &'static str, issue: FieldIssue) -> FieldRepair {
    FieldRepair { field, issue }
}

fn string_set<T>(
    obj: &Map<String, Value>,
    field: &'static str,
    repairs: &mut Vec<FieldRepair>,
) -> Option<BTreeSet<T>>
where
    T: FromStr + Ord,
{
    let Some(value) = obj.get(field) else {
        repairs.push(repair(field, FieldIssue::Missing));
        return None;
    };
    let Value::Array(items) = value else {
        repairs.push(repair(field, FieldIssue::WrongType));
        return None;
    };

    let parsed: BTreeSet<T> = items
        .iter()
        .filter_map(Value::as_str)
        .filter_map(|s| T::from_str(s).ok())
        .collect();
    let valid = items
        .iter()
        .filter_map(Value::as_str)
        .filter(|s| !s.trim().is_empty())
        .count();
    if valid != items.len() {
        repairs.push(repair(field, FieldIssue::InvalidEntries));
    }
    Some(parsed)
}

fn progress_map(
    obj: &Map<String, Value>,
    repairs: &mut Vec<FieldRepair>,
) -> Option<BTreeMap<LessonId, f64>> {
    const FIELD: &str = "lessonProgress";
    let Some(value) = obj.get(FIELD) else {
        repairs.push(repair(FIELD, FieldIssue::Missing));
        return None;
    };
    let Value::Object(entries) = value else {
        repairs.push(repair(FIELD, FieldIssue::WrongType));
        return None;
    };

    let mut progress = BTreeMap::new();
    let mut dropped = false;
    for (key, value) in entries {
        let percent = value.as_f64().filter(|p| (0.0..=100.0).contains(p));
        match (LessonId::from_str(key), percent) {
            (Ok(lesson), Some(percent)) => {
                progress.insert(lesson, percent);
            }
            _ => dropped = true,
        }
    }
    if dropped {
        repairs.push(repair(FIELD, FieldIssue::InvalidEntries));
    }
    Some(progress)
}

fn play_time(value: &Value) -> Option<u64> {
    if let Some(ms) = value.as_u64() {
        return Some(ms);
    }
    // Older saves wrote fractional milliseconds.
    value
        .as_f64()
        .filter(|ms| ms.is_finite() && *ms >= 0.0)
        .map(|ms| ms.round() as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ids::{AreaId, LessonId, PageId};
    use crate::model::record::{DEFAULT_LOCATION, Mutation, STARTING_AREA};
    use crate::time::fixed_now;
    use chrono::Duration;
    use serde_json::json;

    fn issues(parsed: &ParsedRecord) -> Vec<(&'static str, FieldIssue)> {
        match parsed {
            ParsedRecord::Valid(_) => Vec::new(),
            ParsedRecord::Recovered { repairs, .. } => {
                repairs.iter().map(|r| (r.field, r.issue)).collect()
            }
        }
    }

    #[test]
    fn valid_record_round_trips() {
        let now = fixed_now();
        let mut record = LearnerRecord::new(now);
        record.apply(Mutation::CompleteLesson(LessonId::new("hieroglyphics")), now);
        record.apply(Mutation::CollectPage(PageId::new("page-hieroglyphics")), now);
        record.apply(
            Mutation::UpdateLessonProgress {
                lesson: LessonId::new("marketplace"),
                percent: 33.5,
            },
            now,
        );
        record.stamp_saved(now + Duration::seconds(3));

        let raw = serde_json::to_string(&record).unwrap();
        let later = now + Duration::hours(1);
        let parsed = parse_record(&raw, later);

        assert!(!parsed.is_recovered());
        let loaded = parsed.into_record();
        assert!(loaded.same_progress(&record));
        assert_eq!(loaded.total_play_time_ms(), record.total_play_time_ms());
        assert_eq!(loaded.last_saved_at(), record.last_saved_at());
        assert_eq!(loaded.session_started_at(), later);
    }

    #[test]
    fn missing_fields_are_defaulted() {
        let raw = json!({
            "selectedPersona": "A",
            "completedLessons": ["hieroglyphics"],
        });
        let parsed = sanitize(&raw, fixed_now());
        assert!(parsed.is_recovered());

        let record = parsed.record();
        assert_eq!(record.selected_persona().map(|p| p.as_str()), Some("A"));
        assert!(record.is_lesson_completed(&LessonId::new("hieroglyphics")));
        assert_eq!(record.current_location().as_str(), DEFAULT_LOCATION);
        assert!(record.unlocked_areas().contains(STARTING_AREA));
        assert!(issues(&parsed).contains(&("currentLocation", FieldIssue::Missing)));
        assert!(issues(&parsed).contains(&("lessonProgress", FieldIssue::Missing)));
    }

    #[test]
    fn wrong_typed_arrays_are_defaulted_independently() {
        let raw = json!({
            "selectedPersona": null,
            "currentLocation": "egypt-tomb",
            "completedLessons": "hieroglyphics",
            "collectedPages": ["page-1", 7, null, "page-2"],
            "lessonProgress": { "a": 50, "b": 140, "c": "x" },
            "unlockedAreas": {"egypt-tomb": true},
            "achievements": [],
        });
        let parsed = sanitize(&raw, fixed_now());
        let found = issues(&parsed);

        assert!(found.contains(&("completedLessons", FieldIssue::WrongType)));
        assert!(found.contains(&("collectedPages", FieldIssue::InvalidEntries)));
        assert!(found.contains(&("lessonProgress", FieldIssue::InvalidEntries)));
        assert!(found.contains(&("unlockedAreas", FieldIssue::WrongType)));

        let record = parsed.record();
        assert_eq!(record.current_location().as_str(), "egypt-tomb");
        assert!(record.completed_lessons().is_empty());
        assert_eq!(record.collected_pages().len(), 2);
        assert_eq!(record.lesson_progress().len(), 1);
        assert_eq!(record.progress_for(&LessonId::new("a")), 50.0);
        assert_eq!(
            record.unlocked_areas().iter().collect::<Vec<_>>(),
            vec![&AreaId::new(STARTING_AREA)]
        );
    }

    #[test]
    fn unreadable_text_yields_default_record() {
        let parsed = parse_record("{not json", fixed_now());
        assert_eq!(issues(&parsed), vec![("record", FieldIssue::Unreadable)]);
        assert_eq!(parsed.record(), &LearnerRecord::new(fixed_now()));

        let parsed = parse_record("[1, 2, 3]", fixed_now());
        assert!(parsed.is_recovered());
        assert_eq!(parsed.strict(), Err(RecordError::Unreadable));
    }

    #[test]
    fn strict_names_the_first_bad_field() {
        let raw = json!({ "selectedPersona": 5 });
        let err = sanitize(&raw, fixed_now()).strict().unwrap_err();
        assert_eq!(
            err,
            RecordError::Field(FieldRepair {
                field: "selectedPersona",
                issue: FieldIssue::WrongType,
            })
        );
        assert_eq!(err.to_string(), "invalid record field selectedPersona: wrong type");
    }

    #[test]
    fn absent_metadata_is_not_damage() {
        let raw = json!({
            "selectedPersona": "A",
            "currentLocation": "egypt-tomb",
            "completedLessons": [],
            "collectedPages": [],
            "lessonProgress": {},
            "unlockedAreas": ["egypt-tomb"],
            "achievements": [],
            "totalPlayTime": 1234.6,
        });
        let parsed = sanitize(&raw, fixed_now());
        assert!(!parsed.is_recovered());
        assert_eq!(parsed.record().total_play_time_ms(), 1235);
    }

    #[test]
    fn malformed_metadata_is_damage() {
        let raw = json!({
            "selectedPersona": "A",
            "currentLocation": "egypt-tomb",
            "completedLessons": [],
            "collectedPages": [],
            "lessonProgress": {},
            "unlockedAreas": ["egypt-tomb"],
            "achievements": [],
            "totalPlayTime": -4,
            "lastSavedAt": "yesterday",
        });
        let parsed = sanitize(&raw, fixed_now());
        let found = issues(&parsed);
        assert!(found.contains(&("totalPlayTime", FieldIssue::WrongType)));
        assert!(found.contains(&("lastSavedAt", FieldIssue::WrongType)));
        assert_eq!(parsed.record().total_play_time_ms(), 0);
    }
}
