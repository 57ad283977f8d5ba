use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;
use std::str::FromStr;

// ─── Parse Error ───────────────────────────────────────────────────────────────

/// Error type for parsing an identifier from a string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseIdError {
    kind: &'static str,
}

impl fmt::Display for ParseIdError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} cannot be empty or whitespace", self.kind)
    }
}

impl std::error::Error for ParseIdError {}

// ─── Identifier Types ──────────────────────────────────────────────────────────

/// Declares a string-backed identifier.
///
/// Identifiers are opaque slugs supplied by static content (`"hieroglyphics"`,
/// `"egypt-tomb"`) and serialize as bare JSON strings.
macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Creates a new identifier, trimming surrounding whitespace.
            ///
            /// A blank result is representable; [`LearnerRecord`](crate::model::LearnerRecord)
            /// refuses to store it.
            #[must_use]
            pub fn new(id: impl Into<String>) -> Self {
                let id = id.into();
                if id.trim().len() == id.len() {
                    Self(id)
                } else {
                    Self(id.trim().to_owned())
                }
            }

            #[must_use]
            pub fn is_blank(&self) -> bool {
                self.0.is_empty()
            }

            /// Returns the underlying string slice.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({:?})", stringify!($name), self.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl FromStr for $name {
            type Err = ParseIdError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let trimmed = s.trim();
                if trimmed.is_empty() {
                    return Err(ParseIdError {
                        kind: stringify!($name),
                    });
                }
                Ok(Self(trimmed.to_owned()))
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self::new(value)
            }
        }

        impl Borrow<str> for $name {
            fn borrow(&self) -> &str {
                &self.0
            }
        }
    };
}

string_id!(
    /// Playable persona chosen at the start of the story.
    PersonaId
);
string_id!(
    /// Named place in the story world.
    LocationId
);
string_id!(
    /// Lesson identifier, shared by lesson content and learner progress.
    LessonId
);
string_id!(
    /// Collectible journal page.
    PageId
);
string_id!(
    /// Unlockable area of the story world.
    AreaId
);
string_id!(AchievementId);
string_id!(QuestionId);
string_id!(
    /// Practice activity within a lesson.
    ActivityId
);
string_id!(
    /// Learner whose performance history is tracked.
    LearnerId
);

// ─── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lesson_id_display() {
        let id = LessonId::new("hieroglyphics");
        assert_eq!(id.to_string(), "hieroglyphics");
    }

    #[test]
    fn lesson_id_from_str_trims() {
        let id: LessonId = "  pyramid ".parse().unwrap();
        assert_eq!(id, LessonId::new("pyramid"));
    }

    #[test]
    fn new_trims_like_parse() {
        assert_eq!(LessonId::new(" pyramid\n"), "pyramid".parse().unwrap());
        assert!(PageId::new("   ").is_blank());
        assert!(!PageId::new("p1").is_blank());
    }

    #[test]
    fn blank_id_is_rejected() {
        let result = "   ".parse::<PageId>();
        assert!(result.is_err());
        assert_eq!(
            result.unwrap_err().to_string(),
            "PageId cannot be empty or whitespace"
        );
    }

    #[test]
    fn ids_serialize_as_plain_strings() {
        let json = serde_json::to_string(&AreaId::new("egypt-tomb")).unwrap();
        assert_eq!(json, "\"egypt-tomb\"");
        let back: AreaId = serde_json::from_str(&json).unwrap();
        assert_eq!(back.as_str(), "egypt-tomb");
    }

    #[test]
    fn debug_names_the_kind() {
        assert_eq!(
            format!("{:?}", QuestionId::new("q1")),
            "QuestionId(\"q1\")"
        );
    }
}
