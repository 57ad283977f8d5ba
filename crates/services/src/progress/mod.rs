//! Durable learner progress: the record store, its autosave worker and the
//! achievement rules evaluated against it.

pub mod achievements;
mod autosave;
mod store;

pub use achievements::{Achievement, AchievementStatus, Rule};
pub use autosave::ProgressService;
pub use store::{JournalProgress, LoadOutcome, ProgressStore};
