//! Domain model for the chronicle learning engine: learner records and their
//! recovery, static lesson content, assessment sessions, analytics and
//! difficulty adaptation.

pub mod adaptive;
pub mod analytics;
pub mod config;
pub mod error;
pub mod model;
pub mod time;

pub use config::EngineConfig;
pub use error::Error;
pub use time::{Clock, elapsed_millis, fixed_clock, fixed_now};
