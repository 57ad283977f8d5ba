//! Durable save-slot storage: an async repository trait with in-memory and
//! `SQLite` backends.

pub mod repository;
pub mod sqlite;

pub use repository::{InMemoryRepository, SaveSlot, SaveSlotRepository, Storage, StorageError};
