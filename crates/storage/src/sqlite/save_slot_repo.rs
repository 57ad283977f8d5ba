use chrono::{DateTime, Utc};
use sqlx::Row;

use super::SqliteRepository;
use crate::repository::{SaveSlot, SaveSlotRepository, StorageError};

fn conn(e: sqlx::Error) -> StorageError {
    StorageError::Connection(e.to_string())
}

fn ser<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Serialization(e.to_string())
}

#[async_trait::async_trait]
impl SaveSlotRepository for SqliteRepository {
    async fn read_slot(&self, key: &str) -> Result<Option<SaveSlot>, StorageError> {
        let row = sqlx::query(
            r"
            SELECT key, payload, updated_at
            FROM save_slots
            WHERE key = ?1
            ",
        )
        .bind(key)
        .fetch_optional(&self.pool)
        .await
        .map_err(conn)?;

        let Some(row) = row else {
            return Ok(None);
        };
        Ok(Some(SaveSlot {
            key: row.try_get("key").map_err(ser)?,
            payload: row.try_get("payload").map_err(ser)?,
            updated_at: row
                .try_get::<DateTime<Utc>, _>("updated_at")
                .map_err(ser)?,
        }))
    }

    async fn write_slot(
        &self,
        key: &str,
        payload: &str,
        at: DateTime<Utc>,
    ) -> Result<(), StorageError> {
        sqlx::query(
            r"
            INSERT INTO save_slots (key, payload, updated_at)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(key) DO UPDATE SET
                payload = excluded.payload,
                updated_at = excluded.updated_at
            ",
        )
        .bind(key)
        .bind(payload)
        .bind(at)
        .execute(&self.pool)
        .await
        .map_err(conn)?;
        Ok(())
    }

    async fn remove_slot(&self, key: &str) -> Result<(), StorageError> {
        let res = sqlx::query("DELETE FROM save_slots WHERE key = ?1")
            .bind(key)
            .execute(&self.pool)
            .await
            .map_err(conn)?;
        if res.rows_affected() == 0 {
            return Err(StorageError::NotFound);
        }
        Ok(())
    }
}
