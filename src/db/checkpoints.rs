//! Resume checkpoints: bytes already written for an in-flight file.

use crate::error::DatabaseError;
use crate::{Error, Result};

use super::Database;

impl Database {
    /// Get the stored checkpoint for a filename
    pub async fn get_checkpoint(&self, filename: &str) -> Result<Option<u64>> {
        let value: Option<i64> = sqlx::query_scalar(
            r#"
            SELECT bytes_written FROM resume_checkpoints WHERE filename = ?
            "#,
        )
        .bind(filename)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to get checkpoint: {}",
                e
            )))
        })?;

        Ok(value.map(|v| v.max(0) as u64))
    }

    /// Store (or overwrite) the checkpoint for a filename
    pub async fn set_checkpoint(&self, filename: &str, bytes_written: u64) -> Result<()> {
        let stored = i64::try_from(bytes_written).map_err(|_| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Checkpoint {} for {} exceeds the storable range",
                bytes_written, filename
            )))
        })?;
        let now = chrono::Utc::now().timestamp();
        sqlx::query(
            r#"
            INSERT INTO resume_checkpoints (filename, bytes_written, updated_at)
            VALUES (?, ?, ?)
            ON CONFLICT(filename) DO UPDATE SET bytes_written = ?, updated_at = ?
            "#,
        )
        .bind(filename)
        .bind(stored)
        .bind(now)
        .bind(stored)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to set checkpoint: {}",
                e
            )))
        })?;

        Ok(())
    }

    /// Remove the checkpoint for a filename (no-op if absent)
    pub async fn clear_checkpoint(&self, filename: &str) -> Result<()> {
        sqlx::query("DELETE FROM resume_checkpoints WHERE filename = ?")
            .bind(filename)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to clear checkpoint: {}",
                    e
                )))
            })?;

        Ok(())
    }
}
