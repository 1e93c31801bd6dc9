//! Cached descriptors and their last known download state.

use crate::error::{DatabaseError, FailureReason};
use crate::types::{DownloadDescriptor, DownloadState};
use crate::{Error, Result};

use super::{Database, DescriptorRow};

impl Database {
    /// Insert or replace a descriptor, resetting its state
    pub async fn upsert_descriptor(
        &self,
        descriptor: &DownloadDescriptor,
        state: DownloadState,
    ) -> Result<()> {
        let now = chrono::Utc::now().timestamp();

        let size_bytes = i64::try_from(descriptor.size_bytes).map_err(|_| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Size {} of {} exceeds the storable range",
                descriptor.size_bytes, descriptor.filename
            )))
        })?;
        sqlx::query(
            r#"
            INSERT INTO descriptors (
                filename, url, size_bytes, checksum, version_label,
                state, failure_reason, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, NULL, ?)
            ON CONFLICT(filename) DO UPDATE SET
                url = excluded.url,
                size_bytes = excluded.size_bytes,
                checksum = excluded.checksum,
                version_label = excluded.version_label,
                state = excluded.state,
                failure_reason = NULL,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&descriptor.filename)
        .bind(&descriptor.url)
        .bind(size_bytes)
        .bind(&descriptor.checksum)
        .bind(&descriptor.version_label)
        .bind(state.to_i32())
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to upsert descriptor: {}",
                e
            )))
        })?;

        Ok(())
    }

    /// Get a descriptor by filename
    pub async fn get_descriptor(&self, filename: &str) -> Result<Option<DescriptorRow>> {
        let row = sqlx::query_as::<_, DescriptorRow>(
            r#"
            SELECT
                filename, url, size_bytes, checksum, version_label,
                state, failure_reason, updated_at
            FROM descriptors
            WHERE filename = ?
            "#,
        )
        .bind(filename)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to get descriptor: {}",
                e
            )))
        })?;

        Ok(row)
    }

    /// List all known descriptors
    pub async fn list_descriptors(&self) -> Result<Vec<DescriptorRow>> {
        let rows = sqlx::query_as::<_, DescriptorRow>(
            r#"
            SELECT
                filename, url, size_bytes, checksum, version_label,
                state, failure_reason, updated_at
            FROM descriptors
            ORDER BY updated_at ASC, filename ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to list descriptors: {}",
                e
            )))
        })?;

        Ok(rows)
    }

    /// Update the state of a descriptor
    ///
    /// `failure` is stored alongside failure states and cleared otherwise.
    pub async fn update_state(
        &self,
        filename: &str,
        state: DownloadState,
        failure: Option<FailureReason>,
    ) -> Result<()> {
        let now = chrono::Utc::now().timestamp();

        sqlx::query(
            r#"
            UPDATE descriptors
            SET state = ?, failure_reason = ?, updated_at = ?
            WHERE filename = ?
            "#,
        )
        .bind(state.to_i32())
        .bind(failure.map(|f| f.code()))
        .bind(now)
        .bind(filename)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to update state: {}",
                e
            )))
        })?;

        Ok(())
    }

    /// Remove a descriptor
    pub async fn delete_descriptor(&self, filename: &str) -> Result<()> {
        sqlx::query("DELETE FROM descriptors WHERE filename = ?")
            .bind(filename)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to delete descriptor: {}",
                    e
                )))
            })?;

        Ok(())
    }
}
