//! Batch model - SQL persistence layer
//!
//! A batch groups a multi-file upload. Its rollup (completed/failed counts
//! and aggregate status) is derived from member document states by the
//! coordinator; the batch never drives its documents.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

use super::document::DocumentStatus;
use crate::error::PipelineError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, Default)]
#[sqlx(type_name = "batch_status", rename_all = "snake_case")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BatchStatus {
    #[default]
    Uploading,
    Validating,
    Queued,
    Processing,
    Completed,
    Partial,
    Failed,
    Error,
}

impl BatchStatus {
    /// Statuses the coordinator rescans. Terminal batches (and the
    /// degenerate zero-file FAILED batch set by the upload path) are left
    /// alone.
    pub const ACTIVE: [BatchStatus; 5] = [
        BatchStatus::Queued,
        BatchStatus::Processing,
        BatchStatus::Partial,
        BatchStatus::Uploading,
        BatchStatus::Validating,
    ];
}

#[derive(sqlx::FromRow, Debug, Clone)]
pub struct Batch {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub total_files: i64,
    pub completed_files: i64,
    pub failed_files: i64,
    pub status: BatchStatus,
    pub priority: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Per-status document counts for one batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchStatusCounts {
    pub completed: i64,
    pub failed: i64,
    pub processing: i64,
}

impl Batch {
    pub async fn create(
        owner_id: Uuid,
        total_files: i64,
        priority: i32,
        status: BatchStatus,
        pool: &PgPool,
    ) -> Result<Self, PipelineError> {
        let batch = sqlx::query_as::<_, Self>(
            r#"
            INSERT INTO batches (id, owner_id, total_files, status, priority)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(owner_id)
        .bind(total_files)
        .bind(status)
        .bind(priority)
        .fetch_one(pool)
        .await?;

        Ok(batch)
    }

    /// Batches the coordinator should rescan.
    pub async fn find_active(pool: &PgPool) -> Result<Vec<Self>, PipelineError> {
        let batches = sqlx::query_as::<_, Self>(
            "SELECT * FROM batches
             WHERE status = ANY($1)
             ORDER BY created_at ASC",
        )
        .bind(&BatchStatus::ACTIVE[..])
        .fetch_all(pool)
        .await?;

        Ok(batches)
    }

    /// Count member documents by the statuses the rollup cares about.
    /// Soft-deleted documents drop out of the aggregate.
    pub async fn document_status_counts(
        batch_id: Uuid,
        pool: &PgPool,
    ) -> Result<BatchStatusCounts, PipelineError> {
        let rows: Vec<(DocumentStatus, i64)> = sqlx::query_as(
            "SELECT status, COUNT(*) FROM documents
             WHERE batch_id = $1 AND is_deleted = FALSE
             GROUP BY status",
        )
        .bind(batch_id)
        .fetch_all(pool)
        .await?;

        let mut counts = BatchStatusCounts::default();
        for (status, count) in rows {
            match status {
                DocumentStatus::Completed => counts.completed = count,
                DocumentStatus::Error => counts.failed = count,
                DocumentStatus::Processing => counts.processing = count,
                _ => {}
            }
        }

        Ok(counts)
    }

    /// Persist a freshly derived rollup.
    pub async fn update_rollup(
        batch_id: Uuid,
        completed_files: i64,
        failed_files: i64,
        status: BatchStatus,
        pool: &PgPool,
    ) -> Result<(), PipelineError> {
        sqlx::query(
            "UPDATE batches
             SET completed_files = $2, failed_files = $3, status = $4, updated_at = NOW()
             WHERE id = $1",
        )
        .bind(batch_id)
        .bind(completed_files)
        .bind(failed_files)
        .bind(status)
        .execute(pool)
        .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn active_statuses_exclude_terminal_states() {
        assert!(!BatchStatus::ACTIVE.contains(&BatchStatus::Completed));
        assert!(!BatchStatus::ACTIVE.contains(&BatchStatus::Failed));
        assert!(!BatchStatus::ACTIVE.contains(&BatchStatus::Error));
    }

    #[test]
    fn upload_phase_statuses_are_active() {
        assert!(BatchStatus::ACTIVE.contains(&BatchStatus::Uploading));
        assert!(BatchStatus::ACTIVE.contains(&BatchStatus::Validating));
        assert!(BatchStatus::ACTIVE.contains(&BatchStatus::Partial));
    }
}
