//! State store: the persisted Document/Result/Batch operations the worker,
//! coordinator, and operator paths drive.
//!
//! The store is a trait so the pipeline services can be exercised against
//! in-memory implementations; the Postgres implementation delegates to the
//! model-level SQL. Illegal status transitions are rejected here, not left
//! to caller discipline.

use async_trait::async_trait;
use sqlx::PgPool;
use tracing::warn;
use uuid::Uuid;

use super::models::batch::{Batch, BatchStatus, BatchStatusCounts};
use super::models::document::{Document, DocumentStatus};
use super::models::result::{AssessmentResult, ResultUpdate};
use crate::error::PipelineError;

/// Persisted state transitions for documents, results, and batches.
#[async_trait]
pub trait StateStore: Send + Sync {
    // --- Documents ---

    async fn create_document(&self, document: Document) -> Result<Document, PipelineError>;

    async fn get_document(
        &self,
        id: Uuid,
        owner_id: Uuid,
    ) -> Result<Option<Document>, PipelineError>;

    async fn update_document_status(
        &self,
        id: Uuid,
        owner_id: Uuid,
        status: DocumentStatus,
        score: Option<f64>,
        character_count: Option<i64>,
        word_count: Option<i64>,
    ) -> Result<Document, PipelineError>;

    async fn update_document_counts(
        &self,
        id: Uuid,
        owner_id: Uuid,
        character_count: i64,
        word_count: i64,
    ) -> Result<Document, PipelineError>;

    /// Soft-delete a document; returns its blob path when a row was
    /// flagged. The paired result soft-delete is a separate atomic unit;
    /// the caller decides ordering and tolerates partial failure by
    /// logging.
    async fn soft_delete_document(
        &self,
        id: Uuid,
        owner_id: Uuid,
    ) -> Result<Option<String>, PipelineError>;

    // --- Results ---

    async fn get_result_by_document(
        &self,
        document_id: Uuid,
        owner_id: Uuid,
    ) -> Result<Option<AssessmentResult>, PipelineError>;

    async fn create_result(
        &self,
        document_id: Uuid,
        owner_id: Uuid,
    ) -> Result<AssessmentResult, PipelineError>;

    async fn update_result(
        &self,
        result_id: Uuid,
        owner_id: Uuid,
        update: ResultUpdate,
    ) -> Result<AssessmentResult, PipelineError>;

    async fn soft_delete_result_by_document(
        &self,
        document_id: Uuid,
        owner_id: Uuid,
    ) -> Result<bool, PipelineError>;

    // --- Operator actions ---

    /// Manual reset: document to ERROR and result to FAILED, without
    /// re-enqueueing anything.
    async fn reset_document(&self, id: Uuid, owner_id: Uuid) -> Result<(), PipelineError>;

    /// Reprocess: document back to QUEUED and result back to PENDING with
    /// detection output cleared. The caller enqueues the fresh task.
    async fn reprocess_document(&self, id: Uuid, owner_id: Uuid)
        -> Result<Document, PipelineError>;

    // --- Batches ---

    async fn create_batch(
        &self,
        owner_id: Uuid,
        total_files: i64,
        priority: i32,
        status: BatchStatus,
    ) -> Result<Batch, PipelineError>;

    async fn active_batches(&self) -> Result<Vec<Batch>, PipelineError>;

    async fn batch_document_status_counts(
        &self,
        batch_id: Uuid,
    ) -> Result<BatchStatusCounts, PipelineError>;

    async fn update_batch_rollup(
        &self,
        batch_id: Uuid,
        completed_files: i64,
        failed_files: i64,
        status: BatchStatus,
    ) -> Result<(), PipelineError>;
}

/// PostgreSQL-backed state store.
pub struct PostgresStateStore {
    pool: PgPool,
}

impl PostgresStateStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl StateStore for PostgresStateStore {
    async fn create_document(&self, document: Document) -> Result<Document, PipelineError> {
        document.insert(&self.pool).await
    }

    async fn get_document(
        &self,
        id: Uuid,
        owner_id: Uuid,
    ) -> Result<Option<Document>, PipelineError> {
        Document::find_by_id(id, owner_id, &self.pool).await
    }

    async fn update_document_status(
        &self,
        id: Uuid,
        owner_id: Uuid,
        status: DocumentStatus,
        score: Option<f64>,
        character_count: Option<i64>,
        word_count: Option<i64>,
    ) -> Result<Document, PipelineError> {
        Document::update_status(
            id,
            owner_id,
            status,
            score,
            character_count,
            word_count,
            &self.pool,
        )
        .await
    }

    async fn update_document_counts(
        &self,
        id: Uuid,
        owner_id: Uuid,
        character_count: i64,
        word_count: i64,
    ) -> Result<Document, PipelineError> {
        Document::update_counts(id, owner_id, character_count, word_count, &self.pool).await
    }

    async fn soft_delete_document(
        &self,
        id: Uuid,
        owner_id: Uuid,
    ) -> Result<Option<String>, PipelineError> {
        Document::soft_delete(id, owner_id, &self.pool).await
    }

    async fn get_result_by_document(
        &self,
        document_id: Uuid,
        owner_id: Uuid,
    ) -> Result<Option<AssessmentResult>, PipelineError> {
        AssessmentResult::find_by_document(document_id, owner_id, &self.pool).await
    }

    async fn create_result(
        &self,
        document_id: Uuid,
        owner_id: Uuid,
    ) -> Result<AssessmentResult, PipelineError> {
        AssessmentResult::create(document_id, owner_id, &self.pool).await
    }

    async fn update_result(
        &self,
        result_id: Uuid,
        owner_id: Uuid,
        update: ResultUpdate,
    ) -> Result<AssessmentResult, PipelineError> {
        AssessmentResult::update(result_id, owner_id, update, &self.pool).await
    }

    async fn soft_delete_result_by_document(
        &self,
        document_id: Uuid,
        owner_id: Uuid,
    ) -> Result<bool, PipelineError> {
        AssessmentResult::soft_delete_by_document(document_id, owner_id, &self.pool).await
    }

    async fn reset_document(&self, id: Uuid, owner_id: Uuid) -> Result<(), PipelineError> {
        self.update_document_status(id, owner_id, DocumentStatus::Error, None, None, None)
            .await?;

        match self.get_result_by_document(id, owner_id).await? {
            Some(result) => {
                self.update_result(result.id, owner_id, ResultUpdate::failed("Manually reset"))
                    .await?;
            }
            None => {
                warn!(document_id = %id, "reset requested for document without a result");
            }
        }

        Ok(())
    }

    async fn reprocess_document(
        &self,
        id: Uuid,
        owner_id: Uuid,
    ) -> Result<Document, PipelineError> {
        let document = self
            .update_document_status(id, owner_id, DocumentStatus::Queued, None, None, None)
            .await?;

        let result = match self.get_result_by_document(id, owner_id).await? {
            Some(result) => result,
            None => self.create_result(id, owner_id).await?,
        };
        self.update_result(result.id, owner_id, ResultUpdate::pending_reset())
            .await?;

        Ok(document)
    }

    async fn create_batch(
        &self,
        owner_id: Uuid,
        total_files: i64,
        priority: i32,
        status: BatchStatus,
    ) -> Result<Batch, PipelineError> {
        Batch::create(owner_id, total_files, priority, status, &self.pool).await
    }

    async fn active_batches(&self) -> Result<Vec<Batch>, PipelineError> {
        Batch::find_active(&self.pool).await
    }

    async fn batch_document_status_counts(
        &self,
        batch_id: Uuid,
    ) -> Result<BatchStatusCounts, PipelineError> {
        Batch::document_status_counts(batch_id, &self.pool).await
    }

    async fn update_batch_rollup(
        &self,
        batch_id: Uuid,
        completed_files: i64,
        failed_files: i64,
        status: BatchStatus,
    ) -> Result<(), PipelineError> {
        Batch::update_rollup(batch_id, completed_files, failed_files, status, &self.pool).await
    }
}
