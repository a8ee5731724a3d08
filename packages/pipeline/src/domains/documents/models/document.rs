//! Document model - SQL persistence layer
//!
//! A document is one uploaded file owned by exactly one teacher. All reads
//! outside administrative paths are scoped by `owner_id`. Deletion is soft:
//! the row stays behind `is_deleted = true` so history survives.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use typed_builder::TypedBuilder;
use uuid::Uuid;

use crate::error::PipelineError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, Default)]
#[sqlx(type_name = "document_status", rename_all = "snake_case")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DocumentStatus {
    #[default]
    Uploaded,
    Queued,
    Processing,
    Completed,
    Error,
    LimitExceeded,
    Deleted,
}

impl DocumentStatus {
    /// Whether a transition from `self` to `next` is legal.
    ///
    /// Re-entering the same state is always allowed: a re-claimed task
    /// replays its sequence after a crash, so every state the worker writes
    /// must be re-writable. Completed and LimitExceeded admit Processing
    /// for the same reason (crash after the final write but before the
    /// task was consumed).
    pub fn can_transition_to(self, next: DocumentStatus) -> bool {
        use DocumentStatus::*;
        if self == next || next == Deleted {
            return true;
        }
        match (self, next) {
            (Uploaded, Queued) | (Uploaded, Processing) => true,
            (Queued, Processing) | (Queued, Error) => true,
            (Processing, Completed) | (Processing, Error) | (Processing, LimitExceeded) => true,
            (Completed, Queued) | (Completed, Processing) | (Completed, Error) => true,
            (Error, Queued) | (Error, Processing) => true,
            (LimitExceeded, Queued) | (LimitExceeded, Processing) => true,
            _ => false,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            DocumentStatus::Uploaded => "UPLOADED",
            DocumentStatus::Queued => "QUEUED",
            DocumentStatus::Processing => "PROCESSING",
            DocumentStatus::Completed => "COMPLETED",
            DocumentStatus::Error => "ERROR",
            DocumentStatus::LimitExceeded => "LIMIT_EXCEEDED",
            DocumentStatus::Deleted => "DELETED",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "file_type", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum FileType {
    Pdf,
    Docx,
    Txt,
    Png,
    Jpg,
}

impl FileType {
    /// Map a file extension to a file type. Aliases (`text`, `jpeg`) fold
    /// into their canonical variants.
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "pdf" => Some(FileType::Pdf),
            "docx" => Some(FileType::Docx),
            "txt" | "text" => Some(FileType::Txt),
            "png" => Some(FileType::Png),
            "jpg" | "jpeg" => Some(FileType::Jpg),
            _ => None,
        }
    }

    /// Images are stored but never run through text extraction.
    pub fn is_extractable(self) -> bool {
        !matches!(self, FileType::Png | FileType::Jpg)
    }
}

impl std::fmt::Display for FileType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            FileType::Pdf => "pdf",
            FileType::Docx => "docx",
            FileType::Txt => "txt",
            FileType::Png => "png",
            FileType::Jpg => "jpg",
        };
        write!(f, "{}", name)
    }
}

#[derive(sqlx::FromRow, Debug, Clone, Serialize, Deserialize, TypedBuilder)]
#[builder(field_defaults(setter(into)))]
pub struct Document {
    #[builder(default = Uuid::new_v4())]
    pub id: Uuid,
    pub owner_id: Uuid,
    pub original_filename: String,
    pub blob_path: String,
    pub file_type: FileType,
    #[builder(default, setter(strip_option))]
    pub student_id: Option<Uuid>,
    #[builder(default, setter(strip_option))]
    pub assignment_id: Option<Uuid>,
    #[builder(default, setter(strip_option))]
    pub batch_id: Option<Uuid>,
    #[builder(default = 0)]
    pub priority: i32,
    #[builder(default)]
    pub status: DocumentStatus,
    #[builder(default, setter(strip_option))]
    pub character_count: Option<i64>,
    #[builder(default, setter(strip_option))]
    pub word_count: Option<i64>,
    #[builder(default, setter(strip_option))]
    pub score: Option<f64>,
    #[builder(default = Utc::now())]
    pub upload_timestamp: DateTime<Utc>,
    #[builder(default = false)]
    pub is_deleted: bool,
    #[builder(default = Utc::now())]
    pub created_at: DateTime<Utc>,
    #[builder(default = Utc::now())]
    pub updated_at: DateTime<Utc>,
}

impl Document {
    /// Find an active document scoped by owner.
    pub async fn find_by_id(
        id: Uuid,
        owner_id: Uuid,
        pool: &PgPool,
    ) -> Result<Option<Self>, PipelineError> {
        let document = sqlx::query_as::<_, Self>(
            "SELECT * FROM documents WHERE id = $1 AND owner_id = $2 AND is_deleted = FALSE",
        )
        .bind(id)
        .bind(owner_id)
        .fetch_optional(pool)
        .await?;

        Ok(document)
    }

    /// Insert a new document row.
    pub async fn insert(&self, pool: &PgPool) -> Result<Self, PipelineError> {
        let document = sqlx::query_as::<_, Self>(
            r#"
            INSERT INTO documents (
                id, owner_id, original_filename, blob_path, file_type,
                student_id, assignment_id, batch_id, priority, status,
                character_count, word_count, score, upload_timestamp,
                is_deleted, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)
            RETURNING *
            "#,
        )
        .bind(self.id)
        .bind(self.owner_id)
        .bind(&self.original_filename)
        .bind(&self.blob_path)
        .bind(self.file_type)
        .bind(self.student_id)
        .bind(self.assignment_id)
        .bind(self.batch_id)
        .bind(self.priority)
        .bind(self.status)
        .bind(self.character_count)
        .bind(self.word_count)
        .bind(self.score)
        .bind(self.upload_timestamp)
        .bind(self.is_deleted)
        .bind(self.created_at)
        .bind(self.updated_at)
        .fetch_one(pool)
        .await?;

        Ok(document)
    }

    /// Update status, guarding the transition table. Score and counts ride
    /// along when provided so the final write of an assessment is one
    /// statement. Score only survives on COMPLETED; every other status
    /// clears it.
    pub async fn update_status(
        id: Uuid,
        owner_id: Uuid,
        status: DocumentStatus,
        score: Option<f64>,
        character_count: Option<i64>,
        word_count: Option<i64>,
        pool: &PgPool,
    ) -> Result<Self, PipelineError> {
        let current = Self::find_by_id(id, owner_id, pool)
            .await?
            .ok_or(PipelineError::DocumentMissing {
                document_id: id,
                owner_id,
            })?;

        if !current.status.can_transition_to(status) {
            return Err(PipelineError::TransitionRejected {
                entity: "document",
                from: current.status.as_str().to_string(),
                to: status.as_str().to_string(),
            });
        }

        let document = sqlx::query_as::<_, Self>(
            r#"
            UPDATE documents
            SET status = $3,
                score = CASE WHEN $3 = 'completed'::document_status
                             THEN COALESCE($4, score)
                             ELSE NULL END,
                character_count = COALESCE($5, character_count),
                word_count = COALESCE($6, word_count),
                updated_at = NOW()
            WHERE id = $1 AND owner_id = $2 AND is_deleted = FALSE
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(owner_id)
        .bind(status)
        .bind(score)
        .bind(character_count)
        .bind(word_count)
        .fetch_one(pool)
        .await?;

        Ok(document)
    }

    /// Persist extraction counts without touching status.
    pub async fn update_counts(
        id: Uuid,
        owner_id: Uuid,
        character_count: i64,
        word_count: i64,
        pool: &PgPool,
    ) -> Result<Self, PipelineError> {
        let document = sqlx::query_as::<_, Self>(
            r#"
            UPDATE documents
            SET character_count = $3, word_count = $4, updated_at = NOW()
            WHERE id = $1 AND owner_id = $2 AND is_deleted = FALSE
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(owner_id)
        .bind(character_count)
        .bind(word_count)
        .fetch_optional(pool)
        .await?;

        document.ok_or(PipelineError::DocumentMissing {
            document_id: id,
            owner_id,
        })
    }

    /// Soft-delete a document and return its blob path for cleanup.
    ///
    /// The fetch and the flag write run in one transaction so the returned
    /// blob path always matches the row that was actually deleted.
    pub async fn soft_delete(
        id: Uuid,
        owner_id: Uuid,
        pool: &PgPool,
    ) -> Result<Option<String>, PipelineError> {
        let mut tx = pool.begin().await?;

        let blob_path: Option<String> = sqlx::query_scalar(
            "SELECT blob_path FROM documents
             WHERE id = $1 AND owner_id = $2 AND is_deleted = FALSE
             FOR UPDATE",
        )
        .bind(id)
        .bind(owner_id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(blob_path) = blob_path else {
            tx.rollback().await?;
            return Ok(None);
        };

        sqlx::query(
            "UPDATE documents
             SET is_deleted = TRUE, status = 'deleted', updated_at = NOW()
             WHERE id = $1 AND owner_id = $2",
        )
        .bind(id)
        .bind(owner_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(Some(blob_path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upload_flow_transitions_are_legal() {
        use DocumentStatus::*;
        assert!(Uploaded.can_transition_to(Queued));
        assert!(Queued.can_transition_to(Processing));
        assert!(Processing.can_transition_to(Completed));
        assert!(Processing.can_transition_to(Error));
        assert!(Processing.can_transition_to(LimitExceeded));
    }

    #[test]
    fn terminal_states_cannot_skip_back_to_uploaded() {
        use DocumentStatus::*;
        assert!(!Completed.can_transition_to(Uploaded));
        assert!(!Error.can_transition_to(Completed));
        assert!(!LimitExceeded.can_transition_to(Completed));
    }

    #[test]
    fn reprocess_paths_reenter_queued() {
        use DocumentStatus::*;
        assert!(Completed.can_transition_to(Queued));
        assert!(Error.can_transition_to(Queued));
        assert!(LimitExceeded.can_transition_to(Queued));
    }

    #[test]
    fn crash_recovery_reenters_processing() {
        use DocumentStatus::*;
        assert!(Completed.can_transition_to(Processing));
        assert!(LimitExceeded.can_transition_to(Processing));
        assert!(Error.can_transition_to(Processing));
        assert!(Processing.can_transition_to(Processing));
    }

    #[test]
    fn any_state_can_be_soft_deleted() {
        use DocumentStatus::*;
        for status in [Uploaded, Queued, Processing, Completed, Error, LimitExceeded] {
            assert!(status.can_transition_to(Deleted));
        }
    }

    #[test]
    fn uploaded_with_task_is_claimable() {
        // An upload path can enqueue before the QUEUED write lands; the
        // worker treats UPLOADED-with-task as valid and moves it straight
        // to PROCESSING.
        assert!(DocumentStatus::Uploaded.can_transition_to(DocumentStatus::Processing));
    }

    #[test]
    fn file_type_extension_aliases() {
        assert_eq!(FileType::from_extension("TXT"), Some(FileType::Txt));
        assert_eq!(FileType::from_extension("text"), Some(FileType::Txt));
        assert_eq!(FileType::from_extension("jpeg"), Some(FileType::Jpg));
        assert_eq!(FileType::from_extension("exe"), None);
    }

    #[test]
    fn images_are_not_extractable() {
        assert!(!FileType::Png.is_extractable());
        assert!(!FileType::Jpg.is_extractable());
        assert!(FileType::Pdf.is_extractable());
        assert!(FileType::Docx.is_extractable());
        assert!(FileType::Txt.is_extractable());
    }

    #[test]
    fn builder_defaults_to_uploaded() {
        let doc = Document::builder()
            .owner_id(Uuid::new_v4())
            .original_filename("essay.txt")
            .blob_path("blobs/essay.txt")
            .file_type(FileType::Txt)
            .build();
        assert_eq!(doc.status, DocumentStatus::Uploaded);
        assert!(!doc.is_deleted);
        assert!(doc.score.is_none());
    }
}
