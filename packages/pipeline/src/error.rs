//! Typed error taxonomy for the assessment pipeline.
//!
//! Every store and worker seam returns [`PipelineError`]. The worker never
//! lets one escape its loop: each error is classified into a
//! [`FailureClass`] and resolved as complete, defer, or dead-letter.

use thiserror::Error;
use uuid::Uuid;

use crate::domains::documents::models::FileType;
use crate::domains::teachers::quota::QuotaDenial;

#[derive(Debug, Error)]
pub enum PipelineError {
    /// The task queue could not be reached. The worker loop sleeps and
    /// retries on the next cycle.
    #[error("task queue unavailable: {0}")]
    QueueUnavailable(#[source] sqlx::Error),

    /// A claimed task references a document that no longer exists. The
    /// task is completed silently.
    #[error("document {document_id} not found for owner {owner_id}")]
    DocumentMissing { document_id: Uuid, owner_id: Uuid },

    /// An illegal state transition was attempted. Surfaced as a bug; the
    /// task is deferred and the transition logged.
    #[error("illegal {entity} transition: {from} -> {to}")]
    TransitionRejected {
        entity: &'static str,
        from: String,
        to: String,
    },

    /// Blob download failed (transport or storage error, not absence).
    #[error("blob storage failure for {path}: {detail}")]
    BlobUnavailable { path: String, detail: String },

    /// The blob named by the document does not exist in storage.
    #[error("blob not found: {path}")]
    BlobMissing { path: String },

    /// The extractor cannot handle this file type.
    #[error("unsupported file type: {0}")]
    UnsupportedFileType(FileType),

    /// Text extraction failed for a supported type.
    #[error("text extraction failed: {0}")]
    ExtractionFailed(String),

    /// Admission was refused by the quota ledger.
    #[error("{0}")]
    QuotaDenied(QuotaDenial),

    /// The owner referenced by a task has no teacher account, so limits
    /// cannot be verified.
    #[error("teacher account {owner_id} not found, cannot verify usage limits")]
    OwnerMissing { owner_id: Uuid },

    /// The AI detection service returned a non-2xx response or the call
    /// failed at the transport layer.
    #[error("AI detection service error: {0}")]
    AiService(String),

    /// A state-store read or write failed.
    #[error("persistence error: {0}")]
    Persistence(#[from] sqlx::Error),
}

/// How the worker resolves a failed step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// Defer the task with backoff; it will be retried.
    Transient,
    /// Consume the task; mark document ERROR and result FAILED.
    Terminal,
    /// Consume the task; mark document LIMIT_EXCEEDED and result FAILED.
    Denied,
}

impl PipelineError {
    /// Classify this error per the failure-class policy.
    pub fn class(&self) -> FailureClass {
        match self {
            PipelineError::QueueUnavailable(_)
            | PipelineError::TransitionRejected { .. }
            | PipelineError::BlobUnavailable { .. }
            | PipelineError::ExtractionFailed(_)
            | PipelineError::AiService(_)
            | PipelineError::Persistence(_) => FailureClass::Transient,

            PipelineError::DocumentMissing { .. }
            | PipelineError::BlobMissing { .. }
            | PipelineError::UnsupportedFileType(_)
            | PipelineError::OwnerMissing { .. } => FailureClass::Terminal,

            PipelineError::QuotaDenied(_) => FailureClass::Denied,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blob_transport_failures_are_transient() {
        let err = PipelineError::BlobUnavailable {
            path: "docs/a.pdf".into(),
            detail: "connection reset".into(),
        };
        assert_eq!(err.class(), FailureClass::Transient);
    }

    #[test]
    fn missing_blob_is_terminal() {
        let err = PipelineError::BlobMissing {
            path: "docs/a.pdf".into(),
        };
        assert_eq!(err.class(), FailureClass::Terminal);
    }

    #[test]
    fn unsupported_file_type_is_terminal() {
        let err = PipelineError::UnsupportedFileType(FileType::Png);
        assert_eq!(err.class(), FailureClass::Terminal);
    }

    #[test]
    fn detector_errors_are_transient() {
        let err = PipelineError::AiService("HTTP 503".into());
        assert_eq!(err.class(), FailureClass::Transient);
    }

    #[test]
    fn quota_denials_are_their_own_class() {
        use crate::domains::teachers::quota::LimitKind;

        let err = PipelineError::QuotaDenied(QuotaDenial {
            kind: LimitKind::Words,
            limit: 5_000,
            used: 4_998,
            requested: 10,
        });
        assert_eq!(err.class(), FailureClass::Denied);
        assert!(err.to_string().contains("word limit"));
    }
}
