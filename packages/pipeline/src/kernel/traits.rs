// Trait definitions for dependency injection
//
// These are INFRASTRUCTURE traits only - no business logic.
// Business logic (the assessment flow) lives in the worker and domains.
//
// Naming convention: Base* for trait names (e.g., BaseBlobStorage)

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domains::documents::models::FileType;
use crate::error::PipelineError;

// =============================================================================
// Blob Storage Trait (Infrastructure)
// =============================================================================

#[async_trait]
pub trait BaseBlobStorage: Send + Sync {
    /// Store bytes and return the opaque path they live under.
    async fn upload(&self, filename: &str, bytes: &[u8]) -> Result<String, PipelineError>;

    /// Fetch bytes by path. `Ok(None)` means the blob does not exist;
    /// transport and storage failures surface as errors.
    async fn download_bytes(&self, path: &str) -> Result<Option<Vec<u8>>, PipelineError>;

    /// Remove a blob. Deleting a missing blob is not an error.
    async fn delete(&self, path: &str) -> Result<(), PipelineError>;
}

// =============================================================================
// Text Extraction Trait (Infrastructure - CPU bound)
// =============================================================================

/// Pure text extraction. Implementations are synchronous; the worker runs
/// them on the blocking pool so extraction never stalls the I/O scheduler.
pub trait BaseTextExtractor: Send + Sync {
    fn extract(&self, bytes: &[u8], file_type: FileType) -> Result<String, PipelineError>;
}

// =============================================================================
// AI Detection Trait (Infrastructure - remote scoring endpoint)
// =============================================================================

/// Response shape of the detection endpoint.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DetectionResponse {
    pub ai_generated: bool,
    pub human_generated: bool,
    #[serde(default)]
    pub results: Vec<DetectionParagraph>,
}

/// One paragraph's score as returned by the service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionParagraph {
    pub paragraph: String,
    pub label: String,
    pub probability: f64,
}

#[async_trait]
pub trait BaseDetector: Send + Sync {
    /// Score a document's full text.
    async fn detect(&self, text: &str) -> Result<DetectionResponse, PipelineError>;
}
