//! Assessment worker: drains the task queue one task at a time.
//!
//! Each claimed task is driven end-to-end: document to PROCESSING, result
//! ensured and set PROCESSING, text extracted and counted, admission
//! checked against the owner's plan, the detection endpoint called, and
//! the result/document finalized. Failures never escape the loop; every
//! step classifies its error and resolves the task as complete, defer, or
//! (via the claim path) dead-letter.
//!
//! ```text
//! AssessmentWorker
//!     │
//!     ├─► TaskStore.claim_next (lease)
//!     ├─► StateStore: document -> PROCESSING, result -> PROCESSING
//!     ├─► BlobStorage.download + TextExtractor.extract (blocking pool)
//!     ├─► QuotaLedger.admit
//!     ├─► Detector.detect
//!     ├─► StateStore: persist result + document final status
//!     └─► QuotaLedger.record_usage + TaskStore.complete
//! ```
//!
//! Any number of workers may run concurrently; the claim lease is the only
//! coordination between them.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::store::{backoff_delay, TaskStore};
use super::task::Task;
use crate::domains::documents::models::{
    Document, DocumentStatus, ParagraphResult, ResultUpdate, LABEL_AI_GENERATED,
    LABEL_HUMAN_WRITTEN, LABEL_UNDETERMINED,
};
use crate::domains::documents::text;
use crate::domains::documents::StateStore;
use crate::domains::teachers::models::SubscriptionPlan;
use crate::domains::teachers::{Admission, QuotaLedger};
use crate::error::{FailureClass, PipelineError};
use crate::kernel::service_host::Service;
use crate::kernel::traits::{BaseBlobStorage, BaseDetector, BaseTextExtractor, DetectionResponse};

/// Configuration for one worker instance.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Sleep between polls when the queue is empty.
    pub poll_interval: Duration,
    /// Task visibility timeout taken at claim.
    pub lease_duration: Duration,
    /// Base of the retry backoff schedule.
    pub backoff_base: Duration,
    /// Upper bound of the retry backoff schedule.
    pub backoff_cap: Duration,
    /// Worker ID for this instance (log correlation only).
    pub worker_id: String,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(10),
            lease_duration: Duration::from_secs(60),
            backoff_base: Duration::from_secs(10),
            backoff_cap: Duration::from_secs(3_600),
            worker_id: format!("worker-{}", Uuid::new_v4()),
        }
    }
}

/// Map a successful detection response to the overall score and label.
pub fn map_detection(response: &DetectionResponse) -> (Option<f64>, &'static str) {
    if response.ai_generated {
        (Some(1.0), LABEL_AI_GENERATED)
    } else if response.human_generated {
        (Some(0.0), LABEL_HUMAN_WRITTEN)
    } else {
        (None, LABEL_UNDETERMINED)
    }
}

pub struct AssessmentWorker {
    tasks: Arc<dyn TaskStore>,
    state: Arc<dyn StateStore>,
    quota: Arc<dyn QuotaLedger>,
    blobs: Arc<dyn BaseBlobStorage>,
    extractor: Arc<dyn BaseTextExtractor>,
    detector: Arc<dyn BaseDetector>,
    config: WorkerConfig,
}

impl AssessmentWorker {
    pub fn new(
        tasks: Arc<dyn TaskStore>,
        state: Arc<dyn StateStore>,
        quota: Arc<dyn QuotaLedger>,
        blobs: Arc<dyn BaseBlobStorage>,
        extractor: Arc<dyn BaseTextExtractor>,
        detector: Arc<dyn BaseDetector>,
        config: WorkerConfig,
    ) -> Self {
        Self {
            tasks,
            state,
            quota,
            blobs,
            extractor,
            detector,
            config,
        }
    }

    /// Claim and run one task. Returns whether a task was processed.
    pub async fn step(&self) -> Result<bool, PipelineError> {
        let Some(task) = self.tasks.claim_next(self.config.lease_duration).await? else {
            return Ok(false);
        };

        info!(
            worker_id = %self.config.worker_id,
            task_id = %task.id,
            document_id = %task.document_id,
            attempts = task.attempts,
            "claimed task"
        );
        self.process_task(&task).await;
        Ok(true)
    }

    /// Drive one claimed task end-to-end. Never returns an error: every
    /// failure is resolved against the queue before this returns.
    async fn process_task(&self, task: &Task) {
        let document_id = task.document_id;
        let owner_id = task.owner_id;

        // The document may have been removed after enqueue; consume the
        // task silently.
        let document = match self.state.get_document(document_id, owner_id).await {
            Ok(Some(document)) => document,
            Ok(None) => {
                info!(task_id = %task.id, document_id = %document_id, "document gone, dropping task");
                self.complete_task(task).await;
                return;
            }
            Err(e) => {
                warn!(task_id = %task.id, error = %e, "document lookup failed");
                self.defer_task(task, "DOCUMENT_LOOKUP_FAILED").await;
                return;
            }
        };

        if let Err(e) = self
            .state
            .update_document_status(
                document_id,
                owner_id,
                DocumentStatus::Processing,
                None,
                None,
                None,
            )
            .await
        {
            error!(task_id = %task.id, document_id = %document_id, error = %e,
                   "failed to move document to PROCESSING");
            self.defer_task(task, "DB_UPDATE_PROCESSING_FAILED").await;
            return;
        }

        // Ensure a result row exists before any scoring work.
        let result = match self.state.get_result_by_document(document_id, owner_id).await {
            Ok(Some(result)) => result,
            Ok(None) => match self.state.create_result(document_id, owner_id).await {
                Ok(result) => result,
                Err(e) => {
                    error!(task_id = %task.id, document_id = %document_id, error = %e,
                           "failed to create result record");
                    self.mark_document_error(document_id, owner_id).await;
                    self.defer_task(task, "RESULT_CREATION_FAILED").await;
                    return;
                }
            },
            Err(e) => {
                warn!(task_id = %task.id, error = %e, "result lookup failed");
                self.defer_task(task, "RESULT_LOOKUP_FAILED").await;
                return;
            }
        };

        if let Err(e) = self
            .state
            .update_result(result.id, owner_id, ResultUpdate::processing())
            .await
        {
            error!(task_id = %task.id, result_id = %result.id, error = %e,
                   "failed to move result to PROCESSING");
            self.defer_task(task, "RESULT_UPDATE_PROCESSING_FAILED").await;
            return;
        }

        // Text extraction. Counts are persisted before any admission or
        // scoring decision.
        let extracted = match self.extract_text(&document).await {
            Ok(text) => text,
            Err(e) => {
                self.resolve_failure(task, document_id, owner_id, result.id, e)
                    .await;
                return;
            }
        };
        let character_count = text::character_count(&extracted) as i64;
        let word_count = text::word_count(&extracted) as i64;
        debug!(document_id = %document_id, character_count, word_count, "text extracted");

        if let Err(e) = self
            .state
            .update_document_counts(document_id, owner_id, character_count, word_count)
            .await
        {
            // Scoring is more important than the counts; proceed with the
            // stale row and surface the write failure in the logs.
            error!(document_id = %document_id, error = %e, "failed to persist extraction counts");
        }

        // Admission control. A denial is resolved like any other failure,
        // carrying its class through the error taxonomy.
        let plan = match self.quota.admit(owner_id, word_count, character_count).await {
            Ok(Admission::Admitted { plan }) => plan,
            Ok(Admission::Denied(denial)) => {
                info!(task_id = %task.id, document_id = %document_id, %denial, "admission denied");
                self.resolve_failure(
                    task,
                    document_id,
                    owner_id,
                    result.id,
                    PipelineError::QuotaDenied(denial),
                )
                .await;
                return;
            }
            Err(e) => {
                self.resolve_failure(task, document_id, owner_id, result.id, e)
                    .await;
                return;
            }
        };

        // Score the text. Empty documents skip the remote call and count
        // as human written.
        let response = if extracted.is_empty() {
            debug!(document_id = %document_id, "empty text, skipping detection call");
            DetectionResponse {
                ai_generated: false,
                human_generated: true,
                results: Vec::new(),
            }
        } else {
            match self.detector.detect(&extracted).await {
                Ok(response) => response,
                Err(e) => {
                    warn!(task_id = %task.id, document_id = %document_id, error = %e,
                          "detection call failed");
                    self.resolve_failure(task, document_id, owner_id, result.id, e)
                        .await;
                    return;
                }
            }
        };

        let (score, label) = map_detection(&response);
        let paragraphs: Vec<ParagraphResult> = response
            .results
            .iter()
            .map(|p| ParagraphResult {
                text: p.paragraph.clone(),
                label: p.label.clone(),
                probability: p.probability,
            })
            .collect();

        let update = ResultUpdate::completed(
            score,
            label,
            response.ai_generated,
            response.human_generated,
            paragraphs,
        );
        if let Err(e) = self.state.update_result(result.id, owner_id, update).await {
            error!(task_id = %task.id, result_id = %result.id, error = %e,
                   "failed to persist detection output");
            self.defer_task(task, "RESULT_UPDATE_DETECTION_FAILED").await;
            return;
        }

        if let Err(e) = self
            .state
            .update_document_status(
                document_id,
                owner_id,
                DocumentStatus::Completed,
                score,
                None,
                None,
            )
            .await
        {
            error!(task_id = %task.id, document_id = %document_id, error = %e,
                   "failed to move document to COMPLETED");
            self.defer_task(task, "DOC_UPDATE_COMPLETED_FAILED").await;
            return;
        }

        // The single usage-recording site. Schools accounts are unlimited
        // and never accrue usage.
        if plan != SubscriptionPlan::Schools {
            if let Err(e) = self
                .quota
                .record_usage(owner_id, word_count, character_count, 1)
                .await
            {
                error!(owner_id = %owner_id, error = %e, "failed to record usage");
            }
        }

        info!(
            task_id = %task.id,
            document_id = %document_id,
            label,
            score = ?score,
            "assessment completed"
        );
        self.complete_task(task).await;
    }

    /// Download and extract on the blocking pool.
    async fn extract_text(&self, document: &Document) -> Result<String, PipelineError> {
        let bytes = self
            .blobs
            .download_bytes(&document.blob_path)
            .await?
            .ok_or_else(|| PipelineError::BlobMissing {
                path: document.blob_path.clone(),
            })?;

        let extractor = Arc::clone(&self.extractor);
        let file_type = document.file_type;
        tokio::task::spawn_blocking(move || extractor.extract(&bytes, file_type))
            .await
            .map_err(|e| PipelineError::ExtractionFailed(format!("extraction panicked: {}", e)))?
    }

    /// Resolve a mid-flight failure per its class: transient errors mark
    /// the pair ERROR/FAILED and defer; terminal errors mark the pair and
    /// consume the task; denials finish as LIMIT_EXCEEDED.
    async fn resolve_failure(
        &self,
        task: &Task,
        document_id: Uuid,
        owner_id: Uuid,
        result_id: Uuid,
        error: PipelineError,
    ) {
        let message = error.to_string();
        match error.class() {
            FailureClass::Transient => {
                self.mark_pair_failed(document_id, owner_id, result_id, &message)
                    .await;
                self.defer_task(task, &message).await;
            }
            FailureClass::Terminal => {
                warn!(task_id = %task.id, document_id = %document_id, error = %message,
                      "terminal failure, consuming task");
                if self
                    .mark_pair_failed(document_id, owner_id, result_id, &message)
                    .await
                {
                    self.complete_task(task).await;
                } else {
                    // Couldn't record the terminal state; keep the task so
                    // a later attempt can.
                    self.defer_task(task, "DB_UPDATE_TERMINAL_FAILED").await;
                }
            }
            FailureClass::Denied => {
                self.finish_denied(task, document_id, owner_id, result_id, &message)
                    .await;
            }
        }
    }

    /// Admission denial: LIMIT_EXCEEDED + FAILED, task consumed.
    async fn finish_denied(
        &self,
        task: &Task,
        document_id: Uuid,
        owner_id: Uuid,
        result_id: Uuid,
        message: &str,
    ) {
        let doc_update = self
            .state
            .update_document_status(
                document_id,
                owner_id,
                DocumentStatus::LimitExceeded,
                None,
                None,
                None,
            )
            .await;
        let result_update = self
            .state
            .update_result(result_id, owner_id, ResultUpdate::failed(message))
            .await;

        match (doc_update, result_update) {
            (Ok(_), Ok(_)) => self.complete_task(task).await,
            (doc, result) => {
                if let Err(e) = doc {
                    error!(document_id = %document_id, error = %e,
                           "failed to mark document LIMIT_EXCEEDED");
                }
                if let Err(e) = result {
                    error!(result_id = %result_id, error = %e,
                           "failed to mark result FAILED after denial");
                }
                self.defer_task(task, "DB_UPDATE_LIMIT_EXCEEDED_FAILED").await;
            }
        }
    }

    /// Mark document ERROR and result FAILED. Returns whether both writes
    /// landed.
    async fn mark_pair_failed(
        &self,
        document_id: Uuid,
        owner_id: Uuid,
        result_id: Uuid,
        message: &str,
    ) -> bool {
        let doc_ok = match self
            .state
            .update_document_status(document_id, owner_id, DocumentStatus::Error, None, None, None)
            .await
        {
            Ok(_) => true,
            Err(e) => {
                error!(document_id = %document_id, error = %e, "failed to mark document ERROR");
                false
            }
        };

        let message: String = message.chars().take(500).collect();
        let result_ok = match self
            .state
            .update_result(result_id, owner_id, ResultUpdate::failed(message))
            .await
        {
            Ok(_) => true,
            Err(e) => {
                error!(result_id = %result_id, error = %e, "failed to mark result FAILED");
                false
            }
        };

        doc_ok && result_ok
    }

    async fn mark_document_error(&self, document_id: Uuid, owner_id: Uuid) {
        if let Err(e) = self
            .state
            .update_document_status(document_id, owner_id, DocumentStatus::Error, None, None, None)
            .await
        {
            error!(document_id = %document_id, error = %e, "failed to mark document ERROR");
        }
    }

    async fn defer_task(&self, task: &Task, reason: &str) {
        let delay = backoff_delay(self.config.backoff_base, task.attempts, self.config.backoff_cap);
        info!(
            task_id = %task.id,
            attempts = task.attempts,
            delay_secs = delay.as_secs(),
            reason,
            "deferring task for retry"
        );
        if let Err(e) = self.tasks.defer(task.id, delay, reason).await {
            error!(task_id = %task.id, error = %e, "failed to defer task");
        }
    }

    async fn complete_task(&self, task: &Task) {
        if let Err(e) = self.tasks.complete(task.id).await {
            // The lease will expire and another worker will re-run the
            // task; at-least-once semantics absorb this.
            error!(task_id = %task.id, error = %e, "failed to delete completed task");
        }
    }
}

#[async_trait::async_trait]
impl Service for AssessmentWorker {
    fn name(&self) -> &'static str {
        "assessment-worker"
    }

    async fn run(self: Box<Self>, shutdown: CancellationToken) -> Result<()> {
        info!(worker_id = %self.config.worker_id, "assessment worker starting");

        loop {
            if shutdown.is_cancelled() {
                break;
            }

            let sleep_for = match self.step().await {
                // Drain the queue quickly while there is work.
                Ok(true) => Duration::from_millis(100),
                Ok(false) => self.config.poll_interval,
                Err(e) => {
                    error!(worker_id = %self.config.worker_id, error = %e, "failed to claim task");
                    self.config.poll_interval
                }
            };

            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(sleep_for) => {}
            }
        }

        info!(worker_id = %self.config.worker_id, "assessment worker stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_defaults() {
        let config = WorkerConfig::default();
        assert_eq!(config.poll_interval, Duration::from_secs(10));
        assert_eq!(config.lease_duration, Duration::from_secs(60));
        assert!(config.worker_id.starts_with("worker-"));
    }

    #[test]
    fn ai_flag_maps_to_full_score() {
        let response = DetectionResponse {
            ai_generated: true,
            human_generated: false,
            results: Vec::new(),
        };
        assert_eq!(map_detection(&response), (Some(1.0), LABEL_AI_GENERATED));
    }

    #[test]
    fn human_flag_maps_to_zero_score() {
        let response = DetectionResponse {
            ai_generated: false,
            human_generated: true,
            results: Vec::new(),
        };
        assert_eq!(map_detection(&response), (Some(0.0), LABEL_HUMAN_WRITTEN));
    }

    #[test]
    fn ambiguous_response_maps_to_undetermined() {
        let response = DetectionResponse {
            ai_generated: false,
            human_generated: false,
            results: Vec::new(),
        };
        assert_eq!(map_detection(&response), (None, LABEL_UNDETERMINED));
    }

    #[test]
    fn conflicting_flags_count_as_ai() {
        // ai_generated wins when the service asserts both.
        let response = DetectionResponse {
            ai_generated: true,
            human_generated: true,
            results: Vec::new(),
        };
        assert_eq!(map_detection(&response), (Some(1.0), LABEL_AI_GENERATED));
    }
}
