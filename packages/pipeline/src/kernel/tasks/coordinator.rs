//! Batch coordinator: periodic reconciler for batch rollups.
//!
//! Every interval it enumerates active batches, counts their member
//! documents by status, derives the aggregate batch status, and persists
//! the rollup. It never touches tasks; it only observes the document
//! states the worker produces.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::domains::documents::models::{Batch, BatchStatus};
use crate::domains::documents::StateStore;
use crate::error::PipelineError;
use crate::kernel::service_host::Service;

/// Derive a batch's aggregate status from its member document counts.
///
/// Finished means every file is accounted for as completed or failed;
/// PARTIAL records that some of them failed. Anything in flight keeps the
/// batch PROCESSING; a batch nothing has touched stays QUEUED.
pub fn derive_batch_status(
    total_files: i64,
    completed: i64,
    failed: i64,
    processing: i64,
) -> BatchStatus {
    if completed + failed >= total_files {
        if failed == 0 {
            BatchStatus::Completed
        } else {
            BatchStatus::Partial
        }
    } else if processing > 0 || completed > 0 || failed > 0 {
        BatchStatus::Processing
    } else {
        BatchStatus::Queued
    }
}

pub struct BatchCoordinator {
    state: Arc<dyn StateStore>,
    interval: Duration,
}

impl BatchCoordinator {
    pub fn new(state: Arc<dyn StateStore>, interval: Duration) -> Self {
        Self { state, interval }
    }

    /// One reconciliation sweep over all active batches.
    pub async fn run_once(&self) -> Result<(), PipelineError> {
        let batches = self.state.active_batches().await?;
        debug!(count = batches.len(), "reconciling active batches");

        for batch in batches {
            if let Err(e) = self.reconcile_batch(&batch).await {
                error!(batch_id = %batch.id, error = %e, "failed to reconcile batch");
            }
        }

        Ok(())
    }

    async fn reconcile_batch(&self, batch: &Batch) -> Result<(), PipelineError> {
        let counts = self.state.batch_document_status_counts(batch.id).await?;
        let status = derive_batch_status(
            batch.total_files,
            counts.completed,
            counts.failed,
            counts.processing,
        );

        if status == batch.status
            && counts.completed == batch.completed_files
            && counts.failed == batch.failed_files
        {
            return Ok(());
        }

        debug!(
            batch_id = %batch.id,
            completed = counts.completed,
            failed = counts.failed,
            status = ?status,
            "updating batch rollup"
        );
        self.state
            .update_batch_rollup(batch.id, counts.completed, counts.failed, status)
            .await
    }
}

#[async_trait::async_trait]
impl Service for BatchCoordinator {
    fn name(&self) -> &'static str {
        "batch-coordinator"
    }

    async fn run(self: Box<Self>, shutdown: CancellationToken) -> Result<()> {
        info!(interval_secs = self.interval.as_secs(), "batch coordinator starting");

        loop {
            if shutdown.is_cancelled() {
                break;
            }

            if let Err(e) = self.run_once().await {
                error!(error = %e, "batch reconciliation sweep failed");
            }

            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(self.interval) => {}
            }
        }

        info!("batch coordinator stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn untouched_batch_stays_queued() {
        assert_eq!(derive_batch_status(3, 0, 0, 0), BatchStatus::Queued);
    }

    #[test]
    fn in_flight_batch_is_processing() {
        assert_eq!(derive_batch_status(3, 1, 1, 1), BatchStatus::Processing);
        assert_eq!(derive_batch_status(3, 0, 0, 1), BatchStatus::Processing);
        assert_eq!(derive_batch_status(3, 1, 0, 0), BatchStatus::Processing);
    }

    #[test]
    fn fully_successful_batch_completes() {
        assert_eq!(derive_batch_status(3, 3, 0, 0), BatchStatus::Completed);
    }

    #[test]
    fn any_failure_makes_a_finished_batch_partial() {
        assert_eq!(derive_batch_status(3, 2, 1, 0), BatchStatus::Partial);
        assert_eq!(derive_batch_status(2, 0, 2, 0), BatchStatus::Partial);
    }

    #[test]
    fn finished_counts_past_total_still_terminal() {
        assert_eq!(derive_batch_status(2, 3, 0, 0), BatchStatus::Completed);
    }
}
