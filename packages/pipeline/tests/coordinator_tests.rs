//! Batch rollup scenarios against the in-memory state store.

use std::sync::Arc;
use std::time::Duration;

use uuid::Uuid;

use pipeline_core::domains::documents::models::{BatchStatus, Document, DocumentStatus, FileType};
use pipeline_core::domains::documents::StateStore;
use pipeline_core::kernel::tasks::BatchCoordinator;
use pipeline_core::kernel::test_dependencies::InMemoryStateStore;

fn coordinator(state: &Arc<InMemoryStateStore>) -> BatchCoordinator {
    BatchCoordinator::new(state.clone(), Duration::from_secs(10))
}

async fn seed_batch_document(
    state: &InMemoryStateStore,
    owner_id: Uuid,
    batch_id: Uuid,
    status: DocumentStatus,
) -> Uuid {
    let document = state
        .create_document(
            Document::builder()
                .owner_id(owner_id)
                .original_filename("file.txt")
                .blob_path(format!("blobs/{}", Uuid::new_v4()))
                .file_type(FileType::Txt)
                .batch_id(batch_id)
                .status(status)
                .build(),
        )
        .await
        .unwrap();
    document.id
}

#[tokio::test]
async fn rollup_follows_member_documents_to_partial() {
    let state = Arc::new(InMemoryStateStore::new());
    let owner = Uuid::new_v4();
    let batch = state
        .create_batch(owner, 3, 0, BatchStatus::Queued)
        .await
        .unwrap();

    seed_batch_document(&state, owner, batch.id, DocumentStatus::Completed).await;
    seed_batch_document(&state, owner, batch.id, DocumentStatus::Error).await;
    let in_flight =
        seed_batch_document(&state, owner, batch.id, DocumentStatus::Processing).await;

    let coordinator = coordinator(&state);
    coordinator.run_once().await.unwrap();

    let batch_now = state.batch(batch.id).unwrap();
    assert_eq!(batch_now.completed_files, 1);
    assert_eq!(batch_now.failed_files, 1);
    assert_eq!(batch_now.status, BatchStatus::Processing);

    // The in-flight document completes; the batch finishes PARTIAL
    // because one member failed.
    state
        .update_document_status(in_flight, owner, DocumentStatus::Completed, Some(0.0), None, None)
        .await
        .unwrap();
    coordinator.run_once().await.unwrap();

    let batch_now = state.batch(batch.id).unwrap();
    assert_eq!(batch_now.completed_files, 2);
    assert_eq!(batch_now.failed_files, 1);
    assert_eq!(batch_now.status, BatchStatus::Partial);
}

#[tokio::test]
async fn fully_successful_batch_completes() {
    let state = Arc::new(InMemoryStateStore::new());
    let owner = Uuid::new_v4();
    let batch = state
        .create_batch(owner, 2, 0, BatchStatus::Processing)
        .await
        .unwrap();
    seed_batch_document(&state, owner, batch.id, DocumentStatus::Completed).await;
    seed_batch_document(&state, owner, batch.id, DocumentStatus::Completed).await;

    coordinator(&state).run_once().await.unwrap();

    let batch_now = state.batch(batch.id).unwrap();
    assert_eq!(batch_now.status, BatchStatus::Completed);
    assert_eq!(batch_now.completed_files, 2);
    assert_eq!(batch_now.failed_files, 0);
}

#[tokio::test]
async fn untouched_batch_stays_queued() {
    let state = Arc::new(InMemoryStateStore::new());
    let owner = Uuid::new_v4();
    let batch = state
        .create_batch(owner, 2, 0, BatchStatus::Queued)
        .await
        .unwrap();
    seed_batch_document(&state, owner, batch.id, DocumentStatus::Queued).await;
    seed_batch_document(&state, owner, batch.id, DocumentStatus::Uploaded).await;

    coordinator(&state).run_once().await.unwrap();

    assert_eq!(state.batch(batch.id).unwrap().status, BatchStatus::Queued);
}

#[tokio::test]
async fn degenerate_empty_batch_is_never_rescanned() {
    let state = Arc::new(InMemoryStateStore::new());
    let owner = Uuid::new_v4();
    // The upload path marks a zero-file batch FAILED at creation; the
    // coordinator must not resurrect it to COMPLETED.
    let batch = state
        .create_batch(owner, 0, 0, BatchStatus::Failed)
        .await
        .unwrap();

    coordinator(&state).run_once().await.unwrap();

    assert_eq!(state.batch(batch.id).unwrap().status, BatchStatus::Failed);
}

#[tokio::test]
async fn terminal_batches_are_left_alone() {
    let state = Arc::new(InMemoryStateStore::new());
    let owner = Uuid::new_v4();
    let batch = state
        .create_batch(owner, 1, 0, BatchStatus::Completed)
        .await
        .unwrap();
    // A straggler document in ERROR must not flip a terminal batch.
    seed_batch_document(&state, owner, batch.id, DocumentStatus::Error).await;

    coordinator(&state).run_once().await.unwrap();

    let batch_now = state.batch(batch.id).unwrap();
    assert_eq!(batch_now.status, BatchStatus::Completed);
    assert_eq!(batch_now.failed_files, 0);
}

#[tokio::test]
async fn counts_never_exceed_totals_invariant() {
    let state = Arc::new(InMemoryStateStore::new());
    let owner = Uuid::new_v4();
    let batch = state
        .create_batch(owner, 3, 0, BatchStatus::Processing)
        .await
        .unwrap();
    seed_batch_document(&state, owner, batch.id, DocumentStatus::Completed).await;
    seed_batch_document(&state, owner, batch.id, DocumentStatus::Error).await;

    coordinator(&state).run_once().await.unwrap();

    let batch_now = state.batch(batch.id).unwrap();
    assert!(batch_now.completed_files + batch_now.failed_files <= batch_now.total_files);
}
