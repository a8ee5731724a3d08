// TestDependencies - in-memory stores and mock collaborators for testing
//
// The worker and coordinator are constructor-injected, so the whole
// pipeline runs against these fakes in tests: same trait contracts, same
// transition rules, no database.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use sqlx::types::Json;
use uuid::Uuid;

use crate::config::PlanLimits;
use crate::domains::documents::models::{
    AssessmentResult, Batch, BatchStatus, BatchStatusCounts, Document, DocumentStatus, FileType,
    ResultStatus, ResultUpdate, LABEL_ERROR,
};
use crate::domains::documents::StateStore;
use crate::domains::teachers::models::teacher::{cycle_anchor_for, SubscriptionPlan, TeacherAccount};
use crate::domains::teachers::quota::{check_admission, Admission, QuotaLedger};
use crate::error::PipelineError;
use crate::kernel::tasks::store::TaskStore;
use crate::kernel::tasks::task::{Task, TaskStatus};
use crate::kernel::traits::{BaseBlobStorage, BaseDetector, BaseTextExtractor, DetectionResponse};

// =============================================================================
// In-memory task store
// =============================================================================

/// Task queue with the same claim semantics as the Postgres store:
/// priority DESC / created_at ASC ordering, lease-based visibility, and
/// dead-letter sidelining past the attempt budget.
pub struct InMemoryTaskStore {
    tasks: Mutex<Vec<Task>>,
    dead: Mutex<Vec<Task>>,
    max_attempts: i32,
}

impl InMemoryTaskStore {
    pub fn new(max_attempts: i32) -> Self {
        Self {
            tasks: Mutex::new(Vec::new()),
            dead: Mutex::new(Vec::new()),
            max_attempts,
        }
    }

    /// Snapshot of the active queue.
    pub fn tasks(&self) -> Vec<Task> {
        self.tasks.lock().unwrap().clone()
    }

    /// Snapshot of the dead-letter sideline.
    pub fn dead_letters(&self) -> Vec<Task> {
        self.dead.lock().unwrap().clone()
    }

    /// Force every task visible now (fast-forward past leases/backoff).
    pub fn make_all_available(&self) {
        let past = Utc::now() - ChronoDuration::seconds(1);
        for task in self.tasks.lock().unwrap().iter_mut() {
            task.available_at = past;
        }
    }
}

#[async_trait]
impl TaskStore for InMemoryTaskStore {
    async fn enqueue(
        &self,
        document_id: Uuid,
        owner_id: Uuid,
        priority: i32,
    ) -> Result<Task, PipelineError> {
        let task = Task::new(document_id, owner_id, priority);
        self.tasks.lock().unwrap().push(task.clone());
        Ok(task)
    }

    async fn claim_next(&self, lease_duration: Duration) -> Result<Option<Task>, PipelineError> {
        loop {
            let now = Utc::now();
            let mut tasks = self.tasks.lock().unwrap();

            let claimable = tasks
                .iter()
                .enumerate()
                .filter(|(_, t)| {
                    matches!(
                        t.status,
                        TaskStatus::Pending | TaskStatus::InProgress | TaskStatus::Retrying
                    ) && t.available_at <= now
                })
                .max_by(|(_, a), (_, b)| {
                    a.priority
                        .cmp(&b.priority)
                        .then(b.created_at.cmp(&a.created_at))
                })
                .map(|(i, _)| i);

            let Some(index) = claimable else {
                return Ok(None);
            };

            let task = {
                let task = &mut tasks[index];
                task.status = TaskStatus::InProgress;
                task.available_at = now
                    + ChronoDuration::from_std(lease_duration)
                        .unwrap_or_else(|_| ChronoDuration::seconds(60));
                task.attempts += 1;
                task.updated_at = now;
                task.clone()
            };

            if task.attempts > self.max_attempts {
                let mut side = task.clone();
                side.status = TaskStatus::DeadLetter;
                tasks.remove(index);
                drop(tasks);
                self.dead.lock().unwrap().push(side);
                continue;
            }

            return Ok(Some(task));
        }
    }

    async fn complete(&self, task_id: Uuid) -> Result<(), PipelineError> {
        self.tasks.lock().unwrap().retain(|t| t.id != task_id);
        Ok(())
    }

    async fn defer(
        &self,
        task_id: Uuid,
        delay: Duration,
        error: &str,
    ) -> Result<(), PipelineError> {
        let mut tasks = self.tasks.lock().unwrap();
        if let Some(task) = tasks.iter_mut().find(|t| t.id == task_id) {
            task.status = TaskStatus::Retrying;
            task.available_at = Utc::now()
                + ChronoDuration::from_std(delay).unwrap_or_else(|_| ChronoDuration::seconds(60));
            task.last_error = Some(error.to_string());
            task.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn dead_letter(&self, task_id: Uuid) -> Result<(), PipelineError> {
        let mut tasks = self.tasks.lock().unwrap();
        if let Some(index) = tasks.iter().position(|t| t.id == task_id) {
            let mut task = tasks.remove(index);
            task.status = TaskStatus::DeadLetter;
            drop(tasks);
            self.dead.lock().unwrap().push(task);
        }
        Ok(())
    }

    async fn pending_depth(&self) -> Result<i64, PipelineError> {
        let now = Utc::now();
        let depth = self
            .tasks
            .lock()
            .unwrap()
            .iter()
            .filter(|t| t.status != TaskStatus::DeadLetter && t.available_at <= now)
            .count();
        Ok(depth as i64)
    }
}

// =============================================================================
// In-memory state store
// =============================================================================

/// Document/result/batch store enforcing the same transition tables as the
/// Postgres implementation.
pub struct InMemoryStateStore {
    documents: Mutex<HashMap<Uuid, Document>>,
    results: Mutex<HashMap<Uuid, AssessmentResult>>,
    batches: Mutex<HashMap<Uuid, Batch>>,
}

impl InMemoryStateStore {
    pub fn new() -> Self {
        Self {
            documents: Mutex::new(HashMap::new()),
            results: Mutex::new(HashMap::new()),
            batches: Mutex::new(HashMap::new()),
        }
    }

    pub fn document(&self, id: Uuid) -> Option<Document> {
        self.documents.lock().unwrap().get(&id).cloned()
    }

    pub fn result_for_document(&self, document_id: Uuid) -> Option<AssessmentResult> {
        self.results
            .lock()
            .unwrap()
            .values()
            .find(|r| r.document_id == document_id && !r.is_deleted)
            .cloned()
    }

    pub fn batch(&self, id: Uuid) -> Option<Batch> {
        self.batches.lock().unwrap().get(&id).cloned()
    }
}

impl Default for InMemoryStateStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StateStore for InMemoryStateStore {
    async fn create_document(&self, document: Document) -> Result<Document, PipelineError> {
        self.documents
            .lock()
            .unwrap()
            .insert(document.id, document.clone());
        Ok(document)
    }

    async fn get_document(
        &self,
        id: Uuid,
        owner_id: Uuid,
    ) -> Result<Option<Document>, PipelineError> {
        Ok(self
            .documents
            .lock()
            .unwrap()
            .get(&id)
            .filter(|d| d.owner_id == owner_id && !d.is_deleted)
            .cloned())
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
        let mut documents = self.documents.lock().unwrap();
        let document = documents
            .get_mut(&id)
            .filter(|d| d.owner_id == owner_id && !d.is_deleted)
            .ok_or(PipelineError::DocumentMissing {
                document_id: id,
                owner_id,
            })?;

        if !document.status.can_transition_to(status) {
            return Err(PipelineError::TransitionRejected {
                entity: "document",
                from: document.status.as_str().to_string(),
                to: status.as_str().to_string(),
            });
        }

        document.status = status;
        document.score = if status == DocumentStatus::Completed {
            score.or(document.score)
        } else {
            None
        };
        if let Some(chars) = character_count {
            document.character_count = Some(chars);
        }
        if let Some(words) = word_count {
            document.word_count = Some(words);
        }
        document.updated_at = Utc::now();
        Ok(document.clone())
    }

    async fn update_document_counts(
        &self,
        id: Uuid,
        owner_id: Uuid,
        character_count: i64,
        word_count: i64,
    ) -> Result<Document, PipelineError> {
        let mut documents = self.documents.lock().unwrap();
        let document = documents
            .get_mut(&id)
            .filter(|d| d.owner_id == owner_id && !d.is_deleted)
            .ok_or(PipelineError::DocumentMissing {
                document_id: id,
                owner_id,
            })?;

        document.character_count = Some(character_count);
        document.word_count = Some(word_count);
        document.updated_at = Utc::now();
        Ok(document.clone())
    }

    async fn soft_delete_document(
        &self,
        id: Uuid,
        owner_id: Uuid,
    ) -> Result<Option<String>, PipelineError> {
        let mut documents = self.documents.lock().unwrap();
        let Some(document) = documents
            .get_mut(&id)
            .filter(|d| d.owner_id == owner_id && !d.is_deleted)
        else {
            return Ok(None);
        };

        document.is_deleted = true;
        document.status = DocumentStatus::Deleted;
        document.updated_at = Utc::now();
        Ok(Some(document.blob_path.clone()))
    }

    async fn get_result_by_document(
        &self,
        document_id: Uuid,
        owner_id: Uuid,
    ) -> Result<Option<AssessmentResult>, PipelineError> {
        Ok(self
            .results
            .lock()
            .unwrap()
            .values()
            .find(|r| r.document_id == document_id && r.owner_id == owner_id && !r.is_deleted)
            .cloned())
    }

    async fn create_result(
        &self,
        document_id: Uuid,
        owner_id: Uuid,
    ) -> Result<AssessmentResult, PipelineError> {
        let now = Utc::now();
        let result = AssessmentResult {
            id: Uuid::new_v4(),
            document_id,
            owner_id,
            status: ResultStatus::Pending,
            score: None,
            label: None,
            ai_generated: None,
            human_generated: None,
            paragraph_results: Json(Vec::new()),
            error_message: None,
            result_timestamp: now,
            is_deleted: false,
            created_at: now,
            updated_at: now,
        };
        self.results
            .lock()
            .unwrap()
            .insert(result.id, result.clone());
        Ok(result)
    }

    async fn update_result(
        &self,
        result_id: Uuid,
        owner_id: Uuid,
        update: ResultUpdate,
    ) -> Result<AssessmentResult, PipelineError> {
        let mut results = self.results.lock().unwrap();
        let result = results
            .get_mut(&result_id)
            .filter(|r| r.owner_id == owner_id && !r.is_deleted)
            .ok_or_else(|| PipelineError::TransitionRejected {
                entity: "result",
                from: "missing".to_string(),
                to: update.status.as_str().to_string(),
            })?;

        if !result.status.can_transition_to(update.status) {
            return Err(PipelineError::TransitionRejected {
                entity: "result",
                from: result.status.as_str().to_string(),
                to: update.status.as_str().to_string(),
            });
        }

        let now = Utc::now();
        result.status = update.status;
        if update.clears_output() {
            result.score = None;
            result.label = update.label.clone();
            result.ai_generated = None;
            result.human_generated = None;
            result.paragraph_results = Json(Vec::new());
            result.error_message = update.error_message.clone();
        } else {
            result.score = update.score;
            if update.label.is_some() {
                result.label = update.label.clone();
            }
            if update.ai_generated.is_some() {
                result.ai_generated = update.ai_generated;
            }
            if update.human_generated.is_some() {
                result.human_generated = update.human_generated;
            }
            if let Some(paragraphs) = update.paragraph_results.clone() {
                result.paragraph_results = Json(paragraphs);
            }
            result.error_message = None;
        }
        result.result_timestamp = now;
        result.updated_at = now;
        Ok(result.clone())
    }

    async fn soft_delete_result_by_document(
        &self,
        document_id: Uuid,
        owner_id: Uuid,
    ) -> Result<bool, PipelineError> {
        let mut results = self.results.lock().unwrap();
        let Some(result) = results
            .values_mut()
            .find(|r| r.document_id == document_id && r.owner_id == owner_id && !r.is_deleted)
        else {
            return Ok(false);
        };

        result.is_deleted = true;
        result.status = ResultStatus::Deleted;
        result.updated_at = Utc::now();
        Ok(true)
    }

    async fn reset_document(&self, id: Uuid, owner_id: Uuid) -> Result<(), PipelineError> {
        self.update_document_status(id, owner_id, DocumentStatus::Error, None, None, None)
            .await?;
        if let Some(result) = self.get_result_by_document(id, owner_id).await? {
            self.update_result(result.id, owner_id, ResultUpdate::failed("Manually reset"))
                .await?;
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
        let now = Utc::now();
        let batch = Batch {
            id: Uuid::new_v4(),
            owner_id,
            total_files,
            completed_files: 0,
            failed_files: 0,
            status,
            priority,
            created_at: now,
            updated_at: now,
        };
        self.batches.lock().unwrap().insert(batch.id, batch.clone());
        Ok(batch)
    }

    async fn active_batches(&self) -> Result<Vec<Batch>, PipelineError> {
        let mut batches: Vec<Batch> = self
            .batches
            .lock()
            .unwrap()
            .values()
            .filter(|b| BatchStatus::ACTIVE.contains(&b.status))
            .cloned()
            .collect();
        batches.sort_by_key(|b| b.created_at);
        Ok(batches)
    }

    async fn batch_document_status_counts(
        &self,
        batch_id: Uuid,
    ) -> Result<BatchStatusCounts, PipelineError> {
        let documents = self.documents.lock().unwrap();
        let mut counts = BatchStatusCounts::default();
        for document in documents
            .values()
            .filter(|d| d.batch_id == Some(batch_id) && !d.is_deleted)
        {
            match document.status {
                DocumentStatus::Completed => counts.completed += 1,
                DocumentStatus::Error => counts.failed += 1,
                DocumentStatus::Processing => counts.processing += 1,
                _ => {}
            }
        }
        Ok(counts)
    }

    async fn update_batch_rollup(
        &self,
        batch_id: Uuid,
        completed_files: i64,
        failed_files: i64,
        status: BatchStatus,
    ) -> Result<(), PipelineError> {
        let mut batches = self.batches.lock().unwrap();
        if let Some(batch) = batches.get_mut(&batch_id) {
            batch.completed_files = completed_files;
            batch.failed_files = failed_files;
            batch.status = status;
            batch.updated_at = Utc::now();
        }
        Ok(())
    }
}

// =============================================================================
// In-memory quota ledger
// =============================================================================

/// Quota ledger over in-memory teacher accounts, sharing the projection
/// check with the Postgres implementation. Records every `record_usage`
/// call for test assertions.
pub struct InMemoryQuotaLedger {
    accounts: Mutex<HashMap<Uuid, TeacherAccount>>,
    limits: PlanLimits,
    usage_calls: Mutex<Vec<(Uuid, i64, i64, i64)>>,
}

impl InMemoryQuotaLedger {
    pub fn new(limits: PlanLimits) -> Self {
        Self {
            accounts: Mutex::new(HashMap::new()),
            limits,
            usage_calls: Mutex::new(Vec::new()),
        }
    }

    pub fn insert_account(&self, account: TeacherAccount) {
        self.accounts.lock().unwrap().insert(account.id, account);
    }

    pub fn account(&self, id: Uuid) -> Option<TeacherAccount> {
        self.accounts.lock().unwrap().get(&id).cloned()
    }

    /// Every (owner, words, characters, documents) recorded so far.
    pub fn usage_calls(&self) -> Vec<(Uuid, i64, i64, i64)> {
        self.usage_calls.lock().unwrap().clone()
    }
}

/// Build a teacher account for tests with given plan and cycle usage.
pub fn test_account(id: Uuid, plan: SubscriptionPlan, words_used: i64) -> TeacherAccount {
    let now = Utc::now();
    TeacherAccount {
        id,
        email: format!("{}@example.edu", id.simple()),
        full_name: "Test Teacher".to_string(),
        plan,
        words_used_current_cycle: words_used,
        characters_used_current_cycle: 0,
        documents_processed_current_cycle: 0,
        cycle_anchor: cycle_anchor_for(now),
        is_deleted: false,
        created_at: now,
        updated_at: now,
    }
}

#[async_trait]
impl QuotaLedger for InMemoryQuotaLedger {
    async fn admit(
        &self,
        owner_id: Uuid,
        word_count: i64,
        character_count: i64,
    ) -> Result<Admission, PipelineError> {
        let mut accounts = self.accounts.lock().unwrap();
        let account = accounts
            .get_mut(&owner_id)
            .ok_or(PipelineError::OwnerMissing { owner_id })?;

        let now = Utc::now();
        if account.cycle_is_stale(now) {
            account.words_used_current_cycle = 0;
            account.characters_used_current_cycle = 0;
            account.documents_processed_current_cycle = 0;
            account.cycle_anchor = cycle_anchor_for(now);
        }

        Ok(check_admission(
            account.plan,
            account.words_used_current_cycle,
            account.characters_used_current_cycle,
            word_count,
            character_count,
            &self.limits,
        ))
    }

    async fn record_usage(
        &self,
        owner_id: Uuid,
        words: i64,
        characters: i64,
        documents: i64,
    ) -> Result<(), PipelineError> {
        let mut accounts = self.accounts.lock().unwrap();
        if let Some(account) = accounts.get_mut(&owner_id) {
            account.words_used_current_cycle += words;
            account.characters_used_current_cycle += characters;
            account.documents_processed_current_cycle += documents;
        }
        self.usage_calls
            .lock()
            .unwrap()
            .push((owner_id, words, characters, documents));
        Ok(())
    }
}

// =============================================================================
// Mock blob storage
// =============================================================================

pub struct MockBlobStorage {
    blobs: Mutex<HashMap<String, Vec<u8>>>,
    fail_downloads: AtomicBool,
}

impl MockBlobStorage {
    pub fn new() -> Self {
        Self {
            blobs: Mutex::new(HashMap::new()),
            fail_downloads: AtomicBool::new(false),
        }
    }

    /// Seed a blob at a known path.
    pub fn insert(&self, path: &str, bytes: &[u8]) {
        self.blobs
            .lock()
            .unwrap()
            .insert(path.to_string(), bytes.to_vec());
    }

    /// Make every download fail with a storage error (transient class).
    pub fn set_fail_downloads(&self, fail: bool) {
        self.fail_downloads.store(fail, Ordering::SeqCst);
    }
}

impl Default for MockBlobStorage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BaseBlobStorage for MockBlobStorage {
    async fn upload(&self, filename: &str, bytes: &[u8]) -> Result<String, PipelineError> {
        let path = format!("mock/{}_{}", Uuid::new_v4(), filename);
        self.insert(&path, bytes);
        Ok(path)
    }

    async fn download_bytes(&self, path: &str) -> Result<Option<Vec<u8>>, PipelineError> {
        if self.fail_downloads.load(Ordering::SeqCst) {
            return Err(PipelineError::BlobUnavailable {
                path: path.to_string(),
                detail: "simulated storage outage".to_string(),
            });
        }
        Ok(self.blobs.lock().unwrap().get(path).cloned())
    }

    async fn delete(&self, path: &str) -> Result<(), PipelineError> {
        self.blobs.lock().unwrap().remove(path);
        Ok(())
    }
}

// =============================================================================
// Mock text extractor
// =============================================================================

/// Treats every extractable type as UTF-8 text; images are unsupported,
/// as in the real pipeline.
pub struct MockTextExtractor;

impl BaseTextExtractor for MockTextExtractor {
    fn extract(&self, bytes: &[u8], file_type: FileType) -> Result<String, PipelineError> {
        if !file_type.is_extractable() {
            return Err(PipelineError::UnsupportedFileType(file_type));
        }
        Ok(String::from_utf8_lossy(bytes).into_owned())
    }
}

// =============================================================================
// Mock detector
// =============================================================================

enum QueuedDetection {
    Response(DetectionResponse),
    Error(String),
}

/// Detector returning queued responses in order; defaults to a
/// human-written verdict once the queue is drained. Counts calls so tests
/// can assert the service was (not) reached.
pub struct MockDetector {
    queue: Mutex<VecDeque<QueuedDetection>>,
    calls: AtomicUsize,
}

impl MockDetector {
    pub fn new() -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn with_response(self, response: DetectionResponse) -> Self {
        self.queue
            .lock()
            .unwrap()
            .push_back(QueuedDetection::Response(response));
        self
    }

    pub fn with_error(self, message: impl Into<String>) -> Self {
        self.queue
            .lock()
            .unwrap()
            .push_back(QueuedDetection::Error(message.into()));
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Default for MockDetector {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BaseDetector for MockDetector {
    async fn detect(&self, _text: &str) -> Result<DetectionResponse, PipelineError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.queue.lock().unwrap().pop_front() {
            Some(QueuedDetection::Response(response)) => Ok(response),
            Some(QueuedDetection::Error(message)) => Err(PipelineError::AiService(message)),
            None => Ok(DetectionResponse {
                ai_generated: false,
                human_generated: true,
                results: Vec::new(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn claim_orders_by_priority_then_fifo() {
        let store = InMemoryTaskStore::new(5);
        let owner = Uuid::new_v4();
        let low = store.enqueue(Uuid::new_v4(), owner, 0).await.unwrap();
        let high = store.enqueue(Uuid::new_v4(), owner, 5).await.unwrap();
        let low_later = store.enqueue(Uuid::new_v4(), owner, 0).await.unwrap();

        let lease = Duration::from_secs(60);
        let first = store.claim_next(lease).await.unwrap().unwrap();
        assert_eq!(first.id, high.id);
        let second = store.claim_next(lease).await.unwrap().unwrap();
        assert_eq!(second.id, low.id);
        let third = store.claim_next(lease).await.unwrap().unwrap();
        assert_eq!(third.id, low_later.id);
    }

    #[tokio::test]
    async fn claimed_task_is_invisible_until_lease_expires() {
        let store = InMemoryTaskStore::new(5);
        store.enqueue(Uuid::new_v4(), Uuid::new_v4(), 0).await.unwrap();

        let lease = Duration::from_secs(60);
        assert!(store.claim_next(lease).await.unwrap().is_some());
        assert!(store.claim_next(lease).await.unwrap().is_none());

        // Crash recovery: an expired lease makes the task claimable again.
        store.make_all_available();
        let reclaimed = store.claim_next(lease).await.unwrap().unwrap();
        assert_eq!(reclaimed.attempts, 2);
    }

    #[tokio::test]
    async fn claim_increments_attempts_once_per_claim() {
        let store = InMemoryTaskStore::new(5);
        store.enqueue(Uuid::new_v4(), Uuid::new_v4(), 0).await.unwrap();

        let lease = Duration::from_secs(60);
        let claimed = store.claim_next(lease).await.unwrap().unwrap();
        assert_eq!(claimed.attempts, 1);

        store.defer(claimed.id, Duration::from_secs(0), "err").await.unwrap();
        store.make_all_available();
        let reclaimed = store.claim_next(lease).await.unwrap().unwrap();
        assert_eq!(reclaimed.attempts, 2);
    }

    #[tokio::test]
    async fn exhausted_task_moves_to_dead_letter() {
        let store = InMemoryTaskStore::new(2);
        let task = store.enqueue(Uuid::new_v4(), Uuid::new_v4(), 0).await.unwrap();

        let lease = Duration::from_secs(60);
        for _ in 0..2 {
            let claimed = store.claim_next(lease).await.unwrap().unwrap();
            store.defer(claimed.id, Duration::from_secs(0), "boom").await.unwrap();
            store.make_all_available();
        }

        // Third claim pushes attempts to 3 > 2: sidelined, no task returned.
        assert!(store.claim_next(lease).await.unwrap().is_none());
        assert!(store.tasks().is_empty());
        let dead = store.dead_letters();
        assert_eq!(dead.len(), 1);
        assert_eq!(dead[0].id, task.id);
        assert_eq!(dead[0].status, TaskStatus::DeadLetter);
    }

    #[tokio::test]
    async fn state_store_rejects_illegal_transitions() {
        let store = InMemoryStateStore::new();
        let owner = Uuid::new_v4();
        let document = store
            .create_document(
                Document::builder()
                    .owner_id(owner)
                    .original_filename("a.txt")
                    .blob_path("blobs/a.txt")
                    .file_type(FileType::Txt)
                    .status(DocumentStatus::Completed)
                    .build(),
            )
            .await
            .unwrap();

        let err = store
            .update_document_status(
                document.id,
                owner,
                DocumentStatus::LimitExceeded,
                None,
                None,
                None,
            )
            .await;
        assert!(matches!(
            err,
            Err(PipelineError::TransitionRejected { .. })
        ));
    }

    #[tokio::test]
    async fn soft_delete_returns_blob_path_once() {
        let store = InMemoryStateStore::new();
        let owner = Uuid::new_v4();
        let document = store
            .create_document(
                Document::builder()
                    .owner_id(owner)
                    .original_filename("a.txt")
                    .blob_path("blobs/a.txt")
                    .file_type(FileType::Txt)
                    .build(),
            )
            .await
            .unwrap();

        let path = store.soft_delete_document(document.id, owner).await.unwrap();
        assert_eq!(path.as_deref(), Some("blobs/a.txt"));
        // Already deleted: no second blob path, document invisible.
        assert!(store
            .soft_delete_document(document.id, owner)
            .await
            .unwrap()
            .is_none());
        assert!(store.get_document(document.id, owner).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn failed_result_update_pins_error_label() {
        let store = InMemoryStateStore::new();
        let owner = Uuid::new_v4();
        let result = store.create_result(Uuid::new_v4(), owner).await.unwrap();
        store
            .update_result(result.id, owner, ResultUpdate::processing())
            .await
            .unwrap();
        let failed = store
            .update_result(result.id, owner, ResultUpdate::failed("word limit hit"))
            .await
            .unwrap();
        assert_eq!(failed.status, ResultStatus::Failed);
        assert_eq!(failed.label.as_deref(), Some(LABEL_ERROR));
        assert_eq!(failed.error_message.as_deref(), Some("word limit hit"));
    }
}
