//! PostgreSQL-backed task queue.
//!
//! Durable queue semantics for assessment tasks: atomic claim-and-lease,
//! retry deferral, and dead-letter sidelining. The store never retries on
//! its own; the worker decides every outcome.

use async_trait::async_trait;
use sqlx::PgPool;
use std::time::Duration;
use tracing::{info, warn};
use uuid::Uuid;

use super::task::Task;
use crate::error::PipelineError;

/// Trait for task queue operations.
#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Create a PENDING task, immediately available. Idempotency is not
    /// guaranteed by the store; callers dedupe by document id if required.
    async fn enqueue(
        &self,
        document_id: Uuid,
        owner_id: Uuid,
        priority: i32,
    ) -> Result<Task, PipelineError>;

    /// Atomically claim the next eligible task, leasing it for
    /// `lease_duration`. Tasks whose incremented attempts exceed the
    /// configured maximum are sidelined to the dead letter and the claim
    /// retried.
    async fn claim_next(&self, lease_duration: Duration) -> Result<Option<Task>, PipelineError>;

    /// Delete a finished task.
    async fn complete(&self, task_id: Uuid) -> Result<(), PipelineError>;

    /// Return a task to the queue as RETRYING after `delay`, recording the
    /// error. Attempts stay as-is.
    async fn defer(
        &self,
        task_id: Uuid,
        delay: Duration,
        error: &str,
    ) -> Result<(), PipelineError>;

    /// Sideline a task into the dead-letter store.
    async fn dead_letter(&self, task_id: Uuid) -> Result<(), PipelineError>;

    /// Number of tasks currently eligible for a claim.
    async fn pending_depth(&self) -> Result<i64, PipelineError>;
}

/// PostgreSQL-backed task store.
pub struct PostgresTaskStore {
    pool: PgPool,
    max_attempts: i32,
}

impl PostgresTaskStore {
    pub fn new(pool: PgPool, max_attempts: i32) -> Self {
        Self { pool, max_attempts }
    }
}

#[async_trait]
impl TaskStore for PostgresTaskStore {
    async fn enqueue(
        &self,
        document_id: Uuid,
        owner_id: Uuid,
        priority: i32,
    ) -> Result<Task, PipelineError> {
        let task = Task::new(document_id, owner_id, priority)
            .insert(&self.pool)
            .await?;

        info!(task_id = %task.id, document_id = %document_id, priority, "enqueued assessment task");
        Ok(task)
    }

    async fn claim_next(&self, lease_duration: Duration) -> Result<Option<Task>, PipelineError> {
        loop {
            let Some(task) = Task::claim_next(lease_duration.as_secs() as i64, &self.pool).await?
            else {
                return Ok(None);
            };

            // A claim that pushes a task past its retry budget sidelines
            // it and keeps looking for real work.
            if task.attempts > self.max_attempts {
                warn!(
                    task_id = %task.id,
                    document_id = %task.document_id,
                    attempts = task.attempts,
                    "task exceeded max attempts, moving to dead letter"
                );
                Task::dead_letter(task.id, &self.pool).await?;
                continue;
            }

            return Ok(Some(task));
        }
    }

    async fn complete(&self, task_id: Uuid) -> Result<(), PipelineError> {
        Task::delete(task_id, &self.pool).await
    }

    async fn defer(
        &self,
        task_id: Uuid,
        delay: Duration,
        error: &str,
    ) -> Result<(), PipelineError> {
        Task::defer(task_id, delay.as_secs() as i64, error, &self.pool).await
    }

    async fn dead_letter(&self, task_id: Uuid) -> Result<(), PipelineError> {
        Task::dead_letter(task_id, &self.pool).await
    }

    async fn pending_depth(&self) -> Result<i64, PipelineError> {
        Task::pending_depth(&self.pool).await
    }
}

/// Retry schedule: exponential backoff on the attempt count, capped.
pub fn backoff_delay(base: Duration, attempts: i32, cap: Duration) -> Duration {
    let exponent = attempts.clamp(0, 30) as u32;
    let delay = base.saturating_mul(2u32.saturating_pow(exponent));
    delay.min(cap)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_per_attempt() {
        let base = Duration::from_secs(10);
        let cap = Duration::from_secs(3_600);
        assert_eq!(backoff_delay(base, 1, cap), Duration::from_secs(20));
        assert_eq!(backoff_delay(base, 2, cap), Duration::from_secs(40));
        assert_eq!(backoff_delay(base, 3, cap), Duration::from_secs(80));
    }

    #[test]
    fn backoff_is_capped_at_one_hour() {
        let base = Duration::from_secs(10);
        let cap = Duration::from_secs(3_600);
        assert_eq!(backoff_delay(base, 20, cap), cap);
    }

    #[test]
    fn backoff_survives_absurd_attempt_counts() {
        let base = Duration::from_secs(10);
        let cap = Duration::from_secs(3_600);
        assert_eq!(backoff_delay(base, i32::MAX, cap), cap);
    }
}
