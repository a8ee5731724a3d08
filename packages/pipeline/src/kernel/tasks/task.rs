//! Assessment task model: one unit of work in the durable queue.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use typed_builder::TypedBuilder;
use uuid::Uuid;

use crate::error::PipelineError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, Default)]
#[sqlx(type_name = "task_status", rename_all = "snake_case")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    #[default]
    Pending,
    InProgress,
    Retrying,
    DeadLetter,
}

#[derive(sqlx::FromRow, Debug, Clone, Serialize, Deserialize, TypedBuilder)]
#[builder(field_defaults(setter(into)))]
pub struct Task {
    #[builder(default = Uuid::new_v4())]
    pub id: Uuid,
    pub document_id: Uuid,
    pub owner_id: Uuid,
    #[builder(default = 0)]
    pub priority: i32,
    #[builder(default = 0)]
    pub attempts: i32,
    #[builder(default)]
    pub status: TaskStatus,
    #[builder(default = Utc::now())]
    pub available_at: DateTime<Utc>,
    #[builder(default, setter(strip_option))]
    pub last_error: Option<String>,
    #[builder(default = Utc::now())]
    pub created_at: DateTime<Utc>,
    #[builder(default = Utc::now())]
    pub updated_at: DateTime<Utc>,
}

impl Task {
    /// Build a fresh PENDING task, immediately available.
    pub fn new(document_id: Uuid, owner_id: Uuid, priority: i32) -> Self {
        Self::builder()
            .document_id(document_id)
            .owner_id(owner_id)
            .priority(priority)
            .build()
    }

    pub async fn insert(&self, pool: &PgPool) -> Result<Self, PipelineError> {
        let task = sqlx::query_as::<_, Self>(
            r#"
            INSERT INTO tasks (
                id, document_id, owner_id, priority, attempts, status,
                available_at, last_error, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING *
            "#,
        )
        .bind(self.id)
        .bind(self.document_id)
        .bind(self.owner_id)
        .bind(self.priority)
        .bind(self.attempts)
        .bind(self.status)
        .bind(self.available_at)
        .bind(&self.last_error)
        .bind(self.created_at)
        .bind(self.updated_at)
        .fetch_one(pool)
        .await
        .map_err(PipelineError::QueueUnavailable)?;

        Ok(task)
    }

    /// Atomically claim the next eligible task.
    ///
    /// Eligible means any of PENDING, RETRYING, or a lease-expired
    /// IN_PROGRESS row (scavenged for crash recovery), with `available_at`
    /// in the past. The claim sets the lease, increments `attempts`, and
    /// returns the row in one statement; `FOR UPDATE SKIP LOCKED` keeps
    /// concurrent workers from contending.
    pub async fn claim_next(
        lease_seconds: i64,
        pool: &PgPool,
    ) -> Result<Option<Self>, PipelineError> {
        let task = sqlx::query_as::<_, Self>(
            r#"
            WITH next_task AS (
                SELECT id
                FROM tasks
                WHERE status IN ('pending', 'in_progress', 'retrying')
                  AND available_at <= NOW()
                ORDER BY priority DESC, created_at ASC
                LIMIT 1
                FOR UPDATE SKIP LOCKED
            )
            UPDATE tasks
            SET status = 'in_progress',
                available_at = NOW() + ($1 || ' seconds')::INTERVAL,
                attempts = attempts + 1,
                updated_at = NOW()
            WHERE id IN (SELECT id FROM next_task)
            RETURNING *
            "#,
        )
        .bind(lease_seconds.to_string())
        .fetch_optional(pool)
        .await
        .map_err(PipelineError::QueueUnavailable)?;

        Ok(task)
    }

    pub async fn delete(task_id: Uuid, pool: &PgPool) -> Result<(), PipelineError> {
        sqlx::query("DELETE FROM tasks WHERE id = $1")
            .bind(task_id)
            .execute(pool)
            .await
            .map_err(PipelineError::QueueUnavailable)?;

        Ok(())
    }

    /// Return a task to the queue as RETRYING with a future
    /// `available_at`. Attempts stay as-is; the next claim increments.
    pub async fn defer(
        task_id: Uuid,
        delay_seconds: i64,
        error: &str,
        pool: &PgPool,
    ) -> Result<(), PipelineError> {
        sqlx::query(
            r#"
            UPDATE tasks
            SET status = 'retrying',
                available_at = NOW() + ($2 || ' seconds')::INTERVAL,
                last_error = $3,
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(task_id)
        .bind(delay_seconds.to_string())
        .bind(error)
        .execute(pool)
        .await
        .map_err(PipelineError::QueueUnavailable)?;

        Ok(())
    }

    /// Move a task out of the active queue into the dead-letter sideline,
    /// carrying the full row.
    pub async fn dead_letter(task_id: Uuid, pool: &PgPool) -> Result<(), PipelineError> {
        let mut tx = pool
            .begin()
            .await
            .map_err(PipelineError::QueueUnavailable)?;

        sqlx::query(
            r#"
            INSERT INTO tasks_dead_letter (
                id, document_id, owner_id, priority, attempts, status,
                available_at, last_error, created_at, updated_at, dead_lettered_at
            )
            SELECT id, document_id, owner_id, priority, attempts, 'dead_letter',
                   available_at, last_error, created_at, updated_at, NOW()
            FROM tasks
            WHERE id = $1
            "#,
        )
        .bind(task_id)
        .execute(&mut *tx)
        .await
        .map_err(PipelineError::QueueUnavailable)?;

        sqlx::query("DELETE FROM tasks WHERE id = $1")
            .bind(task_id)
            .execute(&mut *tx)
            .await
            .map_err(PipelineError::QueueUnavailable)?;

        tx.commit().await.map_err(PipelineError::QueueUnavailable)?;
        Ok(())
    }

    /// Count tasks currently eligible for a claim.
    pub async fn pending_depth(pool: &PgPool) -> Result<i64, PipelineError> {
        let depth = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*)
            FROM tasks
            WHERE status IN ('pending', 'in_progress', 'retrying')
              AND available_at <= NOW()
            "#,
        )
        .fetch_one(pool)
        .await
        .map_err(PipelineError::QueueUnavailable)?;

        Ok(depth)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_task() -> Task {
        Task::new(Uuid::new_v4(), Uuid::new_v4(), 0)
    }

    #[test]
    fn new_task_starts_pending() {
        let task = sample_task();
        assert_eq!(task.status, TaskStatus::Pending);
    }

    #[test]
    fn new_task_has_zero_attempts() {
        let task = sample_task();
        assert_eq!(task.attempts, 0);
    }

    #[test]
    fn new_task_is_immediately_available() {
        let task = sample_task();
        assert!(task.available_at <= Utc::now());
    }

    #[test]
    fn new_task_carries_no_error() {
        let task = sample_task();
        assert!(task.last_error.is_none());
    }

    #[test]
    fn builder_accepts_priority_override() {
        let task = Task::builder()
            .document_id(Uuid::new_v4())
            .owner_id(Uuid::new_v4())
            .priority(5)
            .build();
        assert_eq!(task.priority, 5);
    }
}
