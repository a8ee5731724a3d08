//! Teacher account model - SQL persistence layer
//!
//! Carries the subscription plan and the per-cycle usage counters the
//! quota ledger reads. Cycles are calendar months (UTC); counters roll
//! lazily the first time an account is read in a new month.

use chrono::{DateTime, Datelike, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::PipelineError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, Default)]
#[sqlx(type_name = "subscription_plan", rename_all = "snake_case")]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionPlan {
    #[default]
    Free,
    Pro,
    Schools,
}

impl SubscriptionPlan {
    /// Schools accounts are unlimited: admission always passes and usage
    /// is never recorded.
    pub fn is_unlimited(self) -> bool {
        matches!(self, SubscriptionPlan::Schools)
    }
}

#[derive(sqlx::FromRow, Debug, Clone)]
pub struct TeacherAccount {
    pub id: Uuid,
    pub email: String,
    pub full_name: String,
    pub plan: SubscriptionPlan,
    pub words_used_current_cycle: i64,
    pub characters_used_current_cycle: i64,
    pub documents_processed_current_cycle: i64,
    pub cycle_anchor: DateTime<Utc>,
    pub is_deleted: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// First instant of the month containing `at`, in UTC.
pub fn cycle_anchor_for(at: DateTime<Utc>) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(at.year(), at.month(), 1, 0, 0, 0)
        .single()
        .unwrap_or(at)
}

impl TeacherAccount {
    pub async fn create(
        id: Uuid,
        email: &str,
        full_name: &str,
        plan: SubscriptionPlan,
        pool: &PgPool,
    ) -> Result<Self, PipelineError> {
        let account = sqlx::query_as::<_, Self>(
            r#"
            INSERT INTO teachers (id, email, full_name, plan, cycle_anchor)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(email)
        .bind(full_name)
        .bind(plan)
        .bind(cycle_anchor_for(Utc::now()))
        .fetch_one(pool)
        .await?;

        Ok(account)
    }

    pub async fn find_by_id(id: Uuid, pool: &PgPool) -> Result<Option<Self>, PipelineError> {
        let account = sqlx::query_as::<_, Self>(
            "SELECT * FROM teachers WHERE id = $1 AND is_deleted = FALSE",
        )
        .bind(id)
        .fetch_optional(pool)
        .await?;

        Ok(account)
    }

    /// Fetch an account with cycle counters valid for the current month.
    ///
    /// If the stored anchor is from a previous month the counters are reset
    /// and the anchor advanced in one guarded update before the row is
    /// returned.
    pub async fn find_current_cycle(
        id: Uuid,
        pool: &PgPool,
    ) -> Result<Option<Self>, PipelineError> {
        let Some(account) = Self::find_by_id(id, pool).await? else {
            return Ok(None);
        };

        let anchor = cycle_anchor_for(Utc::now());
        if account.cycle_anchor >= anchor {
            return Ok(Some(account));
        }

        let rolled = sqlx::query_as::<_, Self>(
            r#"
            UPDATE teachers
            SET words_used_current_cycle = 0,
                characters_used_current_cycle = 0,
                documents_processed_current_cycle = 0,
                cycle_anchor = $2,
                updated_at = NOW()
            WHERE id = $1 AND cycle_anchor < $2
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(anchor)
        .fetch_optional(pool)
        .await?;

        // A concurrent reader may have rolled the cycle first; re-read.
        match rolled {
            Some(account) => Ok(Some(account)),
            None => Self::find_by_id(id, pool).await,
        }
    }

    /// Atomically add usage to the current cycle counters.
    pub async fn increment_usage(
        id: Uuid,
        words: i64,
        characters: i64,
        documents: i64,
        pool: &PgPool,
    ) -> Result<(), PipelineError> {
        sqlx::query(
            r#"
            UPDATE teachers
            SET words_used_current_cycle = words_used_current_cycle + $2,
                characters_used_current_cycle = characters_used_current_cycle + $3,
                documents_processed_current_cycle = documents_processed_current_cycle + $4,
                updated_at = NOW()
            WHERE id = $1 AND is_deleted = FALSE
            "#,
        )
        .bind(id)
        .bind(words)
        .bind(characters)
        .bind(documents)
        .execute(pool)
        .await?;

        Ok(())
    }

    /// Whether the stored anchor belongs to a month before `now`.
    pub fn cycle_is_stale(&self, now: DateTime<Utc>) -> bool {
        self.cycle_anchor < cycle_anchor_for(now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn anchor_is_first_of_month() {
        let at = Utc.with_ymd_and_hms(2025, 3, 17, 14, 30, 5).unwrap();
        let anchor = cycle_anchor_for(at);
        assert_eq!(anchor, Utc.with_ymd_and_hms(2025, 3, 1, 0, 0, 0).unwrap());
    }

    #[test]
    fn anchor_is_idempotent_on_month_boundary() {
        let boundary = Utc.with_ymd_and_hms(2025, 7, 1, 0, 0, 0).unwrap();
        assert_eq!(cycle_anchor_for(boundary), boundary);
    }

    #[test]
    fn schools_plan_is_unlimited() {
        assert!(SubscriptionPlan::Schools.is_unlimited());
        assert!(!SubscriptionPlan::Free.is_unlimited());
        assert!(!SubscriptionPlan::Pro.is_unlimited());
    }

    fn account_with_anchor(anchor: DateTime<Utc>) -> TeacherAccount {
        TeacherAccount {
            id: Uuid::new_v4(),
            email: "t@example.edu".into(),
            full_name: "Test Teacher".into(),
            plan: SubscriptionPlan::Free,
            words_used_current_cycle: 100,
            characters_used_current_cycle: 500,
            documents_processed_current_cycle: 2,
            cycle_anchor: anchor,
            is_deleted: false,
            created_at: anchor,
            updated_at: anchor,
        }
    }

    #[test]
    fn cycle_staleness_detects_month_rollover() {
        let march = Utc.with_ymd_and_hms(2025, 3, 1, 0, 0, 0).unwrap();
        let april_now = Utc.with_ymd_and_hms(2025, 4, 2, 9, 0, 0).unwrap();
        let account = account_with_anchor(march);
        assert!(account.cycle_is_stale(april_now));
    }

    #[test]
    fn cycle_in_current_month_is_fresh() {
        let march = Utc.with_ymd_and_hms(2025, 3, 1, 0, 0, 0).unwrap();
        let later_in_march = Utc.with_ymd_and_hms(2025, 3, 28, 23, 59, 0).unwrap();
        let account = account_with_anchor(march);
        assert!(!account.cycle_is_stale(later_in_march));
    }
}
