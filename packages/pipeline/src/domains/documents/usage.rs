//! Usage-stats read surface consumed by reporting.
//!
//! Aggregates document counts, word counts, and character counts for one
//! owner over a daily, weekly, monthly, or all-time window. Soft-deleted
//! documents are excluded from period aggregates; the all-time view also
//! reports how many documents are live, deleted, and fully processed.

use chrono::{DateTime, Datelike, Duration, NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::PipelineError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UsagePeriod {
    Daily,
    Weekly,
    Monthly,
    AllTime,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UsageStats {
    pub owner_id: Uuid,
    pub document_count: i64,
    pub total_words: i64,
    pub total_characters: i64,
    pub period_start: Option<DateTime<Utc>>,
    pub period_end: Option<DateTime<Utc>>,
    /// Populated for all-time queries only.
    pub current_documents: Option<i64>,
    pub deleted_documents: Option<i64>,
    pub total_processed_documents: Option<i64>,
}

/// Compute the half-open `[start, end)` window for a period around a
/// target date. Weeks start on Monday; months are calendar months.
pub fn period_bounds(
    period: UsagePeriod,
    target_date: NaiveDate,
) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
    let day_start =
        |date: NaiveDate| date.and_hms_opt(0, 0, 0).map(|dt| Utc.from_utc_datetime(&dt));

    match period {
        UsagePeriod::Daily => {
            let start = day_start(target_date)?;
            Some((start, start + Duration::days(1)))
        }
        UsagePeriod::Weekly => {
            let monday =
                target_date - Duration::days(target_date.weekday().num_days_from_monday() as i64);
            let start = day_start(monday)?;
            Some((start, start + Duration::days(7)))
        }
        UsagePeriod::Monthly => {
            let first = target_date.with_day(1)?;
            let next_first = if first.month() == 12 {
                NaiveDate::from_ymd_opt(first.year() + 1, 1, 1)?
            } else {
                NaiveDate::from_ymd_opt(first.year(), first.month() + 1, 1)?
            };
            Some((day_start(first)?, day_start(next_first)?))
        }
        UsagePeriod::AllTime => None,
    }
}

/// Aggregate usage for one owner over the given period.
pub async fn usage_stats_for_period(
    owner_id: Uuid,
    period: UsagePeriod,
    target_date: Option<NaiveDate>,
    pool: &PgPool,
) -> Result<UsageStats, PipelineError> {
    let target = target_date.unwrap_or_else(|| Utc::now().date_naive());
    let bounds = period_bounds(period, target);

    let (document_count, total_words, total_characters): (i64, i64, i64) = match bounds {
        Some((start, end)) => sqlx::query_as(
            r#"
            SELECT COUNT(*),
                   COALESCE(SUM(word_count), 0)::BIGINT,
                   COALESCE(SUM(character_count), 0)::BIGINT
            FROM documents
            WHERE owner_id = $1
              AND is_deleted = FALSE
              AND upload_timestamp >= $2
              AND upload_timestamp < $3
            "#,
        )
        .bind(owner_id)
        .bind(start)
        .bind(end)
        .fetch_one(pool)
        .await?,
        None => sqlx::query_as(
            r#"
            SELECT COUNT(*),
                   COALESCE(SUM(word_count), 0)::BIGINT,
                   COALESCE(SUM(character_count), 0)::BIGINT
            FROM documents
            WHERE owner_id = $1 AND is_deleted = FALSE
            "#,
        )
        .bind(owner_id)
        .fetch_one(pool)
        .await?,
    };

    let mut stats = UsageStats {
        owner_id,
        document_count,
        total_words,
        total_characters,
        period_start: bounds.map(|(start, _)| start),
        period_end: bounds.map(|(_, end)| end),
        ..Default::default()
    };

    if period == UsagePeriod::AllTime {
        let (current, deleted, processed): (i64, i64, i64) = sqlx::query_as(
            r#"
            SELECT COUNT(*) FILTER (WHERE is_deleted = FALSE),
                   COUNT(*) FILTER (WHERE is_deleted = TRUE),
                   COUNT(*) FILTER (WHERE status = 'completed' AND is_deleted = FALSE)
            FROM documents
            WHERE owner_id = $1
            "#,
        )
        .bind(owner_id)
        .fetch_one(pool)
        .await?;

        stats.current_documents = Some(current);
        stats.deleted_documents = Some(deleted);
        stats.total_processed_documents = Some(processed);
    }

    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn daily_bounds_cover_one_day() {
        let (start, end) = period_bounds(UsagePeriod::Daily, date(2025, 6, 15)).unwrap();
        assert_eq!(start, Utc.with_ymd_and_hms(2025, 6, 15, 0, 0, 0).unwrap());
        assert_eq!(end - start, Duration::days(1));
    }

    #[test]
    fn weekly_bounds_start_on_monday() {
        // 2025-06-18 is a Wednesday; the containing week starts 06-16.
        let (start, end) = period_bounds(UsagePeriod::Weekly, date(2025, 6, 18)).unwrap();
        assert_eq!(start, Utc.with_ymd_and_hms(2025, 6, 16, 0, 0, 0).unwrap());
        assert_eq!(end - start, Duration::days(7));
    }

    #[test]
    fn monthly_bounds_cover_the_calendar_month() {
        let (start, end) = period_bounds(UsagePeriod::Monthly, date(2025, 2, 14)).unwrap();
        assert_eq!(start, Utc.with_ymd_and_hms(2025, 2, 1, 0, 0, 0).unwrap());
        assert_eq!(end, Utc.with_ymd_and_hms(2025, 3, 1, 0, 0, 0).unwrap());
    }

    #[test]
    fn december_rolls_into_next_year() {
        let (start, end) = period_bounds(UsagePeriod::Monthly, date(2025, 12, 31)).unwrap();
        assert_eq!(start, Utc.with_ymd_and_hms(2025, 12, 1, 0, 0, 0).unwrap());
        assert_eq!(end, Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap());
    }

    #[test]
    fn all_time_has_no_bounds() {
        assert!(period_bounds(UsagePeriod::AllTime, date(2025, 6, 15)).is_none());
    }
}
