use anyhow::{Context, Result};
use dotenvy::dotenv;
use std::env;
use std::time::Duration;

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub detector_url: String,
    pub ai_timeout: Duration,
    pub poll_interval: Duration,
    pub lease_duration: Duration,
    pub max_attempts: i32,
    pub backoff_base: Duration,
    pub backoff_cap: Duration,
    pub coordinator_interval: Duration,
    pub worker_count: usize,
    pub blob_root: String,
    pub plan_limits: PlanLimits,
}

/// Monthly word and character limits per subscription plan.
///
/// Schools is unlimited and carries no entry here.
#[derive(Debug, Clone, Copy)]
pub struct PlanLimits {
    pub free_monthly_words: i64,
    pub free_monthly_chars: i64,
    pub pro_monthly_words: i64,
    pub pro_monthly_chars: i64,
}

impl Default for PlanLimits {
    fn default() -> Self {
        Self {
            free_monthly_words: 5_000,
            free_monthly_chars: 25_000,
            pro_monthly_words: 100_000,
            pro_monthly_chars: 500_000,
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Load .env file if present (development)
        let _ = dotenv();

        let poll_interval = duration_var("WORKER_POLL_INTERVAL_SECONDS", 10)?;

        Ok(Self {
            database_url: env::var("DATABASE_URL").context("DATABASE_URL must be set")?,
            detector_url: env::var("DETECTOR_URL").context("DETECTOR_URL must be set")?,
            ai_timeout: duration_var("AI_TIMEOUT_SECONDS", 60)?,
            lease_duration: duration_var("TASK_LEASE_SECONDS", 60)?,
            max_attempts: int_var("TASK_MAX_ATTEMPTS", 5)? as i32,
            // Retry backoff defaults to the poll interval as its base.
            backoff_base: duration_var("RETRY_BACKOFF_BASE_SECONDS", poll_interval.as_secs())?,
            backoff_cap: duration_var("RETRY_BACKOFF_CAP_SECONDS", 3_600)?,
            coordinator_interval: duration_var("COORDINATOR_INTERVAL_SECONDS", 10)?,
            worker_count: int_var("WORKER_COUNT", 2)? as usize,
            blob_root: env::var("BLOB_STORAGE_ROOT").unwrap_or_else(|_| "./blob-storage".to_string()),
            poll_interval,
            plan_limits: PlanLimits {
                free_monthly_words: int_var("FREE_PLAN_MONTHLY_WORD_LIMIT", 5_000)?,
                free_monthly_chars: int_var("FREE_PLAN_MONTHLY_CHAR_LIMIT", 25_000)?,
                pro_monthly_words: int_var("PRO_PLAN_MONTHLY_WORD_LIMIT", 100_000)?,
                pro_monthly_chars: int_var("PRO_PLAN_MONTHLY_CHAR_LIMIT", 500_000)?,
            },
        })
    }
}

fn int_var(name: &str, default: i64) -> Result<i64> {
    match env::var(name) {
        Ok(raw) => raw
            .parse::<i64>()
            .with_context(|| format!("{} must be a valid integer", name)),
        Err(_) => Ok(default),
    }
}

fn duration_var(name: &str, default_secs: u64) -> Result<Duration> {
    let secs = int_var(name, default_secs as i64)?;
    Ok(Duration::from_secs(secs as u64))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plan_limits_defaults() {
        let limits = PlanLimits::default();
        assert_eq!(limits.free_monthly_words, 5_000);
        assert_eq!(limits.free_monthly_chars, 25_000);
        assert_eq!(limits.pro_monthly_words, 100_000);
        assert_eq!(limits.pro_monthly_chars, 500_000);
    }
}
