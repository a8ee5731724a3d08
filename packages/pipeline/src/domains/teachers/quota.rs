//! Quota ledger: plan-aware admission control and usage accounting.
//!
//! Admission is prospective: the check compares the current cycle counters
//! plus this document against the plan limits. A denied document is marked
//! LIMIT_EXCEEDED and its task consumed; usage is only recorded after a
//! successful completion, from exactly one call site in the worker.

use async_trait::async_trait;
use sqlx::PgPool;
use tracing::debug;
use uuid::Uuid;

use super::models::teacher::{SubscriptionPlan, TeacherAccount};
use crate::config::PlanLimits;
use crate::error::PipelineError;

/// Which plan limit a denial tripped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimitKind {
    Words,
    Characters,
}

impl LimitKind {
    pub fn as_str(self) -> &'static str {
        match self {
            LimitKind::Words => "word",
            LimitKind::Characters => "character",
        }
    }
}

/// A refused admission, carrying enough detail for the result's
/// human-readable error message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuotaDenial {
    pub kind: LimitKind,
    pub limit: i64,
    pub used: i64,
    pub requested: i64,
}

impl std::fmt::Display for QuotaDenial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Cycle {} limit exceeded: {} used + {} requested > {} allowed",
            self.kind.as_str(),
            self.used,
            self.requested,
            self.limit
        )
    }
}

/// Outcome of an admission check.
#[derive(Debug, Clone, PartialEq)]
pub enum Admission {
    Admitted { plan: SubscriptionPlan },
    Denied(QuotaDenial),
}

/// Trait for admission control and usage accounting.
#[async_trait]
pub trait QuotaLedger: Send + Sync {
    /// Decide whether a document of the given size may be processed for
    /// this owner.
    async fn admit(
        &self,
        owner_id: Uuid,
        word_count: i64,
        character_count: i64,
    ) -> Result<Admission, PipelineError>;

    /// Record usage after a successful completion. Never called for denied
    /// tasks nor for Schools accounts.
    async fn record_usage(
        &self,
        owner_id: Uuid,
        words: i64,
        characters: i64,
        documents: i64,
    ) -> Result<(), PipelineError>;
}

/// Pure projection check shared by every ledger implementation.
///
/// Word limit is primary, character limit secondary; landing exactly on a
/// limit is admitted, strictly exceeding it is denied.
pub fn check_admission(
    plan: SubscriptionPlan,
    words_used: i64,
    characters_used: i64,
    word_count: i64,
    character_count: i64,
    limits: &PlanLimits,
) -> Admission {
    let (word_limit, char_limit) = match plan {
        SubscriptionPlan::Free => (limits.free_monthly_words, limits.free_monthly_chars),
        SubscriptionPlan::Pro => (limits.pro_monthly_words, limits.pro_monthly_chars),
        SubscriptionPlan::Schools => return Admission::Admitted { plan },
    };

    if words_used + word_count > word_limit {
        return Admission::Denied(QuotaDenial {
            kind: LimitKind::Words,
            limit: word_limit,
            used: words_used,
            requested: word_count,
        });
    }

    if characters_used + character_count > char_limit {
        return Admission::Denied(QuotaDenial {
            kind: LimitKind::Characters,
            limit: char_limit,
            used: characters_used,
            requested: character_count,
        });
    }

    Admission::Admitted { plan }
}

/// PostgreSQL-backed quota ledger reading teacher cycle counters.
pub struct PostgresQuotaLedger {
    pool: PgPool,
    limits: PlanLimits,
}

impl PostgresQuotaLedger {
    pub fn new(pool: PgPool, limits: PlanLimits) -> Self {
        Self { pool, limits }
    }
}

#[async_trait]
impl QuotaLedger for PostgresQuotaLedger {
    async fn admit(
        &self,
        owner_id: Uuid,
        word_count: i64,
        character_count: i64,
    ) -> Result<Admission, PipelineError> {
        let account = TeacherAccount::find_current_cycle(owner_id, &self.pool)
            .await?
            .ok_or(PipelineError::OwnerMissing { owner_id })?;

        debug!(
            owner_id = %owner_id,
            plan = ?account.plan,
            words_used = account.words_used_current_cycle,
            word_count,
            "checking admission"
        );

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
        TeacherAccount::increment_usage(owner_id, words, characters, documents, &self.pool).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limits() -> PlanLimits {
        PlanLimits::default()
    }

    #[test]
    fn schools_always_admits() {
        let admission = check_admission(
            SubscriptionPlan::Schools,
            i64::MAX / 2,
            i64::MAX / 2,
            1_000_000,
            5_000_000,
            &limits(),
        );
        assert!(matches!(admission, Admission::Admitted { .. }));
    }

    #[test]
    fn free_plan_admits_under_word_limit() {
        let admission = check_admission(SubscriptionPlan::Free, 100, 500, 4, 31, &limits());
        assert_eq!(
            admission,
            Admission::Admitted {
                plan: SubscriptionPlan::Free
            }
        );
    }

    #[test]
    fn landing_exactly_on_the_limit_is_admitted() {
        let admission = check_admission(SubscriptionPlan::Free, 4_990, 0, 10, 0, &limits());
        assert!(matches!(admission, Admission::Admitted { .. }));
    }

    #[test]
    fn one_word_over_the_limit_is_denied() {
        let admission = check_admission(SubscriptionPlan::Free, 4_998, 0, 10, 0, &limits());
        match admission {
            Admission::Denied(denial) => {
                assert_eq!(denial.kind, LimitKind::Words);
                assert!(denial.to_string().contains("word limit"));
            }
            other => panic!("expected denial, got {:?}", other),
        }
    }

    #[test]
    fn character_limit_is_enforced_as_secondary() {
        let admission = check_admission(SubscriptionPlan::Free, 0, 24_990, 5, 100, &limits());
        match admission {
            Admission::Denied(denial) => {
                assert_eq!(denial.kind, LimitKind::Characters);
                assert!(denial.to_string().contains("character limit"));
            }
            other => panic!("expected denial, got {:?}", other),
        }
    }

    #[test]
    fn word_denial_wins_when_both_limits_trip() {
        let admission = check_admission(
            SubscriptionPlan::Free,
            5_000,
            25_000,
            1,
            1,
            &limits(),
        );
        match admission {
            Admission::Denied(denial) => assert_eq!(denial.kind, LimitKind::Words),
            other => panic!("expected denial, got {:?}", other),
        }
    }

    #[test]
    fn pro_plan_uses_its_own_limits() {
        let admission = check_admission(SubscriptionPlan::Pro, 99_000, 0, 1_000, 0, &limits());
        assert!(matches!(admission, Admission::Admitted { .. }));

        let admission = check_admission(SubscriptionPlan::Pro, 99_000, 0, 1_001, 0, &limits());
        assert!(matches!(admission, Admission::Denied(_)));
    }
}
