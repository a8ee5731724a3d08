//! Assessment result model - SQL persistence layer
//!
//! Exactly one active result exists per active document. The per-paragraph
//! scores from the detection service are persisted verbatim as JSONB.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::PipelineError;

/// Overall label strings surfaced to the UI.
pub const LABEL_AI_GENERATED: &str = "AI Generated";
pub const LABEL_HUMAN_WRITTEN: &str = "Human Written";
pub const LABEL_UNDETERMINED: &str = "Undetermined";
pub const LABEL_ERROR: &str = "Error";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, Default)]
#[sqlx(type_name = "result_status", rename_all = "snake_case")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResultStatus {
    #[default]
    Pending,
    Processing,
    Completed,
    Failed,
    Deleted,
}

impl ResultStatus {
    /// Whether a transition from `self` to `next` is legal. Completed and
    /// Failed re-enter Pending (reprocess) or Processing (crash replay);
    /// Completed reaches Failed through manual reset.
    pub fn can_transition_to(self, next: ResultStatus) -> bool {
        use ResultStatus::*;
        if self == next || next == Deleted {
            return true;
        }
        match (self, next) {
            (Pending, Processing) | (Pending, Failed) => true,
            (Processing, Completed) | (Processing, Failed) => true,
            (Completed, Pending) | (Completed, Processing) | (Completed, Failed) => true,
            (Failed, Pending) | (Failed, Processing) => true,
            _ => false,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ResultStatus::Pending => "PENDING",
            ResultStatus::Processing => "PROCESSING",
            ResultStatus::Completed => "COMPLETED",
            ResultStatus::Failed => "FAILED",
            ResultStatus::Deleted => "DELETED",
        }
    }
}

/// One paragraph's sub-score, stored verbatim from the detection service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParagraphResult {
    pub text: String,
    pub label: String,
    pub probability: f64,
}

#[derive(sqlx::FromRow, Debug, Clone)]
pub struct AssessmentResult {
    pub id: Uuid,
    pub document_id: Uuid,
    pub owner_id: Uuid,
    pub status: ResultStatus,
    pub score: Option<f64>,
    pub label: Option<String>,
    pub ai_generated: Option<bool>,
    pub human_generated: Option<bool>,
    pub paragraph_results: Json<Vec<ParagraphResult>>,
    pub error_message: Option<String>,
    pub result_timestamp: DateTime<Utc>,
    pub is_deleted: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Field set applied by [`AssessmentResult::update`].
///
/// A failed update clears score and pins the label to "Error" so a FAILED
/// result never carries misleading detection output.
#[derive(Debug, Clone, Default)]
pub struct ResultUpdate {
    pub status: ResultStatus,
    pub score: Option<f64>,
    pub label: Option<String>,
    pub ai_generated: Option<bool>,
    pub human_generated: Option<bool>,
    pub paragraph_results: Option<Vec<ParagraphResult>>,
    pub error_message: Option<String>,
}

impl ResultUpdate {
    pub fn processing() -> Self {
        Self {
            status: ResultStatus::Processing,
            ..Default::default()
        }
    }

    pub fn completed(
        score: Option<f64>,
        label: &str,
        ai_generated: bool,
        human_generated: bool,
        paragraph_results: Vec<ParagraphResult>,
    ) -> Self {
        Self {
            status: ResultStatus::Completed,
            score,
            label: Some(label.to_string()),
            ai_generated: Some(ai_generated),
            human_generated: Some(human_generated),
            paragraph_results: Some(paragraph_results),
            error_message: None,
        }
    }

    pub fn failed(error_message: impl Into<String>) -> Self {
        Self {
            status: ResultStatus::Failed,
            score: None,
            label: Some(LABEL_ERROR.to_string()),
            ai_generated: None,
            human_generated: None,
            paragraph_results: None,
            error_message: Some(error_message.into()),
        }
    }

    /// Reprocess reset: back to PENDING with detection output cleared.
    pub fn pending_reset() -> Self {
        Self {
            status: ResultStatus::Pending,
            ..Default::default()
        }
    }

    /// Whether this update wipes detection output instead of merging it.
    pub(crate) fn clears_output(&self) -> bool {
        matches!(self.status, ResultStatus::Failed | ResultStatus::Pending)
    }
}

impl AssessmentResult {
    /// Create a fresh PENDING result for a document.
    pub async fn create(
        document_id: Uuid,
        owner_id: Uuid,
        pool: &PgPool,
    ) -> Result<Self, PipelineError> {
        let result = sqlx::query_as::<_, Self>(
            r#"
            INSERT INTO results (id, document_id, owner_id, status, paragraph_results)
            VALUES ($1, $2, $3, 'pending', '[]'::jsonb)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(document_id)
        .bind(owner_id)
        .fetch_one(pool)
        .await?;

        Ok(result)
    }

    /// Find the active result for a document, scoped by owner.
    pub async fn find_by_document(
        document_id: Uuid,
        owner_id: Uuid,
        pool: &PgPool,
    ) -> Result<Option<Self>, PipelineError> {
        let result = sqlx::query_as::<_, Self>(
            "SELECT * FROM results
             WHERE document_id = $1 AND owner_id = $2 AND is_deleted = FALSE",
        )
        .bind(document_id)
        .bind(owner_id)
        .fetch_optional(pool)
        .await?;

        Ok(result)
    }

    /// Apply an update, guarding the transition table. Stamps
    /// `result_timestamp` on every call.
    pub async fn update(
        id: Uuid,
        owner_id: Uuid,
        update: ResultUpdate,
        pool: &PgPool,
    ) -> Result<Self, PipelineError> {
        let current = sqlx::query_as::<_, Self>(
            "SELECT * FROM results WHERE id = $1 AND owner_id = $2 AND is_deleted = FALSE",
        )
        .bind(id)
        .bind(owner_id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| PipelineError::TransitionRejected {
            entity: "result",
            from: "missing".to_string(),
            to: update.status.as_str().to_string(),
        })?;

        if !current.status.can_transition_to(update.status) {
            return Err(PipelineError::TransitionRejected {
                entity: "result",
                from: current.status.as_str().to_string(),
                to: update.status.as_str().to_string(),
            });
        }

        let result = if update.clears_output() {
            sqlx::query_as::<_, Self>(
                r#"
                UPDATE results
                SET status = $3,
                    score = NULL,
                    label = $4,
                    ai_generated = NULL,
                    human_generated = NULL,
                    paragraph_results = '[]'::jsonb,
                    error_message = $5,
                    result_timestamp = NOW(),
                    updated_at = NOW()
                WHERE id = $1 AND owner_id = $2 AND is_deleted = FALSE
                RETURNING *
                "#,
            )
            .bind(id)
            .bind(owner_id)
            .bind(update.status)
            .bind(&update.label)
            .bind(&update.error_message)
            .fetch_one(pool)
            .await?
        } else {
            sqlx::query_as::<_, Self>(
                r#"
                UPDATE results
                SET status = $3,
                    score = $4,
                    label = COALESCE($5, label),
                    ai_generated = COALESCE($6, ai_generated),
                    human_generated = COALESCE($7, human_generated),
                    paragraph_results = COALESCE($8, paragraph_results),
                    error_message = NULL,
                    result_timestamp = NOW(),
                    updated_at = NOW()
                WHERE id = $1 AND owner_id = $2 AND is_deleted = FALSE
                RETURNING *
                "#,
            )
            .bind(id)
            .bind(owner_id)
            .bind(update.status)
            .bind(update.score)
            .bind(&update.label)
            .bind(update.ai_generated)
            .bind(update.human_generated)
            .bind(update.paragraph_results.map(Json))
            .fetch_one(pool)
            .await?
        };

        Ok(result)
    }

    /// Soft-delete the active result of a document. Returns whether a row
    /// was flagged.
    pub async fn soft_delete_by_document(
        document_id: Uuid,
        owner_id: Uuid,
        pool: &PgPool,
    ) -> Result<bool, PipelineError> {
        let updated = sqlx::query(
            "UPDATE results
             SET is_deleted = TRUE, status = 'deleted', updated_at = NOW()
             WHERE document_id = $1 AND owner_id = $2 AND is_deleted = FALSE",
        )
        .bind(document_id)
        .bind(owner_id)
        .execute(pool)
        .await?;

        Ok(updated.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assessment_flow_transitions_are_legal() {
        use ResultStatus::*;
        assert!(Pending.can_transition_to(Processing));
        assert!(Processing.can_transition_to(Completed));
        assert!(Processing.can_transition_to(Failed));
    }

    #[test]
    fn reprocess_resets_to_pending() {
        use ResultStatus::*;
        assert!(Failed.can_transition_to(Pending));
        assert!(Completed.can_transition_to(Pending));
    }

    #[test]
    fn crash_replay_reenters_processing() {
        use ResultStatus::*;
        assert!(Failed.can_transition_to(Processing));
        assert!(Completed.can_transition_to(Processing));
    }

    #[test]
    fn pending_cannot_skip_to_completed() {
        assert!(!ResultStatus::Pending.can_transition_to(ResultStatus::Completed));
    }

    #[test]
    fn deleted_results_stay_deleted() {
        assert!(!ResultStatus::Deleted.can_transition_to(ResultStatus::Pending));
        assert!(!ResultStatus::Deleted.can_transition_to(ResultStatus::Processing));
    }

    #[test]
    fn failed_update_pins_error_label_and_clears_score() {
        let update = ResultUpdate::failed("Cycle word limit exceeded.");
        assert_eq!(update.status, ResultStatus::Failed);
        assert_eq!(update.label.as_deref(), Some(LABEL_ERROR));
        assert!(update.score.is_none());
        assert!(update.clears_output());
    }

    #[test]
    fn completed_update_carries_detection_output() {
        let paras = vec![ParagraphResult {
            text: "Paragraph one.".into(),
            label: "AI".into(),
            probability: 0.9,
        }];
        let update = ResultUpdate::completed(Some(1.0), LABEL_AI_GENERATED, true, false, paras);
        assert_eq!(update.status, ResultStatus::Completed);
        assert_eq!(update.score, Some(1.0));
        assert!(!update.clears_output());
    }

    #[test]
    fn paragraph_results_round_trip_as_json() {
        let para = ParagraphResult {
            text: "Some text".into(),
            label: "Human".into(),
            probability: 0.12,
        };
        let json = serde_json::to_string(&para).unwrap();
        let back: ParagraphResult = serde_json::from_str(&json).unwrap();
        assert_eq!(para, back);
    }
}
