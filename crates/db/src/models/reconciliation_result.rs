//! Reconciliation result entity models and DTOs.
//!
//! Results are written once per processed record and never updated in
//! place; a later manual correction produces a new audit entry instead of
//! mutating the result.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use tally_core::matching::{MatchStatus, MismatchedField, RecordSnapshot, DEFAULT_CONFIDENCE};
use tally_core::types::{DbId, Timestamp};

/// A row from the `reconciliation_results` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct ReconciliationResult {
    pub id: DbId,
    pub upload_job_id: DbId,
    pub record_id: DbId,
    pub system_record: Option<serde_json::Value>,
    pub uploaded_record: serde_json::Value,
    pub match_status: String,
    pub mismatched_fields: serde_json::Value,
    pub matched_rule: Option<String>,
    pub duplicate_reason: Option<String>,
    pub error_message: Option<String>,
    pub confidence: i16,
    pub created_at: Timestamp,
}

impl ReconciliationResult {
    /// Typed view of the stored status string.
    pub fn status(&self) -> Result<MatchStatus, tally_core::error::CoreError> {
        MatchStatus::parse(&self.match_status)
    }
}

/// DTO for inserting a new result.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateReconciliationResult {
    pub upload_job_id: DbId,
    pub record_id: DbId,
    pub system_record: Option<RecordSnapshot>,
    pub uploaded_record: RecordSnapshot,
    pub match_status: MatchStatus,
    pub mismatched_fields: Vec<MismatchedField>,
    pub matched_rule: String,
    pub duplicate_reason: Option<String>,
    pub error_message: Option<String>,
    pub confidence: i16,
}

impl CreateReconciliationResult {
    /// A result carrying the default confidence score.
    pub fn new(
        upload_job_id: DbId,
        record_id: DbId,
        system_record: Option<RecordSnapshot>,
        uploaded_record: RecordSnapshot,
        match_status: MatchStatus,
        mismatched_fields: Vec<MismatchedField>,
        matched_rule: impl Into<String>,
    ) -> Self {
        Self {
            upload_job_id,
            record_id,
            system_record,
            uploaded_record,
            match_status,
            mismatched_fields,
            matched_rule: matched_rule.into(),
            duplicate_reason: None,
            error_message: None,
            confidence: DEFAULT_CONFIDENCE,
        }
    }
}

/// Filter parameters for listing results.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultListQuery {
    pub upload_job_id: Option<DbId>,
    pub match_status: Option<String>,
    pub from: Option<Timestamp>,
    pub to: Option<Timestamp>,
    /// Maximum number of results. Defaults to 50, capped at 200.
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// Paginated response for result listings.
#[derive(Debug, Clone, Serialize)]
pub struct ResultPage {
    pub items: Vec<ReconciliationResult>,
    pub total: i64,
}
