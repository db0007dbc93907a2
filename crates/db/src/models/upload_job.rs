//! Upload job entity models and DTOs.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use tally_core::error::CoreError;
use tally_core::ingest::ColumnMapping;
use tally_core::types::{DbId, Timestamp};

use super::status::StatusId;

/// A row from the `upload_jobs` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct UploadJob {
    pub id: DbId,
    pub file_name: String,
    pub file_hash: String,
    pub artifact_path: Option<String>,
    pub file_type: String,
    pub uploaded_by: DbId,
    pub status_id: StatusId,
    pub total_records: i64,
    pub processed_records: i64,
    pub failed_records: i64,
    pub matched_records: i64,
    pub partially_matched_records: i64,
    pub unmatched_records: i64,
    pub duplicate_records: i64,
    pub column_mapping: serde_json::Value,
    pub progress_percent: i16,
    pub retry_count: i32,
    pub error_message: Option<String>,
    pub failure_reason: Option<String>,
    pub queue_job_id: Option<DbId>,
    pub created_at: Timestamp,
    pub started_at: Option<Timestamp>,
    pub completed_at: Option<Timestamp>,
    pub failed_at: Option<Timestamp>,
}

impl UploadJob {
    /// Decode the stored column mapping.
    pub fn mapping(&self) -> Result<ColumnMapping, CoreError> {
        serde_json::from_value(self.column_mapping.clone())
            .map_err(|e| CoreError::Internal(format!("Corrupt column mapping: {e}")))
    }
}

/// DTO for creating a new (Pending) upload job.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateUploadJob {
    pub file_name: String,
    pub file_hash: String,
    pub artifact_path: String,
    pub file_type: String,
    pub uploaded_by: DbId,
    pub column_mapping: ColumnMapping,
}

/// Filter parameters for listing upload jobs.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UploadJobListQuery {
    pub status_id: Option<StatusId>,
    pub uploaded_by: Option<DbId>,
    pub from: Option<Timestamp>,
    pub to: Option<Timestamp>,
    /// Maximum number of results. Defaults to 50, capped at 100.
    pub limit: Option<i64>,
    /// Number of results to skip. Defaults to 0.
    pub offset: Option<i64>,
}

/// Paginated response for upload job listings.
#[derive(Debug, Clone, Serialize)]
pub struct UploadJobPage {
    pub items: Vec<UploadJob>,
    pub total: i64,
}
