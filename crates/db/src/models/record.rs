//! Record entity models and DTOs.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use tally_core::ingest::ParsedRow;
use tally_core::matching::RecordSnapshot;
use tally_core::types::{DbId, Timestamp};

/// A row from the `records` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Record {
    pub id: DbId,
    pub upload_job_id: DbId,
    pub transaction_id: String,
    pub amount: f64,
    pub reference_number: String,
    pub transaction_date: Timestamp,
    pub additional_data: serde_json::Value,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Record {
    /// Point-in-time copy of the core fields, for result embedding and
    /// audit snapshots.
    pub fn snapshot(&self) -> RecordSnapshot {
        RecordSnapshot {
            transaction_id: self.transaction_id.clone(),
            amount: self.amount,
            reference_number: self.reference_number.clone(),
            date: self.transaction_date,
        }
    }
}

/// DTO for batch-inserting validated rows.
#[derive(Debug, Clone, Deserialize)]
pub struct NewRecord {
    pub upload_job_id: DbId,
    pub transaction_id: String,
    pub amount: f64,
    pub reference_number: String,
    pub transaction_date: Timestamp,
    pub additional_data: serde_json::Value,
}

impl NewRecord {
    /// Build an insertable record from a validated row.
    pub fn from_parsed(upload_job_id: DbId, row: &ParsedRow) -> Self {
        Self {
            upload_job_id,
            transaction_id: row.transaction_id.clone(),
            amount: row.amount,
            reference_number: row.reference_number.clone(),
            transaction_date: row.date,
            additional_data: serde_json::to_value(&row.additional_data)
                .unwrap_or_else(|_| serde_json::json!({})),
        }
    }
}

/// DTO for a manual correction. Only present fields are updated.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordCorrection {
    pub transaction_id: Option<String>,
    pub amount: Option<f64>,
    pub reference_number: Option<String>,
    pub date: Option<Timestamp>,
}

impl RecordCorrection {
    /// `true` when no field is being corrected.
    pub fn is_empty(&self) -> bool {
        self.transaction_id.is_none()
            && self.amount.is_none()
            && self.reference_number.is_none()
            && self.date.is_none()
    }
}
