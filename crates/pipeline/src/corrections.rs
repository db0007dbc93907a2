//! Manual record correction.
//!
//! Writes the new record state and exactly one audit entry capturing the
//! old and new snapshots, attributed to the acting user with MANUAL
//! source and origin metadata.

use sqlx::PgPool;
use tally_core::error::CoreError;
use tally_core::types::{ActorContext, DbId};
use tally_db::models::audit_log::{AuditLog, CreateAuditLog};
use tally_db::models::record::{Record, RecordCorrection};
use tally_db::repositories::{AuditLogRepo, RecordRepo};

use crate::error::{PipelineError, PipelineResult};

/// Apply a manual correction to one record.
pub async fn manual_correction(
    pool: &PgPool,
    record_id: DbId,
    correction: &RecordCorrection,
    actor: &ActorContext,
) -> PipelineResult<(Record, AuditLog)> {
    if correction.is_empty() {
        return Err(CoreError::Validation("No valid fields to update".to_string()).into());
    }
    if let Some(amount) = correction.amount {
        if !amount.is_finite() || amount < 0.0 {
            return Err(
                CoreError::Validation("Amount must be a non-negative number".to_string()).into(),
            );
        }
    }
    if let Some(ref transaction_id) = correction.transaction_id {
        if transaction_id.trim().is_empty() {
            return Err(CoreError::Validation("transactionId must not be empty".to_string()).into());
        }
    }

    let before = RecordRepo::find_by_id(pool, record_id)
        .await?
        .ok_or(PipelineError::RecordNotFound(record_id))?;
    let old_snapshot = before.snapshot();

    let updated = RecordRepo::apply_correction(pool, record_id, correction)
        .await?
        .ok_or(PipelineError::RecordNotFound(record_id))?;

    let entry = CreateAuditLog::manual_correction(
        record_id,
        updated.upload_job_id,
        serde_json::to_value(&old_snapshot).unwrap_or(serde_json::Value::Null),
        serde_json::to_value(&updated.snapshot()).unwrap_or(serde_json::Value::Null),
        actor,
    );
    let log = AuditLogRepo::insert(pool, &entry).await?;

    tracing::info!(
        record_id,
        upload_job_id = updated.upload_job_id,
        actor_id = actor.actor_id,
        "Manual correction applied",
    );
    Ok((updated, log))
}
