//! Audit log entity models and DTOs.
//!
//! Audit entries are append-only: the model has no update DTO, the
//! repository exposes no mutating methods, and a database trigger rejects
//! UPDATE/DELETE from any caller.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use tally_core::audit::{AuditAction, AuditEntityType, AuditSource};
use tally_core::types::{ActorContext, DbId, Timestamp};

/// A single audit log entry. Immutable once created.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct AuditLog {
    pub id: DbId,
    pub record_id: Option<DbId>,
    pub upload_job_id: Option<DbId>,
    pub action: String,
    pub entity_type: String,
    pub old_value: Option<serde_json::Value>,
    pub new_value: Option<serde_json::Value>,
    pub changed_by: DbId,
    pub source: String,
    pub timestamp: Timestamp,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

/// DTO for appending a new audit log entry.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateAuditLog {
    pub record_id: Option<DbId>,
    pub upload_job_id: Option<DbId>,
    pub action: AuditAction,
    pub entity_type: AuditEntityType,
    pub old_value: Option<serde_json::Value>,
    pub new_value: Option<serde_json::Value>,
    pub changed_by: DbId,
    pub source: AuditSource,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

impl CreateAuditLog {
    /// System-sourced entry for a reconciliation decision.
    pub fn reconcile(
        record_id: DbId,
        upload_job_id: DbId,
        new_value: serde_json::Value,
        changed_by: DbId,
    ) -> Self {
        Self {
            record_id: Some(record_id),
            upload_job_id: Some(upload_job_id),
            action: AuditAction::Reconcile,
            entity_type: AuditEntityType::ReconciliationResult,
            old_value: None,
            new_value: Some(new_value),
            changed_by,
            source: AuditSource::System,
            ip_address: None,
            user_agent: None,
        }
    }

    /// System-sourced entry for a completed row-ingestion phase.
    pub fn upload(upload_job_id: DbId, new_value: serde_json::Value, changed_by: DbId) -> Self {
        Self {
            record_id: None,
            upload_job_id: Some(upload_job_id),
            action: AuditAction::Upload,
            entity_type: AuditEntityType::UploadJob,
            old_value: None,
            new_value: Some(new_value),
            changed_by,
            source: AuditSource::System,
            ip_address: None,
            user_agent: None,
        }
    }

    /// Manually-sourced entry capturing a record correction.
    pub fn manual_correction(
        record_id: DbId,
        upload_job_id: DbId,
        old_value: serde_json::Value,
        new_value: serde_json::Value,
        actor: &ActorContext,
    ) -> Self {
        Self {
            record_id: Some(record_id),
            upload_job_id: Some(upload_job_id),
            action: AuditAction::ManualCorrection,
            entity_type: AuditEntityType::Record,
            old_value: Some(old_value),
            new_value: Some(new_value),
            changed_by: actor.actor_id,
            source: AuditSource::Manual,
            ip_address: actor.ip_address.clone(),
            user_agent: actor.user_agent.clone(),
        }
    }
}

/// Filter parameters for audit timeline queries.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditQuery {
    pub record_id: Option<DbId>,
    pub upload_job_id: Option<DbId>,
    pub changed_by: Option<DbId>,
    pub action: Option<String>,
    pub from: Option<Timestamp>,
    pub to: Option<Timestamp>,
    /// Maximum number of results. Defaults to 50, capped at 500.
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}
