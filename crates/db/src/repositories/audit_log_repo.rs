//! Repository for the `audit_logs` table.
//!
//! Append-only on purpose: there is no update or delete method here, and
//! the `audit_logs_immutable` trigger rejects mutation from any path that
//! bypasses this repo.

use sqlx::{PgExecutor, PgPool};
use tally_core::types::Timestamp;

use crate::models::audit_log::{AuditLog, AuditQuery, CreateAuditLog};

/// Column list for `audit_logs` SELECT queries.
const COLUMNS: &str = "\
    id, record_id, upload_job_id, action, entity_type, old_value, \
    new_value, changed_by, source, timestamp, ip_address, user_agent";

/// Maximum page size for timeline queries.
const MAX_LIMIT: i64 = 500;

/// Default page size for timeline queries.
const DEFAULT_LIMIT: i64 = 50;

/// Provides append and query operations for audit logs.
pub struct AuditLogRepo;

impl AuditLogRepo {
    /// Append one audit entry.
    pub async fn insert<'e>(
        exec: impl PgExecutor<'e>,
        entry: &CreateAuditLog,
    ) -> Result<AuditLog, sqlx::Error> {
        let query = format!(
            "INSERT INTO audit_logs \
                 (record_id, upload_job_id, action, entity_type, old_value, \
                  new_value, changed_by, source, ip_address, user_agent) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, AuditLog>(&query)
            .bind(entry.record_id)
            .bind(entry.upload_job_id)
            .bind(entry.action.as_str())
            .bind(entry.entity_type.as_str())
            .bind(&entry.old_value)
            .bind(&entry.new_value)
            .bind(entry.changed_by)
            .bind(entry.source.as_str())
            .bind(&entry.ip_address)
            .bind(&entry.user_agent)
            .fetch_one(exec)
            .await
    }

    /// Query audit entries with filtering and pagination, newest first.
    pub async fn query(pool: &PgPool, params: &AuditQuery) -> Result<Vec<AuditLog>, sqlx::Error> {
        let limit = params.limit.unwrap_or(DEFAULT_LIMIT).min(MAX_LIMIT);
        let offset = params.offset.unwrap_or(0);

        let (where_clause, bind_values, bind_idx) = build_audit_filter(params);

        let query = format!(
            "SELECT {COLUMNS} FROM audit_logs {where_clause} \
             ORDER BY timestamp DESC, id DESC \
             LIMIT ${bind_idx} OFFSET ${}",
            bind_idx + 1
        );

        let mut q = sqlx::query_as::<_, AuditLog>(&query);
        for value in &bind_values {
            q = bind_audit_value(q, value);
        }
        q.bind(limit).bind(offset).fetch_all(pool).await
    }

    /// Count audit entries matching the filter (pagination metadata).
    pub async fn count(pool: &PgPool, params: &AuditQuery) -> Result<i64, sqlx::Error> {
        let (where_clause, bind_values, _) = build_audit_filter(params);
        let query = format!("SELECT COUNT(*)::BIGINT FROM audit_logs {where_clause}");

        let mut q = sqlx::query_scalar::<_, i64>(&query);
        for value in &bind_values {
            q = bind_audit_value_scalar(q, value);
        }
        q.fetch_one(pool).await
    }
}

// ---------------------------------------------------------------------------
// Internal helpers for dynamic query building
// ---------------------------------------------------------------------------

/// Typed bind value for dynamically-built audit queries.
enum BindValue {
    BigInt(i64),
    Text(String),
    Timestamp(Timestamp),
}

/// Build a WHERE clause and bind values from the timeline filters.
///
/// Returns `(where_clause, bind_values, next_bind_index)`.
fn build_audit_filter(params: &AuditQuery) -> (String, Vec<BindValue>, u32) {
    let mut conditions: Vec<String> = Vec::new();
    let mut bind_idx = 1u32;
    let mut bind_values: Vec<BindValue> = Vec::new();

    if let Some(record_id) = params.record_id {
        conditions.push(format!("record_id = ${bind_idx}"));
        bind_idx += 1;
        bind_values.push(BindValue::BigInt(record_id));
    }

    if let Some(upload_job_id) = params.upload_job_id {
        conditions.push(format!("upload_job_id = ${bind_idx}"));
        bind_idx += 1;
        bind_values.push(BindValue::BigInt(upload_job_id));
    }

    if let Some(changed_by) = params.changed_by {
        conditions.push(format!("changed_by = ${bind_idx}"));
        bind_idx += 1;
        bind_values.push(BindValue::BigInt(changed_by));
    }

    if let Some(ref action) = params.action {
        conditions.push(format!("action = ${bind_idx}"));
        bind_idx += 1;
        bind_values.push(BindValue::Text(action.clone()));
    }

    if let Some(from) = params.from {
        conditions.push(format!("timestamp >= ${bind_idx}"));
        bind_idx += 1;
        bind_values.push(BindValue::Timestamp(from));
    }

    if let Some(to) = params.to {
        conditions.push(format!("timestamp <= ${bind_idx}"));
        bind_idx += 1;
        bind_values.push(BindValue::Timestamp(to));
    }

    let where_clause = if conditions.is_empty() {
        String::new()
    } else {
        format!("WHERE {}", conditions.join(" AND "))
    };

    (where_clause, bind_values, bind_idx)
}

fn bind_audit_value<'q, O>(
    q: sqlx::query::QueryAs<'q, sqlx::Postgres, O, sqlx::postgres::PgArguments>,
    value: &'q BindValue,
) -> sqlx::query::QueryAs<'q, sqlx::Postgres, O, sqlx::postgres::PgArguments> {
    match value {
        BindValue::BigInt(v) => q.bind(*v),
        BindValue::Text(v) => q.bind(v.as_str()),
        BindValue::Timestamp(v) => q.bind(*v),
    }
}

fn bind_audit_value_scalar<'q>(
    q: sqlx::query::QueryScalar<'q, sqlx::Postgres, i64, sqlx::postgres::PgArguments>,
    value: &'q BindValue,
) -> sqlx::query::QueryScalar<'q, sqlx::Postgres, i64, sqlx::postgres::PgArguments> {
    match value {
        BindValue::BigInt(v) => q.bind(*v),
        BindValue::Text(v) => q.bind(v.as_str()),
        BindValue::Timestamp(v) => q.bind(*v),
    }
}
