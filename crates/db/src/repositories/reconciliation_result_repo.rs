//! Repository for the `reconciliation_results` table.
//!
//! Results are insert-only: classifications are never rewritten, so this
//! repo exposes no UPDATE path.

use serde::Serialize;
use sqlx::{PgExecutor, PgPool};
use tally_core::types::{DbId, Timestamp};

use crate::models::reconciliation_result::{
    CreateReconciliationResult, ReconciliationResult, ResultListQuery, ResultPage,
};

/// Column list for `reconciliation_results` queries.
const COLUMNS: &str = "\
    id, upload_job_id, record_id, system_record, uploaded_record, \
    match_status, mismatched_fields, matched_rule, duplicate_reason, \
    error_message, confidence, created_at";

/// Maximum page size for result listing.
const MAX_LIMIT: i64 = 200;

/// Default page size for result listing.
const DEFAULT_LIMIT: i64 = 50;

/// Per-status result counts for one filter.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct StatusCount {
    pub match_status: String,
    pub count: i64,
}

/// Provides insert and query operations for reconciliation results.
pub struct ReconciliationResultRepo;

impl ReconciliationResultRepo {
    /// Persist one classification inside the caller's transaction.
    pub async fn insert<'e>(
        exec: impl PgExecutor<'e>,
        input: &CreateReconciliationResult,
    ) -> Result<ReconciliationResult, sqlx::Error> {
        let system_record = input
            .system_record
            .as_ref()
            .and_then(|s| serde_json::to_value(s).ok());
        let uploaded_record = serde_json::to_value(&input.uploaded_record)
            .unwrap_or_else(|_| serde_json::json!({}));
        let mismatched_fields = serde_json::to_value(&input.mismatched_fields)
            .unwrap_or_else(|_| serde_json::json!([]));

        let query = format!(
            "INSERT INTO reconciliation_results \
                 (upload_job_id, record_id, system_record, uploaded_record, \
                  match_status, mismatched_fields, matched_rule, \
                  duplicate_reason, error_message, confidence) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, ReconciliationResult>(&query)
            .bind(input.upload_job_id)
            .bind(input.record_id)
            .bind(system_record)
            .bind(uploaded_record)
            .bind(input.match_status.as_str())
            .bind(mismatched_fields)
            .bind(&input.matched_rule)
            .bind(&input.duplicate_reason)
            .bind(&input.error_message)
            .bind(input.confidence)
            .fetch_one(exec)
            .await
    }

    /// Query results with filtering and pagination, newest first.
    pub async fn list(pool: &PgPool, params: &ResultListQuery) -> Result<ResultPage, sqlx::Error> {
        let limit = params.limit.unwrap_or(DEFAULT_LIMIT).min(MAX_LIMIT);
        let offset = params.offset.unwrap_or(0);

        let (where_clause, bind_values, bind_idx) = build_result_filter(params);

        let query = format!(
            "SELECT {COLUMNS} FROM reconciliation_results {where_clause} \
             ORDER BY created_at DESC, id DESC \
             LIMIT ${bind_idx} OFFSET ${}",
            bind_idx + 1
        );
        let mut q = sqlx::query_as::<_, ReconciliationResult>(&query);
        for value in &bind_values {
            q = bind_result_value(q, value);
        }
        let items = q.bind(limit).bind(offset).fetch_all(pool).await?;

        let count_query =
            format!("SELECT COUNT(*)::BIGINT FROM reconciliation_results {where_clause}");
        let mut cq = sqlx::query_scalar::<_, i64>(&count_query);
        for value in &bind_values {
            cq = bind_result_value_scalar(cq, value);
        }
        let total = cq.fetch_one(pool).await?;

        Ok(ResultPage { items, total })
    }

    /// Result counts grouped by classification for the given filter.
    pub async fn counts_by_status(
        pool: &PgPool,
        params: &ResultListQuery,
    ) -> Result<Vec<StatusCount>, sqlx::Error> {
        let (where_clause, bind_values, _) = build_result_filter(params);
        let query = format!(
            "SELECT match_status, COUNT(*)::BIGINT AS count \
             FROM reconciliation_results {where_clause} \
             GROUP BY match_status"
        );
        let mut q = sqlx::query_as::<_, StatusCount>(&query);
        for value in &bind_values {
            q = bind_result_value(q, value);
        }
        q.fetch_all(pool).await
    }

    /// All results ever produced for one record, newest first.
    pub async fn find_by_record(
        pool: &PgPool,
        record_id: DbId,
    ) -> Result<Vec<ReconciliationResult>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM reconciliation_results \
             WHERE record_id = $1 \
             ORDER BY created_at DESC, id DESC"
        );
        sqlx::query_as::<_, ReconciliationResult>(&query)
            .bind(record_id)
            .fetch_all(pool)
            .await
    }
}

// ---------------------------------------------------------------------------
// Internal helpers for dynamic query building
// ---------------------------------------------------------------------------

/// Typed bind value for dynamically-built result queries.
enum BindValue {
    BigInt(i64),
    Text(String),
    Timestamp(Timestamp),
}

fn build_result_filter(params: &ResultListQuery) -> (String, Vec<BindValue>, u32) {
    let mut conditions: Vec<String> = Vec::new();
    let mut bind_idx = 1u32;
    let mut bind_values: Vec<BindValue> = Vec::new();

    if let Some(upload_job_id) = params.upload_job_id {
        conditions.push(format!("upload_job_id = ${bind_idx}"));
        bind_idx += 1;
        bind_values.push(BindValue::BigInt(upload_job_id));
    }

    if let Some(ref match_status) = params.match_status {
        conditions.push(format!("match_status = ${bind_idx}"));
        bind_idx += 1;
        bind_values.push(BindValue::Text(match_status.clone()));
    }

    if let Some(from) = params.from {
        conditions.push(format!("created_at >= ${bind_idx}"));
        bind_idx += 1;
        bind_values.push(BindValue::Timestamp(from));
    }

    if let Some(to) = params.to {
        conditions.push(format!("created_at <= ${bind_idx}"));
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

fn bind_result_value<'q, O>(
    q: sqlx::query::QueryAs<'q, sqlx::Postgres, O, sqlx::postgres::PgArguments>,
    value: &'q BindValue,
) -> sqlx::query::QueryAs<'q, sqlx::Postgres, O, sqlx::postgres::PgArguments> {
    match value {
        BindValue::BigInt(v) => q.bind(*v),
        BindValue::Text(v) => q.bind(v.as_str()),
        BindValue::Timestamp(v) => q.bind(*v),
    }
}

fn bind_result_value_scalar<'q>(
    q: sqlx::query::QueryScalar<'q, sqlx::Postgres, i64, sqlx::postgres::PgArguments>,
    value: &'q BindValue,
) -> sqlx::query::QueryScalar<'q, sqlx::Postgres, i64, sqlx::postgres::PgArguments> {
    match value {
        BindValue::BigInt(v) => q.bind(*v),
        BindValue::Text(v) => q.bind(v.as_str()),
        BindValue::Timestamp(v) => q.bind(*v),
    }
}
