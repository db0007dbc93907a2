//! Repository for the `upload_jobs` table.
//!
//! Progress updates use `GREATEST` so the stored percentage never moves
//! backwards within a processing attempt; a retry reset starts the next
//! attempt from zero.

use sqlx::{PgExecutor, PgPool};
use tally_core::stats::ReconStats;
use tally_core::types::{DbId, Timestamp};

use crate::models::status::{StatusId, UploadStatus};
use crate::models::upload_job::{CreateUploadJob, UploadJob, UploadJobListQuery, UploadJobPage};

/// Column list for `upload_jobs` queries.
const COLUMNS: &str = "\
    id, file_name, file_hash, artifact_path, file_type, uploaded_by, \
    status_id, total_records, processed_records, failed_records, \
    matched_records, partially_matched_records, unmatched_records, \
    duplicate_records, column_mapping, progress_percent, retry_count, \
    error_message, failure_reason, queue_job_id, \
    created_at, started_at, completed_at, failed_at";

/// Maximum page size for job listing.
const MAX_LIMIT: i64 = 100;

/// Default page size for job listing.
const DEFAULT_LIMIT: i64 = 50;

/// Provides CRUD operations for upload jobs.
pub struct UploadJobRepo;

impl UploadJobRepo {
    /// Create a new Pending upload job.
    pub async fn create(pool: &PgPool, input: &CreateUploadJob) -> Result<UploadJob, sqlx::Error> {
        let mapping = serde_json::to_value(&input.column_mapping)
            .unwrap_or_else(|_| serde_json::json!({}));
        let query = format!(
            "INSERT INTO upload_jobs \
                 (file_name, file_hash, artifact_path, file_type, uploaded_by, status_id, column_mapping) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, UploadJob>(&query)
            .bind(&input.file_name)
            .bind(&input.file_hash)
            .bind(&input.artifact_path)
            .bind(&input.file_type)
            .bind(input.uploaded_by)
            .bind(UploadStatus::Pending.id())
            .bind(mapping)
            .fetch_one(pool)
            .await
    }

    /// Find a job by its ID.
    pub async fn find_by_id<'e>(
        exec: impl PgExecutor<'e>,
        id: DbId,
    ) -> Result<Option<UploadJob>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM upload_jobs WHERE id = $1");
        sqlx::query_as::<_, UploadJob>(&query)
            .bind(id)
            .fetch_optional(exec)
            .await
    }

    /// Idempotency lookup: the most recent job with this content
    /// fingerprint, submitted by this actor, that is Completed or still
    /// Processing.
    pub async fn find_existing_upload(
        pool: &PgPool,
        file_hash: &str,
        uploaded_by: DbId,
    ) -> Result<Option<UploadJob>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM upload_jobs \
             WHERE file_hash = $1 AND uploaded_by = $2 AND status_id IN ($3, $4) \
             ORDER BY created_at DESC \
             LIMIT 1"
        );
        sqlx::query_as::<_, UploadJob>(&query)
            .bind(file_hash)
            .bind(uploaded_by)
            .bind(UploadStatus::Completed.id())
            .bind(UploadStatus::Processing.id())
            .fetch_optional(pool)
            .await
    }

    /// Attach the queue entry that will process this job.
    pub async fn set_queue_job(
        pool: &PgPool,
        id: DbId,
        queue_job_id: DbId,
    ) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE upload_jobs SET queue_job_id = $2 WHERE id = $1")
            .bind(id)
            .bind(queue_job_id)
            .execute(pool)
            .await?;
        Ok(())
    }

    /// Transition to Processing. `started_at` is stamped only once per
    /// attempt chain.
    pub async fn mark_processing<'e>(
        exec: impl PgExecutor<'e>,
        id: DbId,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE upload_jobs \
             SET status_id = $2, started_at = COALESCE(started_at, NOW()) \
             WHERE id = $1",
        )
        .bind(id)
        .bind(UploadStatus::Processing.id())
        .execute(exec)
        .await?;
        Ok(())
    }

    /// Record the decoded row count.
    pub async fn set_total_records<'e>(
        exec: impl PgExecutor<'e>,
        id: DbId,
        total: i64,
    ) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE upload_jobs SET total_records = $2 WHERE id = $1")
            .bind(id)
            .bind(total)
            .execute(exec)
            .await?;
        Ok(())
    }

    /// Update the row-ingestion counters and progress band.
    pub async fn record_ingest_progress<'e>(
        exec: impl PgExecutor<'e>,
        id: DbId,
        processed: i64,
        failed: i64,
        percent: i16,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE upload_jobs \
             SET processed_records = $2, failed_records = $3, \
                 progress_percent = GREATEST(progress_percent, $4) \
             WHERE id = $1",
        )
        .bind(id)
        .bind(processed)
        .bind(failed)
        .bind(percent)
        .execute(exec)
        .await?;
        Ok(())
    }

    /// Bump the progress percentage (never backwards).
    pub async fn update_progress<'e>(
        exec: impl PgExecutor<'e>,
        id: DbId,
        percent: i16,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE upload_jobs \
             SET progress_percent = GREATEST(progress_percent, $2) \
             WHERE id = $1",
        )
        .bind(id)
        .bind(percent)
        .execute(exec)
        .await?;
        Ok(())
    }

    /// Write the per-classification counters after reconciliation.
    pub async fn apply_recon_stats<'e>(
        exec: impl PgExecutor<'e>,
        id: DbId,
        stats: &ReconStats,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE upload_jobs \
             SET matched_records = $2, partially_matched_records = $3, \
                 unmatched_records = $4, duplicate_records = $5 \
             WHERE id = $1",
        )
        .bind(id)
        .bind(stats.matched as i64)
        .bind(stats.partially_matched as i64)
        .bind(stats.unmatched as i64)
        .bind(stats.duplicate as i64)
        .execute(exec)
        .await?;
        Ok(())
    }

    /// Terminal transition inside the ingestion transaction.
    pub async fn finalize<'e>(
        exec: impl PgExecutor<'e>,
        id: DbId,
        status: UploadStatus,
        error_message: Option<&str>,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE upload_jobs \
             SET status_id = $2, error_message = $3, \
                 completed_at = NOW(), progress_percent = 100 \
             WHERE id = $1",
        )
        .bind(id)
        .bind(status.id())
        .bind(error_message)
        .execute(exec)
        .await?;
        Ok(())
    }

    /// Mark a job Failed after a transaction abort, capturing the reason.
    /// Runs on the pool, never inside the aborted transaction.
    pub async fn mark_failed(
        pool: &PgPool,
        id: DbId,
        failure_reason: &str,
        error_message: Option<&str>,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE upload_jobs \
             SET status_id = $2, failure_reason = $3, error_message = $4, failed_at = NOW() \
             WHERE id = $1",
        )
        .bind(id)
        .bind(UploadStatus::Failed.id())
        .bind(failure_reason)
        .bind(error_message)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Reset a Failed/PartiallyFailed job for another attempt.
    ///
    /// Returns `None` when the job does not exist or is not in a retryable
    /// state.
    pub async fn reset_for_retry(pool: &PgPool, id: DbId) -> Result<Option<UploadJob>, sqlx::Error> {
        let query = format!(
            "UPDATE upload_jobs \
             SET status_id = $2, retry_count = retry_count + 1, \
                 error_message = NULL, failure_reason = NULL, progress_percent = 0 \
             WHERE id = $1 AND status_id IN ($3, $4) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, UploadJob>(&query)
            .bind(id)
            .bind(UploadStatus::Pending.id())
            .bind(UploadStatus::Failed.id())
            .bind(UploadStatus::PartiallyFailed.id())
            .fetch_optional(pool)
            .await
    }

    /// List upload jobs with optional filters and pagination.
    pub async fn list(
        pool: &PgPool,
        params: &UploadJobListQuery,
    ) -> Result<UploadJobPage, sqlx::Error> {
        let limit = params.limit.unwrap_or(DEFAULT_LIMIT).min(MAX_LIMIT);
        let offset = params.offset.unwrap_or(0);

        let (where_clause, bind_values, bind_idx) = build_job_filter(params);

        let query = format!(
            "SELECT {COLUMNS} FROM upload_jobs {where_clause} \
             ORDER BY created_at DESC \
             LIMIT ${bind_idx} OFFSET ${}",
            bind_idx + 1
        );
        let mut q = sqlx::query_as::<_, UploadJob>(&query);
        for value in &bind_values {
            q = bind_job_value(q, value);
        }
        let items = q.bind(limit).bind(offset).fetch_all(pool).await?;

        let count_query = format!("SELECT COUNT(*)::BIGINT FROM upload_jobs {where_clause}");
        let mut cq = sqlx::query_scalar::<_, i64>(&count_query);
        for value in &bind_values {
            cq = bind_job_value_scalar(cq, value);
        }
        let total = cq.fetch_one(pool).await?;

        Ok(UploadJobPage { items, total })
    }
}

// ---------------------------------------------------------------------------
// Internal helpers for dynamic query building
// ---------------------------------------------------------------------------

/// Typed bind value for dynamically-built job queries.
enum BindValue {
    BigInt(i64),
    Small(StatusId),
    Timestamp(Timestamp),
}

/// Build a WHERE clause and bind values from the listing filters.
///
/// Returns `(where_clause, bind_values, next_bind_index)`.
fn build_job_filter(params: &UploadJobListQuery) -> (String, Vec<BindValue>, u32) {
    let mut conditions: Vec<String> = Vec::new();
    let mut bind_idx = 1u32;
    let mut bind_values: Vec<BindValue> = Vec::new();

    if let Some(uploaded_by) = params.uploaded_by {
        conditions.push(format!("uploaded_by = ${bind_idx}"));
        bind_idx += 1;
        bind_values.push(BindValue::BigInt(uploaded_by));
    }

    if let Some(status_id) = params.status_id {
        conditions.push(format!("status_id = ${bind_idx}"));
        bind_idx += 1;
        bind_values.push(BindValue::Small(status_id));
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

fn bind_job_value<'q, O>(
    q: sqlx::query::QueryAs<'q, sqlx::Postgres, O, sqlx::postgres::PgArguments>,
    value: &'q BindValue,
) -> sqlx::query::QueryAs<'q, sqlx::Postgres, O, sqlx::postgres::PgArguments> {
    match value {
        BindValue::BigInt(v) => q.bind(*v),
        BindValue::Small(v) => q.bind(*v),
        BindValue::Timestamp(v) => q.bind(*v),
    }
}

fn bind_job_value_scalar<'q>(
    q: sqlx::query::QueryScalar<'q, sqlx::Postgres, i64, sqlx::postgres::PgArguments>,
    value: &'q BindValue,
) -> sqlx::query::QueryScalar<'q, sqlx::Postgres, i64, sqlx::postgres::PgArguments> {
    match value {
        BindValue::BigInt(v) => q.bind(*v),
        BindValue::Small(v) => q.bind(*v),
        BindValue::Timestamp(v) => q.bind(*v),
    }
}
