//! Read-side reports: result listings, dashboard statistics, and audit
//! timelines.

use serde::Serialize;
use sqlx::PgPool;
use tally_core::matching::MatchStatus;
use tally_core::types::DbId;
use tally_db::models::audit_log::{AuditLog, AuditQuery};
use tally_db::models::reconciliation_result::{ReconciliationResult, ResultListQuery, ResultPage};
use tally_db::repositories::{AuditLogRepo, ReconciliationResultRepo};

use crate::error::PipelineResult;

/// Aggregate classification counts plus the match-rate percentage.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardStats {
    pub total_records: i64,
    pub matched: i64,
    pub partially_matched: i64,
    pub unmatched: i64,
    pub duplicate: i64,
    pub failed: i64,
    /// Share of records matched fully or partially, in percent.
    pub reconciliation_accuracy: f64,
}

/// List reconciliation results with filters and pagination.
pub async fn list_results(pool: &PgPool, params: &ResultListQuery) -> PipelineResult<ResultPage> {
    Ok(ReconciliationResultRepo::list(pool, params).await?)
}

/// All classifications ever produced for one record, newest first.
pub async fn results_for_record(
    pool: &PgPool,
    record_id: DbId,
) -> PipelineResult<Vec<ReconciliationResult>> {
    Ok(ReconciliationResultRepo::find_by_record(pool, record_id).await?)
}

/// Dashboard statistics for the given filter.
pub async fn dashboard_stats(
    pool: &PgPool,
    params: &ResultListQuery,
) -> PipelineResult<DashboardStats> {
    let counts = ReconciliationResultRepo::counts_by_status(pool, params).await?;

    let mut stats = DashboardStats::default();
    for entry in counts {
        match MatchStatus::parse(&entry.match_status) {
            Ok(MatchStatus::Matched) => stats.matched = entry.count,
            Ok(MatchStatus::PartiallyMatched) => stats.partially_matched = entry.count,
            Ok(MatchStatus::NotMatched) => stats.unmatched = entry.count,
            Ok(MatchStatus::Duplicate) => stats.duplicate = entry.count,
            Ok(MatchStatus::Failed) => stats.failed = entry.count,
            Err(_) => {}
        }
        stats.total_records += entry.count;
    }
    if stats.total_records > 0 {
        stats.reconciliation_accuracy = (stats.matched + stats.partially_matched) as f64
            / stats.total_records as f64
            * 100.0;
    }
    Ok(stats)
}

/// Chronological audit timeline for one record.
pub async fn audit_timeline_for_record(
    pool: &PgPool,
    record_id: DbId,
    limit: Option<i64>,
) -> PipelineResult<Vec<AuditLog>> {
    let params = AuditQuery {
        record_id: Some(record_id),
        limit,
        ..AuditQuery::default()
    };
    Ok(AuditLogRepo::query(pool, &params).await?)
}

/// Chronological audit timeline for one upload job.
pub async fn audit_timeline_for_job(
    pool: &PgPool,
    upload_job_id: DbId,
    limit: Option<i64>,
) -> PipelineResult<Vec<AuditLog>> {
    let params = AuditQuery {
        upload_job_id: Some(upload_job_id),
        limit,
        ..AuditQuery::default()
    };
    Ok(AuditLogRepo::query(pool, &params).await?)
}

/// Filtered audit search with pagination metadata.
pub async fn audit_search(
    pool: &PgPool,
    params: &AuditQuery,
) -> PipelineResult<(Vec<AuditLog>, i64)> {
    let items = AuditLogRepo::query(pool, params).await?;
    let total = AuditLogRepo::count(pool, params).await?;
    Ok((items, total))
}
