//! Reconciliation engine.
//!
//! Orchestrates the duplicate detector and the rule evaluator across all
//! active rules for each candidate, in input order. Every emitted result
//! is persisted and immediately followed by one audit entry. Per-record
//! failures are collected in an explicit error accumulator — one bad
//! record never aborts the run.

use std::sync::Arc;

use serde::Serialize;
use sqlx::{PgConnection, PgPool};
use tally_core::duplicate::SeenTransactions;
use tally_core::matching::MatchStatus;
use tally_core::rules::{RuleSpec, SENTINEL_DUPLICATE_DETECTION, SENTINEL_NO_MATCHING_RULE,
    SENTINEL_PROCESSING_ERROR};
use tally_core::stats::{tally, ReconStats};
use tally_core::types::DbId;
use tally_db::models::audit_log::CreateAuditLog;
use tally_db::models::record::Record;
use tally_db::models::reconciliation_result::{CreateReconciliationResult, ReconciliationResult};
use tally_db::repositories::{
    AuditLogRepo, ReconciliationResultRepo, RecordRepo, UploadJobRepo,
};

use crate::duplicates::{DuplicateDetector, DuplicateVerdict};
use crate::error::PipelineResult;
use crate::evaluator::RuleEvaluator;
use crate::progress::ProgressReporter;
use crate::rule_cache::RuleCache;

/// One per-record failure captured during a run.
#[derive(Debug, Clone, Serialize)]
pub struct ReconError {
    pub record_id: DbId,
    pub transaction_id: String,
    pub error: String,
}

/// Classifies candidate records against the persisted population.
pub struct ReconciliationEngine {
    rules: Arc<RuleCache>,
}

impl ReconciliationEngine {
    pub fn new(rules: Arc<RuleCache>) -> Self {
        Self { rules }
    }

    /// Reconcile `candidates` in input order.
    ///
    /// Returns every persisted result alongside the per-record errors, so
    /// the caller can tell complete success from partial failure without
    /// an aborted run.
    pub async fn reconcile(
        &self,
        conn: &mut PgConnection,
        upload_job_id: DbId,
        candidates: &[Record],
        actor_id: DbId,
    ) -> PipelineResult<(Vec<ReconciliationResult>, Vec<ReconError>)> {
        let rules = self.rules.get_active().await?;
        let mut seen = SeenTransactions::new();
        let mut results: Vec<ReconciliationResult> = Vec::with_capacity(candidates.len());
        let mut errors: Vec<ReconError> = Vec::new();

        for candidate in candidates {
            match Self::classify_one(conn, upload_job_id, candidate, &rules, &mut seen, actor_id)
                .await
            {
                Ok(result) => results.push(result),
                Err(e) => {
                    tracing::error!(
                        record_id = candidate.id,
                        transaction_id = %candidate.transaction_id,
                        error = %e,
                        "Record reconciliation failed",
                    );
                    errors.push(ReconError {
                        record_id: candidate.id,
                        transaction_id: candidate.transaction_id.clone(),
                        error: e.to_string(),
                    });

                    // Best effort: record the failure as a result so the
                    // classification is queryable.
                    let failed = CreateReconciliationResult {
                        upload_job_id,
                        record_id: candidate.id,
                        system_record: None,
                        uploaded_record: candidate.snapshot(),
                        match_status: MatchStatus::Failed,
                        mismatched_fields: Vec::new(),
                        matched_rule: SENTINEL_PROCESSING_ERROR.to_string(),
                        duplicate_reason: None,
                        error_message: Some(e.to_string()),
                        confidence: tally_core::matching::DEFAULT_CONFIDENCE,
                    };
                    match Self::persist_with_audit(conn, &failed, actor_id).await {
                        Ok(result) => results.push(result),
                        Err(inner) => tracing::error!(
                            record_id = candidate.id,
                            error = %inner,
                            "Failed to persist Failed result",
                        ),
                    }
                }
            }
        }

        Ok((results, errors))
    }

    /// Run a standalone re-reconciliation pass over already-persisted
    /// records and refresh the job's counters.
    pub async fn run_standalone(
        &self,
        pool: &PgPool,
        upload_job_id: DbId,
        record_ids: &[DbId],
        actor_id: DbId,
        progress: &dyn ProgressReporter,
    ) -> PipelineResult<(Vec<ReconciliationResult>, Vec<ReconError>)> {
        progress.report(10).await;
        let records = RecordRepo::find_by_ids(pool, record_ids).await?;
        progress.report(30).await;

        let mut conn = pool.acquire().await?;
        let (results, errors) = self
            .reconcile(&mut *conn, upload_job_id, &records, actor_id)
            .await?;
        drop(conn);
        progress.report(80).await;

        let stats = result_stats(&results);
        UploadJobRepo::apply_recon_stats(pool, upload_job_id, &stats).await?;
        progress.report(100).await;

        Ok((results, errors))
    }

    /// Classify one candidate: duplicate detection first, then the rules
    /// in priority order (first match wins), else Not Matched.
    async fn classify_one(
        conn: &mut PgConnection,
        upload_job_id: DbId,
        candidate: &Record,
        rules: &[RuleSpec],
        seen: &mut SeenTransactions,
        actor_id: DbId,
    ) -> PipelineResult<ReconciliationResult> {
        let verdict = DuplicateDetector::classify(conn, candidate, upload_job_id, seen).await?;
        if let Some(reason) = verdict.reason() {
            let system = match &verdict {
                DuplicateVerdict::AcrossJobs(record) | DuplicateVerdict::WithinJob(record) => {
                    Some(record.snapshot())
                }
                _ => None,
            };
            let create = CreateReconciliationResult {
                upload_job_id,
                record_id: candidate.id,
                system_record: system,
                uploaded_record: candidate.snapshot(),
                match_status: MatchStatus::Duplicate,
                mismatched_fields: Vec::new(),
                matched_rule: SENTINEL_DUPLICATE_DETECTION.to_string(),
                duplicate_reason: Some(reason.to_string()),
                error_message: None,
                confidence: tally_core::matching::DEFAULT_CONFIDENCE,
            };
            return Self::persist_with_audit(conn, &create, actor_id).await;
        }

        for rule in rules {
            match RuleEvaluator::apply(conn, rule, candidate, upload_job_id).await {
                Ok(Some(found)) => {
                    let create = CreateReconciliationResult::new(
                        upload_job_id,
                        candidate.id,
                        Some(found.system.snapshot()),
                        candidate.snapshot(),
                        found.status,
                        found.mismatches,
                        rule.name.clone(),
                    );
                    return Self::persist_with_audit(conn, &create, actor_id).await;
                }
                Ok(None) => continue,
                Err(e) => {
                    // A failing rule is treated as no-match for that rule;
                    // later rules still get their chance.
                    tracing::warn!(
                        rule = %rule.name,
                        record_id = candidate.id,
                        error = %e,
                        "Rule application failed",
                    );
                    continue;
                }
            }
        }

        let create = CreateReconciliationResult::new(
            upload_job_id,
            candidate.id,
            None,
            candidate.snapshot(),
            MatchStatus::NotMatched,
            Vec::new(),
            SENTINEL_NO_MATCHING_RULE,
        );
        Self::persist_with_audit(conn, &create, actor_id).await
    }

    /// Persist one result followed by exactly one audit entry.
    async fn persist_with_audit(
        conn: &mut PgConnection,
        create: &CreateReconciliationResult,
        actor_id: DbId,
    ) -> PipelineResult<ReconciliationResult> {
        let result = ReconciliationResultRepo::insert(&mut *conn, create).await?;
        let entry = CreateAuditLog::reconcile(
            result.record_id,
            result.upload_job_id,
            serde_json::to_value(&result).unwrap_or(serde_json::Value::Null),
            actor_id,
        );
        AuditLogRepo::insert(&mut *conn, &entry).await?;
        Ok(result)
    }
}

/// Tally persisted results into per-status counters.
pub fn result_stats(results: &[ReconciliationResult]) -> ReconStats {
    tally(
        results
            .iter()
            .filter_map(|r| MatchStatus::parse(&r.match_status).ok()),
    )
}
