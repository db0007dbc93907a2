//! Ingestion pipeline.
//!
//! One sqlx transaction spans the whole job: row validation and batch
//! inserts, the upload audit entry, reconciliation of the freshly
//! persisted records, counter updates, and finalization all commit
//! together. Row-level failures are tallied and never abort the batch;
//! structural errors roll everything back and mark the job Failed.

use std::path::Path;
use std::sync::Arc;

use sqlx::PgPool;
use tally_core::ingest::{parse_row, RowFailure, INSERT_BATCH_SIZE};
use tally_core::progress as schedule;
use tally_core::stats::{final_outcome, ReconStats};
use tally_core::types::DbId;
use tally_db::models::audit_log::CreateAuditLog;
use tally_db::models::record::{NewRecord, Record};
use tally_db::models::status::UploadStatus;
use tally_db::models::upload_job::UploadJob;
use tally_db::repositories::{AuditLogRepo, RecordRepo, UploadJobRepo};

use crate::decoder::TabularSource;
use crate::engine::{result_stats, ReconciliationEngine};
use crate::error::{PipelineError, PipelineResult};
use crate::progress::ProgressReporter;

/// Summary of one completed ingestion run.
#[derive(Debug, Clone)]
pub struct IngestOutcome {
    pub persisted: u64,
    pub row_failures: u64,
    pub recon_errors: u64,
    pub stats: ReconStats,
    pub status: UploadStatus,
}

/// Drives one upload job from Pending through a terminal status.
pub struct IngestionPipeline {
    pool: PgPool,
    engine: ReconciliationEngine,
    decoder: Arc<dyn TabularSource>,
}

impl IngestionPipeline {
    pub fn new(pool: PgPool, engine: ReconciliationEngine, decoder: Arc<dyn TabularSource>) -> Self {
        Self {
            pool,
            engine,
            decoder,
        }
    }

    /// Process one upload job end to end.
    ///
    /// On a structural error the transaction is rolled back, the job is
    /// marked Failed with the captured reason, and the error propagates to
    /// the queue transport for retry accounting. The uploaded artifact is
    /// discarded on both paths.
    pub async fn run(
        &self,
        upload_job_id: DbId,
        actor_id: DbId,
        progress: &dyn ProgressReporter,
    ) -> PipelineResult<IngestOutcome> {
        let outcome = self.run_in_transaction(upload_job_id, actor_id, progress).await;

        match outcome {
            Ok(ok) => {
                tracing::info!(
                    upload_job_id,
                    persisted = ok.persisted,
                    row_failures = ok.row_failures,
                    recon_errors = ok.recon_errors,
                    status = ?ok.status,
                    "Upload job finished",
                );
                self.discard_artifact(upload_job_id).await;
                progress.report(schedule::FINALIZED).await;
                Ok(ok)
            }
            Err(e) => {
                tracing::error!(upload_job_id, error = %e, "Upload job failed");
                if let Err(mark_err) =
                    UploadJobRepo::mark_failed(&self.pool, upload_job_id, &e.to_string(), None)
                        .await
                {
                    tracing::error!(
                        upload_job_id,
                        error = %mark_err,
                        "Failed to mark job as failed",
                    );
                }
                self.discard_artifact(upload_job_id).await;
                Err(e)
            }
        }
    }

    async fn run_in_transaction(
        &self,
        upload_job_id: DbId,
        actor_id: DbId,
        progress: &dyn ProgressReporter,
    ) -> PipelineResult<IngestOutcome> {
        let mut tx = self.pool.begin().await?;

        let job = UploadJobRepo::find_by_id(&mut *tx, upload_job_id)
            .await?
            .ok_or(PipelineError::JobNotFound(upload_job_id))?;
        let mapping = job.mapping()?;
        let artifact_path = job
            .artifact_path
            .clone()
            .ok_or(PipelineError::ArtifactMissing)?;

        UploadJobRepo::mark_processing(&mut *tx, upload_job_id).await?;

        let table = self
            .decoder
            .decode(Path::new(&artifact_path), &job.file_type)
            .await?;
        let total = table.rows.len();
        UploadJobRepo::set_total_records(&mut *tx, upload_job_id, total as i64).await?;
        progress.report(schedule::DECODED).await;

        // Batched validation + insert, 0-60% of the schedule.
        let mut saved: Vec<Record> = Vec::with_capacity(total);
        let mut failures: Vec<RowFailure> = Vec::new();

        for (batch_index, batch) in table.rows.chunks(INSERT_BATCH_SIZE).enumerate() {
            let mut to_insert: Vec<NewRecord> = Vec::with_capacity(batch.len());

            for (offset, row) in batch.iter().enumerate() {
                let row_index = batch_index * INSERT_BATCH_SIZE + offset + 1;
                match parse_row(&mapping, row, row_index) {
                    Ok(parsed) => to_insert.push(NewRecord::from_parsed(upload_job_id, &parsed)),
                    Err(e) => failures.push(RowFailure {
                        row_index,
                        error: e.to_string(),
                    }),
                }
            }

            let inserted = RecordRepo::insert_batch(&mut *tx, &to_insert).await?;
            saved.extend(inserted);

            let processed = ((batch_index + 1) * INSERT_BATCH_SIZE).min(total);
            let percent = schedule::ingest_progress(processed as u64, total as u64);
            UploadJobRepo::record_ingest_progress(
                &mut *tx,
                upload_job_id,
                processed as i64,
                failures.len() as i64,
                percent,
            )
            .await?;
            progress.report(percent).await;

            // Long jobs must not starve the scheduler between batches.
            tokio::task::yield_now().await;
        }

        // Upload audit entry, 65%.
        let entry = CreateAuditLog::upload(
            upload_job_id,
            serde_json::json!({
                "fileName": job.file_name,
                "totalRecords": total,
                "failedRecords": failures.len(),
            }),
            actor_id,
        );
        AuditLogRepo::insert(&mut *tx, &entry).await?;
        UploadJobRepo::update_progress(&mut *tx, upload_job_id, schedule::AUDIT_LOGGED).await?;
        progress.report(schedule::AUDIT_LOGGED).await;

        // Reconciliation of the freshly persisted records, 70-90%.
        UploadJobRepo::update_progress(&mut *tx, upload_job_id, schedule::RECONCILING).await?;
        progress.report(schedule::RECONCILING).await;

        let (results, errors) = self
            .engine
            .reconcile(&mut *tx, upload_job_id, &saved, actor_id)
            .await?;

        UploadJobRepo::update_progress(&mut *tx, upload_job_id, schedule::RECONCILED).await?;
        progress.report(schedule::RECONCILED).await;

        let stats = result_stats(&results);
        UploadJobRepo::apply_recon_stats(&mut *tx, upload_job_id, &stats).await?;

        // Terminal status and commit.
        let outcome = final_outcome(saved.len() as u64, failures.len() as u64, errors.len() as u64);
        let status = UploadStatus::from_outcome(outcome);
        let error_message = match status {
            UploadStatus::Completed => None,
            UploadStatus::Failed => Some("All records failed to process".to_string()),
            _ => Some(format!(
                "{} rows failed to process, {} reconciliation errors",
                failures.len(),
                errors.len()
            )),
        };
        UploadJobRepo::finalize(&mut *tx, upload_job_id, status, error_message.as_deref()).await?;

        tx.commit().await?;

        Ok(IngestOutcome {
            persisted: saved.len() as u64,
            row_failures: failures.len() as u64,
            recon_errors: errors.len() as u64,
            stats,
            status,
        })
    }

    /// Remove the staged artifact; a leftover file is only worth a warning.
    async fn discard_artifact(&self, upload_job_id: DbId) {
        let job: Option<UploadJob> = UploadJobRepo::find_by_id(&self.pool, upload_job_id)
            .await
            .ok()
            .flatten();
        let Some(path) = job.and_then(|j| j.artifact_path) else {
            return;
        };
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                tracing::warn!(upload_job_id, path, error = %e, "Failed to remove artifact");
            }
        }
    }
}
