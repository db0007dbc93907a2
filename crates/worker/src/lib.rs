//! Queue worker.
//!
//! A long-lived loop that claims entries from the `file-processing` and
//! `reconciliation` queues and drives the pipeline. Different upload jobs
//! may run on different workers concurrently; within one claimed job,
//! ingestion and reconciliation are strictly sequential. Retry backoff
//! and attempt accounting live in the queue repository; the worker only
//! reports success or failure per attempt.

use std::sync::Arc;
use std::time::Duration;

use sqlx::PgPool;
use tally_db::models::queue_job::{
    EnqueueOptions, QueueJob, QUEUE_FILE_PROCESSING, QUEUE_RECONCILIATION,
};
use tally_db::repositories::QueueJobRepo;
use tally_pipeline::decoder::TabularSource;
use tally_pipeline::engine::ReconciliationEngine;
use tally_pipeline::ingestion::IngestionPipeline;
use tally_pipeline::orchestrator::{IngestPayload, ReconcilePayload};
use tally_pipeline::progress::QueueProgress;
use tally_pipeline::rule_cache::RuleCache;
use tokio_util::sync::CancellationToken;

/// Default polling interval for the worker loop.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Pulls queue entries and executes them.
pub struct Worker {
    pool: PgPool,
    pipeline: IngestionPipeline,
    engine: ReconciliationEngine,
    poll_interval: Duration,
}

impl Worker {
    pub fn new(pool: PgPool, rules: Arc<RuleCache>, decoder: Arc<dyn TabularSource>) -> Self {
        let pipeline =
            IngestionPipeline::new(pool.clone(), ReconciliationEngine::new(rules.clone()), decoder);
        Self {
            pool,
            pipeline,
            engine: ReconciliationEngine::new(rules),
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Run the claim loop until the cancellation token is triggered.
    ///
    /// Cancellation is only honoured between jobs; a running job finishes
    /// (or aborts) its current transaction first.
    pub async fn run(&self, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.poll_interval);
        tracing::info!(
            poll_interval_ms = self.poll_interval.as_millis() as u64,
            "Worker started",
        );

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Worker shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    if let Err(e) = self.tick().await {
                        tracing::error!(error = %e, "Worker tick failed");
                    }
                }
            }
        }
    }

    /// One poll cycle: ingestion work first, then reconciliation work.
    async fn tick(&self) -> Result<(), sqlx::Error> {
        if let Some(job) = QueueJobRepo::claim_next(&self.pool, QUEUE_FILE_PROCESSING).await? {
            self.process_ingest(job).await;
            return Ok(());
        }

        if let Some(job) = QueueJobRepo::claim_next(&self.pool, QUEUE_RECONCILIATION).await? {
            self.process_reconcile(job).await;
        }

        Ok(())
    }

    async fn process_ingest(&self, queue_job: QueueJob) {
        tracing::info!(
            queue_job_id = queue_job.id,
            attempt = queue_job.attempts_made,
            "Claimed ingestion job",
        );

        let payload: IngestPayload = match serde_json::from_value(queue_job.payload.clone()) {
            Ok(payload) => payload,
            Err(e) => {
                self.fail_attempt(queue_job.id, &format!("Malformed payload: {e}")).await;
                return;
            }
        };

        let progress = QueueProgress::new(self.pool.clone(), queue_job.id);
        match self
            .pipeline
            .run(payload.upload_job_id, payload.actor_id, &progress)
            .await
        {
            Ok(outcome) => {
                let result = serde_json::json!({
                    "uploadJobId": payload.upload_job_id,
                    "persisted": outcome.persisted,
                    "rowFailures": outcome.row_failures,
                    "reconciliationErrors": outcome.recon_errors,
                });
                self.complete_attempt(queue_job.id, QUEUE_FILE_PROCESSING, result).await;
            }
            Err(e) => self.fail_attempt(queue_job.id, &e.to_string()).await,
        }
    }

    async fn process_reconcile(&self, queue_job: QueueJob) {
        tracing::info!(
            queue_job_id = queue_job.id,
            attempt = queue_job.attempts_made,
            "Claimed reconciliation job",
        );

        let payload: ReconcilePayload = match serde_json::from_value(queue_job.payload.clone()) {
            Ok(payload) => payload,
            Err(e) => {
                self.fail_attempt(queue_job.id, &format!("Malformed payload: {e}")).await;
                return;
            }
        };

        let progress = QueueProgress::new(self.pool.clone(), queue_job.id);
        match self
            .engine
            .run_standalone(
                &self.pool,
                payload.upload_job_id,
                &payload.record_ids,
                payload.actor_id,
                &progress,
            )
            .await
        {
            Ok((results, errors)) => {
                let result = serde_json::json!({
                    "uploadJobId": payload.upload_job_id,
                    "results": results.len(),
                    "errors": errors.len(),
                });
                self.complete_attempt(queue_job.id, QUEUE_RECONCILIATION, result).await;
            }
            Err(e) => self.fail_attempt(queue_job.id, &e.to_string()).await,
        }
    }

    async fn complete_attempt(&self, queue_job_id: i64, queue: &str, result: serde_json::Value) {
        if let Err(e) = QueueJobRepo::complete(&self.pool, queue_job_id, &result).await {
            tracing::error!(queue_job_id, error = %e, "Failed to mark queue job completed");
            return;
        }
        tracing::info!(queue_job_id, "Queue job completed");

        let options = match queue {
            QUEUE_RECONCILIATION => EnqueueOptions::reconciliation(),
            _ => EnqueueOptions::file_processing(),
        };
        if let Err(e) = QueueJobRepo::prune_history(
            &self.pool,
            queue,
            options.keep_completed,
            options.keep_failed,
        )
        .await
        {
            tracing::warn!(queue, error = %e, "Failed to prune queue history");
        }
    }

    async fn fail_attempt(&self, queue_job_id: i64, error: &str) {
        match QueueJobRepo::fail(&self.pool, queue_job_id, error).await {
            Ok(updated) => tracing::warn!(
                queue_job_id,
                attempts_made = updated.attempts_made,
                max_attempts = updated.max_attempts,
                error,
                "Queue job attempt failed",
            ),
            Err(e) => tracing::error!(queue_job_id, error = %e, "Failed to record queue failure"),
        }
    }
}
