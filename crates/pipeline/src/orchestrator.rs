//! Job orchestrator: idempotent submission, retry, and lifecycle state.
//!
//! Submission fingerprints the staged artifact's bytes; a byte-identical
//! resubmission by the same actor short-circuits to the existing job
//! while it is Completed or Processing. That short-circuit is a normal
//! return, not an error.

use std::path::Path;

use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use tally_core::error::CoreError;
use tally_core::hashing::sha256_hex;
use tally_core::ingest::ColumnMapping;
use tally_core::types::{ActorContext, DbId};
use tally_db::models::queue_job::{
    EnqueueOptions, QueueJob, QUEUE_FILE_PROCESSING, QUEUE_RECONCILIATION,
};
use tally_db::models::upload_job::{CreateUploadJob, UploadJob, UploadJobListQuery, UploadJobPage};
use tally_db::repositories::{QueueJobRepo, UploadJobRepo};

use crate::decoder::file_type_from_name;
use crate::error::{PipelineError, PipelineResult};

// ---------------------------------------------------------------------------
// Queue payloads
// ---------------------------------------------------------------------------

/// Payload carried by `file-processing` queue entries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestPayload {
    pub upload_job_id: DbId,
    pub actor_id: DbId,
}

/// Payload carried by `reconciliation` queue entries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconcilePayload {
    pub upload_job_id: DbId,
    pub record_ids: Vec<DbId>,
    pub actor_id: DbId,
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

/// Result of a submission: either a fresh queued job or the existing one.
#[derive(Debug)]
pub enum SubmitOutcome {
    /// Idempotency short-circuit: this content was already submitted.
    Existing(UploadJob),
    Queued {
        job: UploadJob,
        queue_job: QueueJob,
    },
}

/// Combined job + live queue state for status queries.
#[derive(Debug, Serialize)]
pub struct JobStatusView {
    pub job: UploadJob,
    pub queue_job: Option<QueueJob>,
}

/// Stage uploaded bytes under a collision-free name inside `dir`.
///
/// The returned path is what [`UploadOrchestrator::submit`] expects; the
/// pipeline removes the file once the job reaches a terminal status.
pub async fn stage_artifact(
    dir: &Path,
    original_name: &str,
    bytes: &[u8],
) -> PipelineResult<std::path::PathBuf> {
    tokio::fs::create_dir_all(dir).await?;
    let staged_name = format!("{}-{}", uuid::Uuid::new_v4(), original_name);
    let path = dir.join(staged_name);
    tokio::fs::write(&path, bytes).await?;
    Ok(path)
}

/// Entry point for upload submission and retry.
pub struct UploadOrchestrator {
    pool: PgPool,
}

impl UploadOrchestrator {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Submit a staged artifact for processing.
    ///
    /// Computes the content fingerprint, short-circuits on an existing
    /// Completed/Processing job with the same fingerprint and actor, and
    /// otherwise creates a Pending job and enqueues it.
    pub async fn submit(
        &self,
        artifact_path: &Path,
        file_name: &str,
        mapping: ColumnMapping,
        actor: &ActorContext,
    ) -> PipelineResult<SubmitOutcome> {
        let bytes = tokio::fs::read(artifact_path)
            .await
            .map_err(|_| PipelineError::ArtifactMissing)?;
        let file_hash = sha256_hex(&bytes);

        if let Some(existing) =
            UploadJobRepo::find_existing_upload(&self.pool, &file_hash, actor.actor_id).await?
        {
            tracing::info!(
                upload_job_id = existing.id,
                file_hash = %file_hash,
                actor_id = actor.actor_id,
                "Duplicate submission short-circuited to existing job",
            );
            return Ok(SubmitOutcome::Existing(existing));
        }

        let mut job = UploadJobRepo::create(
            &self.pool,
            &CreateUploadJob {
                file_name: file_name.to_string(),
                file_hash,
                artifact_path: artifact_path.to_string_lossy().into_owned(),
                file_type: file_type_from_name(file_name).to_string(),
                uploaded_by: actor.actor_id,
                column_mapping: mapping,
            },
        )
        .await?;

        let queue_job = self.enqueue_ingest(&mut job, actor.actor_id).await?;
        tracing::info!(
            upload_job_id = job.id,
            queue_job_id = queue_job.id,
            file_name,
            "Upload accepted and queued",
        );
        Ok(SubmitOutcome::Queued { job, queue_job })
    }

    /// Retry a Failed or PartiallyFailed job with its original artifact
    /// and mapping.
    pub async fn retry(
        &self,
        upload_job_id: DbId,
        actor: &ActorContext,
    ) -> PipelineResult<(UploadJob, QueueJob)> {
        let current = UploadJobRepo::find_by_id(&self.pool, upload_job_id)
            .await?
            .ok_or(PipelineError::JobNotFound(upload_job_id))?;

        let artifact_path = current
            .artifact_path
            .clone()
            .ok_or(PipelineError::ArtifactMissing)?;
        if !tokio::fs::try_exists(&artifact_path).await.unwrap_or(false) {
            return Err(PipelineError::ArtifactMissing);
        }

        let mut job = UploadJobRepo::reset_for_retry(&self.pool, upload_job_id)
            .await?
            .ok_or_else(|| {
                PipelineError::Core(CoreError::Validation(
                    "Only failed or partially failed jobs can be retried".to_string(),
                ))
            })?;

        let queue_job = self.enqueue_ingest(&mut job, actor.actor_id).await?;
        tracing::info!(
            upload_job_id = job.id,
            queue_job_id = queue_job.id,
            retry_count = job.retry_count,
            "Upload job queued for retry",
        );
        Ok((job, queue_job))
    }

    /// Queue a standalone re-reconciliation pass over persisted records.
    pub async fn enqueue_reconciliation(
        &self,
        upload_job_id: DbId,
        record_ids: Vec<DbId>,
        actor: &ActorContext,
    ) -> PipelineResult<QueueJob> {
        let payload = ReconcilePayload {
            upload_job_id,
            record_ids,
            actor_id: actor.actor_id,
        };
        let queue_job = QueueJobRepo::enqueue(
            &self.pool,
            QUEUE_RECONCILIATION,
            &serde_json::to_value(&payload).unwrap_or(serde_json::Value::Null),
            &EnqueueOptions::reconciliation(),
        )
        .await?;
        Ok(queue_job)
    }

    /// Job status plus live queue attempt state.
    pub async fn job_status(&self, upload_job_id: DbId) -> PipelineResult<JobStatusView> {
        let job = UploadJobRepo::find_by_id(&self.pool, upload_job_id)
            .await?
            .ok_or(PipelineError::JobNotFound(upload_job_id))?;
        let queue_job = match job.queue_job_id {
            Some(id) => QueueJobRepo::find_by_id(&self.pool, id).await?,
            None => None,
        };
        Ok(JobStatusView { job, queue_job })
    }

    /// List upload jobs with filters and pagination.
    pub async fn list_uploads(
        &self,
        params: &UploadJobListQuery,
    ) -> PipelineResult<UploadJobPage> {
        Ok(UploadJobRepo::list(&self.pool, params).await?)
    }

    async fn enqueue_ingest(&self, job: &mut UploadJob, actor_id: DbId) -> PipelineResult<QueueJob> {
        let payload = IngestPayload {
            upload_job_id: job.id,
            actor_id,
        };
        let queue_job = QueueJobRepo::enqueue(
            &self.pool,
            QUEUE_FILE_PROCESSING,
            &serde_json::to_value(&payload).unwrap_or(serde_json::Value::Null),
            &EnqueueOptions::file_processing(),
        )
        .await?;
        UploadJobRepo::set_queue_job(&self.pool, job.id, queue_job.id).await?;
        job.queue_job_id = Some(queue_job.id);
        Ok(queue_job)
    }
}
