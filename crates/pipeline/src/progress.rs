//! Per-attempt progress reporting back to the queue transport.

use async_trait::async_trait;
use sqlx::PgPool;
use tally_core::types::DbId;
use tally_db::repositories::QueueJobRepo;

/// Sink for attempt-level progress percentages.
///
/// Reporting is advisory: implementations must not fail the job over a
/// lost progress update.
#[async_trait]
pub trait ProgressReporter: Send + Sync {
    async fn report(&self, percent: i16);
}

/// Discards progress. Used by tests and direct (non-queued) invocations.
pub struct NoopProgress;

#[async_trait]
impl ProgressReporter for NoopProgress {
    async fn report(&self, _percent: i16) {}
}

/// Writes progress onto the executing queue entry.
pub struct QueueProgress {
    pool: PgPool,
    queue_job_id: DbId,
}

impl QueueProgress {
    pub fn new(pool: PgPool, queue_job_id: DbId) -> Self {
        Self { pool, queue_job_id }
    }
}

#[async_trait]
impl ProgressReporter for QueueProgress {
    async fn report(&self, percent: i16) {
        if let Err(e) = QueueJobRepo::update_progress(&self.pool, self.queue_job_id, percent).await
        {
            tracing::warn!(
                queue_job_id = self.queue_job_id,
                percent,
                error = %e,
                "Failed to report queue progress",
            );
        }
    }
}
