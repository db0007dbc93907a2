//! Repository for the `queue_jobs` durable work queue.
//!
//! Claiming uses `SELECT FOR UPDATE SKIP LOCKED` so concurrent workers
//! never double-claim an entry. Failed attempts are rescheduled through
//! `run_at` until `max_attempts` is exhausted.

use sqlx::{PgExecutor, PgPool};
use tally_core::types::DbId;

use crate::models::queue_job::{Backoff, EnqueueOptions, QueueJob};
use crate::models::status::QueueJobStatus;

/// Column list for `queue_jobs` queries.
const COLUMNS: &str = "\
    id, queue, payload, status_id, attempts_made, max_attempts, \
    backoff_strategy, backoff_delay_ms, run_at, progress_percent, \
    result, error_message, created_at, claimed_at, completed_at";

/// Provides enqueue/claim/settle operations for queue jobs.
pub struct QueueJobRepo;

impl QueueJobRepo {
    /// Enqueue a payload on the named queue.
    pub async fn enqueue(
        pool: &PgPool,
        queue: &str,
        payload: &serde_json::Value,
        options: &EnqueueOptions,
    ) -> Result<QueueJob, sqlx::Error> {
        let query = format!(
            "INSERT INTO queue_jobs \
                 (queue, payload, status_id, max_attempts, backoff_strategy, backoff_delay_ms) \
             VALUES ($1, $2, $3, $4, $5, $6) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, QueueJob>(&query)
            .bind(queue)
            .bind(payload)
            .bind(QueueJobStatus::Pending.id())
            .bind(options.max_attempts)
            .bind(options.backoff.strategy())
            .bind(options.backoff.base_delay_ms())
            .fetch_one(pool)
            .await
    }

    /// Atomically claim the next due entry on a queue.
    ///
    /// Increments `attempts_made` as part of the claim, so a claimed job's
    /// counter already reflects the running attempt.
    pub async fn claim_next(pool: &PgPool, queue: &str) -> Result<Option<QueueJob>, sqlx::Error> {
        let query = format!(
            "UPDATE queue_jobs \
             SET status_id = $2, claimed_at = NOW(), attempts_made = attempts_made + 1 \
             WHERE id = ( \
                 SELECT id FROM queue_jobs \
                 WHERE queue = $1 AND status_id IN ($3, $4) AND run_at <= NOW() \
                 ORDER BY run_at ASC, id ASC \
                 LIMIT 1 \
                 FOR UPDATE SKIP LOCKED \
             ) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, QueueJob>(&query)
            .bind(queue)
            .bind(QueueJobStatus::Running.id())
            .bind(QueueJobStatus::Pending.id())
            .bind(QueueJobStatus::Retrying.id())
            .fetch_optional(pool)
            .await
    }

    /// Report attempt progress from inside a running job.
    pub async fn update_progress<'e>(
        exec: impl PgExecutor<'e>,
        id: DbId,
        percent: i16,
    ) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE queue_jobs SET progress_percent = $2 WHERE id = $1")
            .bind(id)
            .bind(percent)
            .execute(exec)
            .await?;
        Ok(())
    }

    /// Mark an entry completed with its result payload.
    pub async fn complete(
        pool: &PgPool,
        id: DbId,
        result: &serde_json::Value,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE queue_jobs \
             SET status_id = $2, result = $3, progress_percent = 100, completed_at = NOW() \
             WHERE id = $1",
        )
        .bind(id)
        .bind(QueueJobStatus::Completed.id())
        .bind(result)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Record a failed attempt.
    ///
    /// Schedules a retry with the entry's backoff policy while attempts
    /// remain; otherwise the entry goes terminal-Failed. Returns the
    /// updated entry.
    pub async fn fail(pool: &PgPool, id: DbId, error: &str) -> Result<QueueJob, sqlx::Error> {
        let job = Self::find_by_id(pool, id)
            .await?
            .ok_or(sqlx::Error::RowNotFound)?;

        if job.attempts_made < job.max_attempts {
            let delay_ms = Backoff::delay_for_attempt(
                &job.backoff_strategy,
                job.backoff_delay_ms,
                job.attempts_made,
            );
            let query = format!(
                "UPDATE queue_jobs \
                 SET status_id = $2, error_message = $3, \
                     run_at = NOW() + ($4 * INTERVAL '1 millisecond') \
                 WHERE id = $1 \
                 RETURNING {COLUMNS}"
            );
            sqlx::query_as::<_, QueueJob>(&query)
                .bind(id)
                .bind(QueueJobStatus::Retrying.id())
                .bind(error)
                .bind(delay_ms)
                .fetch_one(pool)
                .await
        } else {
            let query = format!(
                "UPDATE queue_jobs \
                 SET status_id = $2, error_message = $3, completed_at = NOW() \
                 WHERE id = $1 \
                 RETURNING {COLUMNS}"
            );
            sqlx::query_as::<_, QueueJob>(&query)
                .bind(id)
                .bind(QueueJobStatus::Failed.id())
                .bind(error)
                .fetch_one(pool)
                .await
        }
    }

    /// Find an entry by its ID.
    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<QueueJob>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM queue_jobs WHERE id = $1");
        sqlx::query_as::<_, QueueJob>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Prune settled history beyond the retention caps for one queue.
    pub async fn prune_history(
        pool: &PgPool,
        queue: &str,
        keep_completed: i64,
        keep_failed: i64,
    ) -> Result<u64, sqlx::Error> {
        let mut pruned = 0u64;

        for (status, keep) in [
            (QueueJobStatus::Completed, keep_completed),
            (QueueJobStatus::Failed, keep_failed),
        ] {
            let result = sqlx::query(
                "DELETE FROM queue_jobs \
                 WHERE queue = $1 AND status_id = $2 AND id NOT IN ( \
                     SELECT id FROM queue_jobs \
                     WHERE queue = $1 AND status_id = $2 \
                     ORDER BY completed_at DESC NULLS LAST, id DESC \
                     LIMIT $3 \
                 )",
            )
            .bind(queue)
            .bind(status.id())
            .bind(keep)
            .execute(pool)
            .await?;
            pruned += result.rows_affected();
        }

        if pruned > 0 {
            tracing::debug!(queue, pruned, "Pruned settled queue history");
        }
        Ok(pruned)
    }
}
