//! Durable queue entry models and DTOs.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use tally_core::types::{DbId, Timestamp};

use super::status::StatusId;

/// Queue name for file-ingestion jobs.
pub const QUEUE_FILE_PROCESSING: &str = "file-processing";
/// Queue name for re-reconciliation jobs.
pub const QUEUE_RECONCILIATION: &str = "reconciliation";

/// A row from the `queue_jobs` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct QueueJob {
    pub id: DbId,
    pub queue: String,
    pub payload: serde_json::Value,
    pub status_id: StatusId,
    pub attempts_made: i32,
    pub max_attempts: i32,
    pub backoff_strategy: String,
    pub backoff_delay_ms: i64,
    pub run_at: Timestamp,
    pub progress_percent: i16,
    pub result: Option<serde_json::Value>,
    pub error_message: Option<String>,
    pub created_at: Timestamp,
    pub claimed_at: Option<Timestamp>,
    pub completed_at: Option<Timestamp>,
}

/// Retry backoff policy for a queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Backoff {
    /// Same delay before every retry.
    Fixed { delay_ms: i64 },
    /// Delay doubles with each attempt: `delay * 2^(attempt-1)`.
    Exponential { delay_ms: i64 },
}

impl Backoff {
    pub fn strategy(&self) -> &'static str {
        match self {
            Self::Fixed { .. } => "fixed",
            Self::Exponential { .. } => "exponential",
        }
    }

    pub fn base_delay_ms(&self) -> i64 {
        match self {
            Self::Fixed { delay_ms } | Self::Exponential { delay_ms } => *delay_ms,
        }
    }

    /// Delay before the next attempt, given how many attempts have already
    /// been made (1-based).
    pub fn delay_for_attempt(strategy: &str, base_delay_ms: i64, attempts_made: i32) -> i64 {
        match strategy {
            "exponential" => {
                let shift = attempts_made.saturating_sub(1).clamp(0, 30) as u32;
                base_delay_ms.saturating_mul(1_i64 << shift)
            }
            _ => base_delay_ms,
        }
    }
}

/// Options applied when enqueueing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnqueueOptions {
    pub max_attempts: i32,
    pub backoff: Backoff,
    /// Completed entries retained per queue before pruning.
    pub keep_completed: i64,
    /// Failed entries retained per queue before pruning.
    pub keep_failed: i64,
}

impl EnqueueOptions {
    /// Ingestion jobs: 3 attempts, exponential backoff from 5 s.
    pub fn file_processing() -> Self {
        Self {
            max_attempts: 3,
            backoff: Backoff::Exponential { delay_ms: 5_000 },
            keep_completed: 100,
            keep_failed: 200,
        }
    }

    /// Pure-reconciliation jobs: 2 attempts, fixed 3 s backoff.
    pub fn reconciliation() -> Self {
        Self {
            max_attempts: 2,
            backoff: Backoff::Fixed { delay_ms: 3_000 },
            keep_completed: 50,
            keep_failed: 100,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_backoff_is_constant() {
        assert_eq!(Backoff::delay_for_attempt("fixed", 3_000, 1), 3_000);
        assert_eq!(Backoff::delay_for_attempt("fixed", 3_000, 5), 3_000);
    }

    #[test]
    fn exponential_backoff_doubles_per_attempt() {
        assert_eq!(Backoff::delay_for_attempt("exponential", 5_000, 1), 5_000);
        assert_eq!(Backoff::delay_for_attempt("exponential", 5_000, 2), 10_000);
        assert_eq!(Backoff::delay_for_attempt("exponential", 5_000, 3), 20_000);
    }

    #[test]
    fn exponential_backoff_never_overflows() {
        let delay = Backoff::delay_for_attempt("exponential", i64::MAX / 2, 40);
        assert!(delay > 0);
    }

    #[test]
    fn default_queue_options() {
        let ingest = EnqueueOptions::file_processing();
        assert_eq!(ingest.max_attempts, 3);
        assert_eq!(ingest.backoff.strategy(), "exponential");

        let recon = EnqueueOptions::reconciliation();
        assert_eq!(recon.max_attempts, 2);
        assert_eq!(recon.backoff.strategy(), "fixed");
    }
}
