//! Duplicate detector.
//!
//! Checks run in a fixed order and short-circuit on the first hit:
//! within-batch (seen-set, no query), then across jobs, then repeats
//! inside the same job. The ordering matters — a transaction id repeated
//! in the batch is reported as a within-batch duplicate even when an
//! unrelated job also persisted that id.

use sqlx::PgConnection;
use tally_core::duplicate::{
    SeenTransactions, REASON_ACROSS_JOBS, REASON_WITHIN_BATCH, REASON_WITHIN_JOB,
};
use tally_core::types::DbId;
use tally_db::models::record::Record;
use tally_db::repositories::RecordRepo;

use crate::error::PipelineResult;

/// Verdict for one candidate record.
#[derive(Debug)]
pub enum DuplicateVerdict {
    NotDuplicate,
    /// Transaction id already observed earlier in this run.
    WithinBatch,
    /// A different upload job already persisted this transaction id.
    AcrossJobs(Record),
    /// The same job holds more than one record with this transaction id.
    WithinJob(Record),
}

impl DuplicateVerdict {
    /// The stored duplicate reason, `None` for non-duplicates.
    pub fn reason(&self) -> Option<&'static str> {
        match self {
            Self::NotDuplicate => None,
            Self::WithinBatch => Some(REASON_WITHIN_BATCH),
            Self::AcrossJobs(_) => Some(REASON_ACROSS_JOBS),
            Self::WithinJob(_) => Some(REASON_WITHIN_JOB),
        }
    }
}

/// Stateless detector; the per-run seen-set is owned by the caller.
pub struct DuplicateDetector;

impl DuplicateDetector {
    /// Classify one candidate. Grows the seen-set as a side effect, so
    /// candidates must be presented in input order.
    pub async fn classify(
        conn: &mut PgConnection,
        candidate: &Record,
        upload_job_id: DbId,
        seen: &mut SeenTransactions,
    ) -> PipelineResult<DuplicateVerdict> {
        if seen.check_and_insert(&candidate.transaction_id) {
            return Ok(DuplicateVerdict::WithinBatch);
        }

        if let Some(existing) =
            RecordRepo::find_in_other_jobs(&mut *conn, &candidate.transaction_id, upload_job_id)
                .await?
        {
            return Ok(DuplicateVerdict::AcrossJobs(existing));
        }

        let same_job =
            RecordRepo::find_same_transaction_in_job(&mut *conn, upload_job_id, &candidate.transaction_id)
                .await?;
        if same_job.len() > 1 {
            if let Some(first) = same_job.into_iter().next() {
                return Ok(DuplicateVerdict::WithinJob(first));
            }
        }

        Ok(DuplicateVerdict::NotDuplicate)
    }
}
