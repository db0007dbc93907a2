//! Per-job reconciliation statistics and the final-status decision.

use serde::{Deserialize, Serialize};

use crate::matching::MatchStatus;

// ---------------------------------------------------------------------------
// Result tally
// ---------------------------------------------------------------------------

/// Counts of reconciliation results by classification.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconStats {
    pub matched: u64,
    pub partially_matched: u64,
    pub unmatched: u64,
    pub duplicate: u64,
    pub failed: u64,
}

impl ReconStats {
    pub fn total(&self) -> u64 {
        self.matched + self.partially_matched + self.unmatched + self.duplicate + self.failed
    }

    /// Share of records that matched fully or partially, as a percentage.
    /// Zero when there are no results.
    pub fn accuracy_percent(&self) -> f64 {
        let total = self.total();
        if total == 0 {
            return 0.0;
        }
        (self.matched + self.partially_matched) as f64 / total as f64 * 100.0
    }
}

/// Tally classifications into per-status counters.
pub fn tally<I>(statuses: I) -> ReconStats
where
    I: IntoIterator<Item = MatchStatus>,
{
    let mut stats = ReconStats::default();
    for status in statuses {
        match status {
            MatchStatus::Matched => stats.matched += 1,
            MatchStatus::PartiallyMatched => stats.partially_matched += 1,
            MatchStatus::NotMatched => stats.unmatched += 1,
            MatchStatus::Duplicate => stats.duplicate += 1,
            MatchStatus::Failed => stats.failed += 1,
        }
    }
    stats
}

// ---------------------------------------------------------------------------
// Final job outcome
// ---------------------------------------------------------------------------

/// Terminal state of an ingestion run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOutcome {
    Completed,
    PartiallyFailed,
    Failed,
}

/// Decide the job's terminal status.
///
/// Completed only with zero row failures and zero reconciliation errors;
/// PartiallyFailed when anything was persisted despite failures; Failed
/// when nothing was persisted at all.
pub fn final_outcome(persisted: u64, row_failures: u64, recon_errors: u64) -> JobOutcome {
    if row_failures == 0 && recon_errors == 0 {
        JobOutcome::Completed
    } else if persisted > 0 {
        JobOutcome::PartiallyFailed
    } else {
        JobOutcome::Failed
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tally_counts_each_status() {
        let stats = tally([
            MatchStatus::Matched,
            MatchStatus::Matched,
            MatchStatus::PartiallyMatched,
            MatchStatus::NotMatched,
            MatchStatus::Duplicate,
            MatchStatus::Failed,
        ]);
        assert_eq!(
            stats,
            ReconStats {
                matched: 2,
                partially_matched: 1,
                unmatched: 1,
                duplicate: 1,
                failed: 1,
            }
        );
        assert_eq!(stats.total(), 6);
    }

    #[test]
    fn accuracy_counts_full_and_partial_matches() {
        let stats = tally([
            MatchStatus::Matched,
            MatchStatus::PartiallyMatched,
            MatchStatus::NotMatched,
            MatchStatus::NotMatched,
        ]);
        assert!((stats.accuracy_percent() - 50.0).abs() < 1e-9);
    }

    #[test]
    fn accuracy_of_empty_tally_is_zero() {
        assert_eq!(ReconStats::default().accuracy_percent(), 0.0);
    }

    #[test]
    fn clean_run_completes() {
        assert_eq!(final_outcome(10_000, 0, 0), JobOutcome::Completed);
    }

    #[test]
    fn malformed_rows_partially_fail_the_job() {
        // 10,000-row file with rows 500 and 9,999 malformed.
        assert_eq!(final_outcome(9_998, 2, 0), JobOutcome::PartiallyFailed);
    }

    #[test]
    fn reconciliation_errors_partially_fail_the_job() {
        assert_eq!(final_outcome(100, 0, 3), JobOutcome::PartiallyFailed);
    }

    #[test]
    fn nothing_persisted_fails_the_job() {
        assert_eq!(final_outcome(0, 50, 0), JobOutcome::Failed);
    }

    #[test]
    fn empty_clean_run_still_completes() {
        assert_eq!(final_outcome(0, 0, 0), JobOutcome::Completed);
    }
}
