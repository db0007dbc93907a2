//! Progress schedule for an ingestion job.
//!
//! Fixed checkpoints: 0-60% proportional to rows ingested, 65% once the
//! upload audit entry is written, 70-90% during reconciliation, 100% on
//! finalization. Reported percentages never move backwards within one
//! processing attempt.

/// Progress after the source file has been decoded.
pub const DECODED: i16 = 10;
/// Progress once the upload audit entry has been written.
pub const AUDIT_LOGGED: i16 = 65;
/// Progress when reconciliation begins.
pub const RECONCILING: i16 = 70;
/// Progress when reconciliation has finished.
pub const RECONCILED: i16 = 90;
/// Progress on job finalization.
pub const FINALIZED: i16 = 100;

/// Upper bound of the row-ingestion band.
const INGEST_BAND: i16 = 60;

/// Progress within the 0-60% row-ingestion band.
///
/// A zero-row file reports the full band immediately.
pub fn ingest_progress(processed: u64, total: u64) -> i16 {
    if total == 0 {
        return INGEST_BAND;
    }
    let scaled = (processed.min(total) as f64 / total as f64) * f64::from(INGEST_BAND);
    scaled.floor() as i16
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ingest_band_is_proportional() {
        assert_eq!(ingest_progress(0, 10_000), 0);
        assert_eq!(ingest_progress(5_000, 10_000), 30);
        assert_eq!(ingest_progress(10_000, 10_000), 60);
    }

    #[test]
    fn processed_is_clamped_to_total() {
        assert_eq!(ingest_progress(15_000, 10_000), 60);
    }

    #[test]
    fn zero_rows_reports_full_band() {
        assert_eq!(ingest_progress(0, 0), 60);
    }

    #[test]
    fn checkpoints_are_ordered() {
        assert!(DECODED < AUDIT_LOGGED);
        assert!(AUDIT_LOGGED < RECONCILING);
        assert!(RECONCILING < RECONCILED);
        assert!(RECONCILED < FINALIZED);
    }
}
