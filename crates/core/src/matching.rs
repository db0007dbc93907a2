//! Match math: classification statuses, mismatch entries, and the pure
//! comparison checks behind the rule evaluator.
//!
//! No database access. The evaluator narrows the candidate population with
//! indexed queries and delegates every comparison decision to this module.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::fields::MatchField;
use crate::rules::PartialMatchConfig;
use crate::types::Timestamp;

// ---------------------------------------------------------------------------
// Classification status
// ---------------------------------------------------------------------------

/// Final classification of one uploaded record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MatchStatus {
    Matched,
    PartiallyMatched,
    NotMatched,
    Duplicate,
    Failed,
}

impl MatchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Matched => "Matched",
            Self::PartiallyMatched => "Partially Matched",
            Self::NotMatched => "Not Matched",
            Self::Duplicate => "Duplicate",
            Self::Failed => "Failed",
        }
    }

    pub fn parse(s: &str) -> Result<Self, CoreError> {
        match s {
            "Matched" => Ok(Self::Matched),
            "Partially Matched" => Ok(Self::PartiallyMatched),
            "Not Matched" => Ok(Self::NotMatched),
            "Duplicate" => Ok(Self::Duplicate),
            "Failed" => Ok(Self::Failed),
            other => Err(CoreError::Validation(format!(
                "Unknown match status '{other}'"
            ))),
        }
    }
}

impl std::fmt::Display for MatchStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stored confidence score when no rule computes a finer one.
pub const DEFAULT_CONFIDENCE: i16 = 100;

// ---------------------------------------------------------------------------
// Record snapshot
// ---------------------------------------------------------------------------

/// Point-in-time copy of a record's core fields, embedded in results so
/// they stay meaningful even after a later manual correction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordSnapshot {
    pub transaction_id: String,
    pub amount: f64,
    pub reference_number: String,
    pub date: Timestamp,
}

// ---------------------------------------------------------------------------
// Mismatch entries
// ---------------------------------------------------------------------------

/// One field-level difference between the system and uploaded records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MismatchedField {
    pub field: String,
    pub system_value: serde_json::Value,
    pub uploaded_value: serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub variance: Option<String>,
}

impl MismatchedField {
    fn amount(system: f64, uploaded: f64, variance_percent: f64) -> Self {
        Self {
            field: MatchField::Amount.as_str().to_string(),
            system_value: serde_json::json!(system),
            uploaded_value: serde_json::json!(uploaded),
            variance: Some(format_variance(variance_percent)),
        }
    }

    fn transaction_id(system: &str, uploaded: &str) -> Self {
        Self {
            field: MatchField::TransactionId.as_str().to_string(),
            system_value: serde_json::json!(system),
            uploaded_value: serde_json::json!(uploaded),
            variance: None,
        }
    }

    fn plain_amount(system: f64, uploaded: f64) -> Self {
        Self {
            field: MatchField::Amount.as_str().to_string(),
            system_value: serde_json::json!(system),
            uploaded_value: serde_json::json!(uploaded),
            variance: None,
        }
    }
}

/// Render a variance percentage the way results store it, e.g. `"1.50%"`.
pub fn format_variance(percent: f64) -> String {
    format!("{percent:.2}%")
}

// ---------------------------------------------------------------------------
// Variance math
// ---------------------------------------------------------------------------

/// Relative amount difference as a percentage of the system amount.
///
/// A system amount of exactly zero has no defined percentage: returns
/// `Some(0.0)` when the uploaded amount is also zero, `None` otherwise.
/// Never divides by zero.
pub fn amount_variance_percent(system: f64, uploaded: f64) -> Option<f64> {
    if system == 0.0 {
        if uploaded == 0.0 {
            Some(0.0)
        } else {
            None
        }
    } else {
        Some((system - uploaded).abs() / system * 100.0)
    }
}

/// Absolute difference between two timestamps, in fractional days.
pub fn day_difference(a: Timestamp, b: Timestamp) -> f64 {
    (a - b).num_milliseconds().abs() as f64 / 86_400_000.0
}

// ---------------------------------------------------------------------------
// Pure match checks
// ---------------------------------------------------------------------------

/// Outcome of comparing one system record against the candidate.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchOutcome {
    pub status: MatchStatus,
    pub mismatches: Vec<MismatchedField>,
}

/// Partial-match comparison: amount within tolerance, optional date
/// tolerance, transaction-id difference recorded as a mismatch.
///
/// Returns `None` when the pair is outside tolerance. With no mismatches
/// at all the pair is a full match.
pub fn partial_match_check(
    system: &RecordSnapshot,
    uploaded: &RecordSnapshot,
    config: &PartialMatchConfig,
) -> Option<MatchOutcome> {
    let mut mismatches = Vec::new();

    let variance = amount_variance_percent(system.amount, uploaded.amount)?;
    if variance > config.amount_variance_percent {
        return None;
    }
    if system.amount != uploaded.amount {
        mismatches.push(MismatchedField::amount(
            system.amount,
            uploaded.amount,
            variance,
        ));
    }

    if config.date_variance_days > 0
        && day_difference(system.date, uploaded.date) > f64::from(config.date_variance_days)
    {
        return None;
    }

    if system.transaction_id != uploaded.transaction_id {
        mismatches.push(MismatchedField::transaction_id(
            &system.transaction_id,
            &uploaded.transaction_id,
        ));
    }

    let status = if mismatches.is_empty() {
        MatchStatus::Matched
    } else {
        MatchStatus::PartiallyMatched
    };

    Some(MatchOutcome { status, mismatches })
}

/// Reference-match comparison: reference numbers already agree (query
/// filter); Matched only when transaction id and amount both agree too.
pub fn reference_match_check(system: &RecordSnapshot, uploaded: &RecordSnapshot) -> MatchOutcome {
    let mut mismatches = Vec::new();

    if system.transaction_id != uploaded.transaction_id {
        mismatches.push(MismatchedField::transaction_id(
            &system.transaction_id,
            &uploaded.transaction_id,
        ));
    }
    if system.amount != uploaded.amount {
        mismatches.push(MismatchedField::plain_amount(system.amount, uploaded.amount));
    }

    let status = if mismatches.is_empty() {
        MatchStatus::Matched
    } else {
        MatchStatus::PartiallyMatched
    };

    MatchOutcome { status, mismatches }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};

    fn snapshot(txn: &str, amount: f64, reference: &str) -> RecordSnapshot {
        RecordSnapshot {
            transaction_id: txn.to_string(),
            amount,
            reference_number: reference.to_string(),
            date: Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap(),
        }
    }

    fn two_percent() -> PartialMatchConfig {
        PartialMatchConfig {
            amount_variance_percent: 2.0,
            date_variance_days: 0,
            required_fields: vec![MatchField::ReferenceNumber],
        }
    }

    // -- variance ------------------------------------------------------------

    #[test]
    fn variance_of_equal_amounts_is_zero() {
        assert_eq!(amount_variance_percent(100.0, 100.0), Some(0.0));
    }

    #[test]
    fn variance_is_relative_to_system_amount() {
        let v = amount_variance_percent(100.0, 101.5).unwrap();
        assert!((v - 1.5).abs() < 1e-9);
    }

    #[test]
    fn zero_system_amount_never_divides() {
        assert_eq!(amount_variance_percent(0.0, 0.0), Some(0.0));
        assert_eq!(amount_variance_percent(0.0, 0.01), None);
    }

    #[test]
    fn variance_formats_with_two_decimals() {
        assert_eq!(format_variance(1.5), "1.50%");
        assert_eq!(format_variance(0.0), "0.00%");
    }

    // -- partial match -------------------------------------------------------

    #[test]
    fn amount_within_tolerance_matches_with_mismatch_entry() {
        let system = snapshot("TXN-1", 100.00, "REF-1");
        let uploaded = snapshot("TXN-1", 101.50, "REF-1");

        let outcome = partial_match_check(&system, &uploaded, &two_percent()).unwrap();
        assert_eq!(outcome.status, MatchStatus::PartiallyMatched);
        assert_eq!(outcome.mismatches.len(), 1);
        assert_eq!(outcome.mismatches[0].field, "amount");
        assert_eq!(outcome.mismatches[0].variance.as_deref(), Some("1.50%"));
    }

    #[test]
    fn amount_outside_tolerance_is_no_match() {
        let system = snapshot("TXN-1", 100.00, "REF-1");
        let uploaded = snapshot("TXN-1", 103.00, "REF-1");
        assert_eq!(partial_match_check(&system, &uploaded, &two_percent()), None);
    }

    #[test]
    fn identical_pair_is_full_match() {
        let system = snapshot("TXN-1", 100.00, "REF-1");
        let uploaded = snapshot("TXN-1", 100.00, "REF-1");

        let outcome = partial_match_check(&system, &uploaded, &two_percent()).unwrap();
        assert_eq!(outcome.status, MatchStatus::Matched);
        assert!(outcome.mismatches.is_empty());
    }

    #[test]
    fn differing_transaction_id_is_partial() {
        let system = snapshot("TXN-1", 100.00, "REF-1");
        let uploaded = snapshot("TXN-2", 100.00, "REF-1");

        let outcome = partial_match_check(&system, &uploaded, &two_percent()).unwrap();
        assert_eq!(outcome.status, MatchStatus::PartiallyMatched);
        assert_eq!(outcome.mismatches.len(), 1);
        assert_eq!(outcome.mismatches[0].field, "transactionId");
        assert_eq!(outcome.mismatches[0].variance, None);
    }

    #[test]
    fn zero_amounts_match_without_error() {
        let system = snapshot("TXN-1", 0.0, "REF-1");
        let uploaded = snapshot("TXN-1", 0.0, "REF-1");

        let outcome = partial_match_check(&system, &uploaded, &two_percent()).unwrap();
        assert_eq!(outcome.status, MatchStatus::Matched);
    }

    #[test]
    fn zero_system_amount_against_nonzero_is_no_match() {
        let system = snapshot("TXN-1", 0.0, "REF-1");
        let uploaded = snapshot("TXN-1", 1.00, "REF-1");
        assert_eq!(partial_match_check(&system, &uploaded, &two_percent()), None);
    }

    #[test]
    fn date_tolerance_rejects_when_exceeded() {
        let system = snapshot("TXN-1", 100.0, "REF-1");
        let mut uploaded = snapshot("TXN-1", 100.0, "REF-1");
        uploaded.date = system.date + Duration::days(3);

        let config = PartialMatchConfig {
            date_variance_days: 1,
            ..two_percent()
        };
        assert_eq!(partial_match_check(&system, &uploaded, &config), None);
    }

    #[test]
    fn date_tolerance_accepts_within_window() {
        let system = snapshot("TXN-1", 100.0, "REF-1");
        let mut uploaded = snapshot("TXN-1", 100.0, "REF-1");
        uploaded.date = system.date + Duration::hours(20);

        let config = PartialMatchConfig {
            date_variance_days: 1,
            ..two_percent()
        };
        let outcome = partial_match_check(&system, &uploaded, &config).unwrap();
        assert_eq!(outcome.status, MatchStatus::Matched);
    }

    #[test]
    fn zero_date_tolerance_skips_the_date_check() {
        let system = snapshot("TXN-1", 100.0, "REF-1");
        let mut uploaded = snapshot("TXN-1", 100.0, "REF-1");
        uploaded.date = system.date + Duration::days(30);

        let outcome = partial_match_check(&system, &uploaded, &two_percent()).unwrap();
        assert_eq!(outcome.status, MatchStatus::Matched);
    }

    // -- reference match -----------------------------------------------------

    #[test]
    fn reference_match_with_agreeing_fields_is_full() {
        let system = snapshot("TXN-1", 100.0, "REF-1");
        let uploaded = snapshot("TXN-1", 100.0, "REF-1");

        let outcome = reference_match_check(&system, &uploaded);
        assert_eq!(outcome.status, MatchStatus::Matched);
        assert!(outcome.mismatches.is_empty());
    }

    #[test]
    fn reference_match_records_both_differences() {
        let system = snapshot("TXN-1", 100.0, "REF-1");
        let uploaded = snapshot("TXN-9", 90.0, "REF-1");

        let outcome = reference_match_check(&system, &uploaded);
        assert_eq!(outcome.status, MatchStatus::PartiallyMatched);
        let fields: Vec<&str> = outcome.mismatches.iter().map(|m| m.field.as_str()).collect();
        assert_eq!(fields, vec!["transactionId", "amount"]);
    }

    // -- status strings ------------------------------------------------------

    #[test]
    fn status_round_trips_through_str() {
        for status in [
            MatchStatus::Matched,
            MatchStatus::PartiallyMatched,
            MatchStatus::NotMatched,
            MatchStatus::Duplicate,
            MatchStatus::Failed,
        ] {
            assert_eq!(MatchStatus::parse(status.as_str()).unwrap(), status);
        }
    }

    #[test]
    fn partially_matched_uses_spaced_form() {
        assert_eq!(MatchStatus::PartiallyMatched.as_str(), "Partially Matched");
    }
}
