//! Row validation for the ingestion pipeline.
//!
//! Turns decoded tabular rows (column name → raw string value) into typed
//! records, tracking per-row failures without aborting the batch.

use std::collections::BTreeMap;

use chrono::{NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::fields::{AdditionalData, FieldValue};
use crate::types::Timestamp;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Rows are validated and inserted in fixed-size batches of this many rows.
pub const INSERT_BATCH_SIZE: usize = 1_000;

/// Accepted calendar formats for the mapped date column, tried in order
/// after RFC 3339.
const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y-%m-%d %H:%M:%S", "%m/%d/%Y"];

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// A decoded source row: column name → raw cell value.
pub type RawRow = BTreeMap<String, String>;

/// Which source column feeds each required logical field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnMapping {
    pub transaction_id: String,
    pub amount: String,
    pub reference_number: String,
    pub date: String,
}

impl ColumnMapping {
    /// `true` if `column` is one of the four mapped source columns.
    pub fn is_mapped_column(&self, column: &str) -> bool {
        column == self.transaction_id
            || column == self.amount
            || column == self.reference_number
            || column == self.date
    }
}

/// A validated row, ready for persistence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedRow {
    pub transaction_id: String,
    pub amount: f64,
    pub reference_number: String,
    pub date: Timestamp,
    pub additional_data: AdditionalData,
}

/// A row that failed validation. Recorded in the job's failure tally and
/// excluded from persistence; never fatal to the batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RowFailure {
    /// 1-based row index within the source file.
    pub row_index: usize,
    pub error: String,
}

// ---------------------------------------------------------------------------
// Row parsing
// ---------------------------------------------------------------------------

/// Validate one decoded row against the column mapping.
///
/// `row_index` is 1-based and only used in error messages. Unmapped
/// columns are preserved verbatim in the additional-data bag.
pub fn parse_row(
    mapping: &ColumnMapping,
    row: &RawRow,
    row_index: usize,
) -> Result<ParsedRow, CoreError> {
    let transaction_id = required_cell(row, &mapping.transaction_id, row_index)?;
    let amount_raw = required_cell(row, &mapping.amount, row_index)?;
    let reference_number = required_cell(row, &mapping.reference_number, row_index)?;
    let date_raw = required_cell(row, &mapping.date, row_index)?;

    let amount = amount_raw.parse::<f64>().map_err(|_| {
        CoreError::Validation(format!("Invalid amount in row {row_index}: {amount_raw}"))
    })?;
    if !amount.is_finite() || amount < 0.0 {
        return Err(CoreError::Validation(format!(
            "Amount must be a non-negative number in row {row_index}: {amount_raw}"
        )));
    }

    let date = parse_date(&date_raw).ok_or_else(|| {
        CoreError::Validation(format!("Invalid date in row {row_index}: {date_raw}"))
    })?;

    let additional_data: AdditionalData = row
        .iter()
        .filter(|(column, _)| !mapping.is_mapped_column(column))
        .map(|(column, value)| (column.clone(), FieldValue::Text(value.clone())))
        .collect();

    Ok(ParsedRow {
        transaction_id,
        amount,
        reference_number,
        date,
        additional_data,
    })
}

/// Parse a date cell: RFC 3339 first, then the formats in [`DATE_FORMATS`].
/// Bare dates are taken as midnight UTC.
pub fn parse_date(raw: &str) -> Option<Timestamp> {
    let raw = raw.trim();

    if let Ok(ts) = chrono::DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }

    for format in DATE_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(Utc.from_utc_datetime(&dt));
        }
        if let Ok(d) = NaiveDate::parse_from_str(raw, format) {
            return Some(Utc.from_utc_datetime(&d.and_hms_opt(0, 0, 0)?));
        }
    }

    None
}

/// Fetch a mapped cell, treating a missing column or empty value as a
/// validation failure.
fn required_cell(row: &RawRow, column: &str, row_index: usize) -> Result<String, CoreError> {
    match row.get(column) {
        Some(value) if !value.trim().is_empty() => Ok(value.trim().to_string()),
        _ => Err(CoreError::Validation(format!(
            "Missing required fields in row {row_index}"
        ))),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn mapping() -> ColumnMapping {
        ColumnMapping {
            transaction_id: "Txn ID".to_string(),
            amount: "Amount".to_string(),
            reference_number: "Reference".to_string(),
            date: "Value Date".to_string(),
        }
    }

    fn row(txn: &str, amount: &str, reference: &str, date: &str) -> RawRow {
        let mut row = RawRow::new();
        row.insert("Txn ID".to_string(), txn.to_string());
        row.insert("Amount".to_string(), amount.to_string());
        row.insert("Reference".to_string(), reference.to_string());
        row.insert("Value Date".to_string(), date.to_string());
        row
    }

    #[test]
    fn valid_row_parses() {
        let parsed = parse_row(&mapping(), &row("TXN-1", "100.50", "REF-1", "2024-03-01"), 1)
            .unwrap();
        assert_eq!(parsed.transaction_id, "TXN-1");
        assert_eq!(parsed.amount, 100.50);
        assert_eq!(parsed.reference_number, "REF-1");
        assert!(parsed.additional_data.is_empty());
    }

    #[test]
    fn unmapped_columns_land_in_additional_data() {
        let mut raw = row("TXN-1", "10", "REF-1", "2024-03-01");
        raw.insert("Branch".to_string(), "north".to_string());
        raw.insert("Memo".to_string(), "quarterly".to_string());

        let parsed = parse_row(&mapping(), &raw, 1).unwrap();
        assert_eq!(parsed.additional_data.len(), 2);
        assert_eq!(
            parsed.additional_data.get("Branch"),
            Some(&FieldValue::Text("north".to_string()))
        );
    }

    #[test]
    fn missing_required_field_fails_with_row_index() {
        let mut raw = row("TXN-1", "10", "REF-1", "2024-03-01");
        raw.remove("Reference");

        let err = parse_row(&mapping(), &raw, 500).unwrap_err();
        assert!(err.to_string().contains("row 500"), "{err}");
    }

    #[test]
    fn empty_cell_counts_as_missing() {
        let raw = row("TXN-1", "10", "   ", "2024-03-01");
        assert!(parse_row(&mapping(), &raw, 2).is_err());
    }

    #[test]
    fn non_numeric_amount_fails() {
        let raw = row("TXN-1", "ten dollars", "REF-1", "2024-03-01");
        let err = parse_row(&mapping(), &raw, 3).unwrap_err();
        assert!(err.to_string().contains("Invalid amount"), "{err}");
    }

    #[test]
    fn negative_amount_fails() {
        let raw = row("TXN-1", "-4.20", "REF-1", "2024-03-01");
        assert!(parse_row(&mapping(), &raw, 4).is_err());
    }

    #[test]
    fn zero_amount_is_accepted() {
        let parsed = parse_row(&mapping(), &row("TXN-1", "0", "REF-1", "2024-03-01"), 1).unwrap();
        assert_eq!(parsed.amount, 0.0);
    }

    #[test]
    fn bad_date_fails() {
        let raw = row("TXN-1", "10", "REF-1", "soon");
        let err = parse_row(&mapping(), &raw, 9).unwrap_err();
        assert!(err.to_string().contains("Invalid date"), "{err}");
    }

    #[test]
    fn date_formats_accepted() {
        assert!(parse_date("2024-03-01").is_some());
        assert!(parse_date("2024-03-01 13:45:00").is_some());
        assert!(parse_date("03/01/2024").is_some());
        assert!(parse_date("2024-03-01T13:45:00Z").is_some());
        assert!(parse_date("").is_none());
    }
}
