//! Record field vocabulary and the typed additional-data bag.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::types::Timestamp;

// ---------------------------------------------------------------------------
// Match fields
// ---------------------------------------------------------------------------

/// The four core record fields a matching rule may reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MatchField {
    TransactionId,
    Amount,
    ReferenceNumber,
    Date,
}

/// All matchable fields, in canonical order.
pub const ALL_MATCH_FIELDS: &[MatchField] = &[
    MatchField::TransactionId,
    MatchField::Amount,
    MatchField::ReferenceNumber,
    MatchField::Date,
];

impl MatchField {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TransactionId => "transactionId",
            Self::Amount => "amount",
            Self::ReferenceNumber => "referenceNumber",
            Self::Date => "date",
        }
    }

    pub fn parse(s: &str) -> Result<Self, CoreError> {
        match s {
            "transactionId" => Ok(Self::TransactionId),
            "amount" => Ok(Self::Amount),
            "referenceNumber" => Ok(Self::ReferenceNumber),
            "date" => Ok(Self::Date),
            other => Err(CoreError::Validation(format!(
                "Unknown match field '{other}'. Must be one of: transactionId, amount, referenceNumber, date"
            ))),
        }
    }

    /// Parse a list of stored field names, rejecting the whole list on the
    /// first unknown entry.
    pub fn parse_all(names: &[String]) -> Result<Vec<Self>, CoreError> {
        names.iter().map(|n| Self::parse(n)).collect()
    }
}

impl std::fmt::Display for MatchField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Scalar value bag
// ---------------------------------------------------------------------------

/// A single unmapped-column value carried along with a record.
///
/// Deliberately a closed set of scalar variants rather than raw JSON, so
/// the additional-data bag stays type safe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Bool(bool),
    Number(f64),
    Date(Timestamp),
    Text(String),
}

/// Unmapped source columns preserved on a record, keyed by column name.
///
/// A `BTreeMap` keeps serialized snapshots deterministic.
pub type AdditionalData = BTreeMap<String, FieldValue>;

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_round_trips_through_str() {
        for field in ALL_MATCH_FIELDS {
            assert_eq!(MatchField::parse(field.as_str()).unwrap(), *field);
        }
    }

    #[test]
    fn unknown_field_is_rejected() {
        assert!(MatchField::parse("memo").is_err());
        assert!(MatchField::parse("").is_err());
    }

    #[test]
    fn parse_all_fails_on_any_unknown_entry() {
        let names = vec!["transactionId".to_string(), "memo".to_string()];
        assert!(MatchField::parse_all(&names).is_err());
    }

    #[test]
    fn field_value_serializes_as_bare_scalar() {
        let v = serde_json::to_value(FieldValue::Number(12.5)).unwrap();
        assert_eq!(v, serde_json::json!(12.5));

        let v = serde_json::to_value(FieldValue::Text("branch-7".into())).unwrap();
        assert_eq!(v, serde_json::json!("branch-7"));
    }

    #[test]
    fn additional_data_round_trips() {
        let mut bag = AdditionalData::new();
        bag.insert("branch".into(), FieldValue::Text("north".into()));
        bag.insert("fee".into(), FieldValue::Number(0.35));
        bag.insert("settled".into(), FieldValue::Bool(true));

        let json = serde_json::to_string(&bag).unwrap();
        let back: AdditionalData = serde_json::from_str(&json).unwrap();
        assert_eq!(back, bag);
    }
}
