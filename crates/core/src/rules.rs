//! Matching-rule model.
//!
//! Rules are persisted as flat rows; for evaluation they are lifted into
//! [`RuleKind`], a tagged union where each variant carries only its own
//! configuration and the evaluator dispatches by exhaustive match.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::fields::MatchField;
use crate::types::DbId;

// ---------------------------------------------------------------------------
// Rule type constants (stored values)
// ---------------------------------------------------------------------------

pub const RULE_TYPE_EXACT: &str = "EXACT_MATCH";
pub const RULE_TYPE_PARTIAL: &str = "PARTIAL_MATCH";
pub const RULE_TYPE_REFERENCE: &str = "REFERENCE_MATCH";
pub const VALID_RULE_TYPES: &[&str] = &[RULE_TYPE_EXACT, RULE_TYPE_PARTIAL, RULE_TYPE_REFERENCE];

// ---------------------------------------------------------------------------
// Sentinel rule names on reconciliation results
// ---------------------------------------------------------------------------

/// No enabled rule matched the candidate.
pub const SENTINEL_NO_MATCHING_RULE: &str = "No matching rule";
/// The candidate was classified by the duplicate detector, not a rule.
pub const SENTINEL_DUPLICATE_DETECTION: &str = "Duplicate Detection";
/// Classification failed with a per-record error.
pub const SENTINEL_PROCESSING_ERROR: &str = "Error during processing";

// ---------------------------------------------------------------------------
// Rule kinds
// ---------------------------------------------------------------------------

/// Tolerances and required-equal fields for a partial match rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartialMatchConfig {
    /// Maximum relative amount difference, in percent of the system amount.
    pub amount_variance_percent: f64,
    /// Maximum absolute day difference; 0 disables the date check.
    pub date_variance_days: i32,
    /// Fields that must be exactly equal before tolerances are applied.
    pub required_fields: Vec<MatchField>,
}

impl Default for PartialMatchConfig {
    fn default() -> Self {
        Self {
            amount_variance_percent: 2.0,
            date_variance_days: 0,
            required_fields: vec![MatchField::ReferenceNumber],
        }
    }
}

/// A matching rule's type-specific configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RuleKind {
    /// All listed fields must be identical. An empty list falls back to
    /// [`default_exact_fields`].
    Exact { fields: Vec<MatchField> },
    /// Required fields equal, amount within a percent tolerance, date
    /// within a day tolerance.
    Partial(PartialMatchConfig),
    /// Equal reference numbers only.
    Reference,
}

/// Default equality fields for an exact rule with no configured list.
pub fn default_exact_fields() -> Vec<MatchField> {
    vec![MatchField::TransactionId, MatchField::Amount]
}

impl RuleKind {
    /// The stored rule-type discriminator.
    pub fn rule_type(&self) -> &'static str {
        match self {
            Self::Exact { .. } => RULE_TYPE_EXACT,
            Self::Partial(_) => RULE_TYPE_PARTIAL,
            Self::Reference => RULE_TYPE_REFERENCE,
        }
    }

    /// Reassemble a rule kind from its flattened stored parts.
    pub fn from_parts(
        rule_type: &str,
        exact_match_fields: Option<&[String]>,
        amount_variance_percent: Option<f64>,
        date_variance_days: Option<i32>,
        required_fields: Option<&[String]>,
    ) -> Result<Self, CoreError> {
        match rule_type {
            RULE_TYPE_EXACT => {
                let fields = match exact_match_fields {
                    Some(names) => MatchField::parse_all(names)?,
                    None => Vec::new(),
                };
                Ok(Self::Exact { fields })
            }
            RULE_TYPE_PARTIAL => {
                let defaults = PartialMatchConfig::default();
                let required_fields = match required_fields {
                    Some(names) if !names.is_empty() => MatchField::parse_all(names)?,
                    _ => defaults.required_fields.clone(),
                };
                let config = PartialMatchConfig {
                    amount_variance_percent: amount_variance_percent
                        .unwrap_or(defaults.amount_variance_percent),
                    date_variance_days: date_variance_days.unwrap_or(defaults.date_variance_days),
                    required_fields,
                };
                if config.amount_variance_percent < 0.0 {
                    return Err(CoreError::Validation(
                        "amountVariancePercent must be non-negative".to_string(),
                    ));
                }
                if config.date_variance_days < 0 {
                    return Err(CoreError::Validation(
                        "dateVarianceDays must be non-negative".to_string(),
                    ));
                }
                Ok(Self::Partial(config))
            }
            RULE_TYPE_REFERENCE => Ok(Self::Reference),
            other => Err(CoreError::Validation(format!(
                "Unknown rule type '{other}'. Must be one of: {}",
                VALID_RULE_TYPES.join(", ")
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// Evaluation view of a persisted rule
// ---------------------------------------------------------------------------

/// The evaluator's view of one enabled rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleSpec {
    pub id: DbId,
    pub name: String,
    pub priority: i32,
    pub kind: RuleKind,
}

/// Sort rules for evaluation: priority descending, ties broken by id
/// descending (ids are monotonic, so this is most-recently-created first
/// and fully deterministic).
pub fn sort_for_evaluation(rules: &mut [RuleSpec]) {
    rules.sort_by(|a, b| b.priority.cmp(&a.priority).then(b.id.cmp(&a.id)));
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn spec(id: DbId, priority: i32) -> RuleSpec {
        RuleSpec {
            id,
            name: format!("rule-{id}"),
            priority,
            kind: RuleKind::Reference,
        }
    }

    #[test]
    fn exact_kind_from_parts() {
        let kind = RuleKind::from_parts(
            RULE_TYPE_EXACT,
            Some(&["transactionId".to_string(), "amount".to_string()]),
            None,
            None,
            None,
        )
        .unwrap();
        assert_eq!(
            kind,
            RuleKind::Exact {
                fields: vec![MatchField::TransactionId, MatchField::Amount]
            }
        );
    }

    #[test]
    fn exact_kind_with_unknown_field_fails() {
        let result = RuleKind::from_parts(
            RULE_TYPE_EXACT,
            Some(&["memo".to_string()]),
            None,
            None,
            None,
        );
        assert!(result.is_err());
    }

    #[test]
    fn partial_kind_fills_defaults() {
        let kind = RuleKind::from_parts(RULE_TYPE_PARTIAL, None, None, None, None).unwrap();
        assert_matches!(kind, RuleKind::Partial(config) => {
            assert_eq!(config.amount_variance_percent, 2.0);
            assert_eq!(config.date_variance_days, 0);
            assert_eq!(config.required_fields, vec![MatchField::ReferenceNumber]);
        });
    }

    #[test]
    fn partial_kind_rejects_negative_tolerances() {
        assert!(RuleKind::from_parts(RULE_TYPE_PARTIAL, None, Some(-1.0), None, None).is_err());
        assert!(RuleKind::from_parts(RULE_TYPE_PARTIAL, None, None, Some(-1), None).is_err());
    }

    #[test]
    fn unknown_rule_type_fails() {
        assert!(RuleKind::from_parts("FUZZY_MATCH", None, None, None, None).is_err());
    }

    #[test]
    fn sort_is_priority_descending() {
        let mut rules = vec![spec(1, 10), spec(2, 100), spec(3, 50)];
        sort_for_evaluation(&mut rules);
        let order: Vec<DbId> = rules.iter().map(|r| r.id).collect();
        assert_eq!(order, vec![2, 3, 1]);
    }

    #[test]
    fn priority_ties_break_by_id_descending() {
        let mut rules = vec![spec(7, 50), spec(9, 50), spec(8, 50)];
        sort_for_evaluation(&mut rules);
        let order: Vec<DbId> = rules.iter().map(|r| r.id).collect();
        assert_eq!(order, vec![9, 8, 7]);
    }
}
