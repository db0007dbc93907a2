//! Matching rule entity models and DTOs.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use tally_core::error::CoreError;
use tally_core::rules::{RuleKind, RuleSpec};
use tally_core::types::{DbId, Timestamp};

/// A row from the `matching_rules` table. The type-specific configuration
/// is flattened into nullable columns; [`MatchingRule::to_spec`] lifts it
/// back into the tagged union the evaluator dispatches on.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct MatchingRule {
    pub id: DbId,
    pub rule_name: String,
    pub description: Option<String>,
    pub rule_type: String,
    pub priority: i32,
    pub enabled: bool,
    pub exact_match_fields: Option<Vec<String>>,
    pub amount_variance_percent: Option<f64>,
    pub date_variance_days: Option<i32>,
    pub required_fields: Option<Vec<String>>,
    pub created_by: Option<DbId>,
    pub updated_by: Option<DbId>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl MatchingRule {
    /// The evaluator's view of this rule.
    pub fn to_spec(&self) -> Result<RuleSpec, CoreError> {
        let kind = RuleKind::from_parts(
            &self.rule_type,
            self.exact_match_fields.as_deref(),
            self.amount_variance_percent,
            self.date_variance_days,
            self.required_fields.as_deref(),
        )?;
        Ok(RuleSpec {
            id: self.id,
            name: self.rule_name.clone(),
            priority: self.priority,
            kind,
        })
    }
}

/// DTO for creating a rule.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateMatchingRule {
    pub rule_name: String,
    pub description: Option<String>,
    pub rule_type: String,
    pub priority: i32,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    pub exact_match_fields: Option<Vec<String>>,
    pub amount_variance_percent: Option<f64>,
    pub date_variance_days: Option<i32>,
    pub required_fields: Option<Vec<String>>,
}

fn default_enabled() -> bool {
    true
}

impl CreateMatchingRule {
    /// Validate the DTO by attempting the same lift the evaluator performs.
    pub fn validate(&self) -> Result<RuleKind, CoreError> {
        if self.rule_name.trim().is_empty() {
            return Err(CoreError::Validation("ruleName must not be empty".into()));
        }
        RuleKind::from_parts(
            &self.rule_type,
            self.exact_match_fields.as_deref(),
            self.amount_variance_percent,
            self.date_variance_days,
            self.required_fields.as_deref(),
        )
    }
}

/// DTO for a partial rule update. Only present fields change.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateMatchingRule {
    pub description: Option<String>,
    pub priority: Option<i32>,
    pub enabled: Option<bool>,
    pub exact_match_fields: Option<Vec<String>>,
    pub amount_variance_percent: Option<f64>,
    pub date_variance_days: Option<i32>,
    pub required_fields: Option<Vec<String>>,
}

/// Filter parameters for listing rules.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RuleListQuery {
    pub enabled: Option<bool>,
    pub rule_type: Option<String>,
}
