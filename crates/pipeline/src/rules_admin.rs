//! Matching-rule administration.
//!
//! Every mutation invalidates the rule cache so the engine's next run
//! evaluates the latest configuration even inside the TTL window.

use std::sync::Arc;

use sqlx::PgPool;
use tally_core::error::CoreError;
use tally_core::fields::MatchField;
use tally_core::rules::{RuleKind, RULE_TYPE_EXACT, RULE_TYPE_PARTIAL, RULE_TYPE_REFERENCE};
use tally_core::types::{ActorContext, DbId};
use tally_db::models::matching_rule::{
    CreateMatchingRule, MatchingRule, RuleListQuery, UpdateMatchingRule,
};
use tally_db::repositories::MatchingRuleRepo;

use crate::error::{PipelineError, PipelineResult};
use crate::rule_cache::RuleCache;

/// Rule CRUD with cache invalidation.
pub struct RulesAdmin {
    pool: PgPool,
    cache: Arc<RuleCache>,
}

impl RulesAdmin {
    pub fn new(pool: PgPool, cache: Arc<RuleCache>) -> Self {
        Self { pool, cache }
    }

    pub async fn list(&self, params: &RuleListQuery) -> PipelineResult<Vec<MatchingRule>> {
        Ok(MatchingRuleRepo::list(&self.pool, params).await?)
    }

    pub async fn get(&self, id: DbId) -> PipelineResult<MatchingRule> {
        MatchingRuleRepo::find_by_id(&self.pool, id)
            .await?
            .ok_or(PipelineError::RuleNotFound(id))
    }

    /// Create a rule. Fails on invalid configuration or a duplicate name.
    pub async fn create(
        &self,
        input: &CreateMatchingRule,
        actor: &ActorContext,
    ) -> PipelineResult<MatchingRule> {
        input.validate()?;
        if MatchingRuleRepo::find_by_name(&self.pool, &input.rule_name)
            .await?
            .is_some()
        {
            return Err(CoreError::Conflict(format!(
                "A rule named '{}' already exists",
                input.rule_name
            ))
            .into());
        }

        let rule = MatchingRuleRepo::create(&self.pool, input, Some(actor.actor_id)).await?;
        self.cache.invalidate().await;
        tracing::info!(rule_id = rule.id, rule_name = %rule.rule_name, "Matching rule created");
        Ok(rule)
    }

    /// Apply a partial update, validating the merged configuration.
    pub async fn update(
        &self,
        id: DbId,
        input: &UpdateMatchingRule,
        actor: &ActorContext,
    ) -> PipelineResult<MatchingRule> {
        let existing = self.get(id).await?;

        // Validate the configuration as it will be after the update.
        let merged_exact = input
            .exact_match_fields
            .clone()
            .or(existing.exact_match_fields);
        let merged_required = input.required_fields.clone().or(existing.required_fields);
        RuleKind::from_parts(
            &existing.rule_type,
            merged_exact.as_deref(),
            input
                .amount_variance_percent
                .or(existing.amount_variance_percent),
            input.date_variance_days.or(existing.date_variance_days),
            merged_required.as_deref(),
        )?;

        let rule = MatchingRuleRepo::update(&self.pool, id, input, actor.actor_id)
            .await?
            .ok_or(PipelineError::RuleNotFound(id))?;
        self.cache.invalidate().await;
        tracing::info!(rule_id = rule.id, rule_name = %rule.rule_name, "Matching rule updated");
        Ok(rule)
    }

    /// Delete a rule.
    pub async fn delete(&self, id: DbId) -> PipelineResult<()> {
        if !MatchingRuleRepo::delete(&self.pool, id).await? {
            return Err(PipelineError::RuleNotFound(id));
        }
        self.cache.invalidate().await;
        tracing::info!(rule_id = id, "Matching rule deleted");
        Ok(())
    }

    /// Seed the default rule set on an empty store. No-op otherwise.
    pub async fn seed_default_rules(&self) -> PipelineResult<usize> {
        if MatchingRuleRepo::count(&self.pool).await? > 0 {
            return Ok(0);
        }

        let defaults = default_rules();
        let seeded = defaults.len();
        for rule in &defaults {
            MatchingRuleRepo::create(&self.pool, rule, None).await?;
        }
        self.cache.invalidate().await;
        tracing::info!(count = seeded, "Default matching rules created");
        Ok(seeded)
    }
}

/// The stock rule set: two exact tiers, two partial tiers (the looser one
/// disabled until an administrator opts in), and a reference fallback.
fn default_rules() -> Vec<CreateMatchingRule> {
    vec![
        CreateMatchingRule {
            rule_name: "Exact Match - Transaction ID and Amount".to_string(),
            description: Some("Matches records with identical transaction ID and amount".to_string()),
            rule_type: RULE_TYPE_EXACT.to_string(),
            priority: 100,
            enabled: true,
            exact_match_fields: Some(vec![
                MatchField::TransactionId.as_str().to_string(),
                MatchField::Amount.as_str().to_string(),
            ]),
            amount_variance_percent: None,
            date_variance_days: None,
            required_fields: None,
        },
        CreateMatchingRule {
            rule_name: "Exact Match - All Fields".to_string(),
            description: Some("Matches records with all fields identical".to_string()),
            rule_type: RULE_TYPE_EXACT.to_string(),
            priority: 90,
            enabled: true,
            exact_match_fields: Some(
                tally_core::fields::ALL_MATCH_FIELDS
                    .iter()
                    .map(|f| f.as_str().to_string())
                    .collect(),
            ),
            amount_variance_percent: None,
            date_variance_days: None,
            required_fields: None,
        },
        CreateMatchingRule {
            rule_name: "Partial Match - 2% Amount Variance".to_string(),
            description: Some(
                "Matches records with same reference number and amount within ±2%".to_string(),
            ),
            rule_type: RULE_TYPE_PARTIAL.to_string(),
            priority: 80,
            enabled: true,
            exact_match_fields: None,
            amount_variance_percent: Some(2.0),
            date_variance_days: Some(0),
            required_fields: Some(vec![MatchField::ReferenceNumber.as_str().to_string()]),
        },
        CreateMatchingRule {
            rule_name: "Partial Match - 5% Amount Variance".to_string(),
            description: Some(
                "Matches records with same reference number and amount within ±5%".to_string(),
            ),
            rule_type: RULE_TYPE_PARTIAL.to_string(),
            priority: 70,
            enabled: false,
            exact_match_fields: None,
            amount_variance_percent: Some(5.0),
            date_variance_days: Some(1),
            required_fields: Some(vec![MatchField::ReferenceNumber.as_str().to_string()]),
        },
        CreateMatchingRule {
            rule_name: "Reference Number Match".to_string(),
            description: Some("Matches records by reference number only".to_string()),
            rule_type: RULE_TYPE_REFERENCE.to_string(),
            priority: 60,
            enabled: true,
            exact_match_fields: None,
            amount_variance_percent: None,
            date_variance_days: None,
            required_fields: None,
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_rules_are_valid_and_prioritised() {
        let rules = default_rules();
        assert_eq!(rules.len(), 5);
        for rule in &rules {
            rule.validate().unwrap();
        }

        let priorities: Vec<i32> = rules.iter().map(|r| r.priority).collect();
        let mut sorted = priorities.clone();
        sorted.sort_by(|a, b| b.cmp(a));
        assert_eq!(priorities, sorted);
    }

    #[test]
    fn looser_partial_tier_starts_disabled() {
        let rules = default_rules();
        let five_percent = rules
            .iter()
            .find(|r| r.rule_name.contains("5%"))
            .unwrap();
        assert!(!five_percent.enabled);
    }
}
