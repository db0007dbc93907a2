//! Repository for the `matching_rules` table.
//!
//! Active-rule ordering is `priority DESC, id DESC` — the tie-break is
//! deliberate and documented rather than an accident of insertion order.

use sqlx::PgPool;
use tally_core::types::DbId;

use crate::models::matching_rule::{
    CreateMatchingRule, MatchingRule, RuleListQuery, UpdateMatchingRule,
};

/// Column list for `matching_rules` queries.
const COLUMNS: &str = "\
    id, rule_name, description, rule_type, priority, enabled, \
    exact_match_fields, amount_variance_percent, date_variance_days, \
    required_fields, created_by, updated_by, created_at, updated_at";

/// Provides CRUD operations for matching rules.
pub struct MatchingRuleRepo;

impl MatchingRuleRepo {
    /// All enabled rules, highest priority first.
    pub async fn list_enabled(pool: &PgPool) -> Result<Vec<MatchingRule>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM matching_rules \
             WHERE enabled = TRUE \
             ORDER BY priority DESC, id DESC"
        );
        sqlx::query_as::<_, MatchingRule>(&query)
            .fetch_all(pool)
            .await
    }

    /// List rules with optional filters, in evaluation order.
    pub async fn list(
        pool: &PgPool,
        params: &RuleListQuery,
    ) -> Result<Vec<MatchingRule>, sqlx::Error> {
        let mut conditions: Vec<String> = Vec::new();
        let mut bind_idx = 1u32;

        if params.enabled.is_some() {
            conditions.push(format!("enabled = ${bind_idx}"));
            bind_idx += 1;
        }
        if params.rule_type.is_some() {
            conditions.push(format!("rule_type = ${bind_idx}"));
            let _ = bind_idx;
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };
        let query = format!(
            "SELECT {COLUMNS} FROM matching_rules {where_clause} \
             ORDER BY priority DESC, id DESC"
        );

        let mut q = sqlx::query_as::<_, MatchingRule>(&query);
        if let Some(enabled) = params.enabled {
            q = q.bind(enabled);
        }
        if let Some(ref rule_type) = params.rule_type {
            q = q.bind(rule_type.as_str());
        }
        q.fetch_all(pool).await
    }

    /// Find a rule by its ID.
    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<MatchingRule>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM matching_rules WHERE id = $1");
        sqlx::query_as::<_, MatchingRule>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Find a rule by its unique name.
    pub async fn find_by_name(
        pool: &PgPool,
        rule_name: &str,
    ) -> Result<Option<MatchingRule>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM matching_rules WHERE rule_name = $1");
        sqlx::query_as::<_, MatchingRule>(&query)
            .bind(rule_name)
            .fetch_optional(pool)
            .await
    }

    /// Create a rule. `created_by` is `None` for system seeding.
    pub async fn create(
        pool: &PgPool,
        input: &CreateMatchingRule,
        created_by: Option<DbId>,
    ) -> Result<MatchingRule, sqlx::Error> {
        let query = format!(
            "INSERT INTO matching_rules \
                 (rule_name, description, rule_type, priority, enabled, \
                  exact_match_fields, amount_variance_percent, date_variance_days, \
                  required_fields, created_by, updated_by) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $10) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, MatchingRule>(&query)
            .bind(&input.rule_name)
            .bind(&input.description)
            .bind(&input.rule_type)
            .bind(input.priority)
            .bind(input.enabled)
            .bind(&input.exact_match_fields)
            .bind(input.amount_variance_percent)
            .bind(input.date_variance_days)
            .bind(&input.required_fields)
            .bind(created_by)
            .fetch_one(pool)
            .await
    }

    /// Apply a partial update. Returns `None` when the rule is missing.
    pub async fn update(
        pool: &PgPool,
        id: DbId,
        input: &UpdateMatchingRule,
        updated_by: DbId,
    ) -> Result<Option<MatchingRule>, sqlx::Error> {
        let mut sets: Vec<String> = Vec::new();
        let mut bind_idx = 3u32; // $1 id, $2 updated_by
        let mut binds: Vec<RuleBind> = Vec::new();

        if let Some(ref description) = input.description {
            sets.push(format!("description = ${bind_idx}"));
            bind_idx += 1;
            binds.push(RuleBind::Text(description.clone()));
        }
        if let Some(priority) = input.priority {
            sets.push(format!("priority = ${bind_idx}"));
            bind_idx += 1;
            binds.push(RuleBind::Int(priority));
        }
        if let Some(enabled) = input.enabled {
            sets.push(format!("enabled = ${bind_idx}"));
            bind_idx += 1;
            binds.push(RuleBind::Bool(enabled));
        }
        if let Some(ref fields) = input.exact_match_fields {
            sets.push(format!("exact_match_fields = ${bind_idx}"));
            bind_idx += 1;
            binds.push(RuleBind::TextArray(fields.clone()));
        }
        if let Some(percent) = input.amount_variance_percent {
            sets.push(format!("amount_variance_percent = ${bind_idx}"));
            bind_idx += 1;
            binds.push(RuleBind::Float(percent));
        }
        if let Some(days) = input.date_variance_days {
            sets.push(format!("date_variance_days = ${bind_idx}"));
            bind_idx += 1;
            binds.push(RuleBind::Int(days));
        }
        if let Some(ref fields) = input.required_fields {
            sets.push(format!("required_fields = ${bind_idx}"));
            let _ = bind_idx;
            binds.push(RuleBind::TextArray(fields.clone()));
        }

        if sets.is_empty() {
            return Self::find_by_id(pool, id).await;
        }

        let query = format!(
            "UPDATE matching_rules \
             SET {}, updated_by = $2, updated_at = NOW() \
             WHERE id = $1 \
             RETURNING {COLUMNS}",
            sets.join(", ")
        );
        let mut q = sqlx::query_as::<_, MatchingRule>(&query)
            .bind(id)
            .bind(updated_by);
        for bind in &binds {
            q = match bind {
                RuleBind::Text(v) => q.bind(v.as_str()),
                RuleBind::Int(v) => q.bind(*v),
                RuleBind::Float(v) => q.bind(*v),
                RuleBind::Bool(v) => q.bind(*v),
                RuleBind::TextArray(v) => q.bind(v),
            };
        }
        q.fetch_optional(pool).await
    }

    /// Delete a rule. Returns `true` if a row was removed.
    pub async fn delete(pool: &PgPool, id: DbId) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM matching_rules WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Total number of rules (used by default seeding).
    pub async fn count(pool: &PgPool) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*)::BIGINT FROM matching_rules")
            .fetch_one(pool)
            .await
    }
}

/// Typed bind value for dynamically-built rule updates.
enum RuleBind {
    Text(String),
    Int(i32),
    Float(f64),
    Bool(bool),
    TextArray(Vec<String>),
}
