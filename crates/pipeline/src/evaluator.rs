//! Rule evaluator: applies one rule to one candidate against the
//! persisted record population of the same job.
//!
//! Queries narrow the population with indexed equality filters; every
//! comparison decision is pure logic from `tally_core::matching`.

use sqlx::PgConnection;
use tally_core::fields::MatchField;
use tally_core::matching::{partial_match_check, reference_match_check, MatchStatus, MismatchedField};
use tally_core::rules::{default_exact_fields, RuleKind, RuleSpec};
use tally_core::types::DbId;
use tally_db::models::record::Record;
use tally_db::repositories::RecordRepo;

use crate::error::PipelineResult;

/// A successful rule application.
#[derive(Debug)]
pub struct RuleMatch {
    /// The persisted record the candidate matched against.
    pub system: Record,
    pub status: MatchStatus,
    pub mismatches: Vec<MismatchedField>,
}

/// Stateless evaluator dispatching on the rule's tagged configuration.
pub struct RuleEvaluator;

impl RuleEvaluator {
    /// Apply `rule` to `candidate`, returning the first qualifying system
    /// record (first-found policy, stable id order) or `None`.
    pub async fn apply(
        conn: &mut PgConnection,
        rule: &RuleSpec,
        candidate: &Record,
        upload_job_id: DbId,
    ) -> PipelineResult<Option<RuleMatch>> {
        let uploaded = candidate.snapshot();

        match &rule.kind {
            RuleKind::Exact { fields } => {
                let fields = if fields.is_empty() {
                    default_exact_fields()
                } else {
                    fields.clone()
                };
                let hit = RecordRepo::find_first_equal(
                    &mut *conn,
                    upload_job_id,
                    &fields,
                    &uploaded,
                    candidate.id,
                )
                .await?;
                Ok(hit.map(|system| RuleMatch {
                    system,
                    status: MatchStatus::Matched,
                    mismatches: Vec::new(),
                }))
            }

            RuleKind::Partial(config) => {
                let hits = RecordRepo::find_all_equal(
                    &mut *conn,
                    upload_job_id,
                    &config.required_fields,
                    &uploaded,
                    candidate.id,
                )
                .await?;
                // First record inside tolerance wins; a lower-variance
                // record later in the scan is deliberately not preferred.
                for system in hits {
                    if let Some(outcome) = partial_match_check(&system.snapshot(), &uploaded, config)
                    {
                        return Ok(Some(RuleMatch {
                            system,
                            status: outcome.status,
                            mismatches: outcome.mismatches,
                        }));
                    }
                }
                Ok(None)
            }

            RuleKind::Reference => {
                if uploaded.reference_number.trim().is_empty() {
                    return Ok(None);
                }
                let hit = RecordRepo::find_first_equal(
                    &mut *conn,
                    upload_job_id,
                    &[MatchField::ReferenceNumber],
                    &uploaded,
                    candidate.id,
                )
                .await?;
                Ok(hit.map(|system| {
                    let outcome = reference_match_check(&system.snapshot(), &uploaded);
                    RuleMatch {
                        system,
                        status: outcome.status,
                        mismatches: outcome.mismatches,
                    }
                }))
            }
        }
    }
}
