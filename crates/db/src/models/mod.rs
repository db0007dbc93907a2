//! Entity models and DTOs, one module per table.

pub mod audit_log;
pub mod matching_rule;
pub mod queue_job;
pub mod record;
pub mod reconciliation_result;
pub mod status;
pub mod upload_job;
