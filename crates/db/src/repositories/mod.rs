//! Repository layer.
//!
//! Each repository is a zero-sized struct providing async CRUD methods.
//! Methods that must run inside the per-job ingestion transaction accept
//! any `PgExecutor` so callers can pass either the pool or a transaction
//! connection.

pub mod audit_log_repo;
pub mod matching_rule_repo;
pub mod queue_job_repo;
pub mod record_repo;
pub mod reconciliation_result_repo;
pub mod upload_job_repo;

pub use audit_log_repo::AuditLogRepo;
pub use matching_rule_repo::MatchingRuleRepo;
pub use queue_job_repo::QueueJobRepo;
pub use record_repo::RecordRepo;
pub use reconciliation_result_repo::ReconciliationResultRepo;
pub use upload_job_repo::UploadJobRepo;
