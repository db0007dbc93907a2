use tally_core::error::CoreError;
use tally_core::types::DbId;

pub type PipelineResult<T> = Result<T, PipelineError>;

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Upload job not found: {0}")]
    JobNotFound(DbId),

    #[error("Record not found: {0}")]
    RecordNotFound(DbId),

    #[error("Matching rule not found: {0}")]
    RuleNotFound(DbId),

    #[error("Rule store unavailable and no cached snapshot exists")]
    RuleStoreUnavailable,

    #[error("Original upload artifact no longer exists")]
    ArtifactMissing,

    #[error("Failed to decode source file: {0}")]
    Decode(String),

    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Database(#[from] sqlx::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
