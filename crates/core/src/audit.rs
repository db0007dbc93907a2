//! Audit trail vocabulary: actions, entity types, and sources.
//!
//! Lives in `core` (zero internal deps) so the repository layer and the
//! worker share one set of string constants. Audit entries themselves are
//! append-only at the database level; nothing here can express a mutation.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

// ---------------------------------------------------------------------------
// Actions
// ---------------------------------------------------------------------------

/// What happened to an entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuditAction {
    Create,
    Update,
    Delete,
    Reconcile,
    Upload,
    ManualCorrection,
    UnauthorizedAttempt,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "CREATE",
            Self::Update => "UPDATE",
            Self::Delete => "DELETE",
            Self::Reconcile => "RECONCILE",
            Self::Upload => "UPLOAD",
            Self::ManualCorrection => "MANUAL_CORRECTION",
            Self::UnauthorizedAttempt => "UNAUTHORIZED_ATTEMPT",
        }
    }

    pub fn parse(s: &str) -> Result<Self, CoreError> {
        match s {
            "CREATE" => Ok(Self::Create),
            "UPDATE" => Ok(Self::Update),
            "DELETE" => Ok(Self::Delete),
            "RECONCILE" => Ok(Self::Reconcile),
            "UPLOAD" => Ok(Self::Upload),
            "MANUAL_CORRECTION" => Ok(Self::ManualCorrection),
            "UNAUTHORIZED_ATTEMPT" => Ok(Self::UnauthorizedAttempt),
            other => Err(CoreError::Validation(format!(
                "Unknown audit action '{other}'"
            ))),
        }
    }
}

impl std::fmt::Display for AuditAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Entity types
// ---------------------------------------------------------------------------

/// Which entity an audit entry refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuditEntityType {
    Record,
    UploadJob,
    ReconciliationResult,
    MatchingRule,
}

impl AuditEntityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Record => "Record",
            Self::UploadJob => "UploadJob",
            Self::ReconciliationResult => "ReconciliationResult",
            Self::MatchingRule => "MatchingRule",
        }
    }
}

impl std::fmt::Display for AuditEntityType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Sources
// ---------------------------------------------------------------------------

/// Where a change originated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuditSource {
    Api,
    System,
    Manual,
}

impl AuditSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Api => "API",
            Self::System => "SYSTEM",
            Self::Manual => "MANUAL",
        }
    }
}

impl std::fmt::Display for AuditSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn action_round_trips_through_str() {
        for action in [
            AuditAction::Create,
            AuditAction::Update,
            AuditAction::Delete,
            AuditAction::Reconcile,
            AuditAction::Upload,
            AuditAction::ManualCorrection,
            AuditAction::UnauthorizedAttempt,
        ] {
            assert_eq!(AuditAction::parse(action.as_str()).unwrap(), action);
        }
    }

    #[test]
    fn unknown_action_is_rejected() {
        assert!(AuditAction::parse("REPROCESS").is_err());
        assert!(AuditAction::parse("").is_err());
    }

    #[test]
    fn source_strings_match_stored_values() {
        assert_eq!(AuditSource::Api.as_str(), "API");
        assert_eq!(AuditSource::System.as_str(), "SYSTEM");
        assert_eq!(AuditSource::Manual.as_str(), "MANUAL");
    }
}
