//! Shared scalar type aliases and the actor context.

use serde::{Deserialize, Serialize};

/// Database identifier type matching BIGSERIAL/BIGINT columns.
pub type DbId = i64;

/// Timestamp type matching TIMESTAMPTZ columns.
pub type Timestamp = chrono::DateTime<chrono::Utc>;

/// Identity and origin metadata supplied by the (external) authentication
/// layer for every pipeline invocation. The core records it verbatim and
/// never validates credentials.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActorContext {
    pub actor_id: DbId,
    pub role: String,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

impl ActorContext {
    /// A system-internal actor with no network origin.
    pub fn system(actor_id: DbId) -> Self {
        Self {
            actor_id,
            role: "System".to_string(),
            ip_address: None,
            user_agent: None,
        }
    }
}
