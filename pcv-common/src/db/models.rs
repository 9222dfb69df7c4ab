//! Database models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identity of the submitting user, as supplied by the auth proxy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserIdentity {
    /// Stable id; addresses the user's live session channel
    pub id: String,
    /// Email; results are attributed to and queried by this value
    pub email: String,
}

/// Persisted outcome of one verification job (append-only)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultRecord {
    pub id: Uuid,
    pub user: String,
    /// 0 when the fingerprint did not match
    pub score: u64,
    /// Assigned when the job ran, not when the file was uploaded
    pub submitted_at: DateTime<Utc>,
    /// Hash of the decompressed content, kept whether or not it matched
    pub fingerprint: String,
}
