//! Consent records.
//!
//! Consent is an append-only log; nothing links a record to a particular
//! incident.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Consent text used when a caller does not supply its own.
pub const DEFAULT_CONSENT_TEXT: &str =
    "User consents to emergency location sharing while active. Retention 30 days.";

/// A recorded consent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsentRecord {
    /// Row id assigned by storage.
    pub id: i64,
    /// Subject that consented.
    pub user_id: String,
    /// The exact text consented to.
    pub consent_text: String,
    /// When the consent was recorded.
    pub ts: DateTime<Utc>,
}
