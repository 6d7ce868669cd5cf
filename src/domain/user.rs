//! Users and their storage accounting.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identifier of a user row
pub type UserId = i64;

/// Storage limit given to new users when none is specified (250 MB)
pub const DEFAULT_STORAGE_LIMIT_BYTES: i64 = 262_144_000;

/// A registered user
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: UserId,

    pub username: String,

    pub email: String,

    /// Quota ceiling in bytes (never negative)
    pub storage_limit_bytes: i64,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

/// A user's storage position, derived from their notes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageInfo {
    /// Quota ceiling in bytes
    pub limit_bytes: i64,

    /// Sum of the file sizes of all the user's notes
    pub used_bytes: i64,

    /// `limit_bytes - used_bytes`; negative while a user is over quota
    pub remaining_bytes: i64,
}

impl StorageInfo {
    /// Build storage info from a limit and the current usage
    pub fn new(limit_bytes: i64, used_bytes: i64) -> Self {
        Self {
            limit_bytes,
            used_bytes,
            remaining_bytes: limit_bytes.saturating_sub(used_bytes),
        }
    }
}

/// Per-user note statistics
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserStats {
    pub total_notes: i64,

    /// Total bytes across notes that still hold an audio file
    pub total_size: i64,

    pub categories_used: i64,

    pub last_note_date: Option<DateTime<Utc>>,
}
