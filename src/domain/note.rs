//! Notes, categories and the audio artifacts they reference.

use std::time::SystemTime;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::user::UserId;

/// A lecture note: transcript and summary of one uploaded audio file
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Note {
    pub id: i64,

    pub user_id: UserId,

    pub category_id: Option<i64>,

    /// Joined from the category (if any)
    pub category_name: Option<String>,

    pub category_color: Option<String>,

    pub title: String,

    /// Name of the audio artifact in the audio directory
    pub original_filename: Option<String>,

    pub transcription_text: Option<String>,

    pub summary_text: Option<String>,

    /// Size of the audio artifact. `None` before upload completes, and after
    /// the retention sweep has removed the file.
    pub file_size: Option<i64>,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

/// Fields required to create a note
#[derive(Debug, Clone, Default)]
pub struct NewNote {
    pub title: String,
    pub original_filename: Option<String>,
    pub transcription_text: Option<String>,
    pub summary_text: Option<String>,
    pub file_size: Option<i64>,
    pub category_id: Option<i64>,
}

/// A note category. Built-in categories have no owner.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Category {
    pub id: i64,
    pub user_id: Option<UserId>,
    pub name: String,
    pub color: String,
}

/// Colour used when a category is created without one
pub const DEFAULT_CATEGORY_COLOR: &str = "#007bff";

/// A physical audio artifact on the storage medium
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredAudioFile {
    /// File name, as referenced by `Note::original_filename`
    pub name: String,

    pub size_bytes: u64,

    pub modified: SystemTime,
}
