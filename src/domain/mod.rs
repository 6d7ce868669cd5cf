//! Domain types for classnote.
//!
//! - Users: quota ceilings and derived storage info
//! - Notes: transcripts, summaries and the audio files behind them
//! - Categories: per-user and built-in note grouping

pub mod note;
pub mod user;

// Re-export commonly used types
pub use note::{Category, NewNote, Note, StoredAudioFile, DEFAULT_CATEGORY_COLOR};
pub use user::{StorageInfo, User, UserId, UserStats, DEFAULT_STORAGE_LIMIT_BYTES};
