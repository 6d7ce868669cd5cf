//! Persistence for users, notes and categories.
//!
//! The quota subsystem only needs the narrow [`NoteStore`] view (usage sum,
//! user lookup, limit update). [`SqliteStore`] implements it and also carries
//! the note/category operations used by the HTTP layer.

pub mod sqlite;

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::{User, UserId};

pub use sqlite::SqliteStore;

/// Errors that can occur in the note store
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("User not found: {0}")]
    UserNotFound(UserId),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Database task failed: {0}")]
    Task(String),
}

/// Read/write access to the records the quota ledger works from
#[async_trait]
pub trait NoteStore: Send + Sync {
    /// Look up a user; `None` if no such user exists
    async fn get_user(&self, user_id: UserId) -> Result<Option<User>, StoreError>;

    /// Sum of `file_size` over the user's notes (null counts as 0)
    async fn sum_file_sizes_for_user(&self, user_id: UserId) -> Result<i64, StoreError>;

    /// Replace the user's quota ceiling
    async fn set_user_limit(&self, user_id: UserId, limit_bytes: i64) -> Result<(), StoreError>;
}
