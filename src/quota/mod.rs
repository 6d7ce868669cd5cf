//! Storage quota accounting and upload admission.
//!
//! - **Ledger**: used/remaining bytes per user, derived from note records
//! - **Admission**: the gate consulted before an uploaded file is accepted
//!
//! ```text
//! upload ─▶ UploadAdmission::admit ─▶ QuotaLedger::check_admission ─▶ NoteStore
//!                 │
//!                 └─ rejected ─▶ caller deletes the received file, answers 413
//! ```

pub mod admission;
pub mod ledger;

use std::fmt;

use serde::Serialize;
use thiserror::Error;

use crate::domain::UserId;
use crate::store::StoreError;

// Re-export key types
pub use admission::{Admitted, Reservation, UploadAdmission};
pub use ledger::{limit_from_json, parse_limit, AdmissionCheck, QuotaLedger};

/// Errors that can occur in quota operations
#[derive(Debug, Error)]
pub enum QuotaError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("User not found: {0}")]
    NotFound(UserId),

    #[error("{0}")]
    QuotaExceeded(QuotaExceeded),

    #[error("Store error: {0}")]
    Store(StoreError),
}

impl From<StoreError> for QuotaError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::UserNotFound(id) => Self::NotFound(id),
            other => Self::Store(other),
        }
    }
}

/// Usage figures attached to a rejected upload, so the caller can render
/// "X of Y used".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuotaExceeded {
    pub current_usage: i64,
    pub projected_total: i64,
    pub limit: i64,
    pub remaining: i64,
}

impl fmt::Display for QuotaExceeded {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Storage limit exceeded: {} of {} bytes used, upload would bring total to {}",
            self.current_usage, self.limit, self.projected_total
        )
    }
}

impl From<AdmissionCheck> for QuotaExceeded {
    fn from(check: AdmissionCheck) -> Self {
        Self {
            current_usage: check.current_usage,
            projected_total: check.projected_total,
            limit: check.limit,
            remaining: check.remaining,
        }
    }
}
