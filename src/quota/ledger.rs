//! Quota ledger: per-user used and remaining storage.
//!
//! Usage is the sum of `file_size` over a user's notes as recorded in the
//! store. It is only as fresh as the last store write and never stats files.

use std::sync::Arc;

use serde::Serialize;

use super::QuotaError;
use crate::domain::{StorageInfo, UserId};
use crate::store::NoteStore;

/// Outcome of a "would `n` more bytes fit?" query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdmissionCheck {
    /// `current_usage + incoming <= limit`
    pub can_upload: bool,

    pub current_usage: i64,

    pub projected_total: i64,

    pub limit: i64,

    /// Remaining bytes before the upload
    pub remaining: i64,
}

impl AdmissionCheck {
    /// Decide admission from the storage position alone
    pub fn evaluate(info: &StorageInfo, incoming_bytes: u64) -> Self {
        Self::evaluate_with_held(info, 0, incoming_bytes)
    }

    /// Like [`AdmissionCheck::evaluate`], counting `held` bytes of
    /// outstanding reservations as already used.
    pub fn evaluate_with_held(info: &StorageInfo, held: i64, incoming_bytes: u64) -> Self {
        let incoming = i64::try_from(incoming_bytes).unwrap_or(i64::MAX);
        let current_usage = info.used_bytes.saturating_add(held);
        let projected_total = current_usage.saturating_add(incoming);

        Self {
            can_upload: projected_total <= info.limit_bytes,
            current_usage,
            projected_total,
            limit: info.limit_bytes,
            remaining: info.limit_bytes.saturating_sub(current_usage),
        }
    }
}

/// Computes storage positions from the note store
pub struct QuotaLedger {
    store: Arc<dyn NoteStore>,
}

impl QuotaLedger {
    /// Create a ledger over `store`
    pub fn new(store: Arc<dyn NoteStore>) -> Self {
        Self { store }
    }

    /// Limit, used and remaining bytes for `user_id`
    pub async fn storage_info(&self, user_id: UserId) -> Result<StorageInfo, QuotaError> {
        let user = self
            .store
            .get_user(user_id)
            .await?
            .ok_or(QuotaError::NotFound(user_id))?;
        let used = self.store.sum_file_sizes_for_user(user_id).await?;

        Ok(StorageInfo::new(user.storage_limit_bytes, used))
    }

    /// Would `incoming_bytes` more fit in the user's quota?
    ///
    /// Pure decision: nothing is reserved, so a concurrent upload from the same
    /// user can pass the same check before either note is written.
    pub async fn check_admission(
        &self,
        user_id: UserId,
        incoming_bytes: u64,
    ) -> Result<AdmissionCheck, QuotaError> {
        let info = self.storage_info(user_id).await?;
        Ok(AdmissionCheck::evaluate(&info, incoming_bytes))
    }

    /// Replace the user's quota ceiling. Existing notes are untouched.
    pub async fn set_limit(&self, user_id: UserId, new_limit_bytes: i64) -> Result<StorageInfo, QuotaError> {
        if new_limit_bytes < 0 {
            return Err(QuotaError::Validation(format!(
                "storage limit must be a non-negative integer, got {}",
                new_limit_bytes
            )));
        }

        self.store.set_user_limit(user_id, new_limit_bytes).await?;
        tracing::info!(user_id, limit_bytes = new_limit_bytes, "storage limit updated");

        self.storage_info(user_id).await
    }
}

/// Parse a limit given as text (CLI, form input)
pub fn parse_limit(raw: &str) -> Result<i64, QuotaError> {
    let limit: i64 = raw.trim().parse().map_err(|_| {
        QuotaError::Validation(format!("storage limit must be a non-negative integer, got {:?}", raw))
    })?;

    if limit < 0 {
        return Err(QuotaError::Validation(format!(
            "storage limit must be a non-negative integer, got {}",
            limit
        )));
    }

    Ok(limit)
}

/// Parse a limit given as a JSON value. Only non-negative integers pass.
pub fn limit_from_json(value: Option<&serde_json::Value>) -> Result<i64, QuotaError> {
    match value.and_then(|v| v.as_i64()) {
        Some(limit) if limit >= 0 => Ok(limit),
        _ => Err(QuotaError::Validation(
            "limitBytes must be a non-negative integer".to_string(),
        )),
    }
}
