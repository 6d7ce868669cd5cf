//! Upload admission gate.
//!
//! Consulted after an upload has been received and before it is accepted.
//! Anonymous uploads are never quota-checked. A ledger failure admits the
//! upload (fail-open) and is logged at error level.
//!
//! `admit` is check-then-act: two concurrent uploads from one user can both
//! pass against a usage figure that reflects neither. Callers that need the
//! stronger guarantee use [`UploadAdmission::reserve`], which holds the bytes
//! in-process until [`UploadAdmission::commit`] or [`UploadAdmission::release`].

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use uuid::Uuid;

use super::{AdmissionCheck, QuotaError, QuotaExceeded, QuotaLedger};
use crate::domain::UserId;

/// Why an upload was let through
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admitted {
    /// No user: quota does not apply
    Anonymous,

    /// The upload fits the user's quota
    WithinQuota(AdmissionCheck),

    /// The quota lookup failed and the upload was admitted anyway
    FailOpen,
}

/// A hold on quota bytes between admission and the durable note write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reservation {
    pub id: Uuid,
    pub user_id: UserId,
    pub bytes: i64,
}

/// Gate between "file arrived" and "file accepted"
pub struct UploadAdmission {
    ledger: Arc<QuotaLedger>,
    reservations: Mutex<HashMap<Uuid, Reservation>>,
}

impl UploadAdmission {
    /// Create a gate backed by `ledger`
    pub fn new(ledger: Arc<QuotaLedger>) -> Self {
        Self {
            ledger,
            reservations: Mutex::new(HashMap::new()),
        }
    }

    /// Decide whether an upload of `incoming_bytes` is accepted.
    ///
    /// On `Err` the caller must remove the already-received file.
    pub async fn admit(
        &self,
        user_id: Option<UserId>,
        incoming_bytes: u64,
    ) -> Result<Admitted, QuotaExceeded> {
        let Some(user_id) = user_id else {
            tracing::info!(incoming_bytes, decision = "anonymous", "admission decision");
            return Ok(Admitted::Anonymous);
        };

        match self.ledger.check_admission(user_id, incoming_bytes).await {
            Ok(check) if check.can_upload => {
                tracing::info!(
                    user_id,
                    incoming_bytes,
                    current_usage = check.current_usage,
                    limit = check.limit,
                    decision = "admitted",
                    "admission decision"
                );
                Ok(Admitted::WithinQuota(check))
            }
            Ok(check) => {
                tracing::info!(
                    user_id,
                    incoming_bytes,
                    current_usage = check.current_usage,
                    projected_total = check.projected_total,
                    limit = check.limit,
                    decision = "rejected",
                    "admission decision"
                );
                Err(QuotaExceeded::from(check))
            }
            Err(e) => {
                tracing::error!(
                    user_id,
                    incoming_bytes,
                    error = %e,
                    decision = "fail_open",
                    "admission decision"
                );
                Ok(Admitted::FailOpen)
            }
        }
    }

    /// Hold `bytes` of the user's quota. Outstanding holds count as used for
    /// later `reserve` calls. Ledger errors are returned, not failed open.
    pub async fn reserve(&self, user_id: UserId, bytes: u64) -> Result<Reservation, QuotaError> {
        let info = self.ledger.storage_info(user_id).await?;

        let mut pending = self.lock_reservations();
        let held = held_by(&pending, user_id);
        let check = AdmissionCheck::evaluate_with_held(&info, held, bytes);

        if !check.can_upload {
            return Err(QuotaError::QuotaExceeded(QuotaExceeded::from(check)));
        }

        let reservation = Reservation {
            id: Uuid::new_v4(),
            user_id,
            bytes: check.projected_total - check.current_usage,
        };
        pending.insert(reservation.id, reservation);

        Ok(reservation)
    }

    /// The note for this reservation is written; drop the hold.
    /// Returns false for an unknown or already settled reservation.
    pub fn commit(&self, reservation_id: Uuid) -> bool {
        self.lock_reservations().remove(&reservation_id).is_some()
    }

    /// The upload was abandoned; drop the hold.
    pub fn release(&self, reservation_id: Uuid) -> bool {
        self.lock_reservations().remove(&reservation_id).is_some()
    }

    /// Bytes currently held for `user_id`
    pub fn held_bytes(&self, user_id: UserId) -> i64 {
        held_by(&self.lock_reservations(), user_id)
    }

    fn lock_reservations(&self) -> std::sync::MutexGuard<'_, HashMap<Uuid, Reservation>> {
        self.reservations.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn held_by(pending: &HashMap<Uuid, Reservation>, user_id: UserId) -> i64 {
    pending
        .values()
        .filter(|r| r.user_id == user_id)
        .map(|r| r.bytes)
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::SqliteStore;

    async fn gate_with_user(limit: i64) -> (UploadAdmission, UserId) {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let user = store.create_user("ada", "ada@example.com", Some(limit)).await.unwrap();
        let ledger = Arc::new(QuotaLedger::new(store));
        (UploadAdmission::new(ledger), user.id)
    }

    #[tokio::test]
    async fn test_anonymous_upload_skips_check() {
        let (gate, _) = gate_with_user(0).await;
        let admitted = gate.admit(None, u64::MAX).await.unwrap();
        assert_eq!(admitted, Admitted::Anonymous);
    }

    #[tokio::test]
    async fn test_reservations_accumulate() {
        let (gate, user_id) = gate_with_user(1000).await;

        let first = gate.reserve(user_id, 600).await.unwrap();
        assert_eq!(gate.held_bytes(user_id), 600);

        let err = gate.reserve(user_id, 500).await.unwrap_err();
        match err {
            QuotaError::QuotaExceeded(exceeded) => {
                assert_eq!(exceeded.current_usage, 600);
                assert_eq!(exceeded.projected_total, 1100);
            }
            other => panic!("expected QuotaExceeded, got {:?}", other),
        }

        assert!(gate.release(first.id));
        assert!(!gate.release(first.id));
        assert!(gate.reserve(user_id, 500).await.is_ok());
    }
}
