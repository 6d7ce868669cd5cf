//! Quota Integration Tests
//!
//! Storage accounting and upload admission against a real SQLite store.

use std::sync::Arc;

use async_trait::async_trait;
use classnote::domain::{NewNote, User, UserId};
use classnote::quota::{Admitted, QuotaError, QuotaLedger, UploadAdmission};
use classnote::store::{NoteStore, SqliteStore, StoreError};
use tokio_test::{assert_err, assert_ok};

/// A user with a 1000 byte limit and one 800 byte note
async fn user_with_usage(store: &SqliteStore) -> User {
    let user = store
        .create_user("ada", "ada@example.com", Some(1000))
        .await
        .unwrap();
    store
        .create_note(
            user.id,
            NewNote {
                title: "Week 1".to_string(),
                original_filename: Some("week1.mp3".to_string()),
                file_size: Some(800),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    user
}

fn services(store: Arc<SqliteStore>) -> (Arc<QuotaLedger>, UploadAdmission) {
    let ledger = Arc::new(QuotaLedger::new(store));
    let admission = UploadAdmission::new(Arc::clone(&ledger));
    (ledger, admission)
}

#[tokio::test]
async fn test_storage_info_sums_note_sizes() {
    let store = Arc::new(SqliteStore::open_in_memory().unwrap());
    let user = user_with_usage(&store).await;

    // Notes without a size count as zero
    store
        .create_note(
            user.id,
            NewNote {
                title: "Typed note".to_string(),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let (ledger, _) = services(store);
    let info = ledger.storage_info(user.id).await.unwrap();

    assert_eq!(info.limit_bytes, 1000);
    assert_eq!(info.used_bytes, 800);
    assert_eq!(info.remaining_bytes, 200);
}

#[tokio::test]
async fn test_upload_exactly_filling_quota_is_admitted() {
    let store = Arc::new(SqliteStore::open_in_memory().unwrap());
    let user = user_with_usage(&store).await;
    let (_, admission) = services(store);

    let admitted = assert_ok!(admission.admit(Some(user.id), 200).await);
    match admitted {
        Admitted::WithinQuota(check) => {
            assert!(check.can_upload);
            assert_eq!(check.projected_total, 1000);
        }
        other => panic!("expected WithinQuota, got {:?}", other),
    }
}

#[tokio::test]
async fn test_upload_one_byte_over_is_rejected() {
    let store = Arc::new(SqliteStore::open_in_memory().unwrap());
    let user = user_with_usage(&store).await;
    let (_, admission) = services(store);

    let exceeded = assert_err!(admission.admit(Some(user.id), 201).await);
    assert_eq!(exceeded.current_usage, 800);
    assert_eq!(exceeded.projected_total, 1001);
    assert_eq!(exceeded.limit, 1000);
    assert_eq!(exceeded.remaining, 200);
}

#[tokio::test]
async fn test_check_admission_against_ledger() {
    let store = Arc::new(SqliteStore::open_in_memory().unwrap());
    let user = user_with_usage(&store).await;
    let (ledger, _) = services(store);

    let fits = ledger.check_admission(user.id, 150).await.unwrap();
    assert!(fits.can_upload);
    assert_eq!(fits.current_usage, 800);
    assert_eq!(fits.projected_total, 950);
    assert_eq!(fits.limit, 1000);
    assert_eq!(fits.remaining, 200);

    let too_big = ledger.check_admission(user.id, 300).await.unwrap();
    assert!(!too_big.can_upload);
    assert_eq!(too_big.projected_total, 1100);
    assert_eq!(too_big.remaining, 200);
}

#[tokio::test]
async fn test_check_admission_does_not_change_usage() {
    let store = Arc::new(SqliteStore::open_in_memory().unwrap());
    let user = user_with_usage(&store).await;
    let (ledger, _) = services(store);

    let before = ledger.storage_info(user.id).await.unwrap();
    for incoming in [0, 200, 201, 5_000] {
        ledger.check_admission(user.id, incoming).await.unwrap();
    }
    let after = ledger.storage_info(user.id).await.unwrap();

    assert_eq!(before, after);
}

#[tokio::test]
async fn test_negative_limit_leaves_limit_unchanged() {
    let store = Arc::new(SqliteStore::open_in_memory().unwrap());
    let user = user_with_usage(&store).await;
    let (ledger, _) = services(store);

    let err = ledger.set_limit(user.id, -5).await.unwrap_err();
    assert!(matches!(err, QuotaError::Validation(_)));

    let info = ledger.storage_info(user.id).await.unwrap();
    assert_eq!(info.limit_bytes, 1000);
}

#[tokio::test]
async fn test_lowering_limit_below_usage() {
    let store = Arc::new(SqliteStore::open_in_memory().unwrap());
    let user = user_with_usage(&store).await;
    let (ledger, admission) = services(store);

    let info = ledger.set_limit(user.id, 500).await.unwrap();
    assert_eq!(info.limit_bytes, 500);
    assert_eq!(info.used_bytes, 800);
    assert_eq!(info.remaining_bytes, -300);

    // Even an empty upload no longer fits
    assert_ok!(ledger.check_admission(user.id, 0).await);
    assert_err!(admission.admit(Some(user.id), 1).await);
}

#[tokio::test]
async fn test_unknown_user_is_not_found() {
    let store = Arc::new(SqliteStore::open_in_memory().unwrap());
    let (ledger, _) = services(store);

    let err = ledger.storage_info(42).await.unwrap_err();
    assert!(matches!(err, QuotaError::NotFound(42)));

    let err = ledger.set_limit(42, 100).await.unwrap_err();
    assert!(matches!(err, QuotaError::NotFound(42)));
}

#[tokio::test]
async fn test_anonymous_upload_skips_quota() {
    let store = Arc::new(SqliteStore::open_in_memory().unwrap());
    let (_, admission) = services(store);

    let admitted = assert_ok!(admission.admit(None, u64::MAX).await);
    assert_eq!(admitted, Admitted::Anonymous);
}

/// A store whose every query fails
struct FailingStore;

#[async_trait]
impl NoteStore for FailingStore {
    async fn get_user(&self, _user_id: UserId) -> Result<Option<User>, StoreError> {
        Err(StoreError::Task("database unavailable".to_string()))
    }

    async fn sum_file_sizes_for_user(&self, _user_id: UserId) -> Result<i64, StoreError> {
        Err(StoreError::Task("database unavailable".to_string()))
    }

    async fn set_user_limit(&self, _user_id: UserId, _limit_bytes: i64) -> Result<(), StoreError> {
        Err(StoreError::Task("database unavailable".to_string()))
    }
}

#[tokio::test]
async fn test_ledger_failure_admits_upload() {
    let ledger = Arc::new(QuotaLedger::new(Arc::new(FailingStore)));
    let admission = UploadAdmission::new(Arc::clone(&ledger));

    let admitted = assert_ok!(admission.admit(Some(1), 10_000).await);
    assert_eq!(admitted, Admitted::FailOpen);

    // The ledger itself still reports the failure
    assert!(matches!(
        ledger.storage_info(1).await.unwrap_err(),
        QuotaError::Store(_)
    ));
}

#[tokio::test]
async fn test_reservations_hold_quota_until_settled() {
    let store = Arc::new(SqliteStore::open_in_memory().unwrap());
    let user = user_with_usage(&store).await;
    let (_, admission) = services(store);

    let first = admission.reserve(user.id, 150).await.unwrap();
    assert_eq!(admission.held_bytes(user.id), 150);

    // 800 used + 150 held + 100 > 1000
    let err = admission.reserve(user.id, 100).await.unwrap_err();
    match err {
        QuotaError::QuotaExceeded(exceeded) => {
            assert_eq!(exceeded.current_usage, 950);
            assert_eq!(exceeded.remaining, 50);
        }
        other => panic!("expected QuotaExceeded, got {:?}", other),
    }

    assert!(admission.release(first.id));
    assert!(!admission.release(first.id));
    assert_eq!(admission.held_bytes(user.id), 0);

    let second = admission.reserve(user.id, 100).await.unwrap();
    assert!(admission.commit(second.id));
    assert_eq!(admission.held_bytes(user.id), 0);
}
