//! HTTP API Integration Tests
//!
//! Drives the router in-process with `tower::ServiceExt::oneshot`.

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use classnote::domain::{NewNote, User};
use classnote::retention::{LocalAudioStorage, RetentionPolicy};
use classnote::server::{build_router, AppState, StaticTokenVerifier};
use classnote::store::SqliteStore;
use filetime::FileTime;
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt;

struct TestApp {
    router: Router,
    store: Arc<SqliteStore>,
    user: User,
    audio_dir: TempDir,
}

/// User "ada" (token `tok-ada`) has 800 of 1000 bytes used; user "root"
/// holds the admin token `tok-admin`.
async fn setup() -> TestApp {
    let audio_dir = TempDir::new().unwrap();
    let store = Arc::new(SqliteStore::open_in_memory().unwrap());

    let user = store
        .create_user("ada", "ada@example.com", Some(1000))
        .await
        .unwrap();
    let admin = store
        .create_user("root", "root@example.com", None)
        .await
        .unwrap();
    store
        .create_note(
            user.id,
            NewNote {
                title: "Existing".to_string(),
                file_size: Some(800),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let tokens = StaticTokenVerifier::new()
        .with_token("tok-ada", user.id)
        .with_admin_token("tok-admin", admin.id);
    let audio = Arc::new(LocalAudioStorage::new(audio_dir.path().to_path_buf()));
    let state = AppState::new(store.clone(), audio, Arc::new(tokens), RetentionPolicy::default());

    TestApp {
        router: build_router(state),
        store,
        user,
        audio_dir,
    }
}

fn request(method: Method, uri: &str, token: Option<&str>, body: Body) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    builder.body(body).unwrap()
}

fn json_request(method: Method, uri: &str, token: Option<&str>, value: Value) -> Request<Body> {
    let mut req = request(method, uri, token, Body::from(value.to_string()));
    req.headers_mut()
        .insert(header::CONTENT_TYPE, "application/json".parse().unwrap());
    req
}

async fn send(app: &TestApp, req: Request<Body>) -> (StatusCode, Value) {
    let response = app.router.clone().oneshot(req).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

fn file_count(dir: &Path) -> usize {
    match std::fs::read_dir(dir) {
        Ok(entries) => entries.count(),
        Err(_) => 0,
    }
}

#[tokio::test]
async fn test_storage_requires_token() {
    let app = setup().await;

    let (status, _) = send(&app, request(Method::GET, "/storage", None, Body::empty())).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = send(&app, request(Method::GET, "/storage", Some("bogus"), Body::empty())).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_storage_reports_usage() {
    let app = setup().await;

    let (status, body) = send(&app, request(Method::GET, "/storage", Some("tok-ada"), Body::empty())).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["storage"]["limitBytes"], 1000);
    assert_eq!(body["storage"]["usedBytes"], 800);
    assert_eq!(body["storage"]["remainingBytes"], 200);
}

#[tokio::test]
async fn test_over_quota_upload_is_rejected_and_removed() {
    let app = setup().await;

    let req = request(
        Method::POST,
        "/transcribe?filename=lecture.mp3",
        Some("tok-ada"),
        Body::from(vec![1u8; 300]),
    );
    let (status, body) = send(&app, req).await;

    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(body["error"], "Storage limit exceeded");
    assert_eq!(body["currentUsage"], 800);
    assert_eq!(body["projectedTotal"], 1100);
    assert_eq!(body["limit"], 1000);
    assert_eq!(body["remaining"], 200);

    assert_eq!(file_count(app.audio_dir.path()), 0);

    // Usage is unchanged
    let (_, storage) = send(&app, request(Method::GET, "/storage", Some("tok-ada"), Body::empty())).await;
    assert_eq!(storage["storage"]["usedBytes"], 800);
}

#[tokio::test]
async fn test_upload_within_quota_creates_note() {
    let app = setup().await;

    let req = request(
        Method::POST,
        "/transcribe?title=Algorithms&filename=lecture.MP3",
        Some("tok-ada"),
        Body::from(vec![1u8; 200]),
    );
    let (status, body) = send(&app, req).await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["fileSize"], 200);
    assert_eq!(body["note"]["title"], "Algorithms");
    assert_eq!(body["note"]["fileSize"], 200);

    let filename = body["filename"].as_str().unwrap();
    assert!(filename.ends_with(".mp3"));
    assert!(app.audio_dir.path().join(filename).exists());

    let (_, storage) = send(&app, request(Method::GET, "/storage", Some("tok-ada"), Body::empty())).await;
    assert_eq!(storage["storage"]["usedBytes"], 1000);
    assert_eq!(storage["storage"]["remainingBytes"], 0);
}

#[tokio::test]
async fn test_anonymous_upload_is_processed_without_note() {
    let app = setup().await;

    let req = request(Method::POST, "/transcribe", None, Body::from(vec![1u8; 5000]));
    let (status, body) = send(&app, req).await;

    assert_eq!(status, StatusCode::OK);
    assert!(!body["text"].as_str().unwrap().is_empty());
    assert!(body.get("note").is_none());
}

#[tokio::test]
async fn test_empty_upload_is_rejected() {
    let app = setup().await;

    let (status, _) = send(&app, request(Method::POST, "/transcribe", Some("tok-ada"), Body::empty())).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_set_limit_requires_admin_and_validates() {
    let app = setup().await;
    let uri = format!("/storage/limit/{}", app.user.id);

    let (status, _) = send(&app, json_request(Method::PUT, &uri, Some("tok-ada"), json!({"limitBytes": 5000}))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = send(&app, json_request(Method::PUT, &uri, Some("tok-admin"), json!({"limitBytes": -5}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(&app, json_request(Method::PUT, &uri, Some("tok-admin"), json!({"limitBytes": "lots"}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = send(&app, json_request(Method::PUT, &uri, Some("tok-admin"), json!({"limitBytes": 5000}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["storage"]["limitBytes"], 5000);
    assert_eq!(body["storage"]["remainingBytes"], 4200);

    let (status, _) = send(&app, json_request(Method::PUT, "/storage/limit/9999", Some("tok-admin"), json!({"limitBytes": 1}))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_cleanup_now_and_status() {
    let app = setup().await;

    let old = app.audio_dir.path().join("old.mp3");
    std::fs::write(&old, vec![0u8; 42]).unwrap();
    let modified = SystemTime::now() - Duration::from_secs(48 * 3600);
    filetime::set_file_mtime(&old, FileTime::from_system_time(modified)).unwrap();

    let (status, body) = send(&app, request(Method::GET, "/audio/cleanup-status", Some("tok-ada"), Body::empty())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["totalFiles"], 1);
    assert_eq!(body["filesToDelete"], 1);
    assert_eq!(body["bytesToFree"], 42);
    assert_eq!(body["retentionWindowSecs"], 86_400);

    let (status, body) = send(&app, request(Method::POST, "/audio/cleanup-now", Some("tok-ada"), Body::empty())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["deletedCount"], 1);
    assert_eq!(body["freedBytes"], 42);
    assert!(!old.exists());
}

#[tokio::test]
async fn test_swept_note_audio_is_gone_but_note_remains() {
    let app = setup().await;

    let req = request(
        Method::POST,
        "/transcribe?filename=talk.wav",
        Some("tok-ada"),
        Body::from(vec![1u8; 100]),
    );
    let (_, body) = send(&app, req).await;
    let note_id = body["note"]["id"].as_i64().unwrap();
    let filename = body["filename"].as_str().unwrap().to_string();

    let uri = format!("/notes/{}/audio", note_id);
    let response = app
        .router
        .clone()
        .oneshot(request(Method::GET, &uri, Some("tok-ada"), Body::empty()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "audio/wav");

    let path = app.audio_dir.path().join(&filename);
    let modified = SystemTime::now() - Duration::from_secs(30 * 3600);
    filetime::set_file_mtime(&path, FileTime::from_system_time(modified)).unwrap();
    send(&app, request(Method::POST, "/audio/cleanup-now", Some("tok-ada"), Body::empty())).await;

    let (status, _) = send(&app, request(Method::GET, &uri, Some("tok-ada"), Body::empty())).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let note = app.store.get_note(note_id, app.user.id).await.unwrap().unwrap();
    assert_eq!(note.file_size, None);
    assert!(note.transcription_text.is_some());
}

#[tokio::test]
async fn test_upload_rejects_unknown_or_foreign_category() {
    let app = setup().await;
    let other = app
        .store
        .create_user("bob", "bob@example.com", None)
        .await
        .unwrap();
    let foreign = app
        .store
        .create_category(other.id, "Bob's", "#ff0000")
        .await
        .unwrap();

    for category_id in [999, foreign.id] {
        let uri = format!("/transcribe?filename=a.mp3&category_id={}", category_id);
        let req = request(Method::POST, &uri, Some("tok-ada"), Body::from(vec![1u8; 50]));
        let (status, body) = send(&app, req).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "validation_error");
        assert_eq!(file_count(app.audio_dir.path()), 0);
    }

    // Built-in categories are shared by every user
    let builtin = app
        .store
        .categories_for_user(app.user.id)
        .await
        .unwrap()
        .into_iter()
        .find(|c| c.user_id.is_none())
        .unwrap();
    let uri = format!("/transcribe?filename=a.mp3&category_id={}", builtin.id);
    let req = request(Method::POST, &uri, Some("tok-ada"), Body::from(vec![1u8; 50]));
    let (status, body) = send(&app, req).await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["note"]["categoryName"], builtin.name.as_str());
}
