//! Upload, processing and cleanup endpoints.

use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::Utc;
use serde::{Deserialize, Serialize};

use super::auth::{AuthUser, MaybeAuthUser};
use super::error::{ApiError, ApiResult};
use super::AppState;
use crate::domain::{NewNote, Note, UserId};
use crate::retention::{AudioStorage, CleanupStatus, LocalAudioStorage, SweepSummary};

/// Query parameters accompanying a raw audio body
#[derive(Debug, Default, Deserialize)]
pub struct UploadParams {
    pub title: Option<String>,
    pub filename: Option<String>,
    pub category_id: Option<i64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TranscribeResponse {
    pub text: String,
    pub summary: String,
    pub filename: String,
    pub file_size: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<Note>,
}

/// `POST /transcribe`
///
/// The body is stored first so its exact size is known, then admitted
/// against the uploader's quota. A rejected or failed upload is removed
/// before the error is returned. Anonymous uploads are processed but no
/// note is saved.
pub async fn transcribe(
    State(state): State<AppState>,
    MaybeAuthUser(principal): MaybeAuthUser,
    Query(params): Query<UploadParams>,
    body: Bytes,
) -> ApiResult<(StatusCode, Json<TranscribeResponse>)> {
    if body.is_empty() {
        return Err(ApiError::Validation("No audio file provided".to_string()));
    }

    let user_id = principal.map(|p| p.user_id);
    if let (Some(user_id), Some(category_id)) = (user_id, params.category_id) {
        ensure_category(&state, user_id, category_id).await?;
    }

    let name = LocalAudioStorage::generate_name(params.filename.as_deref());
    let stored = state.audio.write(&name, &body).await?;

    if let Err(exceeded) = state.admission.admit(user_id, stored.size_bytes).await {
        discard_upload(&state, &name).await;
        return Err(ApiError::QuotaExceeded(exceeded));
    }

    let (text, summary) = match process(&state, &name).await {
        Ok(output) => output,
        Err(e) => {
            discard_upload(&state, &name).await;
            return Err(ApiError::Internal(format!("Failed to process audio: {:#}", e)));
        }
    };

    let note = match user_id {
        Some(user_id) => {
            let title = params
                .title
                .filter(|t| !t.trim().is_empty())
                .unwrap_or_else(|| format!("Lecture {}", Utc::now().format("%Y-%m-%d %H:%M")));
            let new_note = NewNote {
                title,
                original_filename: Some(name.clone()),
                transcription_text: Some(text.clone()),
                summary_text: Some(summary.clone()),
                file_size: i64::try_from(stored.size_bytes).ok(),
                category_id: params.category_id,
            };
            match state.store.create_note(user_id, new_note).await {
                Ok(note) => Some(note),
                Err(e) => {
                    discard_upload(&state, &name).await;
                    return Err(e.into());
                }
            }
        }
        None => None,
    };

    let status = if note.is_some() {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };

    Ok((
        status,
        Json(TranscribeResponse {
            text,
            summary,
            filename: name,
            file_size: stored.size_bytes,
            note,
        }),
    ))
}

async fn process(state: &AppState, name: &str) -> anyhow::Result<(String, String)> {
    let path = state.audio.path_for(name)?;
    let text = state.processor.transcribe(&path).await?;
    let summary = state.processor.summarize(&text).await?;
    Ok((text, summary))
}

/// The category must be one of the user's own or a built-in one
async fn ensure_category(state: &AppState, user_id: UserId, category_id: i64) -> ApiResult<()> {
    let categories = state.store.categories_for_user(user_id).await?;
    if categories.iter().any(|c| c.id == category_id) {
        Ok(())
    } else {
        Err(ApiError::Validation(format!("Unknown category: {}", category_id)))
    }
}

async fn discard_upload(state: &AppState, name: &str) {
    if let Err(e) = state.audio.delete_entry(name).await {
        tracing::warn!("Failed to remove discarded upload {}: {}", name, e);
    }
}

#[derive(Debug, Deserialize)]
pub struct SummarizeRequest {
    pub text: String,
}

#[derive(Debug, Serialize)]
pub struct SummarizeResponse {
    pub summary: String,
}

/// `POST /summarize` with `{"text": "..."}`
pub async fn summarize(
    State(state): State<AppState>,
    Json(request): Json<SummarizeRequest>,
) -> ApiResult<Json<SummarizeResponse>> {
    if request.text.trim().is_empty() {
        return Err(ApiError::Validation("Text is required".to_string()));
    }

    let summary = state
        .processor
        .summarize(&request.text)
        .await
        .map_err(|e| ApiError::Internal(format!("Failed to summarize: {:#}", e)))?;
    Ok(Json(SummarizeResponse { summary }))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CleanupStatusResponse {
    #[serde(flatten)]
    pub status: CleanupStatus,
    pub retention_window_secs: u64,
    pub sweep_interval_secs: u64,
}

/// `GET /audio/cleanup-status`: what the next sweep would remove
pub async fn cleanup_status(
    State(state): State<AppState>,
    AuthUser(_): AuthUser,
) -> Json<CleanupStatusResponse> {
    let policy = *state.sweeper.policy();
    let status = state.sweeper.status().await;
    Json(CleanupStatusResponse {
        status,
        retention_window_secs: policy.retention_window.as_secs(),
        sweep_interval_secs: policy.sweep_interval.as_secs(),
    })
}

/// `POST /audio/cleanup-now`: run one sweep cycle immediately
pub async fn cleanup_now(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
) -> Json<SweepSummary> {
    tracing::info!(user_id = principal.user_id, "Manual cleanup requested");
    Json(state.sweeper.run_cleanup_once().await)
}
