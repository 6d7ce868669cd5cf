//! Note, category and stats endpoints.

use axum::extract::{Path, Query, State};
use axum::http::header::CONTENT_TYPE;
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};

use super::auth::AuthUser;
use super::error::{ApiError, ApiResult};
use super::AppState;
use crate::domain::{Category, Note, UserStats, DEFAULT_CATEGORY_COLOR};
use crate::retention::{AudioStorage, StorageError};

const DEFAULT_PAGE_SIZE: u32 = 50;
const MAX_PAGE_SIZE: u32 = 500;

#[derive(Debug, Default, Deserialize)]
pub struct ListParams {
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct NotesResponse {
    pub notes: Vec<Note>,
}

pub async fn list_notes(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
    Query(params): Query<ListParams>,
) -> ApiResult<Json<NotesResponse>> {
    let limit = params.limit.unwrap_or(DEFAULT_PAGE_SIZE).min(MAX_PAGE_SIZE);
    let offset = params.offset.unwrap_or(0);
    let notes = state.store.notes_for_user(principal.user_id, limit, offset).await?;
    Ok(Json(NotesResponse { notes }))
}

pub async fn get_note(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
    Path(id): Path<i64>,
) -> ApiResult<Json<Note>> {
    state
        .store
        .get_note(id, principal.user_id)
        .await?
        .map(Json)
        .ok_or_else(note_not_found)
}

pub async fn search_notes(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
    Path(term): Path<String>,
) -> ApiResult<Json<NotesResponse>> {
    let notes = state.store.search_notes(principal.user_id, &term).await?;
    Ok(Json(NotesResponse { notes }))
}

#[derive(Debug, Serialize)]
pub struct DeleteResponse {
    pub id: i64,
    pub deleted: bool,
}

/// Delete a note and its audio file (if still present)
pub async fn delete_note(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
    Path(id): Path<i64>,
) -> ApiResult<Json<DeleteResponse>> {
    let note = state
        .store
        .delete_note(id, principal.user_id)
        .await?
        .ok_or_else(note_not_found)?;

    if let Some(name) = note.original_filename.as_deref() {
        match state.audio.delete_entry(name).await {
            Ok(()) | Err(StorageError::NotFound(_)) => {}
            Err(e) => tracing::warn!("Failed to remove audio for note {}: {}", id, e),
        }
    }

    Ok(Json(DeleteResponse { id, deleted: true }))
}

/// Stream back a note's audio. 404 once the sweeper has removed it.
pub async fn get_note_audio(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
    Path(id): Path<i64>,
) -> ApiResult<impl IntoResponse> {
    let note = state
        .store
        .get_note(id, principal.user_id)
        .await?
        .ok_or_else(note_not_found)?;

    let name = note
        .original_filename
        .ok_or_else(|| ApiError::NotFound("Note has no audio".to_string()))?;

    let bytes = match state.audio.read(&name).await {
        Ok(bytes) => bytes,
        Err(StorageError::NotFound(_)) => {
            return Err(ApiError::NotFound("Audio file no longer available".to_string()))
        }
        Err(e) => return Err(e.into()),
    };

    Ok(([(CONTENT_TYPE, audio_content_type(&name))], bytes))
}

#[derive(Debug, Serialize)]
pub struct CategoriesResponse {
    pub categories: Vec<Category>,
}

pub async fn list_categories(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
) -> ApiResult<Json<CategoriesResponse>> {
    let categories = state.store.categories_for_user(principal.user_id).await?;
    Ok(Json(CategoriesResponse { categories }))
}

#[derive(Debug, Deserialize)]
pub struct NewCategoryRequest {
    pub name: String,
    pub color: Option<String>,
}

pub async fn create_category(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
    Json(request): Json<NewCategoryRequest>,
) -> ApiResult<Json<Category>> {
    let name = request.name.trim();
    if name.is_empty() {
        return Err(ApiError::Validation("Category name is required".to_string()));
    }
    let color = request.color.as_deref().unwrap_or(DEFAULT_CATEGORY_COLOR);

    let category = state.store.create_category(principal.user_id, name, color).await?;
    Ok(Json(category))
}

pub async fn get_stats(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
) -> ApiResult<Json<UserStats>> {
    Ok(Json(state.store.user_stats(principal.user_id).await?))
}

fn note_not_found() -> ApiError {
    ApiError::NotFound("Note not found".to_string())
}

/// Content type from the stored file's extension
fn audio_content_type(name: &str) -> &'static str {
    let extension = name.rsplit_once('.').map(|(_, ext)| ext).unwrap_or_default();
    match extension {
        "mp3" => "audio/mpeg",
        "wav" => "audio/wav",
        "m4a" | "mp4" => "audio/mp4",
        "ogg" | "oga" => "audio/ogg",
        "webm" => "audio/webm",
        "flac" => "audio/flac",
        "aac" => "audio/aac",
        _ => "application/octet-stream",
    }
}
