//! Storage quota endpoints.

use axum::extract::{Path, State};
use axum::Json;
use serde::Serialize;
use serde_json::Value;

use super::auth::AuthUser;
use super::error::{ApiError, ApiResult};
use super::AppState;
use crate::domain::{StorageInfo, UserId};
use crate::quota::limit_from_json;

#[derive(Debug, Serialize)]
pub struct StorageResponse {
    pub storage: StorageInfo,
}

/// `GET /storage`: the caller's limit, usage and remaining bytes
pub async fn get_storage(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
) -> ApiResult<Json<StorageResponse>> {
    let storage = state.ledger.storage_info(principal.user_id).await?;
    Ok(Json(StorageResponse { storage }))
}

/// `PUT /storage/limit/:user_id` with `{"limitBytes": n}`. Admin only.
pub async fn set_limit(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
    Path(user_id): Path<UserId>,
    Json(body): Json<Value>,
) -> ApiResult<Json<StorageResponse>> {
    if !principal.is_admin {
        return Err(ApiError::Forbidden("Admin rights required".to_string()));
    }

    let limit = limit_from_json(body.get("limitBytes"))?;
    let storage = state.ledger.set_limit(user_id, limit).await?;

    tracing::info!(
        user_id,
        limit_bytes = limit,
        changed_by = principal.user_id,
        "Storage limit updated"
    );
    Ok(Json(StorageResponse { storage }))
}
