//! HTTP error mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

use crate::quota::{QuotaError, QuotaExceeded};
use crate::retention::StorageError;
use crate::store::StoreError;

/// Errors returned by request handlers
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Access token required")]
    Unauthorized,

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    QuotaExceeded(QuotaExceeded),

    #[error("{0}")]
    Internal(String),
}

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
    code: &'static str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct QuotaExceededBody {
    error: String,
    code: &'static str,
    #[serde(flatten)]
    usage: QuotaExceeded,
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::QuotaExceeded(_) => StatusCode::PAYLOAD_TOO_LARGE,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn code(&self) -> &'static str {
        match self {
            Self::Unauthorized => "unauthorized",
            Self::Forbidden(_) => "forbidden",
            Self::Validation(_) => "validation_error",
            Self::NotFound(_) => "not_found",
            Self::QuotaExceeded(_) => "quota_exceeded",
            Self::Internal(_) => "internal_error",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let code = self.code();

        match self {
            Self::QuotaExceeded(usage) => {
                let body = QuotaExceededBody {
                    error: "Storage limit exceeded".to_string(),
                    code,
                    usage,
                };
                (status, Json(body)).into_response()
            }
            other => {
                if let Self::Internal(ref message) = other {
                    tracing::error!("Request failed: {}", message);
                }
                let body = ErrorBody {
                    error: other.to_string(),
                    code,
                };
                (status, Json(body)).into_response()
            }
        }
    }
}

impl From<QuotaError> for ApiError {
    fn from(err: QuotaError) -> Self {
        match err {
            QuotaError::Validation(message) => Self::Validation(message),
            QuotaError::NotFound(_) => Self::NotFound("User not found".to_string()),
            QuotaError::QuotaExceeded(usage) => Self::QuotaExceeded(usage),
            QuotaError::Store(e) => Self::from(e),
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::UserNotFound(_) => Self::NotFound("User not found".to_string()),
            other => Self::Internal(other.to_string()),
        }
    }
}

impl From<StorageError> for ApiError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound(_) => Self::NotFound("Audio file not found".to_string()),
            StorageError::InvalidName(name) => Self::Validation(format!("Invalid audio file name: {:?}", name)),
            other => Self::Internal(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(ApiError::Unauthorized.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            ApiError::from(QuotaError::Validation("bad".to_string())).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::from(QuotaError::NotFound(3)).status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ApiError::from(StorageError::NotFound("a.mp3".to_string())).status(),
            StatusCode::NOT_FOUND
        );
    }

    #[test]
    fn test_quota_exceeded_maps_to_413() {
        let usage = QuotaExceeded {
            current_usage: 800,
            projected_total: 1100,
            limit: 1000,
            remaining: 200,
        };
        let response = ApiError::QuotaExceeded(usage).into_response();
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }
}
