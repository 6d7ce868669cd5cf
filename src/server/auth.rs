//! Bearer-token authentication.
//!
//! Token issuing is handled elsewhere; this module only maps a presented
//! token to a user through a [`TokenVerifier`].

use std::collections::HashMap;

use async_trait::async_trait;
use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;

use super::error::ApiError;
use super::AppState;
use crate::config::AuthConfig;
use crate::domain::UserId;

/// The caller behind a verified token
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Principal {
    pub user_id: UserId,
    pub is_admin: bool,
}

/// Maps bearer tokens to principals
#[async_trait]
pub trait TokenVerifier: Send + Sync {
    /// `None` for an unknown, expired or malformed token
    async fn verify(&self, token: &str) -> Option<Principal>;
}

/// Fixed token table, loaded from configuration
#[derive(Debug, Clone, Default)]
pub struct StaticTokenVerifier {
    tokens: HashMap<String, Principal>,
}

impl StaticTokenVerifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accept `token` for `user_id`
    pub fn with_token(mut self, token: &str, user_id: UserId) -> Self {
        self.tokens.insert(
            token.to_string(),
            Principal {
                user_id,
                is_admin: false,
            },
        );
        self
    }

    /// Accept `token` for `user_id` with admin rights
    pub fn with_admin_token(mut self, token: &str, user_id: UserId) -> Self {
        self.tokens.insert(
            token.to_string(),
            Principal {
                user_id,
                is_admin: true,
            },
        );
        self
    }

    /// Build from the `auth` section of the config
    pub fn from_config(config: &AuthConfig) -> Self {
        let verifier = config
            .tokens
            .iter()
            .fold(Self::new(), |v, (token, user_id)| v.with_token(token, *user_id));
        config
            .admin_tokens
            .iter()
            .fold(verifier, |v, (token, user_id)| v.with_admin_token(token, *user_id))
    }
}

#[async_trait]
impl TokenVerifier for StaticTokenVerifier {
    async fn verify(&self, token: &str) -> Option<Principal> {
        self.tokens.get(token).copied()
    }
}

/// Extract the token from `Authorization: Bearer <token>`
fn bearer_token(parts: &Parts) -> Option<String> {
    let header = parts.headers.get(AUTHORIZATION)?.to_str().ok()?;
    let token = header.strip_prefix("Bearer ")?.trim();
    (!token.is_empty()).then(|| token.to_string())
}

/// A request from an authenticated user. Missing token: 401; unknown token: 403.
#[derive(Debug, Clone, Copy)]
pub struct AuthUser(pub Principal);

#[async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts).ok_or(ApiError::Unauthorized)?;
        let principal = state
            .tokens
            .verify(&token)
            .await
            .ok_or_else(|| ApiError::Forbidden("Invalid or expired token".to_string()))?;
        Ok(Self(principal))
    }
}

/// A request that may carry a token. Invalid tokens are treated as anonymous.
#[derive(Debug, Clone, Copy)]
pub struct MaybeAuthUser(pub Option<Principal>);

#[async_trait]
impl FromRequestParts<AppState> for MaybeAuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let principal = match bearer_token(parts) {
            Some(token) => state.tokens.verify(&token).await,
            None => None,
        };
        Ok(Self(principal))
    }
}
