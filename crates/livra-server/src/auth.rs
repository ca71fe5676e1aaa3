// Copyright (C) 2025 Livra Contributors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Authentication and ownership checks.
//!
//! Token verification is delegated to an [`AuthResolver`]; the server ships
//! a static token map for development and tests, with a hosted provider
//! expected in deployment. Users are created lazily the first time a token
//! resolves.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use axum::http::HeaderMap;

use livra_core::model::UserRecord;
use livra_core::persistence::Persistence;

use crate::error::ApiError;

/// Resolves a bearer token to an auth-provider subject.
#[async_trait]
pub trait AuthResolver: Send + Sync {
    /// The subject for this token, or None if the token is invalid.
    async fn resolve(&self, token: &str) -> Option<String>;
}

/// Resolver backed by a fixed token-to-subject map.
#[derive(Default)]
pub struct StaticTokenResolver {
    tokens: HashMap<String, String>,
}

impl StaticTokenResolver {
    /// Build from explicit token/subject pairs.
    pub fn new(pairs: impl IntoIterator<Item = (String, String)>) -> Self {
        Self {
            tokens: pairs.into_iter().collect(),
        }
    }

    /// Parse `LIVRA_API_TOKENS` (`token:subject,token:subject`).
    pub fn from_env() -> Self {
        let raw = std::env::var("LIVRA_API_TOKENS").unwrap_or_default();
        let tokens = raw
            .split(',')
            .filter_map(|pair| {
                let (token, subject) = pair.split_once(':')?;
                if token.is_empty() || subject.is_empty() {
                    return None;
                }
                Some((token.to_string(), subject.to_string()))
            })
            .collect();
        Self { tokens }
    }
}

#[async_trait]
impl AuthResolver for StaticTokenResolver {
    async fn resolve(&self, token: &str) -> Option<String> {
        self.tokens.get(token).cloned()
    }
}

/// Resolve the request's bearer token to a user, creating it on first sight.
///
/// Returns None when no Authorization header is present; an invalid token is
/// an error.
pub async fn authenticate(
    auth: &Arc<dyn AuthResolver>,
    persistence: &Arc<dyn Persistence>,
    headers: &HeaderMap,
) -> Result<Option<UserRecord>, ApiError> {
    let Some(value) = headers.get(axum::http::header::AUTHORIZATION) else {
        return Ok(None);
    };
    let token = value
        .to_str()
        .ok()
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or(ApiError::Unauthorized)?;
    let subject = auth.resolve(token).await.ok_or(ApiError::Unauthorized)?;
    let user = persistence.get_or_create_user(&subject).await?;
    Ok(Some(user))
}

/// Single ownership check applied to every owned-resource route.
///
/// Unowned resources (`owner` is None) are open; owned resources require the
/// authenticated principal to be the owner.
pub fn authorize_owner(
    principal: Option<&UserRecord>,
    owner: Option<&str>,
) -> Result<(), ApiError> {
    match owner {
        None => Ok(()),
        Some(owner_id) => match principal {
            None => Err(ApiError::Unauthorized),
            Some(user) if user.user_id == owner_id => Ok(()),
            Some(_) => Err(ApiError::Forbidden),
        },
    }
}
