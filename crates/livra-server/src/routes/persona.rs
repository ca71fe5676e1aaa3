// Copyright (C) 2025 Livra Contributors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Routes for owned personas: retry and timeline.

use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use livra_core::model::{MemoryRecord, PostRecord};

use crate::auth::authorize_owner;
use crate::error::ApiError;
use crate::routes::{optional_user, require_persona, run_retry, ControlResponse};
use crate::state::AppState;

const DEFAULT_PAGE: i64 = 20;
const MAX_PAGE: i64 = 100;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub(crate) struct RetryRequest {
    memory_id: Option<i64>,
    #[serde(default)]
    force: bool,
}

/// POST /api/persona/{id}/retry-activity
#[instrument(skip_all, fields(persona_id = %persona_id))]
pub(crate) async fn retry(
    State(state): State<AppState>,
    Path(persona_id): Path<String>,
    headers: HeaderMap,
    Json(body): Json<RetryRequest>,
) -> Result<Json<ControlResponse>, ApiError> {
    run_retry(&state, &headers, &persona_id, body.memory_id, body.force).await
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub(crate) struct TimelineQuery {
    #[serde(default)]
    posts_offset: i64,
    #[serde(default)]
    memories_offset: i64,
    limit: Option<i64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct PostDto {
    id: i64,
    kind: String,
    caption: String,
    content_url: String,
    posted_at: DateTime<Utc>,
}

impl From<PostRecord> for PostDto {
    fn from(p: PostRecord) -> Self {
        Self {
            id: p.id.unwrap_or_default(),
            kind: p.kind,
            caption: p.caption,
            content_url: p.content_url,
            posted_at: p.posted_at,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct MemoryDto {
    id: i64,
    kind: String,
    content: String,
    importance: i64,
    created_at: DateTime<Utc>,
}

impl From<MemoryRecord> for MemoryDto {
    fn from(m: MemoryRecord) -> Self {
        Self {
            id: m.id.unwrap_or_default(),
            kind: m.kind,
            content: m.content,
            importance: m.importance,
            created_at: m.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct TimelineResponse {
    posts: Vec<PostDto>,
    memories: Vec<MemoryDto>,
    has_more_posts: bool,
    has_more_memories: bool,
}

/// GET /api/persona/{id}/timeline: paginated posts and memories.
///
/// Both lists page independently (`postsOffset` / `memoriesOffset`) and
/// share one `limit`.
#[instrument(skip_all, fields(persona_id = %persona_id))]
pub(crate) async fn timeline(
    State(state): State<AppState>,
    Path(persona_id): Path<String>,
    Query(query): Query<TimelineQuery>,
    headers: HeaderMap,
) -> Result<Json<TimelineResponse>, ApiError> {
    let user = optional_user(&state, &headers).await?;
    let persona = require_persona(&state, &persona_id).await?;
    authorize_owner(user.as_ref(), persona.owner_user_id.as_deref())?;

    let limit = query.limit.unwrap_or(DEFAULT_PAGE).clamp(1, MAX_PAGE);
    if query.posts_offset < 0 || query.memories_offset < 0 {
        return Err(ApiError::BadRequest("offsets must be non-negative".to_string()));
    }

    let posts = state
        .persistence
        .list_posts(&persona_id, limit, query.posts_offset)
        .await?;
    let memories = state
        .persistence
        .list_memories(&persona_id, limit, query.memories_offset)
        .await?;

    Ok(Json(TimelineResponse {
        has_more_posts: posts.has_more,
        has_more_memories: memories.has_more,
        posts: posts.items.into_iter().map(Into::into).collect(),
        memories: memories.items.into_iter().map(Into::into).collect(),
    }))
}
