// Copyright (C) 2025 Livra Contributors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Public pulse lookup.
//!
//! Unauthenticated single-item access, gated on the owning persona's
//! `is_public` flag. Everything that is not public, including items that do
//! not exist, answers 404 so the response does not reveal which is which.

use axum::extract::{Query, State};
use axum::Json;
use serde::Deserialize;
use serde_json::json;
use tracing::instrument;

use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct PulseQuery {
    id: i64,
    #[serde(rename = "type")]
    item_type: String,
}

/// GET /api/pulse/item?id=..&type=post|memory
#[instrument(skip_all, fields(id = query.id, item_type = %query.item_type))]
pub(crate) async fn item(
    State(state): State<AppState>,
    Query(query): Query<PulseQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let not_found = || ApiError::NotFound("item not found".to_string());

    let (persona_id, payload) = match query.item_type.as_str() {
        "post" => {
            let post = state
                .persistence
                .get_post(query.id)
                .await?
                .ok_or_else(not_found)?;
            let payload = json!({
                "id": post.id,
                "type": "post",
                "kind": post.kind,
                "caption": post.caption,
                "contentUrl": post.content_url,
                "postedAt": post.posted_at,
            });
            (post.persona_id, payload)
        }
        "memory" => {
            let memory = state
                .persistence
                .get_memory(query.id)
                .await?
                .ok_or_else(not_found)?;
            let payload = json!({
                "id": memory.id,
                "type": "memory",
                "kind": memory.kind,
                "content": memory.content,
                "createdAt": memory.created_at,
            });
            (memory.persona_id, payload)
        }
        _ => return Err(not_found()),
    };

    let persona = state
        .persistence
        .get_persona(&persona_id)
        .await?
        .ok_or_else(not_found)?;
    if !persona.is_public {
        return Err(not_found());
    }

    Ok(Json(payload))
}
