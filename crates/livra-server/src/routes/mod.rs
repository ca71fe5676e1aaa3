// Copyright (C) 2025 Livra Contributors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Route handlers and router assembly.

pub mod influencer;
pub mod persona;
pub mod pulse;

use axum::extract::State;
use axum::http::HeaderMap;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use serde_json::json;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::instrument;
use uuid::Uuid;

use livra_core::model::UserRecord;
use livra_core::recovery;

use crate::auth::{authenticate, authorize_owner};
use crate::error::ApiError;
use crate::state::AppState;

/// Assemble the full API router.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route(
            "/api/influencer",
            post(influencer::create).get(influencer::list),
        )
        .route("/api/influencer/{id}/status", get(influencer::status))
        .route(
            "/api/influencer/{id}/appearance",
            post(influencer::appearance),
        )
        .route("/api/influencer/{id}/avatar", post(influencer::avatar))
        .route(
            "/api/influencer/{id}/retry-activity",
            post(influencer::retry),
        )
        .route("/api/persona/{id}/retry-activity", post(persona::retry))
        .route("/api/persona/{id}/timeline", get(persona::timeline))
        .route("/api/pulse/item", get(pulse::item))
        .route("/api/health", get(health))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Response for lifecycle control requests.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ControlResponse {
    /// Whether the request was accepted.
    pub success: bool,
    /// Gateway event ids queued on behalf of this request.
    pub event_ids: Vec<Uuid>,
}

/// Shared retry flow for both entity families.
///
/// Validates the persona, ownership, and (for non-forced retries) the ERROR
/// memory before anything is queued, so the client gets a specific error
/// instead of a silently dropped event.
pub(crate) async fn run_retry(
    state: &AppState,
    headers: &HeaderMap,
    persona_id: &str,
    memory_id: Option<i64>,
    force: bool,
) -> Result<Json<ControlResponse>, ApiError> {
    let user = authenticate(&state.auth, &state.persistence, headers).await?;
    let persona = require_persona(state, persona_id).await?;
    authorize_owner(user.as_ref(), persona.owner_user_id.as_deref())?;

    if memory_id.is_none() && !force {
        return Err(ApiError::BadRequest(
            "memoryId or force is required".to_string(),
        ));
    }
    // A forced start restarts the cycle from scratch, so the memory id is
    // not consulted and a bad one must not fail the request.
    if !force
        && let Some(memory_id) = memory_id
    {
        recovery::plan_from_memory(state.persistence.as_ref(), persona_id, memory_id).await?;
    }

    let event_id = state.gateway.send_start(persona_id, memory_id, force).await?;
    Ok(Json(ControlResponse {
        success: true,
        event_ids: vec![event_id],
    }))
}

pub(crate) async fn require_persona(
    state: &AppState,
    persona_id: &str,
) -> Result<livra_core::model::PersonaRecord, ApiError> {
    state
        .persistence
        .get_persona(persona_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("persona '{persona_id}' not found")))
}

pub(crate) async fn optional_user(
    state: &AppState,
    headers: &HeaderMap,
) -> Result<Option<UserRecord>, ApiError> {
    authenticate(&state.auth, &state.persistence, headers).await
}

/// Liveness plus a database round trip.
#[instrument(skip_all)]
async fn health(State(state): State<AppState>) -> Result<Json<serde_json::Value>, ApiError> {
    state.persistence.health_check_db().await?;
    Ok(Json(json!({ "status": "ok", "database": "ok" })))
}
