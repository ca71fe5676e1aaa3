// Copyright (C) 2025 Livra Contributors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Routes for the unowned (influencer) entity family.

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, instrument};
use uuid::Uuid;

use livra_core::model::PersonaRecord;
use livra_core::persistence::AppearanceUpdate;

use crate::error::ApiError;
use crate::routes::{require_persona, run_retry, ControlResponse};
use crate::state::AppState;

const LIST_LIMIT: i64 = 20;
const DEFAULT_BALANCE_CENTS: i64 = 10_000;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub(crate) struct CreateRequest {
    display_name: Option<String>,
    country: Option<String>,
    city: Option<String>,
    neighborhood: Option<String>,
    hair: Option<String>,
    eyes: Option<String>,
    skin: Option<String>,
    body: Option<String>,
    vibe: Option<String>,
    clothing_style: Option<String>,
    initial_balance_cents: Option<i64>,
    is_public: Option<bool>,
}

fn required(field: &'static str, value: Option<String>) -> Result<String, ApiError> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(ApiError::BadRequest(format!("missing required field: {field}"))),
    }
}

/// POST /api/influencer: create an influencer and start its first cycle.
#[instrument(skip_all)]
pub(crate) async fn create(
    State(state): State<AppState>,
    Json(body): Json<CreateRequest>,
) -> Result<(StatusCode, Json<serde_json::Value>), ApiError> {
    let display_name = required("displayName", body.display_name)?;
    let country = required("country", body.country)?;
    let city = required("city", body.city)?;

    let persona_id = Uuid::new_v4().to_string();
    let persona = PersonaRecord {
        persona_id: persona_id.clone(),
        owner_user_id: None,
        display_name,
        hair: body.hair.unwrap_or_default(),
        eyes: body.eyes.unwrap_or_default(),
        skin: body.skin.unwrap_or_default(),
        body: body.body.unwrap_or_default(),
        vibe: body.vibe.unwrap_or_default(),
        clothing_style: body.clothing_style.unwrap_or_default(),
        country,
        city,
        neighborhood: body.neighborhood.unwrap_or_default(),
        avatar_url: None,
        lifecycle_status: "idle".to_string(),
        current_activity: None,
        current_activity_started_at: None,
        balance_cents: body.initial_balance_cents.unwrap_or(DEFAULT_BALANCE_CENTS),
        is_public: body.is_public.unwrap_or(true),
        created_at: Utc::now(),
    };
    state.persistence.create_persona(&persona).await?;
    state.gateway.send_start(&persona_id, None, false).await?;

    info!(persona_id, "influencer created");
    Ok((StatusCode::CREATED, Json(json!({ "id": persona_id }))))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct InfluencerSummary {
    id: String,
    display_name: String,
    avatar_url: Option<String>,
    city: String,
    country: String,
    lifecycle_status: String,
    is_public: bool,
    created_at: DateTime<Utc>,
}

impl From<PersonaRecord> for InfluencerSummary {
    fn from(p: PersonaRecord) -> Self {
        Self {
            id: p.persona_id,
            display_name: p.display_name,
            avatar_url: p.avatar_url,
            city: p.city,
            country: p.country,
            lifecycle_status: p.lifecycle_status,
            is_public: p.is_public,
            created_at: p.created_at,
        }
    }
}

/// GET /api/influencer: most recently created entities, newest first.
#[instrument(skip_all)]
pub(crate) async fn list(
    State(state): State<AppState>,
) -> Result<Json<Vec<InfluencerSummary>>, ApiError> {
    let personas = state.persistence.list_recent_personas(LIST_LIMIT).await?;
    Ok(Json(personas.into_iter().map(Into::into).collect()))
}

/// GET /api/influencer/{id}/status
#[instrument(skip_all, fields(persona_id = %persona_id))]
pub(crate) async fn status(
    State(state): State<AppState>,
    Path(persona_id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let persona = require_persona(&state, &persona_id).await?;
    Ok(Json(json!({
        "lifecycleStatus": persona.lifecycle_status,
        "currentActivity": persona.current_activity,
        "currentActivityStartedAt": persona.current_activity_started_at,
    })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub(crate) struct AppearanceRequest {
    hair: Option<String>,
    eyes: Option<String>,
    skin: Option<String>,
    body: Option<String>,
    vibe: Option<String>,
    clothing_style: Option<String>,
}

/// POST /api/influencer/{id}/appearance: partial appearance update.
#[instrument(skip_all, fields(persona_id = %persona_id))]
pub(crate) async fn appearance(
    State(state): State<AppState>,
    Path(persona_id): Path<String>,
    Json(body): Json<AppearanceRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let update = AppearanceUpdate {
        hair: body.hair,
        eyes: body.eyes,
        skin: body.skin,
        body: body.body,
        vibe: body.vibe,
        clothing_style: body.clothing_style,
    };
    if update.hair.is_none()
        && update.eyes.is_none()
        && update.skin.is_none()
        && update.body.is_none()
        && update.vibe.is_none()
        && update.clothing_style.is_none()
    {
        return Err(ApiError::BadRequest(
            "at least one appearance field is required".to_string(),
        ));
    }

    require_persona(&state, &persona_id).await?;
    state
        .persistence
        .update_persona_appearance(&persona_id, &update)
        .await?;
    Ok(Json(json!({ "success": true })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub(crate) struct AvatarRequest {
    avatar_url: Option<String>,
}

/// POST /api/influencer/{id}/avatar
#[instrument(skip_all, fields(persona_id = %persona_id))]
pub(crate) async fn avatar(
    State(state): State<AppState>,
    Path(persona_id): Path<String>,
    Json(body): Json<AvatarRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let avatar_url = required("avatarUrl", body.avatar_url)?;
    require_persona(&state, &persona_id).await?;
    state
        .persistence
        .update_persona_avatar(&persona_id, &avatar_url)
        .await?;
    Ok(Json(json!({ "success": true })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub(crate) struct RetryRequest {
    memory_id: Option<i64>,
    #[serde(default)]
    force: bool,
}

/// POST /api/influencer/{id}/retry-activity
#[instrument(skip_all, fields(persona_id = %persona_id))]
pub(crate) async fn retry(
    State(state): State<AppState>,
    Path(persona_id): Path<String>,
    headers: HeaderMap,
    Json(body): Json<RetryRequest>,
) -> Result<Json<ControlResponse>, ApiError> {
    run_retry(&state, &headers, &persona_id, body.memory_id, body.force).await
}
