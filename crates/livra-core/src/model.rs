// Copyright (C) 2025 Livra Contributors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Domain records and run state types.
//!
//! Record structs mirror the database schema one-to-one. The stage/state
//! types are what gets serialized into run checkpoints and ERROR memories.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Persona record from the persistence layer.
///
/// A persona with `owner_user_id == None` is the unowned (influencer) entity
/// family; both families share this table and the lifecycle engine.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct PersonaRecord {
    /// Unique identifier for the persona.
    pub persona_id: String,
    /// Owning user, or None for the unowned family.
    pub owner_user_id: Option<String>,
    /// Display name.
    pub display_name: String,
    /// Hair descriptor.
    pub hair: String,
    /// Eye descriptor.
    pub eyes: String,
    /// Skin descriptor.
    pub skin: String,
    /// Body descriptor.
    pub body: String,
    /// Personality vibe.
    pub vibe: String,
    /// Clothing style.
    pub clothing_style: String,
    /// Home country.
    pub country: String,
    /// Home city.
    pub city: String,
    /// Home neighborhood.
    pub neighborhood: String,
    /// Avatar image URL once one has been produced.
    pub avatar_url: Option<String>,
    /// Lifecycle status (idle, running, sleeping, errored, stopped).
    pub lifecycle_status: String,
    /// Activity currently being executed, if any.
    pub current_activity: Option<String>,
    /// When the current activity started.
    pub current_activity_started_at: Option<DateTime<Utc>>,
    /// Spendable balance in cents.
    pub balance_cents: i64,
    /// Whether posts/memories are visible to unauthenticated pulse consumers.
    pub is_public: bool,
    /// When the persona was created.
    pub created_at: DateTime<Utc>,
}

/// Authenticated principal, created lazily on first authenticated request.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct UserRecord {
    /// Unique identifier for the user.
    pub user_id: String,
    /// Subject claim from the external auth provider.
    pub auth_subject: String,
    /// When the user was first seen.
    pub created_at: DateTime<Utc>,
}

/// Record of one lifecycle stage execution for a persona. Append-only.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ActivityRecord {
    /// Database primary key (None when inserting).
    #[sqlx(default)]
    pub id: Option<i64>,
    /// Persona this activity belongs to.
    pub persona_id: String,
    /// Stage or activity name.
    pub name: String,
    /// Outcome (completed, failed).
    pub status: String,
    /// Image produced during this activity, if any.
    pub image_url: Option<String>,
    /// Free-form JSON metadata (may carry generation error detail).
    pub metadata: Option<String>,
    /// When the activity was recorded.
    pub created_at: DateTime<Utc>,
}

/// Observation log entry for a persona. Append-only.
///
/// Rows with kind [`MemoryKind::Error`] are the durable retry checkpoints:
/// their `payload` carries a serialized [`ErrorCheckpoint`].
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct MemoryRecord {
    /// Database primary key (None when inserting).
    #[sqlx(default)]
    pub id: Option<i64>,
    /// Persona this memory belongs to.
    pub persona_id: String,
    /// Memory kind (observation, error).
    pub kind: String,
    /// Human-readable description.
    pub content: String,
    /// Importance score.
    pub importance: i64,
    /// Serialized context for error memories.
    pub payload: Option<String>,
    /// When the memory was recorded.
    pub created_at: DateTime<Utc>,
}

/// Published content artifact. Created once per successful production stage.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct PostRecord {
    /// Database primary key (None when inserting).
    #[sqlx(default)]
    pub id: Option<i64>,
    /// Persona this post belongs to.
    pub persona_id: String,
    /// Post kind (image, video).
    pub kind: String,
    /// Caption shown with the post.
    pub caption: String,
    /// URL of the produced media.
    pub content_url: String,
    /// Generation prompt used to produce the media.
    pub prompt: String,
    /// When the post was published.
    pub posted_at: DateTime<Utc>,
}

/// Lifecycle run record from the persistence layer.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct RunRecord {
    /// Unique identifier for the run.
    pub run_id: String,
    /// Persona this run drives.
    pub persona_id: String,
    /// Current status (pending, running, sleeping, completed, errored, cancelled).
    pub status: String,
    /// Stage the run will execute next.
    pub stage: String,
    /// When a sleeping run should be woken.
    pub sleep_until: Option<DateTime<Utc>>,
    /// Error message from failure.
    pub error: Option<String>,
    /// When the run was created.
    pub created_at: DateTime<Utc>,
    /// When the run started executing.
    pub started_at: Option<DateTime<Utc>>,
    /// When the run finished (completed, errored, or cancelled).
    pub finished_at: Option<DateTime<Utc>>,
}

/// Run checkpoint record: one row per persisted stage transition.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct RunCheckpointRecord {
    /// Database primary key.
    pub id: i64,
    /// Run this checkpoint belongs to.
    pub run_id: String,
    /// Stage recorded at checkpoint time (the next stage to execute).
    pub stage: String,
    /// Serialized [`CycleState`].
    pub state: String,
    /// When the checkpoint was created.
    pub created_at: DateTime<Utc>,
}

/// Memory kinds stored in the `kind` column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryKind {
    /// Normal observation produced during a cycle.
    Observation,
    /// Step failure; the durable retry checkpoint.
    Error,
}

impl MemoryKind {
    /// Column value for this kind.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Observation => "observation",
            Self::Error => "error",
        }
    }
}

/// Post kinds stored in the `kind` column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PostKind {
    /// Still image post.
    Image,
    /// Video post.
    Video,
}

impl PostKind {
    /// Column value for this kind.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Video => "video",
        }
    }
}

// ============================================================================
// Run state machine types
// ============================================================================

/// Stages of a lifecycle run, executed in declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Query the environment (weather, trends).
    Sensing,
    /// Select the next activity and budget.
    Planning,
    /// Produce and publish an image post.
    ProducingImage,
    /// Durable timed suspension between productions.
    Sleeping,
    /// Produce and publish a video post.
    ProducingVideo,
}

impl Stage {
    /// The stage executed after this one, or None if the run completes.
    pub fn next(self) -> Option<Stage> {
        match self {
            Self::Sensing => Some(Self::Planning),
            Self::Planning => Some(Self::ProducingImage),
            Self::ProducingImage => Some(Self::Sleeping),
            Self::Sleeping => Some(Self::ProducingVideo),
            Self::ProducingVideo => None,
        }
    }

    /// Column value for this stage.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Sensing => "sensing",
            Self::Planning => "planning",
            Self::ProducingImage => "producing_image",
            Self::Sleeping => "sleeping",
            Self::ProducingVideo => "producing_video",
        }
    }

    /// Parse a column value back into a stage.
    pub fn parse(s: &str) -> Option<Stage> {
        match s {
            "sensing" => Some(Self::Sensing),
            "planning" => Some(Self::Planning),
            "producing_image" => Some(Self::ProducingImage),
            "sleeping" => Some(Self::Sleeping),
            "producing_video" => Some(Self::ProducingVideo),
            _ => None,
        }
    }
}

/// Environmental context produced by the sensing stage.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EnvironmentContext {
    /// Short weather description.
    pub weather: String,
    /// Temperature in degrees Celsius.
    pub temperature_c: f64,
    /// Trends considered relevant for this persona.
    pub trends: Vec<String>,
    /// When the environment was observed.
    pub observed_at: DateTime<Utc>,
}

/// Activity plan produced by the planning stage.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ActivityPlan {
    /// Activity the persona will do (e.g. "morning run along the river").
    pub activity: String,
    /// Generation prompt for the production stages.
    pub prompt: String,
    /// Caption theme for the produced posts.
    pub caption: String,
    /// Budget the activity consumes, in cents.
    pub budget_cents: i64,
}

/// The full carried-forward state of a lifecycle run.
///
/// Serialized into every checkpoint row and into ERROR memory payloads, so a
/// run can resume mid-cycle without re-executing earlier stages.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CycleState {
    /// The next stage to execute.
    pub stage: Stage,
    /// Output of the sensing stage.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub environment: Option<EnvironmentContext>,
    /// Output of the planning stage.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plan: Option<ActivityPlan>,
    /// Post written by the image production stage, if reached.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_post_id: Option<i64>,
}

impl CycleState {
    /// Fresh state for a new run, entering at [`Stage::Sensing`].
    pub fn new() -> Self {
        Self {
            stage: Stage::Sensing,
            environment: None,
            plan: None,
            image_post_id: None,
        }
    }
}

impl Default for CycleState {
    fn default() -> Self {
        Self::new()
    }
}

/// Context persisted in an ERROR memory's payload, sufficient to resume the
/// run at the failed stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorCheckpoint {
    /// The run that failed.
    pub run_id: String,
    /// The stage that failed.
    pub failed_stage: Stage,
    /// Error message from the step.
    pub error: String,
    /// Carried-forward state at the time of failure.
    pub state: CycleState,
}
