// Copyright (C) 2025 Livra Contributors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! External step effects invoked by the engine.
//!
//! Each lifecycle stage is a pure function of the persona state plus exactly
//! one declared external effect. The engine owns all persistence and all
//! failure capture; implementations must not write domain rows and must not
//! swallow errors, so the engine can always author the ERROR memory with a
//! consistent shape.

use async_trait::async_trait;
use std::fmt;

use crate::model::{ActivityPlan, EnvironmentContext, PersonaRecord};

/// Media produced by an image or video generation call.
#[derive(Debug, Clone)]
pub struct GeneratedMedia {
    /// URL of the produced media.
    pub url: String,
    /// Caption to publish with the media.
    pub caption: String,
    /// Prompt actually sent to the generation API.
    pub prompt: String,
}

/// Failure of a single step's external effect.
///
/// The engine converts these into ERROR memories; steps never retry on their
/// own (retry is always an explicit, externally-triggered action).
#[derive(Debug, Clone)]
pub enum StepError {
    /// External AI/service call failed; retryable.
    Upstream(String),
    /// The upstream response could not be interpreted.
    InvalidResponse(String),
}

impl fmt::Display for StepError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Upstream(msg) => write!(f, "upstream call failed: {}", msg),
            Self::InvalidResponse(msg) => write!(f, "invalid upstream response: {}", msg),
        }
    }
}

impl std::error::Error for StepError {}

/// The four external effects a lifecycle run performs.
///
/// Implementations live outside the engine (see `livra-generative`); tests
/// substitute mocks. Effects may be re-invoked after a crash between "step
/// completed" and "advance recorded", so they must be safe to re-execute.
#[async_trait]
pub trait StepEffects: Send + Sync {
    /// Sensing: query weather/trends for the persona's location.
    async fn sense(&self, persona: &PersonaRecord) -> Result<EnvironmentContext, StepError>;

    /// Planning: select the next activity and budget from persona traits and
    /// environmental context. No side effects; failure here is retryable
    /// without cleanup since nothing was written yet.
    async fn plan(
        &self,
        persona: &PersonaRecord,
        environment: &EnvironmentContext,
    ) -> Result<ActivityPlan, StepError>;

    /// Image production: generate an image for the plan, optionally
    /// conditioned on prior posts as reference images.
    async fn generate_image(
        &self,
        persona: &PersonaRecord,
        plan: &ActivityPlan,
        reference_images: &[String],
    ) -> Result<GeneratedMedia, StepError>;

    /// Video production: generate a video for the plan.
    async fn generate_video(
        &self,
        persona: &PersonaRecord,
        plan: &ActivityPlan,
        reference_images: &[String],
    ) -> Result<GeneratedMedia, StepError>;
}
