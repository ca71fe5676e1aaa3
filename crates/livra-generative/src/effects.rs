// Copyright (C) 2025 Livra Contributors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Production implementation of the lifecycle step effects.

use async_trait::async_trait;
use tracing::instrument;

use livra_core::model::{ActivityPlan, EnvironmentContext, PersonaRecord};
use livra_core::steps::{GeneratedMedia, StepEffects, StepError};

use crate::client::GenerativeClient;
use crate::config::GenerativeConfig;
use crate::environment::EnvironmentClient;
use crate::error::GenerativeError;
use crate::prompts;

/// Step effects backed by the live generative and environment upstreams.
pub struct LiveStepEffects {
    client: GenerativeClient,
    environment: EnvironmentClient,
}

impl LiveStepEffects {
    /// Build the live effects from configuration.
    pub fn new(config: GenerativeConfig) -> Result<Self, GenerativeError> {
        let environment_base_url = config.environment_base_url.clone();
        let client = GenerativeClient::new(config)?;
        let environment = EnvironmentClient::new(reqwest::Client::new(), environment_base_url);
        Ok(Self {
            client,
            environment,
        })
    }

    /// Build from pre-constructed clients (tests).
    pub fn from_parts(client: GenerativeClient, environment: EnvironmentClient) -> Self {
        Self {
            client,
            environment,
        }
    }
}

#[async_trait]
impl StepEffects for LiveStepEffects {
    #[instrument(skip_all, fields(persona_id = %persona.persona_id))]
    async fn sense(&self, persona: &PersonaRecord) -> Result<EnvironmentContext, StepError> {
        let environment = self
            .environment
            .fetch(&persona.country, &persona.city)
            .await?;
        Ok(environment)
    }

    #[instrument(skip_all, fields(persona_id = %persona.persona_id))]
    async fn plan(
        &self,
        persona: &PersonaRecord,
        environment: &EnvironmentContext,
    ) -> Result<ActivityPlan, StepError> {
        let response = self
            .client
            .chat_json(prompts::plan_system(), &prompts::plan_user(persona, environment))
            .await?;
        let plan: prompts::PlanResponse = serde_json::from_value(response).map_err(|e| {
            StepError::InvalidResponse(format!("plan response has wrong shape: {e}"))
        })?;
        Ok(plan.into())
    }

    #[instrument(skip_all, fields(persona_id = %persona.persona_id))]
    async fn generate_image(
        &self,
        persona: &PersonaRecord,
        plan: &ActivityPlan,
        reference_images: &[String],
    ) -> Result<GeneratedMedia, StepError> {
        let prompt = prompts::image_prompt(persona, plan);
        let url = self
            .client
            .generate_image(&prompt, reference_images)
            .await?;
        Ok(GeneratedMedia {
            url,
            caption: plan.caption.clone(),
            prompt,
        })
    }

    #[instrument(skip_all, fields(persona_id = %persona.persona_id))]
    async fn generate_video(
        &self,
        persona: &PersonaRecord,
        plan: &ActivityPlan,
        reference_images: &[String],
    ) -> Result<GeneratedMedia, StepError> {
        let prompt = prompts::video_prompt(persona, plan);
        let url = self
            .client
            .generate_video(&prompt, reference_images)
            .await?;
        Ok(GeneratedMedia {
            url,
            caption: plan.caption.clone(),
            prompt,
        })
    }
}
