// Copyright (C) 2025 Livra Contributors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Prompt construction for the planning and production stages.

use serde::Deserialize;

use livra_core::model::{ActivityPlan, EnvironmentContext, PersonaRecord};

/// Shape the planning chat completion must answer with.
#[derive(Debug, Deserialize)]
pub struct PlanResponse {
    /// Activity the persona will do next.
    pub activity: String,
    /// Scene description for media generation.
    pub prompt: String,
    /// Caption for the resulting posts.
    pub caption: String,
    /// Money the activity costs, in cents.
    pub budget_cents: i64,
}

impl From<PlanResponse> for ActivityPlan {
    fn from(r: PlanResponse) -> Self {
        ActivityPlan {
            activity: r.activity,
            prompt: r.prompt,
            caption: r.caption,
            budget_cents: r.budget_cents.max(0),
        }
    }
}

/// System prompt for the planning stage.
pub fn plan_system() -> &'static str {
    "You decide what a social media persona does next, based on who they are, \
     where they live, and what is happening around them. Answer with a single \
     JSON object with keys: activity (short description), prompt (detailed \
     visual scene description), caption (post caption in the persona's voice), \
     budget_cents (integer cost of the activity in cents)."
}

/// User prompt for the planning stage.
pub fn plan_user(persona: &PersonaRecord, environment: &EnvironmentContext) -> String {
    let trends = if environment.trends.is_empty() {
        "none".to_string()
    } else {
        environment.trends.join(", ")
    };
    format!(
        "Persona: {name}, vibe: {vibe}, style: {style}.\n\
         Lives in {neighborhood}, {city}, {country}.\n\
         Current weather: {weather}, {temp:.0}C. Local trends: {trends}.\n\
         Available budget: {balance} cents.\n\
         Pick one activity this persona would plausibly do right now.",
        name = persona.display_name,
        vibe = persona.vibe,
        style = persona.clothing_style,
        neighborhood = persona.neighborhood,
        city = persona.city,
        country = persona.country,
        weather = environment.weather,
        temp = environment.temperature_c,
        trends = trends,
        balance = persona.balance_cents,
    )
}

/// Full image generation prompt: appearance traits plus the planned scene.
pub fn image_prompt(persona: &PersonaRecord, plan: &ActivityPlan) -> String {
    format!(
        "{scene}. The subject: {hair} hair, {eyes} eyes, {skin} skin, \
         {body} build, wearing {style}. Photorealistic social media photo, \
         shot in {city}.",
        scene = plan.prompt,
        hair = persona.hair,
        eyes = persona.eyes,
        skin = persona.skin,
        body = persona.body,
        style = persona.clothing_style,
        city = persona.city,
    )
}

/// Full video generation prompt: the same scene, in motion.
pub fn video_prompt(persona: &PersonaRecord, plan: &ActivityPlan) -> String {
    format!(
        "{base} Short vertical video, natural handheld motion.",
        base = image_prompt(persona, plan)
    )
}
