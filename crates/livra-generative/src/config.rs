// Copyright (C) 2025 Livra Contributors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Configuration for the generative and sensing clients.

use std::time::Duration;

/// Connection settings for the generative upstreams.
#[derive(Debug, Clone)]
pub struct GenerativeConfig {
    /// Base URL of the OpenAI-compatible API (no trailing slash).
    pub ai_base_url: String,
    /// Bearer token for the generative API.
    pub ai_api_key: String,
    /// Chat model used for planning.
    pub chat_model: String,
    /// Model used for image generation.
    pub image_model: String,
    /// Model used for video generation.
    pub video_model: String,
    /// Base URL of the environment (weather/trends) service, if configured.
    pub environment_base_url: Option<String>,
    /// Per-request timeout.
    pub request_timeout: Duration,
}

impl GenerativeConfig {
    /// Load configuration from environment variables.
    ///
    /// Required:
    /// - `LIVRA_AI_BASE_URL`: OpenAI-compatible API base URL
    /// - `LIVRA_AI_API_KEY`: bearer token
    ///
    /// Optional (with defaults):
    /// - `LIVRA_AI_CHAT_MODEL` (default: `gpt-4o-mini`)
    /// - `LIVRA_AI_IMAGE_MODEL` (default: `gpt-image-1`)
    /// - `LIVRA_AI_VIDEO_MODEL` (default: `sora-2`)
    /// - `LIVRA_ENVIRONMENT_BASE_URL`: sensing service; when unset, sensing
    ///   falls back to a neutral environment
    /// - `LIVRA_AI_TIMEOUT_SECS` (default: 120)
    pub fn from_env() -> Result<Self, ConfigError> {
        let ai_base_url = std::env::var("LIVRA_AI_BASE_URL")
            .map_err(|_| ConfigError::Missing("LIVRA_AI_BASE_URL"))?;
        let ai_api_key = std::env::var("LIVRA_AI_API_KEY")
            .map_err(|_| ConfigError::Missing("LIVRA_AI_API_KEY"))?;

        let timeout_secs: u64 = std::env::var("LIVRA_AI_TIMEOUT_SECS")
            .unwrap_or_else(|_| "120".to_string())
            .parse()
            .map_err(|_| ConfigError::Invalid("LIVRA_AI_TIMEOUT_SECS", "must be a positive integer"))?;

        Ok(Self {
            ai_base_url: ai_base_url.trim_end_matches('/').to_string(),
            ai_api_key,
            chat_model: std::env::var("LIVRA_AI_CHAT_MODEL")
                .unwrap_or_else(|_| "gpt-4o-mini".to_string()),
            image_model: std::env::var("LIVRA_AI_IMAGE_MODEL")
                .unwrap_or_else(|_| "gpt-image-1".to_string()),
            video_model: std::env::var("LIVRA_AI_VIDEO_MODEL")
                .unwrap_or_else(|_| "sora-2".to_string()),
            environment_base_url: std::env::var("LIVRA_ENVIRONMENT_BASE_URL")
                .ok()
                .map(|u| u.trim_end_matches('/').to_string()),
            request_timeout: Duration::from_secs(timeout_secs),
        })
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A required environment variable is missing.
    #[error("missing required environment variable: {0}")]
    Missing(&'static str),

    /// An environment variable has an invalid value.
    #[error("invalid value for {0}: {1}")]
    Invalid(&'static str, &'static str),
}
