// Copyright (C) 2025 Livra Contributors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Client for the OpenAI-compatible generative API.

use serde_json::{Value, json};
use tracing::{debug, instrument};

use crate::config::GenerativeConfig;
use crate::error::GenerativeError;

const ERROR_BODY_LIMIT: usize = 512;

/// Thin wrapper over the chat, image, and video generation endpoints.
#[derive(Clone)]
pub struct GenerativeClient {
    http: reqwest::Client,
    config: GenerativeConfig,
}

impl GenerativeClient {
    /// Build a client from configuration.
    pub fn new(config: GenerativeConfig) -> Result<Self, GenerativeError> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;
        Ok(Self { http, config })
    }

    /// Run a chat completion that must answer with a single JSON object.
    #[instrument(skip_all)]
    pub async fn chat_json(&self, system: &str, user: &str) -> Result<Value, GenerativeError> {
        let body = json!({
            "model": self.config.chat_model,
            "response_format": { "type": "json_object" },
            "messages": [
                { "role": "system", "content": system },
                { "role": "user", "content": user },
            ],
        });
        let response = self.post_json("/chat/completions", &body).await?;

        let content = response["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| {
                GenerativeError::MissingContent("chat response has no message content".to_string())
            })?;
        serde_json::from_str(content).map_err(|e| {
            GenerativeError::MissingContent(format!("chat content is not valid JSON: {e}"))
        })
    }

    /// Generate an image and return its URL.
    ///
    /// Reference image URLs keep the persona visually consistent across
    /// posts; the upstream may use any subset of them.
    #[instrument(skip_all, fields(references = reference_images.len()))]
    pub async fn generate_image(
        &self,
        prompt: &str,
        reference_images: &[String],
    ) -> Result<String, GenerativeError> {
        let body = json!({
            "model": self.config.image_model,
            "prompt": prompt,
            "reference_images": reference_images,
        });
        let response = self.post_json("/images/generations", &body).await?;
        Self::first_data_url(&response)
    }

    /// Generate a video and return its URL.
    #[instrument(skip_all, fields(references = reference_images.len()))]
    pub async fn generate_video(
        &self,
        prompt: &str,
        reference_images: &[String],
    ) -> Result<String, GenerativeError> {
        let body = json!({
            "model": self.config.video_model,
            "prompt": prompt,
            "reference_images": reference_images,
        });
        let response = self.post_json("/videos/generations", &body).await?;
        Self::first_data_url(&response)
    }

    async fn post_json(&self, path: &str, body: &Value) -> Result<Value, GenerativeError> {
        let url = format!("{}{}", self.config.ai_base_url, path);
        debug!(%url, "generative request");
        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.config.ai_api_key)
            .json(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let mut body = response.text().await.unwrap_or_default();
            body.truncate(ERROR_BODY_LIMIT);
            return Err(GenerativeError::Api {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response.json().await?)
    }

    fn first_data_url(response: &Value) -> Result<String, GenerativeError> {
        response["data"][0]["url"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| {
                GenerativeError::MissingContent("generation response has no data[0].url".to_string())
            })
    }
}
