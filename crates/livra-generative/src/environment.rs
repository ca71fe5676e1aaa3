// Copyright (C) 2025 Livra Contributors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Client for the environment (weather and trends) service.

use chrono::Utc;
use serde::Deserialize;
use tracing::{debug, instrument, warn};

use livra_core::model::EnvironmentContext;

use crate::error::GenerativeError;

#[derive(Debug, Deserialize)]
struct EnvironmentResponse {
    weather: String,
    temperature_c: f64,
    #[serde(default)]
    trends: Vec<String>,
}

/// Fetches the environmental context for a location.
///
/// When no service is configured the client degrades to a neutral
/// environment instead of failing the sensing stage; sensing is advisory,
/// not load-bearing.
#[derive(Clone)]
pub struct EnvironmentClient {
    http: reqwest::Client,
    base_url: Option<String>,
}

impl EnvironmentClient {
    /// Build a client. `base_url` of `None` enables the neutral fallback.
    pub fn new(http: reqwest::Client, base_url: Option<String>) -> Self {
        Self { http, base_url }
    }

    /// Fetch the current environment for a city.
    #[instrument(skip(self))]
    pub async fn fetch(
        &self,
        country: &str,
        city: &str,
    ) -> Result<EnvironmentContext, GenerativeError> {
        let Some(base_url) = &self.base_url else {
            debug!("no environment service configured; using neutral environment");
            return Ok(Self::neutral());
        };

        let url = format!("{base_url}/environment");
        let response = self
            .http
            .get(&url)
            .query(&[("country", country), ("city", city)])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            warn!(%status, "environment service error; using neutral environment");
            return Ok(Self::neutral());
        }

        let parsed: EnvironmentResponse = response.json().await.map_err(|e| {
            GenerativeError::MissingContent(format!("environment response unparseable: {e}"))
        })?;
        Ok(EnvironmentContext {
            weather: parsed.weather,
            temperature_c: parsed.temperature_c,
            trends: parsed.trends,
            observed_at: Utc::now(),
        })
    }

    fn neutral() -> EnvironmentContext {
        EnvironmentContext {
            weather: "clear".to_string(),
            temperature_c: 20.0,
            trends: Vec::new(),
            observed_at: Utc::now(),
        }
    }
}
