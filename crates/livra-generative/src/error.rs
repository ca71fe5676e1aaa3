// Copyright (C) 2025 Livra Contributors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Error types for the generative clients.

use livra_core::steps::StepError;

/// Errors from the generative and sensing upstreams.
#[derive(Debug, thiserror::Error)]
pub enum GenerativeError {
    /// Transport-level failure talking to the upstream.
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Upstream returned a non-success status.
    #[error("upstream returned {status}: {body}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Response body, truncated for logging.
        body: String,
    },

    /// Upstream responded 2xx but the payload was not usable.
    #[error("unusable upstream response: {0}")]
    MissingContent(String),
}

impl From<GenerativeError> for StepError {
    fn from(err: GenerativeError) -> Self {
        match err {
            GenerativeError::Http(e) => StepError::Upstream(e.to_string()),
            GenerativeError::Api { status, body } => {
                StepError::Upstream(format!("status {status}: {body}"))
            }
            GenerativeError::MissingContent(msg) => StepError::InvalidResponse(msg),
        }
    }
}
