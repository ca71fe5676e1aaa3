// Copyright (C) 2025 Livra Contributors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! HTTP error mapping.
//!
//! All handler errors funnel through [`ApiError`], which renders as
//! `{ "error": message }` with the matching status code. Internal failures
//! are logged with their detail but the client only sees a generic message.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use tracing::error;

use livra_core::error::CoreError;

/// Errors a handler can surface to the client.
#[derive(Debug)]
pub enum ApiError {
    /// Malformed or missing request fields (400).
    BadRequest(String),
    /// No or invalid credentials (401).
    Unauthorized,
    /// The resource belongs to another user (403).
    Forbidden,
    /// The resource does not exist (404).
    NotFound(String),
    /// Anything the client cannot act on (500).
    Internal(String),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::Forbidden => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn message(&self) -> String {
        match self {
            Self::BadRequest(msg) => msg.clone(),
            Self::Unauthorized => "authentication required".to_string(),
            Self::Forbidden => "forbidden".to_string(),
            Self::NotFound(msg) => msg.clone(),
            // Internal detail stays in the logs.
            Self::Internal(_) => "internal server error".to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if let Self::Internal(detail) = &self {
            error!(detail, "internal error");
        }
        (self.status(), Json(json!({ "error": self.message() }))).into_response()
    }
}

impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        match &err {
            CoreError::PersonaNotFound { .. }
            | CoreError::MemoryNotFound { .. }
            | CoreError::RunNotFound { .. } => Self::NotFound(err.to_string()),
            CoreError::ValidationError { .. }
            | CoreError::MemoryPersonaMismatch { .. }
            | CoreError::RunAlreadyActive { .. } => Self::BadRequest(err.to_string()),
            _ => Self::Internal(err.to_string()),
        }
    }
}
