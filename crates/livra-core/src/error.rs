// Copyright (C) 2025 Livra Contributors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Error types for livra-core.
//!
//! Provides a unified error type with stable machine-readable codes that the
//! HTTP layer maps onto response statuses.

use std::fmt;

/// Result type using CoreError
pub type Result<T> = std::result::Result<T, CoreError>;

/// Core errors that can occur while driving lifecycle runs.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub enum CoreError {
    /// Persona was not found in the database.
    PersonaNotFound {
        /// The persona ID that was not found.
        persona_id: String,
    },

    /// Memory was not found in the database.
    MemoryNotFound {
        /// The memory ID that was not found.
        memory_id: i64,
    },

    /// The referenced memory belongs to a different persona.
    MemoryPersonaMismatch {
        /// The memory ID used for the retry.
        memory_id: i64,
        /// The persona the retry targeted.
        persona_id: String,
    },

    /// Lifecycle run was not found.
    RunNotFound {
        /// The run ID that was not found.
        run_id: String,
    },

    /// A non-cancelled run is already active for the persona.
    RunAlreadyActive {
        /// The persona with the active run.
        persona_id: String,
        /// The active run's ID.
        run_id: String,
    },

    /// Input validation failed.
    ValidationError {
        /// The field that failed validation.
        field: String,
        /// The validation error message.
        message: String,
    },

    /// The engine's event channel is closed (engine shut down).
    GatewayClosed,

    /// Database operation failed.
    DatabaseError {
        /// The operation that failed.
        operation: String,
        /// Error details.
        details: String,
    },
}

impl CoreError {
    /// Get the stable error code string for this error type.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::PersonaNotFound { .. } => "PERSONA_NOT_FOUND",
            Self::MemoryNotFound { .. } => "MEMORY_NOT_FOUND",
            Self::MemoryPersonaMismatch { .. } => "MEMORY_PERSONA_MISMATCH",
            Self::RunNotFound { .. } => "RUN_NOT_FOUND",
            Self::RunAlreadyActive { .. } => "RUN_ALREADY_ACTIVE",
            Self::ValidationError { .. } => "VALIDATION_ERROR",
            Self::GatewayClosed => "GATEWAY_CLOSED",
            Self::DatabaseError { .. } => "DATABASE_ERROR",
        }
    }
}

impl fmt::Display for CoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PersonaNotFound { persona_id } => {
                write!(f, "Persona '{}' not found", persona_id)
            }
            Self::MemoryNotFound { memory_id } => {
                write!(f, "Memory {} not found", memory_id)
            }
            Self::MemoryPersonaMismatch {
                memory_id,
                persona_id,
            } => {
                write!(
                    f,
                    "Memory {} does not belong to persona '{}'",
                    memory_id, persona_id
                )
            }
            Self::RunNotFound { run_id } => {
                write!(f, "Lifecycle run '{}' not found", run_id)
            }
            Self::RunAlreadyActive { persona_id, run_id } => {
                write!(
                    f,
                    "Persona '{}' already has active run '{}'",
                    persona_id, run_id
                )
            }
            Self::ValidationError { field, message } => {
                write!(f, "Validation error for '{}': {}", field, message)
            }
            Self::GatewayClosed => {
                write!(f, "Lifecycle event gateway is closed")
            }
            Self::DatabaseError { operation, details } => {
                write!(f, "Database error during '{}': {}", operation, details)
            }
        }
    }
}

impl std::error::Error for CoreError {}

impl From<sqlx::Error> for CoreError {
    fn from(err: sqlx::Error) -> Self {
        CoreError::DatabaseError {
            operation: "query".to_string(),
            details: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        CoreError::DatabaseError {
            operation: "json".to_string(),
            details: err.to_string(),
        }
    }
}
