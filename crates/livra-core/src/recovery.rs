// Copyright (C) 2025 Livra Contributors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Retry and crash recovery planning.
//!
//! An ERROR memory is the durable handle for retrying a failed cycle: its
//! payload carries the [`ErrorCheckpoint`] with the full carried-forward
//! state, so a retry re-enters at the failed stage instead of re-executing
//! the whole cycle (and re-publishing its posts).

use crate::error::CoreError;
use crate::model::{CycleState, ErrorCheckpoint, MemoryKind};
use crate::persistence::Persistence;

/// Where a retried or recovered run should re-enter.
#[derive(Debug, Clone)]
pub struct ResumePlan {
    /// The run the checkpoint came from (provenance, not the new run's id).
    pub source_run_id: String,
    /// State to seed the new run with, positioned at the failed stage.
    pub state: CycleState,
}

/// Build a resume plan from an ERROR memory.
///
/// Validates that the memory exists, belongs to `persona_id`, and carries a
/// parseable checkpoint payload. A memory from another persona is rejected so
/// a retry can never replay one persona's state into another's timeline.
pub async fn plan_from_memory(
    persistence: &dyn Persistence,
    persona_id: &str,
    memory_id: i64,
) -> Result<ResumePlan, CoreError> {
    let memory = persistence
        .get_memory(memory_id)
        .await?
        .ok_or(CoreError::MemoryNotFound { memory_id })?;

    if memory.persona_id != persona_id {
        return Err(CoreError::MemoryPersonaMismatch {
            memory_id,
            persona_id: persona_id.to_string(),
        });
    }

    if memory.kind != MemoryKind::Error.as_str() {
        return Err(CoreError::ValidationError {
            field: "memory_id".to_string(),
            message: format!("memory {} is not an error memory", memory_id),
        });
    }

    let payload = memory.payload.ok_or_else(|| CoreError::ValidationError {
        field: "memory_id".to_string(),
        message: format!("error memory {} has no checkpoint payload", memory_id),
    })?;

    let checkpoint: ErrorCheckpoint =
        serde_json::from_str(&payload).map_err(|e| CoreError::ValidationError {
            field: "memory_id".to_string(),
            message: format!("error memory {} payload is not a checkpoint: {}", memory_id, e),
        })?;

    let mut state = checkpoint.state;
    state.stage = checkpoint.failed_stage;

    Ok(ResumePlan {
        source_run_id: checkpoint.run_id,
        state,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{MemoryRecord, PersonaRecord, Stage};
    use crate::persistence::SqlitePersistence;
    use chrono::Utc;

    async fn db_with_persona(persona_id: &str) -> (SqlitePersistence, tempfile::TempDir) {
        let dir = tempfile::tempdir().expect("tempdir");
        let db = SqlitePersistence::from_path(dir.path().join("test.db"))
            .await
            .expect("open db");
        db.create_persona(&PersonaRecord {
            persona_id: persona_id.to_string(),
            owner_user_id: None,
            display_name: "Mara".to_string(),
            hair: String::new(),
            eyes: String::new(),
            skin: String::new(),
            body: String::new(),
            vibe: String::new(),
            clothing_style: String::new(),
            country: "PT".to_string(),
            city: "Lisbon".to_string(),
            neighborhood: String::new(),
            avatar_url: None,
            lifecycle_status: "idle".to_string(),
            current_activity: None,
            current_activity_started_at: None,
            balance_cents: 0,
            is_public: false,
            created_at: Utc::now(),
        })
        .await
        .unwrap();
        (db, dir)
    }

    fn error_memory(persona_id: &str, payload: Option<String>) -> MemoryRecord {
        MemoryRecord {
            id: None,
            persona_id: persona_id.to_string(),
            kind: MemoryKind::Error.as_str().to_string(),
            content: "Image production failed".to_string(),
            importance: 10,
            payload,
            created_at: Utc::now(),
        }
    }

    fn checkpoint_payload() -> String {
        serde_json::to_string(&ErrorCheckpoint {
            run_id: "run-1".to_string(),
            failed_stage: Stage::ProducingImage,
            error: "upstream timeout".to_string(),
            state: CycleState {
                stage: Stage::ProducingImage,
                environment: None,
                plan: None,
                image_post_id: None,
            },
        })
        .unwrap()
    }

    #[tokio::test]
    async fn plan_resumes_at_failed_stage() {
        let (db, _dir) = db_with_persona("p1").await;
        let memory_id = db
            .insert_memory(&error_memory("p1", Some(checkpoint_payload())))
            .await
            .unwrap();

        let plan = plan_from_memory(&db, "p1", memory_id).await.unwrap();
        assert_eq!(plan.source_run_id, "run-1");
        assert_eq!(plan.state.stage, Stage::ProducingImage);
    }

    #[tokio::test]
    async fn missing_memory_is_not_found() {
        let (db, _dir) = db_with_persona("p1").await;
        let err = plan_from_memory(&db, "p1", 999).await.unwrap_err();
        assert_eq!(err.error_code(), "MEMORY_NOT_FOUND");
    }

    #[tokio::test]
    async fn cross_persona_memory_is_rejected() {
        let (db, _dir) = db_with_persona("p1").await;
        let memory_id = db
            .insert_memory(&error_memory("p1", Some(checkpoint_payload())))
            .await
            .unwrap();

        let err = plan_from_memory(&db, "p2", memory_id).await.unwrap_err();
        assert_eq!(err.error_code(), "MEMORY_PERSONA_MISMATCH");
    }

    #[tokio::test]
    async fn non_error_memory_is_rejected() {
        let (db, _dir) = db_with_persona("p1").await;
        let memory_id = db
            .insert_memory(&MemoryRecord {
                kind: MemoryKind::Observation.as_str().to_string(),
                ..error_memory("p1", None)
            })
            .await
            .unwrap();

        let err = plan_from_memory(&db, "p1", memory_id).await.unwrap_err();
        assert_eq!(err.error_code(), "VALIDATION_ERROR");
    }
}
