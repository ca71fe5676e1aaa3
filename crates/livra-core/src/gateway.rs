// Copyright (C) 2025 Livra Contributors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Lifecycle event gateway.
//!
//! The gateway is the single entry point through which the outside world
//! (HTTP handlers, startup recovery, the wake scheduler) asks the engine to
//! start or stop lifecycle cycles. Events are queued on a bounded channel and
//! consumed by the engine's event loop, so callers never touch run state
//! directly.

use tokio::sync::mpsc;
use uuid::Uuid;

use crate::error::CoreError;

/// A control event accepted by the gateway.
#[derive(Debug, Clone)]
pub enum ControlEvent {
    /// Begin a lifecycle cycle for a persona.
    Start {
        /// Persona to drive.
        persona_id: String,
        /// ERROR memory to resume from, if this is a retry.
        retry_memory_id: Option<i64>,
        /// Supersede any active run instead of rejecting the start.
        force: bool,
    },
    /// Stop the persona's active cycle.
    Stop {
        /// Persona whose cycle should stop.
        persona_id: String,
    },
    /// Resume a sleeping run whose wake time has arrived.
    Wake {
        /// The sleeping run to resume.
        run_id: String,
    },
}

/// An event queued for the engine, tagged with a unique id for tracing.
#[derive(Debug, Clone)]
pub struct QueuedEvent {
    /// Unique identifier for this event instance.
    pub event_id: Uuid,
    /// The control event.
    pub event: ControlEvent,
}

/// Sender half of the lifecycle event queue.
///
/// Cheap to clone; every handler holds one.
#[derive(Clone)]
pub struct CycleGateway {
    tx: mpsc::Sender<QueuedEvent>,
}

impl CycleGateway {
    /// Create a gateway and the receiver the engine consumes from.
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<QueuedEvent>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }

    /// Queue a cycle start for a persona.
    ///
    /// Returns the event id. Existence and active-run checks happen in the
    /// engine, which owns run state.
    pub async fn send_start(
        &self,
        persona_id: &str,
        retry_memory_id: Option<i64>,
        force: bool,
    ) -> Result<Uuid, CoreError> {
        if persona_id.is_empty() {
            return Err(CoreError::ValidationError {
                field: "persona_id".to_string(),
                message: "must not be empty".to_string(),
            });
        }
        self.send(ControlEvent::Start {
            persona_id: persona_id.to_string(),
            retry_memory_id,
            force,
        })
        .await
    }

    /// Queue a cycle stop for a persona.
    pub async fn send_stop(&self, persona_id: &str) -> Result<Uuid, CoreError> {
        if persona_id.is_empty() {
            return Err(CoreError::ValidationError {
                field: "persona_id".to_string(),
                message: "must not be empty".to_string(),
            });
        }
        self.send(ControlEvent::Stop {
            persona_id: persona_id.to_string(),
        })
        .await
    }

    /// Queue a wake for a sleeping run. Used by the wake scheduler.
    pub async fn send_wake(&self, run_id: &str) -> Result<Uuid, CoreError> {
        self.send(ControlEvent::Wake {
            run_id: run_id.to_string(),
        })
        .await
    }

    async fn send(&self, event: ControlEvent) -> Result<Uuid, CoreError> {
        let event_id = Uuid::new_v4();
        self.tx
            .send(QueuedEvent { event_id, event })
            .await
            .map_err(|_| CoreError::GatewayClosed)?;
        Ok(event_id)
    }
}
