// Copyright (C) 2025 Livra Contributors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Livra Core - Persona Lifecycle Engine
//!
//! This crate provides the execution engine for autonomous persona lifecycles.
//! It drives each persona through a fixed sequence of stages, persisting a
//! checkpoint before every transition so a run can be resumed after a crash,
//! a durable sleep, or an explicit retry.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                      HTTP API (livra-server)                    │
//! └─────────────────────────────────────────────────────────────────┘
//!                │ cycle.start / cycle.stop
//!                ▼
//! ┌──────────────────────┐        ┌─────────────────────────────────┐
//! │     CycleGateway     │──────▶ │        LifecycleEngine          │
//! │  (validated events)  │  mpsc  │  run drivers + checkpointing    │
//! └──────────────────────┘        └─────────────────────────────────┘
//!                                    │                 ▲
//!                       StepEffects  │                 │ resume due runs
//!                                    ▼                 │
//!                        ┌───────────────────┐  ┌───────────────┐
//!                        │ Generative / AI   │  │ WakeScheduler │
//!                        │ (livra-generative)│  └───────────────┘
//!                        └───────────────────┘
//!                                    │
//!                                    ▼
//!                        ┌───────────────────┐
//!                        │      SQLite       │
//!                        │ (durable storage) │
//!                        └───────────────────┘
//! ```
//!
//! # Run State Machine
//!
//! ```text
//!   ┌─────────┐  start  ┌─────────┐      ┌──────────┐      ┌────────────────┐
//!   │ pending │────────▶│ sensing │─────▶│ planning │─────▶│ producing_image│
//!   └─────────┘         └─────────┘      └──────────┘      └───────┬────────┘
//!                                                                  │
//!        ┌───────────┐  wake  ┌──────────────────┐                 ▼
//!        │ completed │◀───────│ producing_video  │◀────────── sleeping
//!        └───────────┘        └──────────────────┘        (durable timer)
//!
//!   Any non-terminal stage ──step failure──▶ errored (ERROR memory written)
//!   Any stage boundary ──tombstone found──▶ cancelled
//! ```
//!
//! A run is one full cycle; looping back to idle is the caller's next
//! `cycle.start`. Cancellation tombstones are keyed by run id, so stopping an
//! old run never affects a new one started immediately afterwards.
//!
//! # Checkpoint Semantics
//!
//! Every stage result is written to `run_checkpoints` *before* the run's
//! stage pointer advances (at-least-once execution per stage). On restart the
//! engine reloads the latest checkpoint and re-enters at the recorded stage.
//!
//! # Modules
//!
//! - [`config`]: Engine configuration from environment variables
//! - [`engine`]: Lifecycle run drivers and checkpointing
//! - [`error`]: Error types with stable error codes
//! - [`gateway`]: Validated `cycle.start` / `cycle.stop` event gateway
//! - [`migrations`]: Embedded database migrations
//! - [`model`]: Domain records and the run state types
//! - [`persistence`]: Storage trait and the SQLite backend
//! - [`recovery`]: Resume-from-retry reconstruction
//! - [`steps`]: External step effects contract
//! - [`wake`]: Durable sleep wake scheduler

#![deny(missing_docs)]

/// Engine configuration loaded from environment variables.
pub mod config;

/// Lifecycle run drivers, checkpointing, cancellation, and error capture.
pub mod engine;

/// Error types for engine operations with stable error codes.
pub mod error;

/// Event gateway: validated lifecycle control events.
pub mod gateway;

/// Embedded database migrations.
pub mod migrations;

/// Domain records and run state types.
pub mod model;

/// Persistence trait and SQLite backend.
pub mod persistence;

/// Resume-from-retry: rebuilding a run's re-entry point from an ERROR memory.
pub mod recovery;

/// External step effects invoked by the engine.
pub mod steps;

/// Wake scheduler for durable sleep.
pub mod wake;
