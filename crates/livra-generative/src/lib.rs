// Copyright (C) 2025 Livra Contributors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Live implementations of the lifecycle step effects.
//!
//! This crate talks to the outside world on behalf of the engine:
//!
//! - an OpenAI-compatible API for planning (chat), image generation, and
//!   video generation
//! - an environment service for weather and trends sensing
//!
//! The engine only sees the [`livra_core::steps::StepEffects`] trait;
//! [`effects::LiveStepEffects`] is the production implementation, built from
//! [`config::GenerativeConfig`].

#![deny(missing_docs)]

pub mod client;
pub mod config;
pub mod effects;
pub mod environment;
pub mod error;
pub mod prompts;

pub use effects::LiveStepEffects;
