// Copyright (C) 2025 Livra Contributors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! HTTP API for livra.
//!
//! Exposes the persona/influencer surface over axum: entity CRUD, lifecycle
//! control (start on create, explicit retry), paginated timelines, and the
//! public pulse lookup. The router is built from [`state::AppState`] so tests
//! can run it in-process without binding a socket.

#![deny(missing_docs)]

pub mod auth;
pub mod error;
pub mod routes;
pub mod state;

pub use routes::build_router;
pub use state::AppState;
