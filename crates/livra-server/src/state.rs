// Copyright (C) 2025 Livra Contributors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Shared application state for the HTTP layer.

use std::sync::Arc;

use livra_core::gateway::CycleGateway;
use livra_core::persistence::Persistence;

use crate::auth::AuthResolver;

/// Dependencies shared by every handler. Cheap to clone.
#[derive(Clone)]
pub struct AppState {
    /// Persistence backend.
    pub persistence: Arc<dyn Persistence>,
    /// Entry point for lifecycle control events.
    pub gateway: CycleGateway,
    /// Resolves bearer tokens to auth subjects.
    pub auth: Arc<dyn AuthResolver>,
}
