// Copyright (C) 2025 Livra Contributors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Wake scheduler for sleeping runs.
//!
//! Sleeping runs hold no task, timer, or in-memory state; the `sleep_until`
//! column is the only record of the pending wake. This scheduler polls for
//! due runs and feeds them back to the engine through the gateway, which
//! makes wakes survive process restarts for free.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{info, warn};

use crate::gateway::CycleGateway;
use crate::persistence::Persistence;

const WAKE_BATCH_LIMIT: i64 = 32;

/// Polls for sleeping runs whose wake time has arrived.
pub struct WakeScheduler {
    persistence: Arc<dyn Persistence>,
    gateway: CycleGateway,
    poll_interval: Duration,
}

impl WakeScheduler {
    /// Create a scheduler polling at `poll_interval`.
    pub fn new(
        persistence: Arc<dyn Persistence>,
        gateway: CycleGateway,
        poll_interval: Duration,
    ) -> Self {
        Self {
            persistence,
            gateway,
            poll_interval,
        }
    }

    /// Spawn the polling loop until shutdown.
    pub fn spawn(self, mut shutdown: watch::Receiver<bool>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            info!(interval = ?self.poll_interval, "wake scheduler started");
            let mut ticker = tokio::time::interval(self.poll_interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                    _ = ticker.tick() => {
                        self.poll_once().await;
                    }
                }
            }
            info!("wake scheduler stopped");
        })
    }

    /// One poll pass: queue a wake for every due run.
    ///
    /// Duplicate wakes are harmless; the engine ignores wakes for runs that
    /// are no longer sleeping.
    pub async fn poll_once(&self) {
        let due = match self.persistence.get_sleeping_runs_due(WAKE_BATCH_LIMIT).await {
            Ok(due) => due,
            Err(e) => {
                warn!(error = %e, "failed to query due runs");
                return;
            }
        };
        for run in due {
            info!(run_id = %run.run_id, "waking run");
            if let Err(e) = self.gateway.send_wake(&run.run_id).await {
                warn!(run_id = %run.run_id, error = %e, "failed to queue wake");
            }
        }
    }
}
