// Copyright (C) 2025 Livra Contributors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Persistence interfaces and backends for livra-core.
//!
//! This module defines the persistence abstraction and backend
//! implementations. All writes are single-row, last-writer-wins operations;
//! stages own disjoint rows so no multi-row transactions are needed.

pub mod sqlite;

pub use self::sqlite::SqlitePersistence;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::CoreError;
use crate::model::{
    ActivityRecord, MemoryRecord, PersonaRecord, PostRecord, RunCheckpointRecord, RunRecord,
    UserRecord,
};

/// Fields accepted by a persona appearance update.
///
/// `None` leaves the column untouched (partial update).
#[derive(Debug, Clone, Default)]
pub struct AppearanceUpdate {
    /// Hair descriptor.
    pub hair: Option<String>,
    /// Eye descriptor.
    pub eyes: Option<String>,
    /// Skin descriptor.
    pub skin: Option<String>,
    /// Body descriptor.
    pub body: Option<String>,
    /// Personality vibe.
    pub vibe: Option<String>,
    /// Clothing style.
    pub clothing_style: Option<String>,
}

/// One page of a timeline query plus its has-more flag.
///
/// `has_more` is true iff exactly `limit` rows were returned.
#[derive(Debug, Clone)]
pub struct Page<T> {
    /// The rows in this page, newest first.
    pub items: Vec<T>,
    /// Whether another page may exist.
    pub has_more: bool,
}

/// Persistence interface used by the engine, gateway, and HTTP layer.
#[allow(missing_docs)]
#[async_trait]
pub trait Persistence: Send + Sync {
    // ========================================================================
    // Users
    // ========================================================================

    /// Look up a user by auth-provider subject, creating it on first sight.
    async fn get_or_create_user(&self, auth_subject: &str) -> Result<UserRecord, CoreError>;

    async fn get_user(&self, user_id: &str) -> Result<Option<UserRecord>, CoreError>;

    // ========================================================================
    // Personas
    // ========================================================================

    async fn create_persona(&self, persona: &PersonaRecord) -> Result<(), CoreError>;

    async fn get_persona(&self, persona_id: &str) -> Result<Option<PersonaRecord>, CoreError>;

    /// List recently created personas, newest first.
    async fn list_recent_personas(&self, limit: i64) -> Result<Vec<PersonaRecord>, CoreError>;

    async fn update_persona_appearance(
        &self,
        persona_id: &str,
        update: &AppearanceUpdate,
    ) -> Result<(), CoreError>;

    async fn update_persona_avatar(
        &self,
        persona_id: &str,
        avatar_url: &str,
    ) -> Result<(), CoreError>;

    /// Set the persona's lifecycle status and current activity in one write.
    async fn set_persona_lifecycle(
        &self,
        persona_id: &str,
        status: &str,
        current_activity: Option<&str>,
        activity_started_at: Option<DateTime<Utc>>,
    ) -> Result<(), CoreError>;

    /// Adjust the persona's balance by `delta_cents` (may be negative).
    async fn adjust_persona_balance(
        &self,
        persona_id: &str,
        delta_cents: i64,
    ) -> Result<(), CoreError>;

    // ========================================================================
    // Activities / Memories / Posts (append-only)
    // ========================================================================

    async fn insert_activity(&self, activity: &ActivityRecord) -> Result<i64, CoreError>;

    async fn insert_memory(&self, memory: &MemoryRecord) -> Result<i64, CoreError>;

    async fn get_memory(&self, memory_id: i64) -> Result<Option<MemoryRecord>, CoreError>;

    /// Page through a persona's memories, newest first.
    async fn list_memories(
        &self,
        persona_id: &str,
        limit: i64,
        offset: i64,
    ) -> Result<Page<MemoryRecord>, CoreError>;

    async fn insert_post(&self, post: &PostRecord) -> Result<i64, CoreError>;

    async fn get_post(&self, post_id: i64) -> Result<Option<PostRecord>, CoreError>;

    /// Page through a persona's posts, newest first by `posted_at`.
    async fn list_posts(
        &self,
        persona_id: &str,
        limit: i64,
        offset: i64,
    ) -> Result<Page<PostRecord>, CoreError>;

    /// Most recent post content URLs, for use as generation references.
    async fn recent_post_urls(
        &self,
        persona_id: &str,
        limit: i64,
    ) -> Result<Vec<String>, CoreError>;

    /// Count posts for a persona (test/observability helper).
    async fn count_posts(&self, persona_id: &str) -> Result<i64, CoreError>;

    // ========================================================================
    // Lifecycle runs
    // ========================================================================

    async fn create_run(&self, run: &RunRecord) -> Result<(), CoreError>;

    async fn get_run(&self, run_id: &str) -> Result<Option<RunRecord>, CoreError>;

    /// The persona's single non-terminal run (pending, running, or sleeping),
    /// if one exists.
    async fn get_active_run(&self, persona_id: &str) -> Result<Option<RunRecord>, CoreError>;

    /// All runs currently in the given status (startup recovery).
    async fn get_runs_by_status(&self, status: &str) -> Result<Vec<RunRecord>, CoreError>;

    async fn update_run_status(
        &self,
        run_id: &str,
        status: &str,
        started_at: Option<DateTime<Utc>>,
    ) -> Result<(), CoreError>;

    /// Record a checkpoint and advance the run's stage pointer.
    ///
    /// The checkpoint row is written first; the stage pointer only moves if
    /// that write succeeded.
    async fn save_run_checkpoint(
        &self,
        run_id: &str,
        stage: &str,
        state: &str,
    ) -> Result<(), CoreError>;

    /// Latest checkpoint for a run, if any.
    async fn load_latest_checkpoint(
        &self,
        run_id: &str,
    ) -> Result<Option<RunCheckpointRecord>, CoreError>;

    /// Move a run to a terminal status and stamp `finished_at`.
    async fn finish_run(
        &self,
        run_id: &str,
        status: &str,
        error: Option<&str>,
    ) -> Result<(), CoreError>;

    /// Set the wake timestamp and mark the run sleeping.
    async fn set_run_sleep(
        &self,
        run_id: &str,
        sleep_until: DateTime<Utc>,
    ) -> Result<(), CoreError>;

    /// Clear the wake timestamp and mark the run running again.
    async fn clear_run_sleep(&self, run_id: &str) -> Result<(), CoreError>;

    /// Sleeping runs whose wake time has arrived (`sleep_until <= now`).
    async fn get_sleeping_runs_due(&self, limit: i64) -> Result<Vec<RunRecord>, CoreError>;

    // ========================================================================
    // Cancellation tombstones (run-scoped)
    // ========================================================================

    /// Record a cancellation tombstone for a run instance.
    async fn insert_cancellation(&self, run_id: &str) -> Result<(), CoreError>;

    /// Whether a cancellation tombstone exists for this run.
    async fn is_run_cancelled(&self, run_id: &str) -> Result<bool, CoreError>;

    // ========================================================================
    // Health
    // ========================================================================

    async fn health_check_db(&self) -> Result<bool, CoreError>;
}
