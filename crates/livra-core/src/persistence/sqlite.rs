// Copyright (C) 2025 Livra Contributors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! SQLite-backed persistence implementation.

use std::path::Path;

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use sqlx::sqlite::SqlitePoolOptions;
use uuid::Uuid;

use crate::error::CoreError;
use crate::model::{
    ActivityRecord, MemoryRecord, PersonaRecord, PostRecord, RunCheckpointRecord, RunRecord,
    UserRecord,
};

use super::{AppearanceUpdate, Page, Persistence};

/// SQLite-backed persistence provider.
#[derive(Clone)]
pub struct SqlitePersistence {
    pool: SqlitePool,
}

impl SqlitePersistence {
    /// Create a new SQLite persistence provider from an existing pool.
    ///
    /// Migrations must already have been applied (see [`crate::migrations`]).
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create and initialize a new SQLite persistence from a file path.
    ///
    /// This convenience constructor handles all setup:
    /// - Creates parent directories if they don't exist
    /// - Creates the database file if it doesn't exist
    /// - Connects to the database with sensible defaults
    /// - Runs all migrations
    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self, CoreError> {
        let path = path.as_ref();

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| CoreError::DatabaseError {
                operation: "create_dir".to_string(),
                details: format!("Failed to create directory {:?}: {}", parent, e),
            })?;
        }

        let url = format!("sqlite:{}?mode=rwc", path.to_string_lossy());
        Self::connect(&url).await
    }

    /// Connect by URL and run migrations.
    pub async fn connect(url: &str) -> Result<Self, CoreError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(url)
            .await
            .map_err(|e| CoreError::DatabaseError {
                operation: "connect".to_string(),
                details: format!("Failed to connect to SQLite at {}: {}", url, e),
            })?;

        crate::migrations::run_sqlite(&pool)
            .await
            .map_err(|e| CoreError::DatabaseError {
                operation: "migrate".to_string(),
                details: format!("Failed to run migrations: {}", e),
            })?;

        Ok(Self { pool })
    }

    /// Access the underlying pool (tests, ad-hoc queries).
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

const PERSONA_COLUMNS: &str = r#"
    persona_id, owner_user_id, display_name, hair, eyes, skin, body, vibe,
    clothing_style, country, city, neighborhood, avatar_url, lifecycle_status,
    current_activity, current_activity_started_at, balance_cents, is_public,
    created_at
"#;

const RUN_COLUMNS: &str = r#"
    run_id, persona_id, status, stage, sleep_until, error,
    created_at, started_at, finished_at
"#;

#[async_trait::async_trait]
impl Persistence for SqlitePersistence {
    async fn get_or_create_user(&self, auth_subject: &str) -> Result<UserRecord, CoreError> {
        if let Some(user) = sqlx::query_as::<_, UserRecord>(
            r#"
            SELECT user_id, auth_subject, created_at
            FROM users
            WHERE auth_subject = ?
            "#,
        )
        .bind(auth_subject)
        .fetch_optional(&self.pool)
        .await?
        {
            return Ok(user);
        }

        let user_id = Uuid::new_v4().to_string();
        sqlx::query(
            r#"
            INSERT INTO users (user_id, auth_subject, created_at)
            VALUES (?, ?, ?)
            ON CONFLICT (auth_subject) DO NOTHING
            "#,
        )
        .bind(&user_id)
        .bind(auth_subject)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        // Re-read: a concurrent request may have won the insert.
        let user = sqlx::query_as::<_, UserRecord>(
            r#"
            SELECT user_id, auth_subject, created_at
            FROM users
            WHERE auth_subject = ?
            "#,
        )
        .bind(auth_subject)
        .fetch_one(&self.pool)
        .await?;

        Ok(user)
    }

    async fn get_user(&self, user_id: &str) -> Result<Option<UserRecord>, CoreError> {
        let user = sqlx::query_as::<_, UserRecord>(
            r#"
            SELECT user_id, auth_subject, created_at
            FROM users
            WHERE user_id = ?
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    async fn create_persona(&self, persona: &PersonaRecord) -> Result<(), CoreError> {
        sqlx::query(
            r#"
            INSERT INTO personas (
                persona_id, owner_user_id, display_name, hair, eyes, skin, body,
                vibe, clothing_style, country, city, neighborhood, avatar_url,
                lifecycle_status, current_activity, current_activity_started_at,
                balance_cents, is_public, created_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&persona.persona_id)
        .bind(&persona.owner_user_id)
        .bind(&persona.display_name)
        .bind(&persona.hair)
        .bind(&persona.eyes)
        .bind(&persona.skin)
        .bind(&persona.body)
        .bind(&persona.vibe)
        .bind(&persona.clothing_style)
        .bind(&persona.country)
        .bind(&persona.city)
        .bind(&persona.neighborhood)
        .bind(&persona.avatar_url)
        .bind(&persona.lifecycle_status)
        .bind(&persona.current_activity)
        .bind(persona.current_activity_started_at)
        .bind(persona.balance_cents)
        .bind(persona.is_public)
        .bind(persona.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_persona(&self, persona_id: &str) -> Result<Option<PersonaRecord>, CoreError> {
        let persona = sqlx::query_as::<_, PersonaRecord>(&format!(
            "SELECT {PERSONA_COLUMNS} FROM personas WHERE persona_id = ?"
        ))
        .bind(persona_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(persona)
    }

    async fn list_recent_personas(&self, limit: i64) -> Result<Vec<PersonaRecord>, CoreError> {
        let personas = sqlx::query_as::<_, PersonaRecord>(&format!(
            "SELECT {PERSONA_COLUMNS} FROM personas ORDER BY created_at DESC, persona_id LIMIT ?"
        ))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(personas)
    }

    async fn update_persona_appearance(
        &self,
        persona_id: &str,
        update: &AppearanceUpdate,
    ) -> Result<(), CoreError> {
        sqlx::query(
            r#"
            UPDATE personas
            SET hair = COALESCE(?1, hair),
                eyes = COALESCE(?2, eyes),
                skin = COALESCE(?3, skin),
                body = COALESCE(?4, body),
                vibe = COALESCE(?5, vibe),
                clothing_style = COALESCE(?6, clothing_style)
            WHERE persona_id = ?7
            "#,
        )
        .bind(&update.hair)
        .bind(&update.eyes)
        .bind(&update.skin)
        .bind(&update.body)
        .bind(&update.vibe)
        .bind(&update.clothing_style)
        .bind(persona_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn update_persona_avatar(
        &self,
        persona_id: &str,
        avatar_url: &str,
    ) -> Result<(), CoreError> {
        sqlx::query(
            r#"
            UPDATE personas
            SET avatar_url = ?
            WHERE persona_id = ?
            "#,
        )
        .bind(avatar_url)
        .bind(persona_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn set_persona_lifecycle(
        &self,
        persona_id: &str,
        status: &str,
        current_activity: Option<&str>,
        activity_started_at: Option<DateTime<Utc>>,
    ) -> Result<(), CoreError> {
        sqlx::query(
            r#"
            UPDATE personas
            SET lifecycle_status = ?,
                current_activity = ?,
                current_activity_started_at = ?
            WHERE persona_id = ?
            "#,
        )
        .bind(status)
        .bind(current_activity)
        .bind(activity_started_at)
        .bind(persona_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn adjust_persona_balance(
        &self,
        persona_id: &str,
        delta_cents: i64,
    ) -> Result<(), CoreError> {
        sqlx::query(
            r#"
            UPDATE personas
            SET balance_cents = balance_cents + ?
            WHERE persona_id = ?
            "#,
        )
        .bind(delta_cents)
        .bind(persona_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn insert_activity(&self, activity: &ActivityRecord) -> Result<i64, CoreError> {
        let result = sqlx::query(
            r#"
            INSERT INTO activities (persona_id, name, status, image_url, metadata, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&activity.persona_id)
        .bind(&activity.name)
        .bind(&activity.status)
        .bind(&activity.image_url)
        .bind(&activity.metadata)
        .bind(activity.created_at)
        .execute(&self.pool)
        .await?;

        Ok(result.last_insert_rowid())
    }

    async fn insert_memory(&self, memory: &MemoryRecord) -> Result<i64, CoreError> {
        let result = sqlx::query(
            r#"
            INSERT INTO memories (persona_id, kind, content, importance, payload, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&memory.persona_id)
        .bind(&memory.kind)
        .bind(&memory.content)
        .bind(memory.importance)
        .bind(&memory.payload)
        .bind(memory.created_at)
        .execute(&self.pool)
        .await?;

        Ok(result.last_insert_rowid())
    }

    async fn get_memory(&self, memory_id: i64) -> Result<Option<MemoryRecord>, CoreError> {
        let memory = sqlx::query_as::<_, MemoryRecord>(
            r#"
            SELECT id, persona_id, kind, content, importance, payload, created_at
            FROM memories
            WHERE id = ?
            "#,
        )
        .bind(memory_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(memory)
    }

    async fn list_memories(
        &self,
        persona_id: &str,
        limit: i64,
        offset: i64,
    ) -> Result<Page<MemoryRecord>, CoreError> {
        let items = sqlx::query_as::<_, MemoryRecord>(
            r#"
            SELECT id, persona_id, kind, content, importance, payload, created_at
            FROM memories
            WHERE persona_id = ?
            ORDER BY id DESC
            LIMIT ? OFFSET ?
            "#,
        )
        .bind(persona_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        let has_more = items.len() as i64 == limit;
        Ok(Page { items, has_more })
    }

    async fn insert_post(&self, post: &PostRecord) -> Result<i64, CoreError> {
        let result = sqlx::query(
            r#"
            INSERT INTO posts (persona_id, kind, caption, content_url, prompt, posted_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&post.persona_id)
        .bind(&post.kind)
        .bind(&post.caption)
        .bind(&post.content_url)
        .bind(&post.prompt)
        .bind(post.posted_at)
        .execute(&self.pool)
        .await?;

        Ok(result.last_insert_rowid())
    }

    async fn get_post(&self, post_id: i64) -> Result<Option<PostRecord>, CoreError> {
        let post = sqlx::query_as::<_, PostRecord>(
            r#"
            SELECT id, persona_id, kind, caption, content_url, prompt, posted_at
            FROM posts
            WHERE id = ?
            "#,
        )
        .bind(post_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(post)
    }

    async fn list_posts(
        &self,
        persona_id: &str,
        limit: i64,
        offset: i64,
    ) -> Result<Page<PostRecord>, CoreError> {
        // posted_at desc; id breaks ties for rows posted in the same second.
        let items = sqlx::query_as::<_, PostRecord>(
            r#"
            SELECT id, persona_id, kind, caption, content_url, prompt, posted_at
            FROM posts
            WHERE persona_id = ?
            ORDER BY datetime(posted_at) DESC, id DESC
            LIMIT ? OFFSET ?
            "#,
        )
        .bind(persona_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        let has_more = items.len() as i64 == limit;
        Ok(Page { items, has_more })
    }

    async fn recent_post_urls(
        &self,
        persona_id: &str,
        limit: i64,
    ) -> Result<Vec<String>, CoreError> {
        let rows: Vec<(String,)> = sqlx::query_as(
            r#"
            SELECT content_url
            FROM posts
            WHERE persona_id = ? AND kind = 'image'
            ORDER BY id DESC
            LIMIT ?
            "#,
        )
        .bind(persona_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|r| r.0).collect())
    }

    async fn count_posts(&self, persona_id: &str) -> Result<i64, CoreError> {
        let row: (i64,) = sqlx::query_as(
            r#"
            SELECT COUNT(*) FROM posts WHERE persona_id = ?
            "#,
        )
        .bind(persona_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.0)
    }

    async fn create_run(&self, run: &RunRecord) -> Result<(), CoreError> {
        sqlx::query(
            r#"
            INSERT INTO lifecycle_runs (
                run_id, persona_id, status, stage, sleep_until, error,
                created_at, started_at, finished_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&run.run_id)
        .bind(&run.persona_id)
        .bind(&run.status)
        .bind(&run.stage)
        .bind(run.sleep_until)
        .bind(&run.error)
        .bind(run.created_at)
        .bind(run.started_at)
        .bind(run.finished_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_run(&self, run_id: &str) -> Result<Option<RunRecord>, CoreError> {
        let run = sqlx::query_as::<_, RunRecord>(&format!(
            "SELECT {RUN_COLUMNS} FROM lifecycle_runs WHERE run_id = ?"
        ))
        .bind(run_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(run)
    }

    async fn get_active_run(&self, persona_id: &str) -> Result<Option<RunRecord>, CoreError> {
        let run = sqlx::query_as::<_, RunRecord>(&format!(
            r#"
            SELECT {RUN_COLUMNS}
            FROM lifecycle_runs
            WHERE persona_id = ? AND status IN ('pending', 'running', 'sleeping')
            ORDER BY created_at DESC
            LIMIT 1
            "#
        ))
        .bind(persona_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(run)
    }

    async fn get_runs_by_status(&self, status: &str) -> Result<Vec<RunRecord>, CoreError> {
        let runs = sqlx::query_as::<_, RunRecord>(&format!(
            "SELECT {RUN_COLUMNS} FROM lifecycle_runs WHERE status = ?"
        ))
        .bind(status)
        .fetch_all(&self.pool)
        .await?;

        Ok(runs)
    }

    async fn update_run_status(
        &self,
        run_id: &str,
        status: &str,
        started_at: Option<DateTime<Utc>>,
    ) -> Result<(), CoreError> {
        if let Some(started) = started_at {
            sqlx::query(
                r#"
                UPDATE lifecycle_runs
                SET status = ?, started_at = ?
                WHERE run_id = ?
                "#,
            )
            .bind(status)
            .bind(started)
            .bind(run_id)
            .execute(&self.pool)
            .await?;
        } else {
            sqlx::query(
                r#"
                UPDATE lifecycle_runs
                SET status = ?
                WHERE run_id = ?
                "#,
            )
            .bind(status)
            .bind(run_id)
            .execute(&self.pool)
            .await?;
        }

        Ok(())
    }

    async fn save_run_checkpoint(
        &self,
        run_id: &str,
        stage: &str,
        state: &str,
    ) -> Result<(), CoreError> {
        // Checkpoint first; the stage pointer only advances once the state is
        // durable.
        sqlx::query(
            r#"
            INSERT INTO run_checkpoints (run_id, stage, state, created_at)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(run_id)
        .bind(stage)
        .bind(state)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            UPDATE lifecycle_runs
            SET stage = ?
            WHERE run_id = ?
            "#,
        )
        .bind(stage)
        .bind(run_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn load_latest_checkpoint(
        &self,
        run_id: &str,
    ) -> Result<Option<RunCheckpointRecord>, CoreError> {
        let checkpoint = sqlx::query_as::<_, RunCheckpointRecord>(
            r#"
            SELECT id, run_id, stage, state, created_at
            FROM run_checkpoints
            WHERE run_id = ?
            ORDER BY id DESC
            LIMIT 1
            "#,
        )
        .bind(run_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(checkpoint)
    }

    async fn finish_run(
        &self,
        run_id: &str,
        status: &str,
        error: Option<&str>,
    ) -> Result<(), CoreError> {
        sqlx::query(
            r#"
            UPDATE lifecycle_runs
            SET status = ?,
                error = ?,
                sleep_until = NULL,
                finished_at = ?
            WHERE run_id = ?
            "#,
        )
        .bind(status)
        .bind(error)
        .bind(Utc::now())
        .bind(run_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn set_run_sleep(
        &self,
        run_id: &str,
        sleep_until: DateTime<Utc>,
    ) -> Result<(), CoreError> {
        sqlx::query(
            r#"
            UPDATE lifecycle_runs
            SET status = 'sleeping', sleep_until = ?
            WHERE run_id = ?
            "#,
        )
        .bind(sleep_until)
        .bind(run_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn clear_run_sleep(&self, run_id: &str) -> Result<(), CoreError> {
        sqlx::query(
            r#"
            UPDATE lifecycle_runs
            SET status = 'running', sleep_until = NULL
            WHERE run_id = ?
            "#,
        )
        .bind(run_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_sleeping_runs_due(&self, limit: i64) -> Result<Vec<RunRecord>, CoreError> {
        // datetime() normalizes the stored representation before comparing.
        let runs = sqlx::query_as::<_, RunRecord>(&format!(
            r#"
            SELECT {RUN_COLUMNS}
            FROM lifecycle_runs
            WHERE status = 'sleeping'
              AND sleep_until IS NOT NULL
              AND datetime(sleep_until) <= datetime('now')
            ORDER BY datetime(sleep_until)
            LIMIT ?
            "#
        ))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(runs)
    }

    async fn insert_cancellation(&self, run_id: &str) -> Result<(), CoreError> {
        sqlx::query(
            r#"
            INSERT INTO run_cancellations (run_id, created_at)
            VALUES (?, ?)
            ON CONFLICT (run_id) DO NOTHING
            "#,
        )
        .bind(run_id)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn is_run_cancelled(&self, run_id: &str) -> Result<bool, CoreError> {
        let row: Option<(i64,)> = sqlx::query_as(
            r#"
            SELECT 1 FROM run_cancellations WHERE run_id = ?
            "#,
        )
        .bind(run_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.is_some())
    }

    async fn health_check_db(&self) -> Result<bool, CoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{MemoryKind, PostKind};

    async fn test_persistence() -> (SqlitePersistence, tempfile::TempDir) {
        let dir = tempfile::tempdir().expect("tempdir");
        let persistence = SqlitePersistence::from_path(dir.path().join("test.db"))
            .await
            .expect("open db");
        (persistence, dir)
    }

    fn test_persona(persona_id: &str) -> PersonaRecord {
        PersonaRecord {
            persona_id: persona_id.to_string(),
            owner_user_id: None,
            display_name: "Mara".to_string(),
            hair: "auburn".to_string(),
            eyes: "green".to_string(),
            skin: "fair".to_string(),
            body: "athletic".to_string(),
            vibe: "sunny".to_string(),
            clothing_style: "streetwear".to_string(),
            country: "PT".to_string(),
            city: "Lisbon".to_string(),
            neighborhood: "Alfama".to_string(),
            avatar_url: None,
            lifecycle_status: "idle".to_string(),
            current_activity: None,
            current_activity_started_at: None,
            balance_cents: 10_000,
            is_public: false,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn persona_round_trip() {
        let (db, _dir) = test_persistence().await;
        db.create_persona(&test_persona("p1")).await.unwrap();

        let loaded = db.get_persona("p1").await.unwrap().expect("persona");
        assert_eq!(loaded.display_name, "Mara");
        assert_eq!(loaded.lifecycle_status, "idle");
        assert!(!loaded.is_public);
        assert_eq!(loaded.balance_cents, 10_000);

        assert!(db.get_persona("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn appearance_update_is_partial() {
        let (db, _dir) = test_persistence().await;
        db.create_persona(&test_persona("p1")).await.unwrap();

        db.update_persona_appearance(
            "p1",
            &AppearanceUpdate {
                hair: Some("platinum".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();

        let loaded = db.get_persona("p1").await.unwrap().unwrap();
        assert_eq!(loaded.hair, "platinum");
        assert_eq!(loaded.eyes, "green"); // untouched
    }

    #[tokio::test]
    async fn user_created_lazily_and_idempotently() {
        let (db, _dir) = test_persistence().await;

        let first = db.get_or_create_user("auth0|abc").await.unwrap();
        let second = db.get_or_create_user("auth0|abc").await.unwrap();
        assert_eq!(first.user_id, second.user_id);

        let other = db.get_or_create_user("auth0|xyz").await.unwrap();
        assert_ne!(first.user_id, other.user_id);
    }

    #[tokio::test]
    async fn post_pagination_has_more_flag() {
        let (db, _dir) = test_persistence().await;
        db.create_persona(&test_persona("p1")).await.unwrap();

        for i in 0..25 {
            db.insert_post(&PostRecord {
                id: None,
                persona_id: "p1".to_string(),
                kind: PostKind::Image.as_str().to_string(),
                caption: format!("post {i}"),
                content_url: format!("https://cdn.example/p{i}.png"),
                prompt: "prompt".to_string(),
                posted_at: Utc::now(),
            })
            .await
            .unwrap();
        }

        let first = db.list_posts("p1", 20, 0).await.unwrap();
        assert_eq!(first.items.len(), 20);
        assert!(first.has_more);
        // Newest first
        assert_eq!(first.items[0].caption, "post 24");

        let second = db.list_posts("p1", 20, 20).await.unwrap();
        assert_eq!(second.items.len(), 5);
        assert!(!second.has_more);
        assert_eq!(second.items[0].caption, "post 4");
    }

    #[tokio::test]
    async fn memory_round_trip_and_error_payload() {
        let (db, _dir) = test_persistence().await;
        db.create_persona(&test_persona("p1")).await.unwrap();

        let id = db
            .insert_memory(&MemoryRecord {
                id: None,
                persona_id: "p1".to_string(),
                kind: MemoryKind::Error.as_str().to_string(),
                content: "Image production failed".to_string(),
                importance: 10,
                payload: Some(r#"{"run_id":"r1"}"#.to_string()),
                created_at: Utc::now(),
            })
            .await
            .unwrap();

        let loaded = db.get_memory(id).await.unwrap().expect("memory");
        assert_eq!(loaded.kind, "error");
        assert!(loaded.payload.unwrap().contains("r1"));
    }

    #[tokio::test]
    async fn active_run_excludes_terminal_statuses() {
        let (db, _dir) = test_persistence().await;
        db.create_persona(&test_persona("p1")).await.unwrap();

        let run = RunRecord {
            run_id: "r1".to_string(),
            persona_id: "p1".to_string(),
            status: "running".to_string(),
            stage: "sensing".to_string(),
            sleep_until: None,
            error: None,
            created_at: Utc::now(),
            started_at: Some(Utc::now()),
            finished_at: None,
        };
        db.create_run(&run).await.unwrap();

        let active = db.get_active_run("p1").await.unwrap();
        assert_eq!(active.unwrap().run_id, "r1");

        db.finish_run("r1", "cancelled", None).await.unwrap();
        assert!(db.get_active_run("p1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn sleeping_runs_due_honors_wake_time() {
        let (db, _dir) = test_persistence().await;
        db.create_persona(&test_persona("p1")).await.unwrap();
        db.create_persona(&test_persona("p2")).await.unwrap();

        for (run_id, persona_id) in [("r1", "p1"), ("r2", "p2")] {
            db.create_run(&RunRecord {
                run_id: run_id.to_string(),
                persona_id: persona_id.to_string(),
                status: "running".to_string(),
                stage: "sleeping".to_string(),
                sleep_until: None,
                error: None,
                created_at: Utc::now(),
                started_at: Some(Utc::now()),
                finished_at: None,
            })
            .await
            .unwrap();
        }

        // r1 already due, r2 far in the future
        db.set_run_sleep("r1", Utc::now() - chrono::Duration::seconds(10))
            .await
            .unwrap();
        db.set_run_sleep("r2", Utc::now() + chrono::Duration::hours(4))
            .await
            .unwrap();

        let due = db.get_sleeping_runs_due(10).await.unwrap();
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].run_id, "r1");

        db.clear_run_sleep("r1").await.unwrap();
        let run = db.get_run("r1").await.unwrap().unwrap();
        assert_eq!(run.status, "running");
        assert!(run.sleep_until.is_none());
    }

    #[tokio::test]
    async fn checkpoint_advances_stage_pointer() {
        let (db, _dir) = test_persistence().await;
        db.create_persona(&test_persona("p1")).await.unwrap();
        db.create_run(&RunRecord {
            run_id: "r1".to_string(),
            persona_id: "p1".to_string(),
            status: "running".to_string(),
            stage: "sensing".to_string(),
            sleep_until: None,
            error: None,
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
        })
        .await
        .unwrap();

        db.save_run_checkpoint("r1", "planning", r#"{"stage":"planning"}"#)
            .await
            .unwrap();
        db.save_run_checkpoint("r1", "producing_image", r#"{"stage":"producing_image"}"#)
            .await
            .unwrap();

        let run = db.get_run("r1").await.unwrap().unwrap();
        assert_eq!(run.stage, "producing_image");

        let latest = db.load_latest_checkpoint("r1").await.unwrap().unwrap();
        assert_eq!(latest.stage, "producing_image");
    }

    #[tokio::test]
    async fn cancellation_tombstone_is_run_scoped() {
        let (db, _dir) = test_persistence().await;

        db.insert_cancellation("r1").await.unwrap();
        db.insert_cancellation("r1").await.unwrap(); // idempotent

        assert!(db.is_run_cancelled("r1").await.unwrap());
        assert!(!db.is_run_cancelled("r2").await.unwrap());
    }
}
