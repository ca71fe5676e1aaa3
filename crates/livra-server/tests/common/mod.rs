// Copyright (C) 2025 Livra Contributors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Shared test infrastructure for livra-server API tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use chrono::Utc;
use http_body_util::BodyExt;
use serde_json::Value;
use tokio::sync::watch;
use tower::ServiceExt;

use livra_core::engine::{EngineConfig, LifecycleEngine};
use livra_core::gateway::CycleGateway;
use livra_core::model::{ActivityPlan, EnvironmentContext, PersonaRecord};
use livra_core::persistence::{Persistence, SqlitePersistence};
use livra_core::steps::{GeneratedMedia, StepEffects, StepError};
use livra_core::wake::WakeScheduler;
use livra_server::auth::StaticTokenResolver;
use livra_server::{AppState, build_router};

/// Step effects that always succeed instantly.
pub struct StubEffects;

#[async_trait]
impl StepEffects for StubEffects {
    async fn sense(&self, _persona: &PersonaRecord) -> Result<EnvironmentContext, StepError> {
        Ok(EnvironmentContext {
            weather: "sunny".to_string(),
            temperature_c: 22.0,
            trends: Vec::new(),
            observed_at: Utc::now(),
        })
    }

    async fn plan(
        &self,
        _persona: &PersonaRecord,
        _environment: &EnvironmentContext,
    ) -> Result<ActivityPlan, StepError> {
        Ok(ActivityPlan {
            activity: "coffee".to_string(),
            prompt: "at a cafe".to_string(),
            caption: "slow morning".to_string(),
            budget_cents: 100,
        })
    }

    async fn generate_image(
        &self,
        _persona: &PersonaRecord,
        _plan: &ActivityPlan,
        _reference_images: &[String],
    ) -> Result<GeneratedMedia, StepError> {
        Ok(GeneratedMedia {
            url: "https://cdn.example/image.png".to_string(),
            caption: "slow morning".to_string(),
            prompt: "at a cafe".to_string(),
        })
    }

    async fn generate_video(
        &self,
        _persona: &PersonaRecord,
        _plan: &ActivityPlan,
        _reference_images: &[String],
    ) -> Result<GeneratedMedia, StepError> {
        Ok(GeneratedMedia {
            url: "https://cdn.example/video.mp4".to_string(),
            caption: "slow morning".to_string(),
            prompt: "at a cafe".to_string(),
        })
    }
}

/// In-process server plus direct database access.
pub struct TestApp {
    pub router: Router,
    pub db: SqlitePersistence,
    _shutdown_tx: watch::Sender<bool>,
    _dir: tempfile::TempDir,
}

impl TestApp {
    /// Boot the full stack on a temp database.
    ///
    /// Tokens `tok-a` and `tok-b` resolve to two distinct subjects.
    pub async fn new() -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let db = SqlitePersistence::from_path(dir.path().join("test.db"))
            .await
            .expect("open db");
        let persistence: Arc<dyn Persistence> = Arc::new(db.clone());

        let engine = LifecycleEngine::new(
            persistence.clone(),
            Arc::new(StubEffects),
            EngineConfig {
                sleep_min: Duration::ZERO,
                sleep_max: Duration::ZERO,
                reference_image_limit: 3,
            },
        );
        let (gateway, rx) = CycleGateway::new(16);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let _ = engine.spawn(rx, shutdown_rx.clone());
        let _ = WakeScheduler::new(persistence.clone(), gateway.clone(), Duration::from_millis(50))
            .spawn(shutdown_rx);

        let auth = Arc::new(StaticTokenResolver::new([
            ("tok-a".to_string(), "auth0|a".to_string()),
            ("tok-b".to_string(), "auth0|b".to_string()),
        ]));

        let router = build_router(AppState {
            persistence,
            gateway,
            auth,
        });

        Self {
            router,
            db,
            _shutdown_tx: shutdown_tx,
            _dir: dir,
        }
    }

    /// Send one request and decode the JSON response.
    pub async fn request(
        &self,
        method: &str,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let request = match body {
            Some(json) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json.to_string()))
                .expect("request"),
            None => builder.body(Body::empty()).expect("request"),
        };

        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("response");
        let status = response.status();
        let bytes = response
            .into_body()
            .collect()
            .await
            .expect("body")
            .to_bytes();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, json)
    }

    /// Insert a persona directly, bypassing the API.
    pub async fn seed_persona(
        &self,
        persona_id: &str,
        owner_user_id: Option<&str>,
        is_public: bool,
    ) -> PersonaRecord {
        let persona = PersonaRecord {
            persona_id: persona_id.to_string(),
            owner_user_id: owner_user_id.map(str::to_string),
            display_name: format!("Persona {persona_id}"),
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
            balance_cents: 100_000,
            is_public,
            created_at: Utc::now(),
        };
        self.db.create_persona(&persona).await.expect("seed persona");
        persona
    }

    /// The user id the given auth subject maps to, creating it if needed.
    pub async fn user_id_for(&self, subject: &str) -> String {
        self.db
            .get_or_create_user(subject)
            .await
            .expect("user")
            .user_id
    }

    /// Poll until the persona has the expected number of posts.
    pub async fn wait_for_posts(&self, persona_id: &str, count: i64) {
        for _ in 0..500 {
            if self.db.count_posts(persona_id).await.unwrap() == count {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("persona {persona_id} never reached {count} posts");
    }
}
