// Copyright (C) 2025 Livra Contributors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Shared test infrastructure for livra-core integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::watch;

use livra_core::engine::{EngineConfig, LifecycleEngine};
use livra_core::gateway::CycleGateway;
use livra_core::model::{
    ActivityPlan, EnvironmentContext, PersonaRecord, RunRecord, Stage,
};
use livra_core::persistence::{Persistence, SqlitePersistence};
use livra_core::steps::{GeneratedMedia, StepEffects, StepError};
use livra_core::wake::WakeScheduler;

/// Step effects double with per-stage failure injection and call counting.
#[derive(Default)]
pub struct MockStepEffects {
    fail_stage: Mutex<Option<Stage>>,
    counts: Mutex<HashMap<&'static str, usize>>,
}

impl MockStepEffects {
    /// Make the effect for `stage` fail until cleared.
    pub fn fail_at(&self, stage: Stage) {
        *self.fail_stage.lock().unwrap() = Some(stage);
    }

    /// Stop injecting failures.
    pub fn clear_failure(&self) {
        *self.fail_stage.lock().unwrap() = None;
    }

    /// How many times the named effect was invoked.
    pub fn calls(&self, name: &str) -> usize {
        *self.counts.lock().unwrap().get(name).unwrap_or(&0)
    }

    fn record(&self, name: &'static str) {
        *self.counts.lock().unwrap().entry(name).or_insert(0) += 1;
    }

    fn maybe_fail(&self, stage: Stage) -> Result<(), StepError> {
        if *self.fail_stage.lock().unwrap() == Some(stage) {
            return Err(StepError::Upstream("injected failure".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl StepEffects for MockStepEffects {
    async fn sense(&self, _persona: &PersonaRecord) -> Result<EnvironmentContext, StepError> {
        self.record("sense");
        self.maybe_fail(Stage::Sensing)?;
        Ok(EnvironmentContext {
            weather: "sunny".to_string(),
            temperature_c: 22.0,
            trends: vec!["rooftop cafes".to_string()],
            observed_at: Utc::now(),
        })
    }

    async fn plan(
        &self,
        _persona: &PersonaRecord,
        _environment: &EnvironmentContext,
    ) -> Result<ActivityPlan, StepError> {
        self.record("plan");
        self.maybe_fail(Stage::Planning)?;
        Ok(ActivityPlan {
            activity: "morning run along the river".to_string(),
            prompt: "a jogger at sunrise".to_string(),
            caption: "chasing the sunrise".to_string(),
            budget_cents: 500,
        })
    }

    async fn generate_image(
        &self,
        _persona: &PersonaRecord,
        _plan: &ActivityPlan,
        _reference_images: &[String],
    ) -> Result<GeneratedMedia, StepError> {
        self.record("generate_image");
        self.maybe_fail(Stage::ProducingImage)?;
        Ok(GeneratedMedia {
            url: "https://cdn.example/image.png".to_string(),
            caption: "chasing the sunrise".to_string(),
            prompt: "a jogger at sunrise".to_string(),
        })
    }

    async fn generate_video(
        &self,
        _persona: &PersonaRecord,
        _plan: &ActivityPlan,
        _reference_images: &[String],
    ) -> Result<GeneratedMedia, StepError> {
        self.record("generate_video");
        self.maybe_fail(Stage::ProducingVideo)?;
        Ok(GeneratedMedia {
            url: "https://cdn.example/video.mp4".to_string(),
            caption: "sunrise run, the movie".to_string(),
            prompt: "a jogger at sunrise, video".to_string(),
        })
    }
}

/// A database, engine, and mock effects wired together for one test.
pub struct TestContext {
    pub db: SqlitePersistence,
    pub persistence: Arc<dyn Persistence>,
    pub effects: Arc<MockStepEffects>,
    pub engine: LifecycleEngine,
    pub gateway: CycleGateway,
    shutdown_tx: watch::Sender<bool>,
    _dir: tempfile::TempDir,
}

impl TestContext {
    /// Context with zero-length sleeps so runs wake on the next poll.
    pub async fn new() -> Self {
        Self::with_sleep(Duration::ZERO, Duration::ZERO).await
    }

    /// Context with a fixed sleep window.
    pub async fn with_sleep(sleep_min: Duration, sleep_max: Duration) -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let db = SqlitePersistence::from_path(dir.path().join("test.db"))
            .await
            .expect("open db");
        let persistence: Arc<dyn Persistence> = Arc::new(db.clone());
        let effects = Arc::new(MockStepEffects::default());
        let engine = LifecycleEngine::new(
            persistence.clone(),
            effects.clone(),
            EngineConfig {
                sleep_min,
                sleep_max,
                reference_image_limit: 3,
            },
        );

        let (gateway, rx) = CycleGateway::new(16);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let _ = engine.spawn(rx, shutdown_rx.clone());

        let scheduler = WakeScheduler::new(
            persistence.clone(),
            gateway.clone(),
            Duration::from_millis(50),
        );
        let _ = scheduler.spawn(shutdown_rx);

        Self {
            db,
            persistence,
            effects,
            engine,
            gateway,
            shutdown_tx,
            _dir: dir,
        }
    }

    pub async fn create_persona(&self, persona_id: &str) -> PersonaRecord {
        let persona = PersonaRecord {
            persona_id: persona_id.to_string(),
            owner_user_id: None,
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
            is_public: true,
            created_at: Utc::now(),
        };
        self.db.create_persona(&persona).await.expect("create persona");
        persona
    }

    /// Poll until the persona has an active (non-terminal) run.
    pub async fn wait_for_active_run(&self, persona_id: &str) -> RunRecord {
        for _ in 0..200 {
            if let Some(run) = self.db.get_active_run(persona_id).await.unwrap() {
                return run;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("no active run appeared for persona {persona_id}");
    }

    /// Poll until the run reaches the expected status.
    pub async fn wait_for_run_status(&self, run_id: &str, status: &str) -> RunRecord {
        let mut last = None;
        for _ in 0..500 {
            let run = self.db.get_run(run_id).await.unwrap().expect("run exists");
            if run.status == status {
                return run;
            }
            last = Some(run.status);
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!(
            "run {run_id} never reached status {status:?} (last seen {last:?})"
        );
    }

    /// Poll until the persona's lifecycle status matches.
    pub async fn wait_for_persona_status(&self, persona_id: &str, status: &str) -> PersonaRecord {
        for _ in 0..500 {
            let persona = self
                .db
                .get_persona(persona_id)
                .await
                .unwrap()
                .expect("persona exists");
            if persona.lifecycle_status == status {
                return persona;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("persona {persona_id} never reached status {status:?}");
    }
}
