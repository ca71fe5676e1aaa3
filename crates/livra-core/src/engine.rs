// Copyright (C) 2025 Livra Contributors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! The lifecycle engine: consumes gateway events and drives runs.
//!
//! The engine owns all run state transitions. Each run is driven by its own
//! tokio task that executes stages in order, persisting a checkpoint before
//! every stage transition, so a crash at any point resumes from the last
//! durable stage rather than from the beginning. Effects are therefore
//! at-least-once; everything the engine writes is keyed so re-execution of a
//! stage cannot corrupt state.
//!
//! Sleeping runs hold no task and no timer: the run row carries `sleep_until`
//! and the wake scheduler queues a wake event when the time arrives.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use rand::Rng;
use tokio::sync::{mpsc, watch};
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::error::CoreError;
use crate::gateway::{ControlEvent, QueuedEvent};
use crate::model::{
    ActivityRecord, CycleState, ErrorCheckpoint, MemoryKind, MemoryRecord, PersonaRecord,
    PostKind, PostRecord, RunRecord, Stage,
};
use crate::persistence::Persistence;
use crate::recovery;
use crate::steps::StepEffects;

/// Engine tunables.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Lower bound of the jittered sleep between productions.
    pub sleep_min: Duration,
    /// Upper bound of the jittered sleep between productions.
    pub sleep_max: Duration,
    /// How many recent posts to pass as generation references.
    pub reference_image_limit: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sleep_min: Duration::from_secs(4 * 3600),
            sleep_max: Duration::from_secs(8 * 3600),
            reference_image_limit: 3,
        }
    }
}

impl EngineConfig {
    /// Derive engine tunables from the service configuration.
    pub fn from_config(config: &crate::config::Config) -> Self {
        Self {
            sleep_min: config.sleep_min,
            sleep_max: config.sleep_max,
            reference_image_limit: config.reference_image_limit,
        }
    }
}

/// Drives persona lifecycle runs. Cheap to clone.
#[derive(Clone)]
pub struct LifecycleEngine {
    persistence: Arc<dyn Persistence>,
    effects: Arc<dyn StepEffects>,
    config: EngineConfig,
}

impl LifecycleEngine {
    /// Create a new engine over the given persistence and effects.
    pub fn new(
        persistence: Arc<dyn Persistence>,
        effects: Arc<dyn StepEffects>,
        config: EngineConfig,
    ) -> Self {
        Self {
            persistence,
            effects,
            config,
        }
    }

    /// Spawn the event loop consuming gateway events until shutdown.
    pub fn spawn(
        &self,
        mut rx: mpsc::Receiver<QueuedEvent>,
        mut shutdown: watch::Receiver<bool>,
    ) -> tokio::task::JoinHandle<()> {
        let engine = self.clone();
        tokio::spawn(async move {
            info!("lifecycle engine started");
            loop {
                tokio::select! {
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                    queued = rx.recv() => {
                        match queued {
                            Some(queued) => engine.handle_event(queued).await,
                            None => break,
                        }
                    }
                }
            }
            info!("lifecycle engine stopped");
        })
    }

    #[instrument(skip(self, queued), fields(event_id = %queued.event_id))]
    async fn handle_event(&self, queued: QueuedEvent) {
        let result = match queued.event {
            ControlEvent::Start {
                persona_id,
                retry_memory_id,
                force,
            } => self.handle_start(&persona_id, retry_memory_id, force).await,
            ControlEvent::Stop { persona_id } => self.handle_stop(&persona_id).await,
            ControlEvent::Wake { run_id } => self.handle_wake(&run_id).await,
        };
        if let Err(e) = result {
            warn!(error = %e, "event handling failed");
        }
    }

    /// Start a new run for the persona, or resume from an ERROR memory.
    ///
    /// At most one non-terminal run may exist per persona. `force` supersedes
    /// an existing active run by cancelling it first.
    pub async fn handle_start(
        &self,
        persona_id: &str,
        retry_memory_id: Option<i64>,
        force: bool,
    ) -> Result<(), CoreError> {
        let persona = self
            .persistence
            .get_persona(persona_id)
            .await?
            .ok_or_else(|| CoreError::PersonaNotFound {
                persona_id: persona_id.to_string(),
            })?;

        if let Some(active) = self.persistence.get_active_run(persona_id).await? {
            if !force {
                return Err(CoreError::RunAlreadyActive {
                    persona_id: persona_id.to_string(),
                    run_id: active.run_id,
                });
            }
            // Tombstone first so an in-flight driver task for the old run
            // observes the cancellation at its next stage boundary.
            self.persistence.insert_cancellation(&active.run_id).await?;
            self.persistence
                .finish_run(&active.run_id, "cancelled", None)
                .await?;
            info!(old_run_id = %active.run_id, "superseded active run");
        }

        // A forced start always begins a fresh cycle; any memory id on the
        // request is ignored rather than looked up, so a stale or bogus id
        // cannot block the restart.
        let state = match retry_memory_id {
            Some(memory_id) if !force => {
                let plan =
                    recovery::plan_from_memory(self.persistence.as_ref(), persona_id, memory_id)
                        .await?;
                info!(
                    source_run_id = %plan.source_run_id,
                    stage = plan.state.stage.as_str(),
                    "resuming from error memory"
                );
                plan.state
            }
            _ => CycleState::new(),
        };

        let run_id = Uuid::new_v4().to_string();
        let now = Utc::now();
        self.persistence
            .create_run(&RunRecord {
                run_id: run_id.clone(),
                persona_id: persona_id.to_string(),
                status: "running".to_string(),
                stage: state.stage.as_str().to_string(),
                sleep_until: None,
                error: None,
                created_at: now,
                started_at: Some(now),
                finished_at: None,
            })
            .await?;
        self.persistence
            .save_run_checkpoint(&run_id, state.stage.as_str(), &serde_json::to_string(&state)?)
            .await?;
        self.persistence
            .set_persona_lifecycle(persona_id, "running", None, None)
            .await?;

        info!(run_id = %run_id, stage = state.stage.as_str(), "run started");
        self.spawn_driver(persona, run_id, state);
        Ok(())
    }

    /// Stop the persona's active run, if any. Idempotent.
    pub async fn handle_stop(&self, persona_id: &str) -> Result<(), CoreError> {
        let Some(active) = self.persistence.get_active_run(persona_id).await? else {
            info!("stop with no active run; nothing to do");
            return Ok(());
        };

        self.persistence.insert_cancellation(&active.run_id).await?;
        self.persistence
            .finish_run(&active.run_id, "cancelled", None)
            .await?;
        self.persistence
            .set_persona_lifecycle(persona_id, "stopped", None, None)
            .await?;

        info!(run_id = %active.run_id, "run cancelled");
        Ok(())
    }

    /// Resume a sleeping run whose wake time has arrived.
    pub async fn handle_wake(&self, run_id: &str) -> Result<(), CoreError> {
        let Some(run) = self.persistence.get_run(run_id).await? else {
            return Err(CoreError::RunNotFound {
                run_id: run_id.to_string(),
            });
        };
        if run.status != "sleeping" {
            // Cancelled or already woken by a competing poll. Not an error.
            return Ok(());
        }
        if self.persistence.is_run_cancelled(run_id).await? {
            self.persistence.finish_run(run_id, "cancelled", None).await?;
            return Ok(());
        }

        let mut state = match self.persistence.load_latest_checkpoint(run_id).await? {
            Some(cp) => serde_json::from_str::<CycleState>(&cp.state)?,
            None => CycleState::new(),
        };
        if state.stage == Stage::Sleeping {
            // Sleep served; advance past it durably before driving.
            state.stage = Stage::ProducingVideo;
            self.persistence
                .save_run_checkpoint(run_id, state.stage.as_str(), &serde_json::to_string(&state)?)
                .await?;
        }
        self.persistence.clear_run_sleep(run_id).await?;
        self.persistence
            .set_persona_lifecycle(&run.persona_id, "running", None, None)
            .await?;

        let persona = self
            .persistence
            .get_persona(&run.persona_id)
            .await?
            .ok_or_else(|| CoreError::PersonaNotFound {
                persona_id: run.persona_id.clone(),
            })?;

        info!(run_id = %run_id, "run woken");
        self.spawn_driver(persona, run_id.to_string(), state);
        Ok(())
    }

    /// Re-adopt runs that were mid-stage when the process died.
    ///
    /// Sleeping runs need no adoption; the wake scheduler finds them through
    /// their `sleep_until` timestamps.
    pub async fn recover_interrupted(&self) -> Result<usize, CoreError> {
        let mut adopted = 0;
        for run in self.persistence.get_runs_by_status("running").await? {
            if self.persistence.is_run_cancelled(&run.run_id).await? {
                self.persistence
                    .finish_run(&run.run_id, "cancelled", None)
                    .await?;
                continue;
            }
            let state = match self.persistence.load_latest_checkpoint(&run.run_id).await? {
                Some(cp) => serde_json::from_str::<CycleState>(&cp.state)?,
                None => CycleState::new(),
            };
            let Some(persona) = self.persistence.get_persona(&run.persona_id).await? else {
                warn!(run_id = %run.run_id, "interrupted run has no persona; dropping");
                continue;
            };
            info!(run_id = %run.run_id, stage = state.stage.as_str(), "adopting interrupted run");
            self.spawn_driver(persona, run.run_id.clone(), state);
            adopted += 1;
        }
        Ok(adopted)
    }

    fn spawn_driver(&self, persona: PersonaRecord, run_id: String, state: CycleState) {
        let engine = self.clone();
        tokio::spawn(async move {
            if let Err(e) = engine.drive_run(&persona, &run_id, state).await {
                error!(run_id = %run_id, error = %e, "run driver failed");
            }
        });
    }

    /// Execute stages from `state.stage` until the run sleeps, completes,
    /// fails, or observes its cancellation tombstone.
    #[instrument(skip(self, persona, state), fields(persona_id = %persona.persona_id, run_id))]
    async fn drive_run(
        &self,
        persona: &PersonaRecord,
        run_id: &str,
        mut state: CycleState,
    ) -> Result<(), CoreError> {
        loop {
            // Tombstones are run-scoped: a stop aimed at this run can never
            // suppress a successor started for the same persona.
            if self.persistence.is_run_cancelled(run_id).await? {
                self.persistence.finish_run(run_id, "cancelled", None).await?;
                info!(run_id, "driver observed cancellation; exiting");
                return Ok(());
            }

            let stage = state.stage;
            let activity_label = state
                .plan
                .as_ref()
                .map(|p| p.activity.clone())
                .unwrap_or_else(|| stage.as_str().to_string());
            self.persistence
                .set_persona_lifecycle(
                    &persona.persona_id,
                    "running",
                    Some(&activity_label),
                    Some(Utc::now()),
                )
                .await?;

            match stage {
                Stage::Sensing => {
                    let environment = match self.effects.sense(persona).await {
                        Ok(env) => env,
                        Err(e) => return self.fail_run(persona, run_id, state, &e.to_string()).await,
                    };
                    self.persistence
                        .insert_memory(&MemoryRecord {
                            id: None,
                            persona_id: persona.persona_id.clone(),
                            kind: MemoryKind::Observation.as_str().to_string(),
                            content: format!(
                                "Sensed {} at {:.1}C in {}",
                                environment.weather, environment.temperature_c, persona.city
                            ),
                            importance: 3,
                            payload: None,
                            created_at: Utc::now(),
                        })
                        .await?;
                    state.environment = Some(environment);
                    self.advance(run_id, &mut state).await?;
                }

                Stage::Planning => {
                    let environment = state.environment.clone().unwrap_or_else(|| {
                        // Resumed without a sensing checkpoint; plan blind.
                        crate::model::EnvironmentContext {
                            weather: "unknown".to_string(),
                            temperature_c: 0.0,
                            trends: Vec::new(),
                            observed_at: Utc::now(),
                        }
                    });
                    let plan = match self.effects.plan(persona, &environment).await {
                        Ok(plan) => plan,
                        Err(e) => return self.fail_run(persona, run_id, state, &e.to_string()).await,
                    };

                    let current = self
                        .persistence
                        .get_persona(&persona.persona_id)
                        .await?
                        .ok_or_else(|| CoreError::PersonaNotFound {
                            persona_id: persona.persona_id.clone(),
                        })?;
                    if current.balance_cents < plan.budget_cents {
                        let msg = format!(
                            "insufficient balance: activity needs {} cents, persona has {}",
                            plan.budget_cents, current.balance_cents
                        );
                        return self.fail_run(persona, run_id, state, &msg).await;
                    }
                    self.persistence
                        .adjust_persona_balance(&persona.persona_id, -plan.budget_cents)
                        .await?;
                    self.persistence
                        .insert_activity(&ActivityRecord {
                            id: None,
                            persona_id: persona.persona_id.clone(),
                            name: plan.activity.clone(),
                            status: "planned".to_string(),
                            image_url: None,
                            metadata: Some(serde_json::to_string(&plan)?),
                            created_at: Utc::now(),
                        })
                        .await?;

                    state.plan = Some(plan);
                    self.advance(run_id, &mut state).await?;
                }

                Stage::ProducingImage => {
                    let Some(plan) = state.plan.clone() else {
                        return self
                            .fail_run(persona, run_id, state, "no plan available for production")
                            .await;
                    };
                    let references = self
                        .persistence
                        .recent_post_urls(
                            &persona.persona_id,
                            self.config.reference_image_limit as i64,
                        )
                        .await?;
                    let media = match self
                        .effects
                        .generate_image(persona, &plan, &references)
                        .await
                    {
                        Ok(media) => media,
                        Err(e) => return self.fail_run(persona, run_id, state, &e.to_string()).await,
                    };

                    let post_id = self
                        .persistence
                        .insert_post(&PostRecord {
                            id: None,
                            persona_id: persona.persona_id.clone(),
                            kind: PostKind::Image.as_str().to_string(),
                            caption: media.caption.clone(),
                            content_url: media.url.clone(),
                            prompt: media.prompt.clone(),
                            posted_at: Utc::now(),
                        })
                        .await?;
                    self.persistence
                        .insert_activity(&ActivityRecord {
                            id: None,
                            persona_id: persona.persona_id.clone(),
                            name: plan.activity.clone(),
                            status: "completed".to_string(),
                            image_url: Some(media.url),
                            metadata: None,
                            created_at: Utc::now(),
                        })
                        .await?;

                    state.image_post_id = Some(post_id);
                    self.advance(run_id, &mut state).await?;
                }

                Stage::Sleeping => {
                    let sleep_secs = self.jittered_sleep_secs();
                    let sleep_until = Utc::now() + chrono::Duration::seconds(sleep_secs as i64);
                    self.persistence.set_run_sleep(run_id, sleep_until).await?;
                    self.persistence
                        .set_persona_lifecycle(&persona.persona_id, "sleeping", None, None)
                        .await?;
                    info!(run_id, %sleep_until, "run sleeping; driver exiting");
                    // No task survives the sleep. The wake scheduler re-enters
                    // through the gateway when sleep_until passes.
                    return Ok(());
                }

                Stage::ProducingVideo => {
                    let Some(plan) = state.plan.clone() else {
                        return self
                            .fail_run(persona, run_id, state, "no plan available for production")
                            .await;
                    };
                    let references = self
                        .persistence
                        .recent_post_urls(
                            &persona.persona_id,
                            self.config.reference_image_limit as i64,
                        )
                        .await?;
                    let media = match self
                        .effects
                        .generate_video(persona, &plan, &references)
                        .await
                    {
                        Ok(media) => media,
                        Err(e) => return self.fail_run(persona, run_id, state, &e.to_string()).await,
                    };

                    self.persistence
                        .insert_post(&PostRecord {
                            id: None,
                            persona_id: persona.persona_id.clone(),
                            kind: PostKind::Video.as_str().to_string(),
                            caption: media.caption.clone(),
                            content_url: media.url.clone(),
                            prompt: media.prompt.clone(),
                            posted_at: Utc::now(),
                        })
                        .await?;
                    self.persistence
                        .insert_activity(&ActivityRecord {
                            id: None,
                            persona_id: persona.persona_id.clone(),
                            name: plan.activity.clone(),
                            status: "completed".to_string(),
                            image_url: Some(media.url),
                            metadata: None,
                            created_at: Utc::now(),
                        })
                        .await?;

                    self.persistence.finish_run(run_id, "completed", None).await?;
                    self.persistence
                        .set_persona_lifecycle(&persona.persona_id, "idle", None, None)
                        .await?;
                    info!(run_id, "run completed");
                    return Ok(());
                }
            }
        }
    }

    async fn advance(&self, run_id: &str, state: &mut CycleState) -> Result<(), CoreError> {
        let next = match state.stage.next() {
            Some(next) => next,
            None => return Ok(()),
        };
        state.stage = next;
        self.persistence
            .save_run_checkpoint(run_id, next.as_str(), &serde_json::to_string(state)?)
            .await
    }

    /// Record a stage failure: write the ERROR memory carrying the resume
    /// checkpoint, then move the run and persona to their errored states.
    async fn fail_run(
        &self,
        persona: &PersonaRecord,
        run_id: &str,
        state: CycleState,
        error_msg: &str,
    ) -> Result<(), CoreError> {
        let failed_stage = state.stage;
        let checkpoint = ErrorCheckpoint {
            run_id: run_id.to_string(),
            failed_stage,
            error: error_msg.to_string(),
            state,
        };
        // The memory is the durable retry handle; write it before anything
        // that could mask the failure.
        self.persistence
            .insert_memory(&MemoryRecord {
                id: None,
                persona_id: persona.persona_id.clone(),
                kind: MemoryKind::Error.as_str().to_string(),
                content: format!("{} failed: {}", failed_stage.as_str(), error_msg),
                importance: 10,
                payload: Some(serde_json::to_string(&checkpoint)?),
                created_at: Utc::now(),
            })
            .await?;
        self.persistence
            .insert_activity(&ActivityRecord {
                id: None,
                persona_id: persona.persona_id.clone(),
                name: failed_stage.as_str().to_string(),
                status: "failed".to_string(),
                image_url: None,
                metadata: Some(serde_json::json!({ "error": error_msg }).to_string()),
                created_at: Utc::now(),
            })
            .await?;
        self.persistence
            .finish_run(run_id, "errored", Some(error_msg))
            .await?;
        self.persistence
            .set_persona_lifecycle(&persona.persona_id, "errored", None, None)
            .await?;

        warn!(run_id, stage = failed_stage.as_str(), error = error_msg, "run failed");
        Ok(())
    }

    fn jittered_sleep_secs(&self) -> u64 {
        let min = self.config.sleep_min.as_secs();
        let max = self.config.sleep_max.as_secs();
        if max <= min {
            return min;
        }
        rand::thread_rng().gen_range(min..=max)
    }
}
