// Copyright (C) 2025 Livra Contributors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! livra-server binary: config, persistence, engine, HTTP.

use std::sync::Arc;

use anyhow::Context;
use tokio::sync::watch;
use tracing::info;
use tracing_subscriber::EnvFilter;

use livra_core::config::Config;
use livra_core::engine::{EngineConfig, LifecycleEngine};
use livra_core::gateway::CycleGateway;
use livra_core::persistence::{Persistence, SqlitePersistence};
use livra_core::wake::WakeScheduler;
use livra_generative::config::GenerativeConfig;
use livra_generative::LiveStepEffects;
use livra_server::auth::StaticTokenResolver;
use livra_server::{build_router, AppState};

const GATEWAY_CAPACITY: usize = 256;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_env().context("loading LIVRA_* configuration")?;
    let generative_config =
        GenerativeConfig::from_env().context("loading generative configuration")?;

    let persistence: Arc<dyn Persistence> = Arc::new(
        SqlitePersistence::connect(&config.database_url)
            .await
            .context("opening database")?,
    );
    let effects = Arc::new(
        LiveStepEffects::new(generative_config).context("building generative clients")?,
    );

    let engine = LifecycleEngine::new(
        persistence.clone(),
        effects,
        EngineConfig::from_config(&config),
    );
    let (gateway, event_rx) = CycleGateway::new(GATEWAY_CAPACITY);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let _ = engine.spawn(event_rx, shutdown_rx.clone());
    let _ = WakeScheduler::new(persistence.clone(), gateway.clone(), config.wake_poll_interval)
        .spawn(shutdown_rx);

    let adopted = engine
        .recover_interrupted()
        .await
        .context("recovering interrupted runs")?;
    if adopted > 0 {
        info!(adopted, "re-adopted interrupted runs");
    }

    let state = AppState {
        persistence,
        gateway,
        auth: Arc::new(StaticTokenResolver::from_env()),
    };
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(config.http_addr)
        .await
        .with_context(|| format!("binding {}", config.http_addr))?;
    info!(addr = %config.http_addr, "livra-server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("shutdown signal received");
            }
            let _ = shutdown_tx.send(true);
        })
        .await
        .context("http server")?;

    Ok(())
}
