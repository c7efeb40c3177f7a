//! MinePoints server
//!
//! Serves the rewards API and webhooks, and runs the background scheduler.

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::{info, warn};

use minepoints::{
    api::{self, AppState},
    config::{Catalog, Config},
    crypto::SessionKeys,
    ledger::Ledger,
    scheduler::Scheduler,
    state::Store,
    types::SystemClock,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=debug".into()),
        )
        .init();

    let config = Config::parse();
    config.validate()?;
    if !config.require_signatures {
        warn!("webhook signatures are NOT required; do not run this in production");
    }

    let data_path = config.data_path();
    std::fs::create_dir_all(&data_path)
        .with_context(|| format!("creating data directory {}", data_path.display()))?;
    let store = Store::open(&data_path)
        .with_context(|| format!("opening ledger at {}", data_path.display()))?;
    info!(path = %data_path.display(), "ledger opened");

    if let Some(path) = &config.catalog {
        Catalog::load(path)?.seed(&store)?;
    }

    let ledger = Ledger::new(store.clone(), Arc::new(SystemClock), config.ledger_config()?);
    let state = AppState::new(
        ledger.clone(),
        SessionKeys::new(config.session_secret.clone()),
        config.webhook_secret(),
        config.require_signatures,
    );

    let scheduler =
        Scheduler::new(ledger, config.conversion_instant()?, config.sweep_interval()).spawn();

    let app = api::router(state, config.request_timeout());
    let listener = tokio::net::TcpListener::bind(config.listen)
        .await
        .with_context(|| format!("binding {}", config.listen))?;
    info!(addr = %config.listen, version = minepoints::VERSION, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "failed to listen for shutdown signal");
            }
            info!("shutdown requested");
        })
        .await?;

    if !scheduler.stop().await {
        warn!("scheduler did not shut down cleanly");
    }
    store.flush()?;
    info!("ledger flushed; bye");
    Ok(())
}
