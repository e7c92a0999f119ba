//! # minibotd: minibot daemon
//!
//! Composition root that loads the activity configuration, wires the device
//! adapter into the scheduler and runs it until interrupted.
//!
//! ## Responsibilities
//! - Parse configuration (config file, env vars)
//! - Install the `tracing` subscriber
//! - Construct the device adapter and the task registry
//! - Register the configured activities and spawn the scheduler loop
//! - Log scheduler events published on the in-process bus
//! - Handle graceful shutdown (Ctrl-C): the running cycle completes first
//!
//! ## Dependency rule
//! This is the **only** crate that depends on all other crates.
//! It is the wiring layer: no scheduling logic belongs here.

mod config;

use std::sync::Arc;

use anyhow::Context;
use tokio::sync::broadcast;
use tracing_subscriber::EnvFilter;

use minibot_app::event_bus::InProcessEventBus;
use minibot_app::ports::SystemClock;
use minibot_app::scheduler::{Scheduler, handle};
use minibot_app::task_registry::TaskRegistry;
use minibot_domain::event::SchedulerEvent;

use crate::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::load().context("loading configuration")?;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_new(&config.logging.filter).unwrap_or_else(|err| {
            eprintln!("invalid log filter {:?}: {err}", config.logging.filter);
            EnvFilter::new("info")
        }))
        .init();

    // Device
    let device = Arc::new(config.device.build());

    // Event bus
    let event_bus = InProcessEventBus::default();
    tokio::spawn(log_events(event_bus.subscribe()));

    // Scheduler
    let mut scheduler = Scheduler::new(
        device,
        SystemClock,
        event_bus,
        TaskRegistry::with_builtin(),
        config.scheduler_settings(),
    );
    for definition in config.activity_definitions()? {
        let id = definition.id.clone();
        scheduler
            .register(definition)
            .await
            .with_context(|| format!("registering activity {id}"))?;
    }
    let handle = handle::spawn(scheduler);
    tracing::info!(
        activities = config.activities.len(),
        "minibotd running, press Ctrl-C to stop"
    );

    tokio::signal::ctrl_c()
        .await
        .context("waiting for shutdown signal")?;
    tracing::info!("shutdown requested, waiting for the current cycle");

    let status = handle.stop().await;
    for activity in &status.activities {
        tracing::info!(
            activity_id = %activity.id,
            state = %activity.state,
            retry_counter = activity.retry_counter,
            "final activity state"
        );
    }
    Ok(())
}

async fn log_events(mut events: broadcast::Receiver<SchedulerEvent>) {
    loop {
        match events.recv().await {
            Ok(event) => tracing::debug!(?event, "scheduler event"),
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "event logger lagged");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}
