// SPDX-FileCopyrightText: 2026 Zapline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `zapline serve` command implementation.
//!
//! Builds the bridge adapters, starts one session per configured agent and
//! runs until SIGINT/SIGTERM, then drains the sessions.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use zapline_config::ZaplineConfig;
use zapline_core::traits::{MessagingBackend, PluginAdapter, PushConnector};
use zapline_core::types::{AgentId, HealthStatus};
use zapline_core::ZaplineError;
use zapline_sync::{SessionClient, SessionDeps, SessionRegistry, SessionSettings};
use zapline_whatsapp::{BridgeBackend, WsConnector};

/// Runs the `zapline serve` command.
pub async fn run_serve(config: ZaplineConfig) -> Result<(), ZaplineError> {
    init_tracing(&config.agent.log_level);
    zapline_sync::metrics::register_metrics();

    info!(backend = %config.backend.base_url, push = %config.push.url, "starting zapline serve");

    let backend = Arc::new(BridgeBackend::new(&config.backend)?);
    match backend.health_check().await? {
        HealthStatus::Healthy => debug!("bridge is healthy"),
        HealthStatus::Degraded(reason) => warn!(%reason, "bridge reports degraded health"),
        HealthStatus::Unhealthy(reason) => warn!(%reason, "bridge is unreachable, sessions will keep retrying"),
    }
    let connector = Arc::new(WsConnector::from_config(&config));

    let deps = SessionDeps {
        backend: Arc::clone(&backend) as Arc<dyn MessagingBackend>,
        connector: Arc::clone(&connector) as Arc<dyn PushConnector>,
        lead_store: None,
    };
    let registry = SessionRegistry::new(SessionSettings::from_config(&config), deps);

    let cancel = zapline_sync::install_signal_handler();

    if config.sync.agents.is_empty() {
        warn!("no agents configured in [sync].agents; nothing to sync");
    }
    let mut watchers = Vec::new();
    for agent in &config.sync.agents {
        let client = registry.login(AgentId::from(agent.as_str()));
        // Headless mode: start pairing right away so the artifact shows up in the log.
        if let Err(e) = client.initiate_pairing().await {
            error!(agent_id = %agent, error = %e, "failed to start pairing");
        }
        watchers.push(log_transitions(client, cancel.clone()));
    }

    info!(agents = registry.len(), "zapline serve running");
    cancel.cancelled().await;

    zapline_sync::drain_sessions(&registry, config.sync.drain_timeout()).await;
    for watcher in watchers {
        watcher.abort();
    }
    if let Err(e) = backend.shutdown().await {
        warn!(error = %e, "backend shutdown failed");
    }
    if let Err(e) = connector.shutdown().await {
        warn!(error = %e, "connector shutdown failed");
    }

    info!("zapline serve stopped");
    Ok(())
}

/// Logs session state changes for one agent until the session ends.
fn log_transitions(client: SessionClient, cancel: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut rx = client.subscribe();
        let mut last = rx.borrow_and_update().clone();
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                changed = rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let view = rx.borrow_and_update().clone();
                    if view.phase != last.phase || view.pairing_artifact != last.pairing_artifact {
                        info!(
                            agent_id = %view.agent_id,
                            status = %view.status,
                            phase = %view.phase,
                            artifact = view.pairing_artifact.as_deref().unwrap_or(""),
                            line = view.line_identifier.as_deref().unwrap_or(""),
                            failure = view.last_failure.as_deref().unwrap_or(""),
                            "session state changed"
                        );
                    }
                    if view.channel != last.channel {
                        info!(agent_id = %view.agent_id, channel = %view.channel, "push channel state changed");
                    }
                    last = view;
                }
            }
        }
    })
}

/// Initializes the tracing subscriber with the given log level.
fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("zapline={log_level},warn")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_names(false)
        .init();
}
