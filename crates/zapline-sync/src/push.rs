// SPDX-FileCopyrightText: 2026 Zapline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Push channel client.
//!
//! Keeps one live connection per agent session through a [`PushConnector`],
//! reconnecting with capped exponential backoff. Every connection starts
//! with a `join` signal for the agent. Decoded events are forwarded to the
//! session's input queue in arrival order and never reordered or
//! coalesced; a full queue back-pressures the socket instead of dropping.
//! Transitions are reported as [`EngineInput::ChannelUp`] and
//! [`EngineInput::ChannelDown`] so the engine can run gap recovery.

use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use rand::Rng;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use zapline_core::error::ZaplineError;
use zapline_core::events::AgentSignal;
use zapline_core::traits::{PushConnection, PushConnector};
use zapline_core::types::AgentId;

use crate::engine::EngineInput;
use crate::metrics;

/// Doubling reconnect delay with an upper bound and up to 20% jitter.
#[derive(Debug, Clone)]
pub struct Backoff {
    initial: Duration,
    max: Duration,
    current: Duration,
}

impl Backoff {
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self {
            initial,
            max,
            current: initial,
        }
    }

    /// Delay before the next attempt. Each call doubles the base delay
    /// until it reaches the maximum.
    pub fn next_delay(&mut self) -> Duration {
        let base = self.current;
        self.current = (self.current * 2).min(self.max);
        with_jitter(base)
    }

    /// Back to the initial delay after a successful connection.
    pub fn reset(&mut self) {
        self.current = self.initial;
    }
}

fn with_jitter(base: Duration) -> Duration {
    let spread = base.as_millis() as u64 / 5;
    if spread == 0 {
        return base;
    }
    base + Duration::from_millis(rand::thread_rng().gen_range(0..=spread))
}

enum Exit {
    Cancelled,
    /// The session stopped consuming input.
    SessionGone,
    /// Connected but the join signal could not be sent.
    JoinFailed(String),
    /// Connection lost after `ChannelUp` was reported.
    Dropped(String),
}

pub struct PushChannelClient {
    agent_id: AgentId,
    connector: Arc<dyn PushConnector>,
    backoff: Backoff,
    inputs: mpsc::Sender<EngineInput>,
    signals: mpsc::Receiver<AgentSignal>,
    cancel: CancellationToken,
}

impl PushChannelClient {
    pub fn new(
        agent_id: AgentId,
        connector: Arc<dyn PushConnector>,
        backoff: Backoff,
        inputs: mpsc::Sender<EngineInput>,
        signals: mpsc::Receiver<AgentSignal>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            agent_id,
            connector,
            backoff,
            inputs,
            signals,
            cancel,
        }
    }

    /// Runs until cancelled or until the session stops accepting input.
    pub async fn run(mut self) {
        let mut resumed = false;
        loop {
            let connection = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                result = self.connector.connect() => result,
            };

            match connection {
                Ok(connection) => match self.serve(connection, resumed).await {
                    Exit::Cancelled | Exit::SessionGone => break,
                    Exit::JoinFailed(reason) => {
                        warn!(agent_id = %self.agent_id, %reason, "join signal failed");
                    }
                    Exit::Dropped(reason) => {
                        resumed = true;
                        if self
                            .inputs
                            .send(EngineInput::ChannelDown { reason })
                            .await
                            .is_err()
                        {
                            break;
                        }
                    }
                },
                Err(e) => {
                    warn!(agent_id = %self.agent_id, error = %e, "push channel connect failed");
                }
            }

            let delay = self.backoff.next_delay();
            debug!(agent_id = %self.agent_id, delay_ms = delay.as_millis() as u64, "reconnecting push channel");
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }
        debug!(agent_id = %self.agent_id, "push channel client stopped");
    }

    async fn serve(&mut self, connection: PushConnection, resumed: bool) -> Exit {
        let PushConnection {
            mut events,
            signals: mut sink,
        } = connection;

        let join = AgentSignal::Join {
            agent_id: self.agent_id.clone(),
        };
        if let Err(e) = sink.send(join).await {
            return Exit::JoinFailed(e.to_string());
        }
        self.backoff.reset();
        info!(agent_id = %self.agent_id, resumed, "push channel joined");
        if self
            .inputs
            .send(EngineInput::ChannelUp { resumed })
            .await
            .is_err()
        {
            return Exit::SessionGone;
        }

        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    // Flush what the session queued before closing, e.g. the offline presence.
                    while let Ok(signal) = self.signals.try_recv() {
                        if sink.send(signal).await.is_err() {
                            break;
                        }
                    }
                    if let Err(e) = sink.close().await {
                        debug!(agent_id = %self.agent_id, error = %e, "push channel close failed");
                    }
                    return Exit::Cancelled;
                }
                item = events.next() => match item {
                    Some(Ok(event)) => {
                        if self.inputs.send(EngineInput::Push(event)).await.is_err() {
                            return Exit::SessionGone;
                        }
                    }
                    Some(Err(ZaplineError::MalformedEvent { reason })) => {
                        error!(agent_id = %self.agent_id, %reason, "malformed push event skipped");
                        metrics::record_malformed();
                    }
                    Some(Err(e)) => return Exit::Dropped(e.to_string()),
                    None => return Exit::Dropped("event stream ended".to_string()),
                },
                signal = self.signals.recv() => match signal {
                    Some(signal) => {
                        if let Err(e) = sink.send(signal).await {
                            return Exit::Dropped(e.to_string());
                        }
                    }
                    None => return Exit::SessionGone,
                },
            }
        }
    }
}
