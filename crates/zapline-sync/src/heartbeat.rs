// SPDX-FileCopyrightText: 2026 Zapline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Periodic presence signal.
//!
//! While running, the scheduler queues one [`AgentSignal::Heartbeat`] per
//! interval on the push client's outbound queue, the first one immediately.
//! Ticks missed while the queue was full are skipped rather than bursted.
//! A restart never sends sooner than one interval after the last heartbeat.
//! It runs only between `StartHeartbeat` and `StopHeartbeat` effects, i.e.
//! while the push channel is connected and the agent session is active.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use zapline_core::events::AgentSignal;
use zapline_core::types::AgentId;

pub struct HeartbeatScheduler {
    agent_id: AgentId,
    interval: Duration,
    signals: mpsc::Sender<AgentSignal>,
    running: Option<CancellationToken>,
    last_sent: Arc<Mutex<Option<Instant>>>,
}

impl HeartbeatScheduler {
    pub fn new(agent_id: AgentId, interval: Duration, signals: mpsc::Sender<AgentSignal>) -> Self {
        Self {
            agent_id,
            interval,
            signals,
            running: None,
            last_sent: Arc::new(Mutex::new(None)),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }

    /// Starts ticking. No-op if already running.
    pub fn start(&mut self) {
        if self.running.is_some() {
            return;
        }
        let token = CancellationToken::new();
        self.running = Some(token.clone());

        let agent_id = self.agent_id.clone();
        let signals = self.signals.clone();
        let period = self.interval;
        let last_sent = Arc::clone(&self.last_sent);
        let first_tick = match last_sent.lock() {
            Ok(last) => (*last).map_or_else(Instant::now, |at| (at + period).max(Instant::now())),
            Err(_) => Instant::now(),
        };
        info!(agent_id = %agent_id, interval_secs = period.as_secs(), "heartbeat started");

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(first_tick, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        let signal = AgentSignal::Heartbeat { agent_id: agent_id.clone() };
                        match signals.try_send(signal) {
                            Ok(()) => {
                                if let Ok(mut last) = last_sent.lock() {
                                    *last = Some(Instant::now());
                                }
                            }
                            Err(mpsc::error::TrySendError::Full(_)) => {
                                debug!(agent_id = %agent_id, "outbound queue full, heartbeat skipped");
                            }
                            Err(mpsc::error::TrySendError::Closed(_)) => break,
                        }
                    }
                }
            }
            debug!(agent_id = %agent_id, "heartbeat task exited");
        });
    }

    /// Stops ticking immediately. No-op if not running.
    pub fn stop(&mut self) {
        if let Some(token) = self.running.take() {
            token.cancel();
            info!(agent_id = %self.agent_id, "heartbeat stopped");
        }
    }
}

impl Drop for HeartbeatScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}
