// SPDX-FileCopyrightText: 2026 Zapline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock push connector for deterministic testing.
//!
//! Every `connect()` on [`MockConnector`] opens a fresh [`MockLink`]: an
//! in-memory pair of channels standing in for one socket. Tests inject
//! server events with [`MockLink::emit`], read client signals with
//! [`MockLink::next_signal`], and simulate a drop with
//! [`MockLink::drop_connection`].

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures::channel::mpsc::{self, UnboundedReceiver, UnboundedSender};
use futures::{SinkExt, StreamExt};
use tokio::sync::{Mutex, watch};

use zapline_core::ZaplineError;
use zapline_core::events::{AgentSignal, PushEvent};
use zapline_core::traits::{PluginAdapter, PushConnection, PushConnector};
use zapline_core::types::{AdapterType, HealthStatus};

/// Test side of one mock connection.
pub struct MockLink {
    events: UnboundedSender<Result<PushEvent, ZaplineError>>,
    signals: Mutex<UnboundedReceiver<AgentSignal>>,
}

impl MockLink {
    /// Deliver a server event to the client.
    pub fn emit(&self, event: PushEvent) {
        // Client side may already be gone after a drop; nothing to deliver.
        let _ = self.events.unbounded_send(Ok(event));
    }

    /// Deliver a frame the transport could not decode.
    pub fn emit_malformed(&self, reason: &str) {
        let _ = self.events.unbounded_send(Err(ZaplineError::malformed(reason)));
    }

    /// End the event stream, as a socket close would.
    pub fn drop_connection(&self) {
        self.events.close_channel();
    }

    pub fn is_open(&self) -> bool {
        !self.events.is_closed()
    }

    /// Next signal the client sent on this connection, or `None` once the
    /// client released its sink.
    pub async fn next_signal(&self) -> Option<AgentSignal> {
        self.signals.lock().await.next().await
    }

    /// Like [`next_signal`](Self::next_signal) but gives up after `timeout`.
    pub async fn next_signal_within(&self, timeout: Duration) -> Option<AgentSignal> {
        tokio::time::timeout(timeout, self.next_signal())
            .await
            .ok()
            .flatten()
    }
}

/// A mock push connector for testing.
pub struct MockConnector {
    links: Mutex<Vec<Arc<MockLink>>>,
    connected: watch::Sender<usize>,
    failures: AtomicU32,
}

impl MockConnector {
    pub fn new() -> Self {
        Self {
            links: Mutex::new(Vec::new()),
            connected: watch::Sender::new(0),
            failures: AtomicU32::new(0),
        }
    }

    /// Refuse the next `count` connection attempts.
    pub fn fail_next(&self, count: u32) {
        self.failures.store(count, Ordering::SeqCst);
    }

    /// Number of successful connections so far.
    pub fn connect_count(&self) -> usize {
        *self.connected.borrow()
    }

    /// Waits for the `index`-th successful connection (zero based).
    pub async fn link(&self, index: usize) -> Arc<MockLink> {
        let mut rx = self.connected.subscribe();
        // Sender lives in self; wait_for only fails if it is dropped.
        let _ = rx.wait_for(|count| *count > index).await;
        Arc::clone(&self.links.lock().await[index])
    }

    /// The most recent connection, if any.
    pub async fn latest(&self) -> Option<Arc<MockLink>> {
        self.links.lock().await.last().cloned()
    }
}

impl Default for MockConnector {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PluginAdapter for MockConnector {
    fn name(&self) -> &str {
        "mock-push"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Transport
    }

    async fn health_check(&self) -> Result<HealthStatus, ZaplineError> {
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), ZaplineError> {
        Ok(())
    }
}

#[async_trait]
impl PushConnector for MockConnector {
    async fn connect(&self) -> Result<PushConnection, ZaplineError> {
        let refused = self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if refused {
            tracing::debug!("mock connector refusing connection");
            return Err(ZaplineError::transport("connection refused"));
        }

        let (events_tx, events_rx) = mpsc::unbounded();
        let (signals_tx, signals_rx) = mpsc::unbounded();
        let link = Arc::new(MockLink {
            events: events_tx,
            signals: Mutex::new(signals_rx),
        });

        let mut links = self.links.lock().await;
        links.push(link);
        self.connected.send_replace(links.len());
        tracing::debug!(connection = links.len(), "mock push connection opened");
        drop(links);

        let sink = signals_tx.sink_map_err(|e| ZaplineError::transport(e.to_string()));
        Ok(PushConnection::new(events_rx, sink))
    }
}
