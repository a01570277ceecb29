// SPDX-FileCopyrightText: 2026 Zapline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Push-channel transport abstraction.

use std::pin::Pin;

use async_trait::async_trait;
use futures::{Sink, Stream};

use crate::error::ZaplineError;
use crate::events::{AgentSignal, PushEvent};
use crate::traits::adapter::PluginAdapter;

/// Ordered stream of decoded push events.
///
/// An `Err(ZaplineError::MalformedEvent { .. })` item reports one undecodable
/// frame and the stream continues. Any other error, or the end of the
/// stream, means the connection is gone.
pub type EventStream = Pin<Box<dyn Stream<Item = Result<PushEvent, ZaplineError>> + Send>>;

/// Outgoing half of a push connection.
pub type SignalSink = Pin<Box<dyn Sink<AgentSignal, Error = ZaplineError> + Send>>;

/// One live bidirectional push connection.
pub struct PushConnection {
    pub events: EventStream,
    pub signals: SignalSink,
}

impl PushConnection {
    pub fn new<E, S>(events: E, signals: S) -> Self
    where
        E: Stream<Item = Result<PushEvent, ZaplineError>> + Send + 'static,
        S: Sink<AgentSignal, Error = ZaplineError> + Send + 'static,
    {
        Self {
            events: Box::pin(events),
            signals: Box::pin(signals),
        }
    }
}

impl std::fmt::Debug for PushConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PushConnection").finish_non_exhaustive()
    }
}

/// Opens push connections. Reconnection policy lives in the caller.
#[async_trait]
pub trait PushConnector: PluginAdapter {
    /// Establishes one connection. Each call yields an independent socket.
    async fn connect(&self) -> Result<PushConnection, ZaplineError>;
}
