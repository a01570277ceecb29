// SPDX-FileCopyrightText: 2026 Zapline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Agent session actor.
//!
//! One task per logged-in agent owns the [`Engine`] and is its only writer.
//! Push events, REST replies, timers and UI commands all arrive on a single
//! input queue and are applied in order. Effects that need I/O run on
//! spawned tasks that report back through the same queue, so live events
//! keep flowing while a fetch or pairing request is in flight.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};
use zapline_config::ZaplineConfig;
use zapline_core::error::ZaplineError;
use zapline_core::events::AgentSignal;
use zapline_core::traits::{LeadStore, MessagingBackend, PushConnector};
use zapline_core::types::{
    AgentId, ChatMessage, ConversationId, ConversationSnapshot, MessageId, OutboundText,
};

use crate::engine::{Command, Effect, Engine, EngineInput, EngineSettings, SessionView};
use crate::heartbeat::HeartbeatScheduler;
use crate::metrics;
use crate::push::{Backoff, PushChannelClient};

/// Session tuning derived from [`ZaplineConfig`].
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub mailbox_capacity: usize,
    pub outbound_buffer: usize,
    pub pairing_timeout: Duration,
    pub heartbeat_enabled: bool,
    pub heartbeat_interval: Duration,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub snapshot_fetch_attempts: u32,
    pub engine: EngineSettings,
}

impl SessionSettings {
    pub fn from_config(config: &ZaplineConfig) -> Self {
        Self {
            mailbox_capacity: config.sync.mailbox_capacity,
            outbound_buffer: config.push.outbound_buffer,
            pairing_timeout: config.pairing.timeout(),
            heartbeat_enabled: config.heartbeat.enabled,
            heartbeat_interval: config.heartbeat.interval(),
            initial_backoff: config.push.initial_backoff(),
            max_backoff: config.push.max_backoff(),
            snapshot_fetch_attempts: config.backend.snapshot_fetch_attempts,
            engine: EngineSettings::from_config(&config.reconcile),
        }
    }
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self::from_config(&ZaplineConfig::default())
    }
}

/// External collaborators shared by every session.
#[derive(Clone)]
pub struct SessionDeps {
    pub backend: Arc<dyn MessagingBackend>,
    pub connector: Arc<dyn PushConnector>,
    pub lead_store: Option<Arc<dyn LeadStore>>,
}

enum Query {
    Messages {
        conversation_id: ConversationId,
        reply: oneshot::Sender<Vec<ChatMessage>>,
    },
}

/// Cloneable front door to a running session.
#[derive(Clone)]
pub struct SessionClient {
    agent_id: AgentId,
    inputs: mpsc::Sender<EngineInput>,
    queries: mpsc::Sender<Query>,
    view: watch::Receiver<SessionView>,
}

impl SessionClient {
    pub fn agent_id(&self) -> &AgentId {
        &self.agent_id
    }

    /// Latest published session state.
    pub fn view(&self) -> SessionView {
        self.view.borrow().clone()
    }

    /// Receiver notified after every applied input that changed the view.
    pub fn subscribe(&self) -> watch::Receiver<SessionView> {
        self.view.clone()
    }

    async fn command(&self, command: Command) -> Result<(), ZaplineError> {
        self.inputs
            .send(EngineInput::Command(command))
            .await
            .map_err(|_| self.closed())
    }

    fn closed(&self) -> ZaplineError {
        ZaplineError::SessionClosed {
            agent_id: self.agent_id.to_string(),
        }
    }

    pub async fn initiate_pairing(&self) -> Result<(), ZaplineError> {
        self.command(Command::InitiatePairing).await
    }

    pub async fn disconnect(&self) -> Result<(), ZaplineError> {
        self.command(Command::Disconnect).await
    }

    pub async fn open_conversation(&self, id: ConversationId) -> Result<(), ZaplineError> {
        self.command(Command::OpenConversation(id)).await
    }

    pub async fn refresh_conversation(&self, id: ConversationId) -> Result<(), ZaplineError> {
        self.command(Command::RefreshConversation(id)).await
    }

    pub async fn close_conversation(&self, id: ConversationId) -> Result<(), ZaplineError> {
        self.command(Command::CloseConversation(id)).await
    }

    /// Queues a text message and returns its optimistic id.
    pub async fn send_text(
        &self,
        conversation_id: ConversationId,
        text: impl Into<String>,
    ) -> Result<MessageId, ZaplineError> {
        let client_id = MessageId::optimistic();
        self.command(Command::SendText {
            conversation_id,
            client_id: client_id.clone(),
            text: text.into(),
            timestamp: Utc::now(),
        })
        .await?;
        Ok(client_id)
    }

    /// Messages of one conversation as currently held by the ledger.
    pub async fn messages(&self, conversation_id: ConversationId) -> Result<Vec<ChatMessage>, ZaplineError> {
        let (reply, rx) = oneshot::channel();
        self.queries
            .send(Query::Messages {
                conversation_id,
                reply,
            })
            .await
            .map_err(|_| self.closed())?;
        rx.await.map_err(|_| self.closed())
    }

    /// Waits until `predicate` holds for the published view.
    pub async fn wait_for<F>(&self, predicate: F) -> Result<SessionView, ZaplineError>
    where
        F: FnMut(&SessionView) -> bool,
    {
        let mut rx = self.view.clone();
        let view = rx.wait_for(predicate).await.map_err(|_| self.closed())?;
        Ok((*view).clone())
    }
}

/// Owning handle of a running session task.
pub struct AgentSession {
    client: SessionClient,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl AgentSession {
    pub fn client(&self) -> &SessionClient {
        &self.client
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Logs the agent out and waits up to `timeout` for the session to wind
    /// down before forcing it.
    pub async fn logout(self, timeout: Duration) {
        if self.client.command(Command::Logout).await.is_err() {
            debug!(agent_id = %self.client.agent_id, "session already stopped");
        }
        self.finish(timeout).await;
    }

    /// Stops the session without logging the agent out.
    pub async fn shutdown(self, timeout: Duration) {
        self.cancel.cancel();
        self.finish(timeout).await;
    }

    async fn finish(self, timeout: Duration) {
        let agent_id = self.client.agent_id.clone();
        let mut task = self.task;
        if tokio::time::timeout(timeout, &mut task).await.is_err() {
            warn!(agent_id = %agent_id, "session did not stop in time, aborting");
            self.cancel.cancel();
            task.abort();
        }
    }
}

/// Starts a session task for `agent_id`.
pub fn spawn_session(agent_id: AgentId, settings: SessionSettings, deps: SessionDeps) -> AgentSession {
    let (inputs_tx, inputs_rx) = mpsc::channel(settings.mailbox_capacity);
    let (queries_tx, queries_rx) = mpsc::channel(16);
    let (signals_tx, signals_rx) = mpsc::channel(settings.outbound_buffer);

    let engine = Engine::new(agent_id.clone(), settings.engine.clone());
    let (view_tx, view_rx) = watch::channel(engine.view());
    let cancel = CancellationToken::new();

    let push = PushChannelClient::new(
        agent_id.clone(),
        Arc::clone(&deps.connector),
        Backoff::new(settings.initial_backoff, settings.max_backoff),
        inputs_tx.clone(),
        signals_rx,
        cancel.child_token(),
    );

    let heartbeat = HeartbeatScheduler::new(
        agent_id.clone(),
        settings.heartbeat_interval,
        signals_tx.clone(),
    );

    let actor = SessionActor {
        agent_id: agent_id.clone(),
        engine,
        settings,
        deps,
        inputs: inputs_tx.clone(),
        signals: signals_tx,
        heartbeat,
        view: view_tx,
        cancel: cancel.clone(),
        io: TaskTracker::new(),
    };

    let task = tokio::spawn(actor.run(push, inputs_rx, queries_rx));
    info!(agent_id = %agent_id, "agent session started");

    AgentSession {
        client: SessionClient {
            agent_id,
            inputs: inputs_tx,
            queries: queries_tx,
            view: view_rx,
        },
        cancel,
        task,
    }
}

struct SessionActor {
    agent_id: AgentId,
    engine: Engine,
    settings: SessionSettings,
    deps: SessionDeps,
    inputs: mpsc::Sender<EngineInput>,
    signals: mpsc::Sender<AgentSignal>,
    heartbeat: HeartbeatScheduler,
    view: watch::Sender<SessionView>,
    cancel: CancellationToken,
    io: TaskTracker,
}

impl SessionActor {
    async fn run(
        mut self,
        push: PushChannelClient,
        mut inputs: mpsc::Receiver<EngineInput>,
        mut queries: mpsc::Receiver<Query>,
    ) {
        let push_task = tokio::spawn(push.run());
        let cancel = self.cancel.clone();

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                Some(input) = inputs.recv() => {
                    let effects = self.engine.apply(input);
                    for effect in effects {
                        self.execute(effect);
                    }
                    self.publish();
                    if self.engine.is_closed() {
                        break;
                    }
                }
                Some(query) = queries.recv() => self.answer(query),
                else => break,
            }
        }

        self.heartbeat.stop();
        self.cancel.cancel();
        drop(inputs);
        drop(queries);
        self.io.close();
        self.io.wait().await;
        if let Err(e) = push_task.await {
            warn!(agent_id = %self.agent_id, error = %e, "push channel task failed");
        }
        info!(agent_id = %self.agent_id, "agent session closed");
    }

    fn publish(&self) {
        let view = self.engine.view();
        self.view.send_if_modified(|current| {
            if *current == view {
                false
            } else {
                *current = view;
                true
            }
        });
    }

    fn answer(&self, query: Query) {
        match query {
            Query::Messages {
                conversation_id,
                reply,
            } => {
                let messages = self
                    .engine
                    .ledger(&conversation_id)
                    .map(|l| l.messages().to_vec())
                    .unwrap_or_default();
                // Requester may have gone away.
                let _ = reply.send(messages);
            }
        }
    }

    /// Runs `fut` on a tracked task that stops when the session closes.
    fn spawn_io<F>(&self, fut: F)
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let cancel = self.cancel.clone();
        self.io.spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => {}
                _ = fut => {}
            }
        });
    }

    fn execute(&mut self, effect: Effect) {
        let agent_id = self.agent_id.clone();
        let inputs = self.inputs.clone();
        match effect {
            Effect::RequestPairing { attempt } => {
                let backend = Arc::clone(&self.deps.backend);
                self.spawn_io(async move {
                    let result = backend.request_pairing(&agent_id).await;
                    let _ = inputs
                        .send(EngineInput::PairingResolved { attempt, result })
                        .await;
                });
            }
            Effect::ArmPairingTimer { attempt } => {
                let timeout = self.settings.pairing_timeout;
                self.spawn_io(async move {
                    tokio::time::sleep(timeout).await;
                    let _ = inputs.send(EngineInput::PairingTimedOut { attempt }).await;
                });
            }
            Effect::EndSession => {
                let backend = Arc::clone(&self.deps.backend);
                self.spawn_io(async move {
                    if let Err(e) = backend.end_session(&agent_id).await {
                        warn!(agent_id = %agent_id, error = %e, "end session request failed");
                    }
                });
            }
            Effect::FetchSnapshot { conversation_id } => {
                let backend = Arc::clone(&self.deps.backend);
                let attempts = self.settings.snapshot_fetch_attempts;
                let backoff = Backoff::new(self.settings.initial_backoff, self.settings.max_backoff);
                self.spawn_io(async move {
                    let input = match fetch_snapshot(&*backend, &agent_id, &conversation_id, attempts, backoff).await {
                        Ok(snapshot) => EngineInput::SnapshotLoaded(snapshot),
                        Err(error) => {
                            metrics::record_snapshot_fetch("failed");
                            EngineInput::SnapshotFailed {
                                conversation_id,
                                error,
                            }
                        }
                    };
                    let _ = inputs.send(input).await;
                });
            }
            Effect::SendText(outbound) => {
                let backend = Arc::clone(&self.deps.backend);
                self.spawn_io(async move {
                    let result = backend.send_text(&agent_id, &outbound).await;
                    let OutboundText {
                        conversation_id,
                        client_id,
                        ..
                    } = outbound;
                    let _ = inputs
                        .send(EngineInput::SendResolved {
                            conversation_id,
                            client_id,
                            result,
                        })
                        .await;
                });
            }
            Effect::NotifyLeadStore { conversation_id } => {
                let Some(store) = self.deps.lead_store.clone() else {
                    return;
                };
                self.spawn_io(async move {
                    if let Err(e) = store.conversation_changed(&agent_id, &conversation_id).await {
                        warn!(
                            agent_id = %agent_id,
                            conversation_id = %conversation_id,
                            error = %e,
                            "lead store refresh failed"
                        );
                    }
                });
            }
            Effect::StartHeartbeat => {
                if self.settings.heartbeat_enabled {
                    self.heartbeat.start();
                }
            }
            Effect::StopHeartbeat => self.heartbeat.stop(),
            Effect::CloseChannel => {
                // Presence goes out before the socket closes; best effort.
                let _ = self.signals.try_send(AgentSignal::Presence {
                    agent_id,
                    online: false,
                });
                self.cancel.cancel();
            }
        }
    }
}

async fn fetch_snapshot(
    backend: &dyn MessagingBackend,
    agent_id: &AgentId,
    conversation_id: &ConversationId,
    attempts: u32,
    mut backoff: Backoff,
) -> Result<ConversationSnapshot, ZaplineError> {
    let mut attempt = 1;
    loop {
        match backend.fetch_snapshot(agent_id, conversation_id).await {
            Ok(snapshot) => {
                metrics::record_snapshot_fetch("ok");
                return Ok(snapshot);
            }
            Err(e) if e.is_transient() && attempt < attempts => {
                let delay = backoff.next_delay();
                debug!(
                    agent_id = %agent_id,
                    conversation_id = %conversation_id,
                    attempt,
                    error = %e,
                    delay_ms = delay.as_millis() as u64,
                    "snapshot fetch failed, retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}
