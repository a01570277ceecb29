// SPDX-FileCopyrightText: 2026 Zapline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Reconciliation engine.
//!
//! Owns one agent's session state, pairing controller, conversation
//! ledgers and pending buffer. Everything the session learns (push events,
//! channel transitions, REST replies, agent commands) enters through
//! [`Engine::apply`], which mutates state and returns the [`Effect`]s the
//! caller must run. The engine performs no I/O, so the agent actor is its
//! single writer and the tests drive it directly.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use tracing::{debug, info, warn};
use zapline_config::model::{MAX_MATCH_WINDOW_SECS, ReconcileConfig};
use zapline_core::error::ZaplineError;
use zapline_core::events::PushEvent;
use zapline_core::types::{
    AgentId, ChatMessage, ConnectionStatus, ConversationId, ConversationSnapshot, DeliveryStatus,
    MessageId, OutboundText, PairingTicket, Payload, SendReceipt, Sender,
};

use crate::buffer::{Deferred, PendingBuffer};
use crate::ledger::{Advance, ConversationLedger};
use crate::metrics;
use crate::pairing::{PairingController, PairingOutcome};
use crate::session::{SessionPhase, SessionStore};

/// Reconciliation tuning.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub match_window: TimeDelta,
    pub pending_capacity: usize,
    pub pending_ttl: Duration,
}

impl EngineSettings {
    pub fn from_config(config: &ReconcileConfig) -> Self {
        Self {
            match_window: TimeDelta::seconds(config.match_window_secs.min(MAX_MATCH_WINDOW_SECS) as i64),
            pending_capacity: config.pending_buffer_cap,
            pending_ttl: config.pending_ttl(),
        }
    }
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self::from_config(&ReconcileConfig::default())
    }
}

/// State of the push channel as shown to the UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelStatus {
    /// Never connected yet.
    Connecting,
    Connected,
    /// Dropped after having been connected; reconnecting with backoff.
    Reconnecting,
}

impl std::fmt::Display for ChannelStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChannelStatus::Connecting => write!(f, "connecting"),
            ChannelStatus::Connected => write!(f, "connected"),
            ChannelStatus::Reconnecting => write!(f, "reconnecting"),
        }
    }
}

/// Agent-originated requests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    InitiatePairing,
    /// End the WhatsApp session on the backend. State changes only when the
    /// resulting `disconnect` event arrives.
    Disconnect,
    OpenConversation(ConversationId),
    RefreshConversation(ConversationId),
    CloseConversation(ConversationId),
    SendText {
        conversation_id: ConversationId,
        client_id: MessageId,
        text: String,
        timestamp: DateTime<Utc>,
    },
    Logout,
}

/// Everything that can happen to an agent session.
#[derive(Debug)]
pub enum EngineInput {
    Push(PushEvent),
    /// Push channel (re)connected. `resumed` is set when an earlier
    /// connection existed, meaning events may have been missed.
    ChannelUp { resumed: bool },
    ChannelDown { reason: String },
    SnapshotLoaded(ConversationSnapshot),
    SnapshotFailed {
        conversation_id: ConversationId,
        error: ZaplineError,
    },
    PairingResolved {
        attempt: u64,
        result: Result<PairingTicket, ZaplineError>,
    },
    PairingTimedOut { attempt: u64 },
    SendResolved {
        conversation_id: ConversationId,
        client_id: MessageId,
        result: Result<SendReceipt, ZaplineError>,
    },
    Command(Command),
}

/// Side effect requested by the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    RequestPairing { attempt: u64 },
    ArmPairingTimer { attempt: u64 },
    EndSession,
    FetchSnapshot { conversation_id: ConversationId },
    SendText(OutboundText),
    NotifyLeadStore { conversation_id: ConversationId },
    StartHeartbeat,
    StopHeartbeat,
    CloseChannel,
}

/// Last known presence of a teammate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PresenceEntry {
    pub online: bool,
    pub last_seen: DateTime<Utc>,
}

/// Read-only snapshot of an agent session for the UI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionView {
    pub agent_id: AgentId,
    pub status: ConnectionStatus,
    pub phase: SessionPhase,
    pub pairing_artifact: Option<String>,
    pub line_identifier: Option<String>,
    pub last_failure: Option<String>,
    pub channel: ChannelStatus,
    pub open_conversations: Vec<ConversationId>,
    pub roster: BTreeMap<AgentId, PresenceEntry>,
}

pub struct Engine {
    agent_id: AgentId,
    settings: EngineSettings,
    session: SessionStore,
    pairing: PairingController,
    ledgers: HashMap<ConversationId, ConversationLedger>,
    open: BTreeSet<ConversationId>,
    pending: PendingBuffer,
    channel: ChannelStatus,
    roster: BTreeMap<AgentId, PresenceEntry>,
    closed: bool,
}

impl Engine {
    pub fn new(agent_id: AgentId, settings: EngineSettings) -> Self {
        let pending = PendingBuffer::new(settings.pending_capacity, settings.pending_ttl);
        Self {
            session: SessionStore::new(agent_id.clone()),
            agent_id,
            settings,
            pairing: PairingController::new(),
            ledgers: HashMap::new(),
            open: BTreeSet::new(),
            pending,
            channel: ChannelStatus::Connecting,
            roster: BTreeMap::new(),
            closed: false,
        }
    }

    pub fn agent_id(&self) -> &AgentId {
        &self.agent_id
    }

    pub fn session(&self) -> &SessionStore {
        &self.session
    }

    pub fn channel(&self) -> ChannelStatus {
        self.channel
    }

    pub fn ledger(&self, conversation_id: &ConversationId) -> Option<&ConversationLedger> {
        self.ledgers.get(conversation_id)
    }

    pub fn open_conversations(&self) -> impl Iterator<Item = &ConversationId> {
        self.open.iter()
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Set after logout; every later input is ignored.
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn view(&self) -> SessionView {
        SessionView {
            agent_id: self.agent_id.clone(),
            status: self.session.status(),
            phase: self.session.phase(),
            pairing_artifact: self.session.pairing_artifact().map(str::to_string),
            line_identifier: self.session.line_identifier().map(str::to_string),
            last_failure: self.session.last_failure().map(str::to_string),
            channel: self.channel,
            open_conversations: self.open.iter().cloned().collect(),
            roster: self.roster.clone(),
        }
    }

    /// Applies one input and returns the effects to execute, in order.
    pub fn apply(&mut self, input: EngineInput) -> Vec<Effect> {
        let mut effects = Vec::new();
        if self.closed {
            debug!(agent_id = %self.agent_id, "session closed, input ignored");
            return effects;
        }

        match input {
            EngineInput::Push(event) => self.on_push(event, &mut effects),
            EngineInput::ChannelUp { resumed } => self.on_channel_up(resumed, &mut effects),
            EngineInput::ChannelDown { reason } => {
                warn!(agent_id = %self.agent_id, %reason, "push channel dropped, reconnecting");
                self.channel = ChannelStatus::Reconnecting;
                effects.push(Effect::StopHeartbeat);
            }
            EngineInput::SnapshotLoaded(snapshot) => self.merge_snapshot(snapshot, &mut effects),
            EngineInput::SnapshotFailed {
                conversation_id,
                error,
            } => {
                warn!(
                    agent_id = %self.agent_id,
                    conversation_id = %conversation_id,
                    error = %error,
                    "snapshot fetch failed; will retry on next refresh or reconnect"
                );
            }
            EngineInput::PairingResolved { attempt, result } => {
                let result = result.map_err(|e| e.to_string());
                let outcome = self
                    .pairing
                    .on_request_result(&mut self.session, attempt, result);
                self.pairing_effects(outcome, &mut effects);
            }
            EngineInput::PairingTimedOut { attempt } => {
                self.pairing.on_timeout(&mut self.session, attempt);
            }
            EngineInput::SendResolved {
                conversation_id,
                client_id,
                result,
            } => self.on_send_resolved(conversation_id, client_id, result, &mut effects),
            EngineInput::Command(command) => self.on_command(command, &mut effects),
        }

        effects
    }

    fn on_push(&mut self, event: PushEvent, effects: &mut Vec<Effect>) {
        metrics::record_event(event.kind());
        match event {
            PushEvent::PairingArtifact { artifact } => {
                let outcome = self.pairing.on_artifact(&mut self.session, artifact);
                self.pairing_effects(outcome, effects);
            }
            PushEvent::ConnectSuccess { line_identifier } => {
                self.pairing.on_connected(&mut self.session, line_identifier);
            }
            PushEvent::Disconnect { reason } => {
                self.pairing
                    .on_disconnect(&mut self.session, reason.as_deref());
            }
            PushEvent::Message(message) => self.on_message(message, effects),
            PushEvent::StatusUpdate {
                conversation_id,
                message_id,
                status,
            } => self.on_status(conversation_id, message_id, status, effects),
            PushEvent::Presence { agent_id, online } => {
                if agent_id == self.agent_id {
                    return;
                }
                debug!(agent_id = %self.agent_id, teammate = %agent_id, online, "presence changed");
                self.roster.insert(
                    agent_id,
                    PresenceEntry {
                        online,
                        last_seen: Utc::now(),
                    },
                );
            }
        }
    }

    fn pairing_effects(&self, outcome: PairingOutcome, effects: &mut Vec<Effect>) {
        if let PairingOutcome::Started { attempt } = outcome {
            effects.push(Effect::RequestPairing { attempt });
            effects.push(Effect::ArmPairingTimer { attempt });
        }
    }

    fn on_channel_up(&mut self, resumed: bool, effects: &mut Vec<Effect>) {
        self.channel = ChannelStatus::Connected;
        effects.push(Effect::StartHeartbeat);
        if !resumed {
            info!(agent_id = %self.agent_id, "push channel connected");
            return;
        }
        metrics::record_reconnect();
        info!(
            agent_id = %self.agent_id,
            open = self.open.len(),
            "push channel reconnected, re-fetching open conversations"
        );
        effects.extend(self.open.iter().map(|id| Effect::FetchSnapshot {
            conversation_id: id.clone(),
        }));
    }

    fn on_command(&mut self, command: Command, effects: &mut Vec<Effect>) {
        match command {
            Command::InitiatePairing => {
                let outcome = self.pairing.initiate(&mut self.session);
                self.pairing_effects(outcome, effects);
            }
            Command::Disconnect => {
                if matches!(
                    self.session.phase(),
                    SessionPhase::Offline | SessionPhase::PairingFailed
                ) {
                    debug!(agent_id = %self.agent_id, "disconnect requested while offline");
                } else {
                    effects.push(Effect::EndSession);
                }
            }
            Command::OpenConversation(id) => {
                self.ledgers
                    .entry(id.clone())
                    .or_insert_with(|| ConversationLedger::new(id.clone()));
                if self.open.insert(id.clone()) {
                    debug!(agent_id = %self.agent_id, conversation_id = %id, "conversation opened");
                    effects.push(Effect::FetchSnapshot {
                        conversation_id: id,
                    });
                }
                metrics::set_open_conversations(&self.agent_id.0, self.open.len());
            }
            Command::RefreshConversation(id) => {
                self.ledgers
                    .entry(id.clone())
                    .or_insert_with(|| ConversationLedger::new(id.clone()));
                self.open.insert(id.clone());
                metrics::set_open_conversations(&self.agent_id.0, self.open.len());
                effects.push(Effect::FetchSnapshot {
                    conversation_id: id,
                });
            }
            Command::CloseConversation(id) => {
                self.open.remove(&id);
                metrics::set_open_conversations(&self.agent_id.0, self.open.len());
            }
            Command::SendText {
                conversation_id,
                client_id,
                text,
                timestamp,
            } => {
                let ledger = self
                    .ledgers
                    .entry(conversation_id.clone())
                    .or_insert_with(|| ConversationLedger::new(conversation_id.clone()));
                let inserted = ledger.insert(ChatMessage {
                    id: client_id.clone(),
                    conversation_id: conversation_id.clone(),
                    sender: Sender::Agent,
                    status: DeliveryStatus::Sending,
                    timestamp,
                    payload: Payload::text(text.clone()),
                });
                if !inserted {
                    debug!(agent_id = %self.agent_id, message_id = %client_id, "duplicate send ignored");
                    return;
                }
                effects.push(Effect::SendText(OutboundText {
                    conversation_id: conversation_id.clone(),
                    client_id,
                    text,
                }));
                effects.push(Effect::NotifyLeadStore { conversation_id });
            }
            Command::Logout => {
                info!(agent_id = %self.agent_id, "agent logged out");
                self.pairing.reset(&mut self.session);
                self.channel = ChannelStatus::Connecting;
                self.open.clear();
                self.closed = true;
                metrics::set_open_conversations(&self.agent_id.0, 0);
                effects.push(Effect::StopHeartbeat);
                effects.push(Effect::CloseChannel);
            }
        }
    }

    fn on_message(&mut self, message: ChatMessage, effects: &mut Vec<Effect>) {
        let conversation_id = message.conversation_id.clone();
        match self.ledgers.get_mut(&conversation_id) {
            Some(ledger) if ledger.is_loaded() => {
                if merge_message(
                    ledger,
                    &mut self.pending,
                    message,
                    self.settings.match_window,
                    false,
                ) {
                    effects.push(Effect::NotifyLeadStore { conversation_id });
                }
            }
            _ => {
                // The lead list still needs the new preview even though the
                // conversation's messages are not loaded here.
                self.pending
                    .push(conversation_id.clone(), Deferred::Message(message));
                effects.push(Effect::NotifyLeadStore { conversation_id });
            }
        }
    }

    fn on_status(
        &mut self,
        conversation_id: ConversationId,
        message_id: MessageId,
        status: DeliveryStatus,
        effects: &mut Vec<Effect>,
    ) {
        let Some(ledger) = self
            .ledgers
            .get_mut(&conversation_id)
            .filter(|l| l.is_loaded())
        else {
            self.pending
                .push(conversation_id, Deferred::Status { message_id, status });
            return;
        };
        match ledger.advance(&message_id, status) {
            Advance::Advanced { from, to } => {
                debug!(
                    conversation_id = %conversation_id,
                    message_id = %message_id,
                    %from,
                    %to,
                    "delivery status advanced"
                );
                effects.push(Effect::NotifyLeadStore { conversation_id });
            }
            Advance::Stale { current } => {
                debug!(
                    conversation_id = %conversation_id,
                    message_id = %message_id,
                    %current,
                    incoming = %status,
                    "stale status update ignored"
                );
                metrics::record_stale("status_update");
            }
            Advance::Unknown => {
                self.pending
                    .push(conversation_id, Deferred::Status { message_id, status });
            }
        }
    }

    fn merge_snapshot(&mut self, snapshot: ConversationSnapshot, effects: &mut Vec<Effect>) {
        let ConversationSnapshot {
            conversation_id,
            messages,
        } = snapshot;
        metrics::record_snapshot_fetch("loaded");

        let window = self.settings.match_window;
        let ledger = self
            .ledgers
            .entry(conversation_id.clone())
            .or_insert_with(|| ConversationLedger::new(conversation_id.clone()));

        let mut changed = false;
        for message in messages {
            if message.conversation_id != conversation_id {
                warn!(
                    conversation_id = %conversation_id,
                    message_id = %message.id,
                    "snapshot record belongs to another conversation, skipped"
                );
                continue;
            }
            changed |= merge_message(ledger, &mut self.pending, message, window, true);
        }
        ledger.mark_loaded();

        let mut replayed = 0usize;
        for entry in self.pending.take_conversation(&conversation_id) {
            match entry.event.clone() {
                Deferred::Message(message) => {
                    changed |= merge_message(ledger, &mut self.pending, message, window, false);
                    replayed += 1;
                }
                Deferred::Status { message_id, status } => {
                    match ledger.advance(&message_id, status) {
                        Advance::Advanced { .. } => {
                            changed = true;
                            replayed += 1;
                        }
                        Advance::Stale { .. } => replayed += 1,
                        Advance::Unknown => self.pending.restore(entry),
                    }
                }
            }
        }

        debug!(
            agent_id = %self.agent_id,
            conversation_id = %conversation_id,
            messages = ledger.len(),
            replayed,
            "snapshot merged"
        );
        if changed {
            effects.push(Effect::NotifyLeadStore { conversation_id });
        }
    }

    fn on_send_resolved(
        &mut self,
        conversation_id: ConversationId,
        client_id: MessageId,
        result: Result<SendReceipt, ZaplineError>,
        effects: &mut Vec<Effect>,
    ) {
        let Some(ledger) = self.ledgers.get_mut(&conversation_id) else {
            debug!(conversation_id = %conversation_id, "send resolved for unknown conversation");
            return;
        };

        let changed = match result {
            Err(error) => {
                warn!(
                    conversation_id = %conversation_id,
                    message_id = %client_id,
                    error = %error,
                    "send failed"
                );
                matches!(
                    ledger.advance(&client_id, DeliveryStatus::Failed),
                    Advance::Advanced { .. }
                )
            }
            Ok(SendReceipt { id, status }) => {
                if ledger.contains(&client_id) {
                    if ledger.contains(&id) {
                        // The server record arrived first and was not matched;
                        // collapse the optimistic copy into it.
                        ledger.remove(&client_id);
                    } else {
                        ledger.replace_id(&client_id, id.clone());
                    }
                    ledger.advance(&id, status);
                    replay_orphans(ledger, &mut self.pending, &id);
                    true
                } else if ledger.contains(&id) {
                    matches!(ledger.advance(&id, status), Advance::Advanced { .. })
                } else {
                    debug!(
                        conversation_id = %conversation_id,
                        message_id = %client_id,
                        "send receipt matches no record"
                    );
                    false
                }
            }
        };

        if changed {
            effects.push(Effect::NotifyLeadStore { conversation_id });
        }
    }
}

/// Merges one message into a ledger. Returns whether the ledger changed.
///
/// `advance_existing` lets snapshot records move an existing record's
/// status forward; a repeated push `message` event never does.
fn merge_message(
    ledger: &mut ConversationLedger,
    pending: &mut PendingBuffer,
    message: ChatMessage,
    window: TimeDelta,
    advance_existing: bool,
) -> bool {
    if ledger.contains(&message.id) {
        if advance_existing {
            return matches!(
                ledger.advance(&message.id, message.status),
                Advance::Advanced { .. }
            );
        }
        debug!(message_id = %message.id, "duplicate message event ignored");
        metrics::record_stale("message");
        return false;
    }

    let id = message.id.clone();
    if let Some(optimistic) = ledger.find_optimistic_match(&message, window) {
        debug!(from = %optimistic, to = %id, "optimistic record confirmed");
        ledger.replace_id(&optimistic, id.clone());
        ledger.advance(&id, message.status);
    } else {
        ledger.insert(message);
    }
    replay_orphans(ledger, pending, &id);
    true
}

/// Applies status updates that arrived before their message.
fn replay_orphans(ledger: &mut ConversationLedger, pending: &mut PendingBuffer, id: &MessageId) {
    let conversation_id = ledger.conversation_id().clone();
    for status in pending.take_statuses(&conversation_id, id) {
        ledger.advance(id, status);
    }
}
