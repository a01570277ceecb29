// SPDX-FileCopyrightText: 2026 Zapline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Real-time conversation sync for agents of a WhatsApp-backed CRM.
//!
//! Each logged-in agent gets an [`AgentSession`]: a single task owning the
//! pairing state machine, per-conversation ledgers and the buffer of events
//! that arrived before their conversation was loaded. The session consumes
//! the push channel, reconciles optimistic sends with server echoes, and
//! recovers missed events by refetching snapshots after a reconnect.
//!
//! - [`engine`]: the pure state reducer, `input -> effects`
//! - [`agent`]: the actor that runs the engine and performs its effects
//! - [`push`]: push channel client with reconnect backoff
//! - [`registry`]: live sessions keyed by agent

pub mod agent;
pub mod buffer;
pub mod engine;
pub mod heartbeat;
pub mod ledger;
pub mod metrics;
pub mod pairing;
pub mod push;
pub mod registry;
pub mod session;
pub mod shutdown;

pub use agent::{AgentSession, SessionClient, SessionDeps, SessionSettings, spawn_session};
pub use engine::{
    ChannelStatus, Command, Effect, Engine, EngineInput, EngineSettings, PresenceEntry,
    SessionView,
};
pub use ledger::{Advance, ConversationLedger};
pub use push::{Backoff, PushChannelClient};
pub use registry::SessionRegistry;
pub use session::{SessionPhase, SessionStore};
pub use shutdown::{drain_sessions, install_signal_handler};
