// SPDX-FileCopyrightText: 2026 Zapline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the Zapline messaging sync engine.
//!
//! This crate provides the domain types, push events, error type and adapter
//! traits shared by the sync engine, the WhatsApp backend adapters and the
//! test utilities.

pub mod error;
pub mod events;
pub mod traits;
pub mod types;

pub use error::ZaplineError;
pub use events::{AgentSignal, PushEvent};
pub use types::{
    AdapterType, AgentId, ChatMessage, ConnectionStatus, ConversationId, ConversationSnapshot,
    DeliveryStatus, HealthStatus, MessageId, OutboundText, PairingTicket, Payload, SendReceipt,
    Sender,
};

pub use traits::{
    EventStream, LeadStore, MessagingBackend, PluginAdapter, PushConnection, PushConnector,
    SignalSink,
};
