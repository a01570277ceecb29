// SPDX-FileCopyrightText: 2026 Zapline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Events flowing between the push channel and an agent session.

use serde::{Deserialize, Serialize};

use crate::types::{AgentId, ChatMessage, ConversationId, DeliveryStatus, MessageId};

/// Server-to-client event delivered over the push channel, already decoded
/// and normalized by the transport adapter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PushEvent {
    /// A new (or refreshed) pairing artifact, typically a QR payload.
    PairingArtifact { artifact: String },
    /// The phone completed pairing; the line is now online.
    ConnectSuccess { line_identifier: String },
    /// The WhatsApp line went offline.
    Disconnect { reason: Option<String> },
    /// A new message, inbound or outbound.
    Message(ChatMessage),
    /// Delivery status change for a known message.
    StatusUpdate {
        conversation_id: ConversationId,
        message_id: MessageId,
        status: DeliveryStatus,
    },
    /// A teammate joined or left.
    Presence { agent_id: AgentId, online: bool },
}

impl PushEvent {
    /// Short name used in logs and metric labels.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::PairingArtifact { .. } => "pairing_artifact",
            Self::ConnectSuccess { .. } => "connect_success",
            Self::Disconnect { .. } => "disconnect",
            Self::Message(_) => "message",
            Self::StatusUpdate { .. } => "status_update",
            Self::Presence { .. } => "presence",
        }
    }
}

/// Client-to-server signal sent over the push channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AgentSignal {
    /// Announces the agent on a fresh connection; always the first signal.
    Join { agent_id: AgentId },
    /// Keepalive.
    Heartbeat { agent_id: AgentId },
    /// Agent availability change.
    Presence { agent_id: AgentId, online: bool },
}
