// SPDX-FileCopyrightText: 2026 Zapline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! REST side of the messaging backend.

use async_trait::async_trait;

use crate::error::ZaplineError;
use crate::traits::adapter::PluginAdapter;
use crate::types::{
    AgentId, ConversationId, ConversationSnapshot, OutboundText, PairingTicket, SendReceipt,
};

/// Request/response operations against the WhatsApp bridge or Cloud API proxy.
///
/// Every call is scoped to one agent; the backend holds one WhatsApp line per
/// agent.
#[async_trait]
pub trait MessagingBackend: PluginAdapter {
    /// Asks the backend to start pairing the agent's line.
    ///
    /// The artifact is usually delivered later as a push event; some backends
    /// return it inline in the ticket.
    async fn request_pairing(&self, agent: &AgentId) -> Result<PairingTicket, ZaplineError>;

    /// Terminates the agent's WhatsApp session on the backend.
    async fn end_session(&self, agent: &AgentId) -> Result<(), ZaplineError>;

    /// Fetches the full message list of one conversation, oldest first.
    async fn fetch_snapshot(
        &self,
        agent: &AgentId,
        conversation: &ConversationId,
    ) -> Result<ConversationSnapshot, ZaplineError>;

    /// Sends a text message on behalf of the agent.
    async fn send_text(
        &self,
        agent: &AgentId,
        message: &OutboundText,
    ) -> Result<SendReceipt, ZaplineError>;
}
