// SPDX-FileCopyrightText: 2026 Zapline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Message and event builders shared by tests.

use chrono::{DateTime, TimeZone, Utc};

use zapline_core::events::PushEvent;
use zapline_core::types::{
    ChatMessage, ConversationId, DeliveryStatus, MessageId, Payload, Sender,
};

/// Fixed base instant so tests do not depend on the wall clock.
pub fn at(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(1_760_000_000 + secs, 0)
        .single()
        .unwrap_or_default()
}

/// Text message from the lead.
pub fn inbound(id: &str, conversation: &str, text: &str, secs: i64) -> ChatMessage {
    ChatMessage {
        id: MessageId::new(id),
        conversation_id: ConversationId::from(conversation),
        sender: Sender::Counterpart,
        status: DeliveryStatus::Delivered,
        timestamp: at(secs),
        payload: Payload::text(text),
    }
}

/// Text message sent by the agent, as the server reports it.
pub fn outbound(
    id: &str,
    conversation: &str,
    text: &str,
    status: DeliveryStatus,
    secs: i64,
) -> ChatMessage {
    ChatMessage {
        id: MessageId::new(id),
        conversation_id: ConversationId::from(conversation),
        sender: Sender::Agent,
        status,
        timestamp: at(secs),
        payload: Payload::text(text),
    }
}

pub fn status_update(conversation: &str, id: &str, status: DeliveryStatus) -> PushEvent {
    PushEvent::StatusUpdate {
        conversation_id: ConversationId::from(conversation),
        message_id: MessageId::new(id),
        status,
    }
}
