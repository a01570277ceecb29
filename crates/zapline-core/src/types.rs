// SPDX-FileCopyrightText: 2026 Zapline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Domain types shared by the sync engine, the backend adapters and the UI layer.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Prefix carried by client-generated (optimistic) message ids.
pub const OPTIMISTIC_PREFIX: &str = "tmp-";

/// Identifier of a sales agent; owner key of a session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AgentId(pub String);

/// Identifier of a conversation (lead thread).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConversationId(pub String);

/// Identifier of a message, unique within a conversation.
///
/// Always stored in normalized form: surrounding whitespace is trimmed and
/// serialized provider keys (`true_5511999@c.us_3EB0C4`) are reduced to
/// their message key (`3EB0C4`), so the same message reported by the push
/// channel and by a REST snapshot compares equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct MessageId(String);

impl MessageId {
    /// Builds a normalized message id.
    pub fn new(raw: impl AsRef<str>) -> Self {
        Self(normalize_message_id(raw.as_ref()))
    }

    /// Generates a fresh client-side id for an optimistic send.
    pub fn optimistic() -> Self {
        Self(format!("{OPTIMISTIC_PREFIX}{}", uuid::Uuid::new_v4()))
    }

    /// Whether this id was generated client-side and awaits server confirmation.
    pub fn is_optimistic(&self) -> bool {
        self.0.starts_with(OPTIMISTIC_PREFIX)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for MessageId {
    fn from(raw: String) -> Self {
        Self::new(raw)
    }
}

impl From<&str> for MessageId {
    fn from(raw: &str) -> Self {
        Self::new(raw)
    }
}

impl From<MessageId> for String {
    fn from(id: MessageId) -> Self {
        id.0
    }
}

fn normalize_message_id(raw: &str) -> String {
    let trimmed = raw.trim();
    let mut parts = trimmed.splitn(3, '_');
    match (parts.next(), parts.next(), parts.next()) {
        (Some("true" | "false"), Some(chat), Some(key)) if chat.contains('@') && !key.is_empty() => {
            key.to_string()
        }
        _ => trimmed.to_string(),
    }
}

macro_rules! impl_id_display {
    ($($ty:ty),*) => {
        $(impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        })*
    };
}

impl_id_display!(AgentId, ConversationId, MessageId);

impl From<&str> for AgentId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<&str> for ConversationId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Connection status of an agent's WhatsApp session as shown to the UI.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ConnectionStatus {
    Offline,
    Connecting,
    Online,
}

/// Delivery lifecycle of a message.
///
/// `Sending < Sent < Delivered < Read` is a strict forward order. `Failed`
/// sits outside the order: it is reachable from `Sending` or `Sent` only,
/// and both `Failed` and `Read` are absorbing.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum DeliveryStatus {
    Sending,
    Sent,
    Delivered,
    Read,
    Failed,
}

impl DeliveryStatus {
    /// Position in the forward order; `None` for `Failed`.
    pub fn rank(self) -> Option<u8> {
        match self {
            Self::Sending => Some(0),
            Self::Sent => Some(1),
            Self::Delivered => Some(2),
            Self::Read => Some(3),
            Self::Failed => None,
        }
    }

    /// No further transitions are accepted from this status.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Read | Self::Failed)
    }

    /// Whether a record currently in `self` may move to `next`.
    pub fn can_advance_to(self, next: DeliveryStatus) -> bool {
        if self.is_terminal() {
            return false;
        }
        match (self.rank(), next.rank()) {
            (_, None) => matches!(self, Self::Sending | Self::Sent),
            (Some(current), Some(incoming)) => incoming > current,
            (None, Some(_)) => false,
        }
    }

    /// Maps a provider acknowledgement code to a delivery status.
    ///
    /// Codes follow the WhatsApp Web convention: -1 error, 0 pending,
    /// 1 server, 2 device, 3 read, 4 played.
    pub fn from_ack(ack: i64) -> Option<Self> {
        match ack {
            -1 => Some(Self::Failed),
            0 => Some(Self::Sending),
            1 => Some(Self::Sent),
            2 => Some(Self::Delivered),
            3 | 4 => Some(Self::Read),
            _ => None,
        }
    }
}

/// Who authored a message.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Sender {
    Agent,
    Counterpart,
}

/// Message body: text or a reference to media held by the provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Payload {
    Text {
        text: String,
    },
    Media {
        url: String,
        mime_type: Option<String>,
        caption: Option<String>,
    },
}

impl Payload {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    /// Short human-readable form, used for last-message previews.
    pub fn preview(&self) -> &str {
        match self {
            Self::Text { text } => text,
            Self::Media {
                caption: Some(caption),
                ..
            } => caption,
            Self::Media { .. } => "[media]",
        }
    }
}

/// One message as known to the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: MessageId,
    pub conversation_id: ConversationId,
    pub sender: Sender,
    pub status: DeliveryStatus,
    pub timestamp: DateTime<Utc>,
    pub payload: Payload,
}

/// Full point-in-time REST state of one conversation, ordered oldest first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationSnapshot {
    pub conversation_id: ConversationId,
    pub messages: Vec<ChatMessage>,
}

/// Backend answer to a pairing request.
///
/// Bridges usually deliver the artifact later over the push channel; the
/// official Cloud API flow may return it inline.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PairingTicket {
    #[serde(default)]
    pub artifact: Option<String>,
}

/// Text message the agent asked to send, keyed by its optimistic id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundText {
    pub conversation_id: ConversationId,
    pub client_id: MessageId,
    pub text: String,
}

/// Backend acknowledgement of an outbound send.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendReceipt {
    pub id: MessageId,
    pub status: DeliveryStatus,
}

/// Health status reported by adapter health checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthStatus {
    /// Adapter is fully operational.
    Healthy,
    /// Adapter is operational but experiencing issues.
    Degraded(String),
    /// Adapter is not operational.
    Unhealthy(String),
}

/// Identifies the kind of adapter plugged into a session.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
pub enum AdapterType {
    Backend,
    Transport,
    LeadStore,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    const ORDERED: [DeliveryStatus; 4] = [
        DeliveryStatus::Sending,
        DeliveryStatus::Sent,
        DeliveryStatus::Delivered,
        DeliveryStatus::Read,
    ];

    #[test]
    fn forward_order_only_advances() {
        for (i, from) in ORDERED.iter().enumerate() {
            for (j, to) in ORDERED.iter().enumerate() {
                assert_eq!(
                    from.can_advance_to(*to),
                    j > i && *from != DeliveryStatus::Read,
                    "{from} -> {to}"
                );
            }
        }
    }

    #[test]
    fn failed_reachable_from_sending_and_sent_only() {
        assert!(DeliveryStatus::Sending.can_advance_to(DeliveryStatus::Failed));
        assert!(DeliveryStatus::Sent.can_advance_to(DeliveryStatus::Failed));
        assert!(!DeliveryStatus::Delivered.can_advance_to(DeliveryStatus::Failed));
        assert!(!DeliveryStatus::Read.can_advance_to(DeliveryStatus::Failed));
    }

    #[test]
    fn failed_and_read_are_absorbing() {
        for next in ORDERED.iter().chain([DeliveryStatus::Failed].iter()) {
            assert!(!DeliveryStatus::Failed.can_advance_to(*next));
            assert!(!DeliveryStatus::Read.can_advance_to(*next));
        }
    }

    #[test]
    fn ack_codes_map_to_statuses() {
        assert_eq!(DeliveryStatus::from_ack(-1), Some(DeliveryStatus::Failed));
        assert_eq!(DeliveryStatus::from_ack(1), Some(DeliveryStatus::Sent));
        assert_eq!(DeliveryStatus::from_ack(2), Some(DeliveryStatus::Delivered));
        assert_eq!(DeliveryStatus::from_ack(4), Some(DeliveryStatus::Read));
        assert_eq!(DeliveryStatus::from_ack(9), None);
    }

    #[test]
    fn message_id_normalizes_serialized_provider_keys() {
        assert_eq!(MessageId::new("true_5511999@c.us_3EB0C4").as_str(), "3EB0C4");
        assert_eq!(MessageId::new("false_5511888@c.us_ABCD").as_str(), "ABCD");
        assert_eq!(MessageId::new("  srv-42 ").as_str(), "srv-42");
        // Underscores alone do not trigger key extraction.
        assert_eq!(MessageId::new("wamid_HBgM_123").as_str(), "wamid_HBgM_123");
    }

    #[test]
    fn message_id_deserializes_normalized() {
        let id: MessageId = serde_json::from_str("\"true_55@c.us_KEY1\"").unwrap();
        assert_eq!(id, MessageId::new("KEY1"));
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"KEY1\"");
    }

    #[test]
    fn optimistic_ids_are_recognized() {
        let id = MessageId::optimistic();
        assert!(id.is_optimistic());
        assert!(!MessageId::new("srv-42").is_optimistic());
    }

    #[test]
    fn enums_round_trip_through_strings() {
        assert_eq!(ConnectionStatus::Connecting.to_string(), "connecting");
        assert_eq!(
            DeliveryStatus::from_str("delivered").unwrap(),
            DeliveryStatus::Delivered
        );
        assert_eq!(Sender::from_str("counterpart").unwrap(), Sender::Counterpart);
        assert_eq!(
            serde_json::to_string(&DeliveryStatus::Read).unwrap(),
            "\"read\""
        );
    }

    #[test]
    fn payload_preview() {
        assert_eq!(Payload::text("Olá").preview(), "Olá");
        let media = Payload::Media {
            url: "https://cdn/x.jpg".into(),
            mime_type: Some("image/jpeg".into()),
            caption: None,
        };
        assert_eq!(media.preview(), "[media]");
    }
}
