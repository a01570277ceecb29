// SPDX-FileCopyrightText: 2026 Zapline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! JSON wire format shared by the bridge's REST API and event socket.
//!
//! Socket frames are `{"event": <name>, "data": {...}}`. Bridges differ in
//! event names (`qr` vs `pairing_artifact`, `message_ack` vs
//! `status_update`), so the common aliases are accepted. Delivery status
//! arrives either as a named `status` or as a numeric `ack` level.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use zapline_core::events::{AgentSignal, PushEvent};
use zapline_core::types::{
    AgentId, ChatMessage, ConversationId, DeliveryStatus, MessageId, Payload, SendReceipt, Sender,
};
use zapline_core::ZaplineError;

/// Timestamp as sent by bridges: unix seconds, unix millis or RFC 3339.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum WireTime {
    Unix(i64),
    Rfc3339(DateTime<Utc>),
}

impl WireTime {
    fn to_utc(&self) -> Result<DateTime<Utc>, ZaplineError> {
        match self {
            Self::Rfc3339(at) => Ok(*at),
            Self::Unix(n) => {
                let parsed = if n.abs() >= 100_000_000_000 {
                    Utc.timestamp_millis_opt(*n).single()
                } else {
                    Utc.timestamp_opt(*n, 0).single()
                };
                parsed.ok_or_else(|| ZaplineError::malformed(format!("timestamp {n} out of range")))
            }
        }
    }
}

/// Message record as returned by snapshot fetches and `message` frames.
#[derive(Debug, Clone, Deserialize)]
pub struct WireMessage {
    pub id: String,
    #[serde(alias = "chatId", alias = "conversation_id")]
    pub chat_id: String,
    #[serde(default, alias = "fromMe")]
    pub from_me: bool,
    #[serde(default)]
    pub status: Option<DeliveryStatus>,
    #[serde(default)]
    pub ack: Option<i64>,
    pub timestamp: WireTime,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default, alias = "mediaUrl")]
    pub media_url: Option<String>,
    #[serde(default, alias = "mimetype")]
    pub mime_type: Option<String>,
    #[serde(default)]
    pub caption: Option<String>,
}

impl WireMessage {
    pub fn into_message(self) -> Result<ChatMessage, ZaplineError> {
        let id = MessageId::new(&self.id);
        if id.as_str().is_empty() {
            return Err(ZaplineError::malformed("message without id"));
        }
        let conversation_id = ConversationId::from(self.chat_id.trim());
        if conversation_id.0.is_empty() {
            return Err(ZaplineError::malformed(format!("message {id} without chat id")));
        }

        let sender = if self.from_me {
            Sender::Agent
        } else {
            Sender::Counterpart
        };
        let status = self
            .status
            .or_else(|| self.ack.and_then(DeliveryStatus::from_ack))
            .unwrap_or(match sender {
                Sender::Agent => DeliveryStatus::Sent,
                Sender::Counterpart => DeliveryStatus::Delivered,
            });

        let payload = match (self.media_url, self.body) {
            (Some(url), body) => Payload::Media {
                url,
                mime_type: self.mime_type,
                caption: self.caption.or(body),
            },
            (None, Some(text)) => Payload::Text { text },
            (None, None) => {
                return Err(ZaplineError::malformed(format!("message {id} without body")));
            }
        };

        Ok(ChatMessage {
            id,
            conversation_id,
            sender,
            status,
            timestamp: self.timestamp.to_utc()?,
            payload,
        })
    }
}

/// Server-to-client socket frame.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum InboundFrame {
    #[serde(alias = "qr")]
    PairingArtifact {
        #[serde(alias = "qr")]
        artifact: String,
    },
    #[serde(alias = "ready", alias = "connected")]
    ConnectSuccess {
        #[serde(alias = "phone", alias = "wid")]
        line_identifier: String,
    },
    #[serde(alias = "disconnected")]
    Disconnect {
        #[serde(default)]
        reason: Option<String>,
    },
    Message(WireMessage),
    #[serde(alias = "message_ack")]
    StatusUpdate {
        #[serde(alias = "chatId", alias = "conversation_id")]
        chat_id: String,
        #[serde(alias = "messageId", alias = "id")]
        message_id: String,
        #[serde(default)]
        status: Option<DeliveryStatus>,
        #[serde(default)]
        ack: Option<i64>,
    },
    Presence {
        agent_id: String,
        online: bool,
    },
}

impl InboundFrame {
    pub fn into_event(self) -> Result<PushEvent, ZaplineError> {
        Ok(match self {
            Self::PairingArtifact { artifact } => PushEvent::PairingArtifact { artifact },
            Self::ConnectSuccess { line_identifier } => PushEvent::ConnectSuccess { line_identifier },
            Self::Disconnect { reason } => PushEvent::Disconnect { reason },
            Self::Message(message) => PushEvent::Message(message.into_message()?),
            Self::StatusUpdate {
                chat_id,
                message_id,
                status,
                ack,
            } => {
                let conversation_id = ConversationId::from(chat_id.trim());
                if conversation_id.0.is_empty() {
                    return Err(ZaplineError::malformed(format!(
                        "status update for {message_id} without chat id"
                    )));
                }
                let status = status
                    .or_else(|| ack.and_then(DeliveryStatus::from_ack))
                    .ok_or_else(|| {
                        ZaplineError::malformed(format!("status update for {message_id} without status"))
                    })?;
                PushEvent::StatusUpdate {
                    conversation_id,
                    message_id: MessageId::new(&message_id),
                    status,
                }
            }
            Self::Presence { agent_id, online } => PushEvent::Presence {
                agent_id: AgentId(agent_id),
                online,
            },
        })
    }
}

/// Decodes one text frame from the event socket.
pub fn decode_frame(text: &str) -> Result<PushEvent, ZaplineError> {
    let frame: InboundFrame = serde_json::from_str(text)
        .map_err(|e| ZaplineError::malformed(format!("undecodable frame: {e}")))?;
    frame.into_event()
}

#[derive(Serialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
enum OutboundFrame<'a> {
    Join { agent_id: &'a str },
    Heartbeat { agent_id: &'a str },
    Presence { agent_id: &'a str, online: bool },
}

/// Encodes a client signal as a socket text frame.
pub fn encode_signal(signal: &AgentSignal) -> Result<String, ZaplineError> {
    let frame = match signal {
        AgentSignal::Join { agent_id } => OutboundFrame::Join { agent_id: &agent_id.0 },
        AgentSignal::Heartbeat { agent_id } => OutboundFrame::Heartbeat { agent_id: &agent_id.0 },
        AgentSignal::Presence { agent_id, online } => OutboundFrame::Presence {
            agent_id: &agent_id.0,
            online: *online,
        },
    };
    serde_json::to_string(&frame).map_err(|e| ZaplineError::Internal(format!("encode signal: {e}")))
}

/// Body of a snapshot fetch. Records are decoded one by one so a single
/// bad record does not hide the rest of the conversation.
#[derive(Debug, Deserialize)]
pub struct SnapshotBody {
    pub messages: Vec<serde_json::Value>,
}

/// Body returned by the pairing endpoint.
#[derive(Debug, Default, Deserialize)]
pub struct PairingBody {
    #[serde(default, alias = "qr")]
    pub artifact: Option<String>,
}

/// Request body of an outbound text send.
#[derive(Debug, Serialize)]
pub struct SendBody<'a> {
    pub client_id: &'a str,
    pub text: &'a str,
}

/// Body returned by the send endpoint.
#[derive(Debug, Deserialize)]
pub struct ReceiptBody {
    pub id: String,
    #[serde(default)]
    pub status: Option<DeliveryStatus>,
    #[serde(default)]
    pub ack: Option<i64>,
}

impl ReceiptBody {
    pub fn into_receipt(self) -> Result<SendReceipt, ZaplineError> {
        let id = MessageId::new(&self.id);
        if id.as_str().is_empty() {
            return Err(ZaplineError::malformed("send receipt without id"));
        }
        let status = self
            .status
            .or_else(|| self.ack.and_then(DeliveryStatus::from_ack))
            .unwrap_or(DeliveryStatus::Sent);
        Ok(SendReceipt { id, status })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_bridge_aliases() {
        let event = decode_frame(r#"{"event":"qr","data":{"qr":"2@abc"}}"#).unwrap();
        assert_eq!(
            event,
            PushEvent::PairingArtifact {
                artifact: "2@abc".into()
            }
        );

        let event = decode_frame(r#"{"event":"ready","data":{"phone":"5511999990000"}}"#).unwrap();
        assert_eq!(
            event,
            PushEvent::ConnectSuccess {
                line_identifier: "5511999990000".into()
            }
        );

        let event = decode_frame(r#"{"event":"disconnected","data":{}}"#).unwrap();
        assert_eq!(event, PushEvent::Disconnect { reason: None });
    }

    #[test]
    fn ack_levels_map_to_statuses() {
        let event = decode_frame(
            r#"{"event":"message_ack","data":{"chatId":"5511@c.us","messageId":"true_5511@c.us_ABC","ack":3}}"#,
        )
        .unwrap();
        assert_eq!(
            event,
            PushEvent::StatusUpdate {
                conversation_id: ConversationId::from("5511@c.us"),
                message_id: MessageId::new("ABC"),
                status: DeliveryStatus::Read,
            }
        );
    }

    #[test]
    fn message_frames_normalize_ids_and_timestamps() {
        let event = decode_frame(
            r#"{"event":"message","data":{"id":"false_5511@c.us_XYZ","chat_id":"5511@c.us","timestamp":1760000000,"body":"oi"}}"#,
        )
        .unwrap();
        let PushEvent::Message(message) = event else {
            panic!("expected message event");
        };
        assert_eq!(message.id.as_str(), "XYZ");
        assert_eq!(message.sender, Sender::Counterpart);
        assert_eq!(message.status, DeliveryStatus::Delivered);
        assert_eq!(message.timestamp.timestamp(), 1_760_000_000);
        assert_eq!(message.payload, Payload::text("oi"));
    }

    #[test]
    fn millisecond_and_rfc3339_timestamps() {
        let millis: WireTime = serde_json::from_str("1760000000123").unwrap();
        assert_eq!(millis.to_utc().unwrap().timestamp_millis(), 1_760_000_000_123);

        let rfc: WireTime = serde_json::from_str(r#""2025-10-09T08:53:20Z""#).unwrap();
        assert_eq!(rfc.to_utc().unwrap().timestamp(), 1_760_000_000);
    }

    #[test]
    fn media_message_keeps_caption() {
        let wire: WireMessage = serde_json::from_str(
            r#"{"id":"M1","chatId":"c","fromMe":true,"ack":2,"timestamp":1,"mediaUrl":"https://cdn/x.jpg","mimetype":"image/jpeg","caption":"price list"}"#,
        )
        .unwrap();
        let message = wire.into_message().unwrap();
        assert_eq!(message.sender, Sender::Agent);
        assert_eq!(message.status, DeliveryStatus::Delivered);
        assert_eq!(message.payload.preview(), "price list");
    }

    #[test]
    fn padded_chat_ids_resolve_to_one_conversation() {
        let message = decode_frame(
            r#"{"event":"message","data":{"id":"M1","chat_id":" 5511@c.us ","timestamp":1,"body":"oi"}}"#,
        )
        .unwrap();
        let status =
            decode_frame(r#"{"event":"message_ack","data":{"chatId":" 5511@c.us\n","id":"M1","ack":3}}"#)
                .unwrap();

        let PushEvent::Message(message) = message else {
            panic!("expected message");
        };
        let PushEvent::StatusUpdate { conversation_id, .. } = status else {
            panic!("expected status update");
        };
        assert_eq!(conversation_id, message.conversation_id);
        assert_eq!(conversation_id, ConversationId::from("5511@c.us"));
    }

    #[test]
    fn malformed_frames_are_rejected() {
        for frame in [
            "not json",
            r#"{"event":"unknown","data":{}}"#,
            r#"{"event":"message","data":{"chat_id":"c","timestamp":1,"body":"x"}}"#,
            r#"{"event":"message","data":{"id":"M","chat_id":"c","timestamp":1}}"#,
            r#"{"event":"status_update","data":{"chat_id":"c","message_id":"M"}}"#,
            r#"{"event":"status_update","data":{"chat_id":"  ","message_id":"M","ack":2}}"#,
        ] {
            let err = decode_frame(frame).unwrap_err();
            assert!(matches!(err, ZaplineError::MalformedEvent { .. }), "{frame}");
        }
    }

    #[test]
    fn signals_encode_as_event_frames() {
        let join = encode_signal(&AgentSignal::Join {
            agent_id: AgentId::from("agent-1"),
        })
        .unwrap();
        assert_eq!(join, r#"{"event":"join","data":{"agent_id":"agent-1"}}"#);

        let presence = encode_signal(&AgentSignal::Presence {
            agent_id: AgentId::from("agent-1"),
            online: false,
        })
        .unwrap();
        assert_eq!(
            presence,
            r#"{"event":"presence","data":{"agent_id":"agent-1","online":false}}"#
        );
    }
}
