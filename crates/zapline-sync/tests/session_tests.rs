// SPDX-FileCopyrightText: 2026 Zapline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! End-to-end tests of an agent session against mock adapters.

use chrono::Utc;
use zapline_core::events::{AgentSignal, PushEvent};
use zapline_core::types::{
    AgentId, ChatMessage, ConnectionStatus, ConversationId, DeliveryStatus, MessageId, Payload,
    SendReceipt, Sender,
};
use zapline_core::ZaplineError;
use zapline_sync::ChannelStatus;
use zapline_test_utils::fixtures::{inbound, outbound, status_update};
use zapline_test_utils::{BackendCall, SessionHarness};

fn ids(messages: &[ChatMessage]) -> Vec<&str> {
    messages.iter().map(|m| m.id.as_str()).collect()
}

#[tokio::test]
async fn join_is_first_signal_and_pairing_reaches_online() {
    let harness = SessionHarness::builder().build().await;
    let link = harness.connected(0).await.unwrap();

    harness.pair(&link).await.unwrap();

    let view = harness.view();
    assert_eq!(view.status, ConnectionStatus::Online);
    assert_eq!(view.line_identifier.as_deref(), Some("+5511999990000"));
    assert!(view.pairing_artifact.is_none());
    assert_eq!(harness.backend.pairing_requests().await, 1);
}

#[tokio::test]
async fn repeated_pairing_requests_share_one_attempt() {
    let harness = SessionHarness::builder().build().await;
    let link = harness.connected(0).await.unwrap();
    let client = harness.client();

    client.initiate_pairing().await.unwrap();
    client.initiate_pairing().await.unwrap();
    link.emit(PushEvent::PairingArtifact {
        artifact: "qr-1".into(),
    });
    harness
        .wait_for(|v| v.pairing_artifact.as_deref() == Some("qr-1"))
        .await
        .unwrap();

    assert_eq!(harness.backend.pairing_requests().await, 1);
}

#[tokio::test]
async fn failed_pairing_request_is_reported() {
    let harness = SessionHarness::builder().build().await;
    harness.connected(0).await.unwrap();
    harness
        .backend
        .fail_pairing(Some("bridge unavailable".into()))
        .await;

    harness.client().initiate_pairing().await.unwrap();
    let view = harness
        .wait_for(|v| v.last_failure.is_some())
        .await
        .unwrap();

    assert_eq!(view.status, ConnectionStatus::Offline);
    assert!(
        view.last_failure
            .as_deref()
            .is_some_and(|f| f.contains("bridge unavailable"))
    );
}

#[tokio::test]
async fn malformed_frames_are_skipped() {
    let harness = SessionHarness::builder()
        .with_snapshot("c", vec![inbound("m1", "c", "hi", 0)])
        .build()
        .await;
    let link = harness.connected(0).await.unwrap();
    harness
        .client()
        .open_conversation(ConversationId::from("c"))
        .await
        .unwrap();
    harness.wait_for_messages("c", |m| m.len() == 1).await.unwrap();

    link.emit_malformed("missing message id");
    link.emit(PushEvent::Message(inbound("m2", "c", "still here", 1)));

    let messages = harness.wait_for_messages("c", |m| m.len() == 2).await.unwrap();
    assert_eq!(ids(&messages), vec!["m1", "m2"]);
    assert!(link.is_open());
    assert_eq!(harness.connector.connect_count(), 1);
}

#[tokio::test]
async fn reconnect_recovers_missed_messages() {
    let harness = SessionHarness::builder()
        .with_snapshot("c", vec![inbound("c1", "c", "one", 0)])
        .build()
        .await;
    let first = harness.connected(0).await.unwrap();
    harness
        .client()
        .open_conversation(ConversationId::from("c"))
        .await
        .unwrap();
    harness.wait_for_messages("c", |m| m.len() == 1).await.unwrap();

    first.drop_connection();
    harness
        .backend
        .set_snapshot(
            ConversationId::from("c"),
            vec![
                inbound("c1", "c", "one", 0),
                inbound("c2", "c", "two", 1),
                inbound("c3", "c", "three", 2),
            ],
        )
        .await;

    harness.connected(1).await.unwrap();
    let messages = harness.wait_for_messages("c", |m| m.len() == 3).await.unwrap();

    assert_eq!(ids(&messages), vec!["c1", "c2", "c3"]);
    assert_eq!(
        harness
            .backend
            .snapshot_fetches(&ConversationId::from("c"))
            .await,
        2
    );
}

#[tokio::test]
async fn closed_conversations_are_not_refetched_after_reconnect() {
    let harness = SessionHarness::builder().build().await;
    let first = harness.connected(0).await.unwrap();
    let client = harness.client();
    let id = ConversationId::from("c");

    client.open_conversation(id.clone()).await.unwrap();
    harness.wait_for(|v| v.open_conversations.contains(&id)).await.unwrap();
    client.close_conversation(id.clone()).await.unwrap();
    harness.wait_for(|v| v.open_conversations.is_empty()).await.unwrap();

    first.drop_connection();
    harness.connected(1).await.unwrap();

    assert_eq!(harness.backend.snapshot_fetches(&id).await, 1);
}

#[tokio::test]
async fn connect_failures_are_retried() {
    let harness = SessionHarness::builder().build().await;
    harness.connector.fail_next(2);

    harness.connected(0).await.unwrap();

    assert_eq!(harness.connector.connect_count(), 1);
    assert_eq!(harness.view().channel, ChannelStatus::Connected);
}

#[tokio::test]
async fn transient_snapshot_failures_are_retried() {
    let harness = SessionHarness::builder()
        .with_snapshot("c", vec![inbound("m1", "c", "hi", 0)])
        .build()
        .await;
    harness.connected(0).await.unwrap();
    harness.backend.fail_snapshots(2);

    harness
        .client()
        .open_conversation(ConversationId::from("c"))
        .await
        .unwrap();
    harness.wait_for_messages("c", |m| m.len() == 1).await.unwrap();

    assert_eq!(
        harness
            .backend
            .snapshot_fetches(&ConversationId::from("c"))
            .await,
        3
    );
}

#[tokio::test]
async fn optimistic_send_is_replaced_by_receipt_and_echo_is_absorbed() {
    let harness = SessionHarness::builder().build().await;
    let link = harness.connected(0).await.unwrap();
    let client = harness.client();
    client.open_conversation(ConversationId::from("c")).await.unwrap();
    harness.wait_for_messages("c", |_| true).await.unwrap();

    let tmp = client.send_text(ConversationId::from("c"), "hello").await.unwrap();
    assert!(tmp.is_optimistic());

    let messages = harness
        .wait_for_messages("c", |m| m.len() == 1 && m[0].id.as_str() == "srv-1")
        .await
        .unwrap();
    assert_eq!(messages[0].status, DeliveryStatus::Sent);

    link.emit(PushEvent::Message(ChatMessage {
        id: MessageId::new("srv-1"),
        conversation_id: ConversationId::from("c"),
        sender: Sender::Agent,
        status: DeliveryStatus::Sent,
        timestamp: Utc::now(),
        payload: Payload::text("hello"),
    }));
    link.emit(status_update("c", "srv-1", DeliveryStatus::Read));

    let messages = harness
        .wait_for_messages("c", |m| m.first().is_some_and(|m| m.status == DeliveryStatus::Read))
        .await
        .unwrap();
    assert_eq!(ids(&messages), vec!["srv-1"]);

    let sent = harness.backend.sent_texts().await;
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].client_id, tmp);
    assert_eq!(sent[0].text, "hello");
}

#[tokio::test]
async fn echo_before_receipt_yields_one_message() {
    let harness = SessionHarness::builder().build().await;
    let link = harness.connected(0).await.unwrap();
    let client = harness.client();
    client.open_conversation(ConversationId::from("c")).await.unwrap();
    harness.wait_for_messages("c", |_| true).await.unwrap();

    harness.backend.hold_sends();
    harness
        .backend
        .queue_receipt(Ok(SendReceipt {
            id: MessageId::new("srv-9"),
            status: DeliveryStatus::Sent,
        }))
        .await;
    client.send_text(ConversationId::from("c"), "ping").await.unwrap();
    harness
        .wait_for_messages("c", |m| m.len() == 1 && m[0].id.is_optimistic())
        .await
        .unwrap();

    // Echo timestamp must fall inside the match window of the local send.
    link.emit(PushEvent::Message(ChatMessage {
        timestamp: Utc::now(),
        ..outbound("srv-9", "c", "ping", DeliveryStatus::Delivered, 0)
    }));
    harness
        .wait_for_messages("c", |m| m.iter().any(|m| m.id.as_str() == "srv-9"))
        .await
        .unwrap();
    harness.backend.release_sends();

    let messages = harness
        .wait_for_messages("c", |m| {
            m.len() == 1 && m[0].status == DeliveryStatus::Delivered
        })
        .await
        .unwrap();
    assert_eq!(ids(&messages), vec!["srv-9"]);
}

#[tokio::test]
async fn rejected_send_is_marked_failed() {
    let harness = SessionHarness::builder().build().await;
    harness.connected(0).await.unwrap();
    let client = harness.client();
    client.open_conversation(ConversationId::from("c")).await.unwrap();
    harness
        .backend
        .queue_receipt(Err("recipient not on whatsapp".into()))
        .await;

    let tmp = client.send_text(ConversationId::from("c"), "hi").await.unwrap();
    let messages = harness
        .wait_for_messages("c", |m| m.first().is_some_and(|m| m.status == DeliveryStatus::Failed))
        .await
        .unwrap();

    assert_eq!(messages[0].id, tmp);
}

#[tokio::test]
async fn new_messages_notify_the_lead_store() {
    let harness = SessionHarness::builder().build().await;
    let link = harness.connected(0).await.unwrap();
    let id = ConversationId::from("lead-7");

    link.emit(PushEvent::Message(inbound("m1", "lead-7", "quote please", 0)));
    link.emit(PushEvent::Message(inbound("m2", "other", "hello", 1)));

    let poll = async {
        while harness.lead_store.change_count(&id).await == 0 {
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
    };
    tokio::time::timeout(std::time::Duration::from_secs(5), poll)
        .await
        .unwrap();
    assert_eq!(harness.lead_store.changes().await[0].0, harness.agent_id);
}

#[tokio::test]
async fn teammate_presence_is_tracked() {
    let harness = SessionHarness::builder().build().await;
    let link = harness.connected(0).await.unwrap();

    link.emit(PushEvent::Presence {
        agent_id: "agent-2".into(),
        online: true,
    });
    let view = harness
        .wait_for(|v| v.roster.contains_key(&AgentId::from("agent-2")))
        .await
        .unwrap();

    assert!(view.roster[&AgentId::from("agent-2")].online);
}

#[tokio::test]
async fn disconnect_ends_the_session_on_the_backend() {
    let harness = SessionHarness::builder().build().await;
    let link = harness.connected(0).await.unwrap();
    harness.pair(&link).await.unwrap();

    harness.client().disconnect().await.unwrap();
    let poll = async {
        loop {
            let calls = harness.backend.calls().await;
            if calls.iter().any(|c| matches!(c, BackendCall::EndSession(_))) {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
    };
    tokio::time::timeout(std::time::Duration::from_secs(5), poll)
        .await
        .unwrap();

    link.emit(PushEvent::Disconnect {
        reason: Some("logged out from phone".into()),
    });
    harness
        .wait_for(|v| v.status == ConnectionStatus::Offline)
        .await
        .unwrap();
}

#[tokio::test]
async fn logout_stops_the_session() {
    let mut harness = SessionHarness::builder().build().await;
    let link = harness.connected(0).await.unwrap();
    let client = harness.client();

    harness.logout().await;

    let err = client.messages(ConversationId::from("c")).await.unwrap_err();
    assert!(matches!(err, ZaplineError::SessionClosed { .. }));

    // The client sink is released once the channel closes.
    loop {
        match link.next_signal().await {
            Some(AgentSignal::Heartbeat { .. } | AgentSignal::Presence { .. }) => continue,
            Some(other) => panic!("unexpected signal after logout: {other:?}"),
            None => break,
        }
    }
}
