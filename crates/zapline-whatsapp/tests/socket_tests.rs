// SPDX-FileCopyrightText: 2026 Zapline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Event socket connector against a local WebSocket server.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use zapline_core::events::{AgentSignal, PushEvent};
use zapline_core::traits::PushConnector;
use zapline_core::types::{AgentId, ConversationId, DeliveryStatus, MessageId};
use zapline_core::ZaplineError;
use zapline_whatsapp::WsConnector;

struct Served {
    url: String,
    auth: Arc<Mutex<Option<String>>>,
    task: JoinHandle<Vec<String>>,
}

/// Accepts one client, records its first text frame, then sends `frames`
/// and closes.
async fn serve_once(frames: Vec<&'static str>) -> Served {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("ws://{}/events", listener.local_addr().unwrap());
    let auth = Arc::new(Mutex::new(None));
    let seen = Arc::clone(&auth);

    let task = tokio::spawn(async move {
        let (tcp, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_hdr_async(tcp, |req: &Request, resp: Response| {
            *seen.lock().unwrap() = req
                .headers()
                .get("authorization")
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);
            Ok::<_, ErrorResponse>(resp)
        })
        .await
        .unwrap();

        let mut received = Vec::new();
        if let Some(Ok(Message::Text(text))) = ws.next().await {
            received.push(text.to_string());
        }
        for frame in frames {
            ws.send(Message::text(frame)).await.unwrap();
        }
        ws.close(None).await.ok();
        received
    });

    Served { url, auth, task }
}

#[tokio::test]
async fn join_goes_out_and_frames_come_in_decoded() {
    let served = serve_once(vec![
        r#"{"event":"message","data":{"id":"M1","chat_id":"c","timestamp":1760000000,"body":"hi"}}"#,
        r#"{"event":"message","data":{"chat_id":"c"}}"#,
        r#"{"event":"message_ack","data":{"chatId":"c","messageId":"M1","ack":2}}"#,
    ])
    .await;

    let connector = WsConnector::new(served.url.clone(), Some("secret".into()), Duration::from_secs(5));
    let mut connection = connector.connect().await.unwrap();

    connection
        .signals
        .send(AgentSignal::Join {
            agent_id: AgentId::from("agent-1"),
        })
        .await
        .unwrap();

    let first = connection.events.next().await.unwrap().unwrap();
    let PushEvent::Message(message) = first else {
        panic!("expected message, got {first:?}");
    };
    assert_eq!(message.id, MessageId::new("M1"));

    let second = connection.events.next().await.unwrap();
    assert!(matches!(second, Err(ZaplineError::MalformedEvent { .. })));

    let third = connection.events.next().await.unwrap().unwrap();
    assert_eq!(
        third,
        PushEvent::StatusUpdate {
            conversation_id: ConversationId::from("c"),
            message_id: MessageId::new("M1"),
            status: DeliveryStatus::Delivered,
        }
    );

    // Server close ends the stream.
    loop {
        match connection.events.next().await {
            None => break,
            Some(Err(ZaplineError::Transport { .. })) => break,
            Some(other) => panic!("unexpected item after close: {other:?}"),
        }
    }

    let received = served.task.await.unwrap();
    assert_eq!(received, vec![r#"{"event":"join","data":{"agent_id":"agent-1"}}"#]);
    assert_eq!(served.auth.lock().unwrap().as_deref(), Some("Bearer secret"));
}

#[tokio::test]
async fn refused_connection_is_a_transport_error() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("ws://{}/events", listener.local_addr().unwrap());
    drop(listener);

    let connector = WsConnector::new(url, None, Duration::from_secs(5));
    let err = connector.connect().await.unwrap_err();

    assert!(matches!(err, ZaplineError::Transport { .. }));
    assert!(err.is_transient());
}
