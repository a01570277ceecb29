// SPDX-FileCopyrightText: 2026 Zapline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! REST client for the WhatsApp bridge.
//!
//! Provides [`BridgeBackend`] which handles URL construction, bearer
//! authentication, response decoding and retry of transient errors.
//! Sends are retried only when the bridge refused them outright, so a
//! message is never posted twice.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use reqwest::{Method, StatusCode, Url};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};
use zapline_config::model::BackendConfig;
use zapline_core::ZaplineError;
use zapline_core::traits::{MessagingBackend, PluginAdapter};
use zapline_core::types::{
    AdapterType, AgentId, ConversationId, ConversationSnapshot, HealthStatus, OutboundText,
    PairingTicket, SendReceipt,
};

use crate::wire::{PairingBody, ReceiptBody, SendBody, SnapshotBody, WireMessage};

/// Delay before retrying a transient failure.
const RETRY_DELAY: Duration = Duration::from_millis(500);

/// HTTP client for the bridge REST API.
#[derive(Debug, Clone)]
pub struct BridgeBackend {
    client: reqwest::Client,
    base_url: Url,
    max_retries: u32,
}

impl BridgeBackend {
    pub fn new(config: &BackendConfig) -> Result<Self, ZaplineError> {
        let mut headers = HeaderMap::new();
        if let Some(token) = &config.api_token {
            let value = HeaderValue::from_str(&format!("Bearer {token}"))
                .map_err(|e| ZaplineError::Config(format!("invalid API token header value: {e}")))?;
            headers.insert(AUTHORIZATION, value);
        }

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| ZaplineError::Backend {
                message: format!("failed to build HTTP client: {e}"),
                status: None,
                source: Some(Box::new(e)),
            })?;

        Ok(Self {
            client,
            base_url: parse_base(&config.base_url)?,
            max_retries: config.max_retries,
        })
    }

    /// Overrides the base URL (for testing with wiremock).
    pub fn with_base_url(mut self, url: &str) -> Result<Self, ZaplineError> {
        self.base_url = parse_base(url)?;
        Ok(self)
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, ZaplineError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| ZaplineError::Config(format!("base URL {} cannot be a base", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// Sends one request, retrying up to `max_retries` where `retry` allows.
    async fn execute(
        &self,
        method: Method,
        url: Url,
        body: Option<&serde_json::Value>,
        retry: Retry,
    ) -> Result<reqwest::Response, ZaplineError> {
        let max_retries = if retry == Retry::Never { 0 } else { self.max_retries };
        let mut last_error = None;

        for attempt in 0..=max_retries {
            if attempt > 0 {
                warn!(attempt, url = %url, "retrying bridge request after transient error");
                tokio::time::sleep(RETRY_DELAY).await;
            }

            let mut request = self.client.request(method.clone(), url.clone());
            if let Some(body) = body {
                request = request.json(body);
            }

            let response = match request.send().await {
                Ok(response) => response,
                Err(e) => {
                    let error = ZaplineError::Backend {
                        message: format!("HTTP request failed: {e}"),
                        status: None,
                        source: Some(Box::new(e)),
                    };
                    if retry.on_transport_error() && attempt < max_retries {
                        last_error = Some(error);
                        continue;
                    }
                    return Err(error);
                }
            };

            let status = response.status();
            debug!(status = %status, attempt, url = %url, "bridge response received");

            if status.is_success() {
                return Ok(response);
            }

            let body = response.text().await.unwrap_or_default();
            let error = ZaplineError::Backend {
                message: format!("bridge returned {status}: {body}"),
                status: Some(status.as_u16()),
                source: None,
            };
            if retry.on_status(status) && attempt < max_retries {
                warn!(status = %status, "transient bridge error, will retry");
                last_error = Some(error);
                continue;
            }
            return Err(error);
        }

        Err(last_error.unwrap_or_else(|| ZaplineError::Backend {
            message: "bridge request failed after retries".into(),
            status: None,
            source: None,
        }))
    }

    async fn json<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, ZaplineError> {
        let body = response.text().await.map_err(|e| ZaplineError::Backend {
            message: format!("failed to read response body: {e}"),
            status: None,
            source: Some(Box::new(e)),
        })?;
        serde_json::from_str(&body)
            .map_err(|e| ZaplineError::malformed(format!("unexpected bridge response: {e}")))
    }
}

fn parse_base(url: &str) -> Result<Url, ZaplineError> {
    Url::parse(url).map_err(|e| ZaplineError::Config(format!("invalid backend URL {url}: {e}")))
}

/// Which failures a request may be retried on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Retry {
    /// Idempotent request: transport errors and transient statuses.
    Transient,
    /// Non-idempotent request: only statuses meaning the bridge turned it
    /// away unprocessed. A lost response or timeout is never resent.
    Refused,
    /// The caller runs its own retry loop.
    Never,
}

impl Retry {
    fn on_transport_error(self) -> bool {
        self == Retry::Transient
    }

    fn on_status(self, status: StatusCode) -> bool {
        match self {
            Retry::Transient => matches!(status.as_u16(), 429 | 500 | 502 | 503 | 504),
            Retry::Refused => matches!(status.as_u16(), 429 | 503),
            Retry::Never => false,
        }
    }
}

#[async_trait]
impl PluginAdapter for BridgeBackend {
    fn name(&self) -> &str {
        "whatsapp-bridge"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Backend
    }

    async fn health_check(&self) -> Result<HealthStatus, ZaplineError> {
        let url = self.endpoint(&["health"])?;
        match self.client.get(url).send().await {
            Ok(response) if response.status().is_success() => Ok(HealthStatus::Healthy),
            Ok(response) => Ok(HealthStatus::Degraded(format!(
                "health endpoint returned {}",
                response.status()
            ))),
            Err(e) => Ok(HealthStatus::Unhealthy(format!("bridge unreachable: {e}"))),
        }
    }

    async fn shutdown(&self) -> Result<(), ZaplineError> {
        Ok(())
    }
}

#[async_trait]
impl MessagingBackend for BridgeBackend {
    async fn request_pairing(&self, agent_id: &AgentId) -> Result<PairingTicket, ZaplineError> {
        let url = self.endpoint(&["agents", &agent_id.0, "session"])?;
        let response = self.execute(Method::POST, url, None, Retry::Refused).await.map_err(|e| {
            ZaplineError::Pairing(e.to_string())
        })?;
        // Bridges that push the QR over the socket reply with an empty body.
        let body = response.text().await.unwrap_or_default();
        if body.trim().is_empty() {
            return Ok(PairingTicket::default());
        }
        let parsed: PairingBody = serde_json::from_str(&body)
            .map_err(|e| ZaplineError::malformed(format!("unexpected pairing response: {e}")))?;
        Ok(PairingTicket {
            artifact: parsed.artifact,
        })
    }

    async fn end_session(&self, agent_id: &AgentId) -> Result<(), ZaplineError> {
        let url = self.endpoint(&["agents", &agent_id.0, "session"])?;
        self.execute(Method::DELETE, url, None, Retry::Transient).await?;
        Ok(())
    }

    async fn fetch_snapshot(
        &self,
        agent_id: &AgentId,
        conversation_id: &ConversationId,
    ) -> Result<ConversationSnapshot, ZaplineError> {
        let url = self.endpoint(&[
            "agents",
            &agent_id.0,
            "conversations",
            &conversation_id.0,
            "messages",
        ])?;
        // Snapshot retries are driven by the session with backoff.
        let response = self.execute(Method::GET, url, None, Retry::Never).await?;
        let body: SnapshotBody = Self::json(response).await?;

        let mut messages = Vec::with_capacity(body.messages.len());
        for record in body.messages {
            let decoded = serde_json::from_value::<WireMessage>(record)
                .map_err(|e| ZaplineError::malformed(format!("undecodable record: {e}")))
                .and_then(WireMessage::into_message);
            match decoded {
                Ok(message) if message.conversation_id == *conversation_id => messages.push(message),
                Ok(message) => warn!(
                    conversation_id = %conversation_id,
                    message_id = %message.id,
                    "snapshot record belongs to another conversation, skipping"
                ),
                Err(e) => warn!(conversation_id = %conversation_id, error = %e, "skipping malformed snapshot record"),
            }
        }
        messages.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));

        Ok(ConversationSnapshot {
            conversation_id: conversation_id.clone(),
            messages,
        })
    }

    async fn send_text(
        &self,
        agent_id: &AgentId,
        message: &OutboundText,
    ) -> Result<SendReceipt, ZaplineError> {
        let url = self.endpoint(&[
            "agents",
            &agent_id.0,
            "conversations",
            &message.conversation_id.0,
            "messages",
        ])?;
        let body = serde_json::to_value(SendBody {
            client_id: message.client_id.as_str(),
            text: &message.text,
        })
        .map_err(|e| ZaplineError::Internal(format!("encode send body: {e}")))?;
        let response = self.execute(Method::POST, url, Some(&body), Retry::Refused).await?;
        let receipt: ReceiptBody = Self::json(response).await?;
        receipt.into_receipt()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use zapline_core::types::{DeliveryStatus, MessageId, Sender};
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_backend(base_url: &str) -> BridgeBackend {
        let config = BackendConfig {
            api_token: Some("secret".into()),
            max_retries: 1,
            ..BackendConfig::default()
        };
        BridgeBackend::new(&config)
            .unwrap()
            .with_base_url(base_url)
            .unwrap()
    }

    #[tokio::test]
    async fn snapshot_is_fetched_with_bearer_token_and_sorted() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/agents/a1/conversations/5511@c.us/messages"))
            .and(header("authorization", "Bearer secret"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "messages": [
                    {"id": "M2", "chat_id": "5511@c.us", "timestamp": 20, "body": "second", "from_me": true, "ack": 3},
                    {"id": "M1", "chat_id": "5511@c.us", "timestamp": 10, "body": "first"},
                    {"chat_id": "5511@c.us", "timestamp": 15, "body": "no id"}
                ]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let backend = test_backend(&server.uri());
        let snapshot = backend
            .fetch_snapshot(&AgentId::from("a1"), &ConversationId::from("5511@c.us"))
            .await
            .unwrap();

        let ids: Vec<_> = snapshot.messages.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["M1", "M2"]);
        assert_eq!(snapshot.messages[1].sender, Sender::Agent);
        assert_eq!(snapshot.messages[1].status, DeliveryStatus::Read);
    }

    #[tokio::test]
    async fn transient_errors_are_retried() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/agents/a1/session"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path("/agents/a1/session"))
            .respond_with(ResponseTemplate::new(204))
            .mount(&server)
            .await;

        let backend = test_backend(&server.uri());
        backend.end_session(&AgentId::from("a1")).await.unwrap();
    }

    #[tokio::test]
    async fn snapshot_failure_is_left_to_the_session() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/agents/a1/conversations/c/messages"))
            .respond_with(ResponseTemplate::new(503))
            .expect(1)
            .mount(&server)
            .await;

        let backend = test_backend(&server.uri());
        let err = backend
            .fetch_snapshot(&AgentId::from("a1"), &ConversationId::from("c"))
            .await
            .unwrap_err();
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn client_errors_are_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/agents/a1/conversations/c/messages"))
            .respond_with(ResponseTemplate::new(404).set_body_string("no such chat"))
            .expect(1)
            .mount(&server)
            .await;

        let backend = test_backend(&server.uri());
        let err = backend
            .fetch_snapshot(&AgentId::from("a1"), &ConversationId::from("c"))
            .await
            .unwrap_err();
        assert!(matches!(err, ZaplineError::Backend { status: Some(404), .. }));
        assert!(!err.is_transient());
    }

    #[tokio::test]
    async fn send_text_posts_body_and_parses_receipt() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/agents/a1/conversations/c/messages"))
            .and(body_json(serde_json::json!({"client_id": "tmp-1", "text": "hello"})))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"id": "true_c@c.us_SRV1", "ack": 1})),
            )
            .mount(&server)
            .await;

        let backend = test_backend(&server.uri());
        let receipt = backend
            .send_text(
                &AgentId::from("a1"),
                &OutboundText {
                    conversation_id: ConversationId::from("c"),
                    client_id: MessageId::new("tmp-1"),
                    text: "hello".into(),
                },
            )
            .await
            .unwrap();

        assert_eq!(receipt.id.as_str(), "SRV1");
        assert_eq!(receipt.status, DeliveryStatus::Sent);
    }

    fn outbound(text: &str) -> OutboundText {
        OutboundText {
            conversation_id: ConversationId::from("c"),
            client_id: MessageId::new("tmp-1"),
            text: text.into(),
        }
    }

    #[tokio::test]
    async fn timed_out_send_is_posted_once() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/agents/a1/conversations/c/messages"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"id": "SRV1"}))
                    .set_delay(Duration::from_millis(1500)),
            )
            .expect(1)
            .mount(&server)
            .await;

        let config = BackendConfig {
            request_timeout_secs: 1,
            max_retries: 1,
            ..BackendConfig::default()
        };
        let backend = BridgeBackend::new(&config)
            .unwrap()
            .with_base_url(&server.uri())
            .unwrap();
        let err = backend
            .send_text(&AgentId::from("a1"), &outbound("hello"))
            .await
            .unwrap_err();

        assert!(matches!(err, ZaplineError::Backend { status: None, .. }));
        server.verify().await;
    }

    #[tokio::test]
    async fn refused_send_is_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/agents/a1/conversations/c/messages"))
            .respond_with(ResponseTemplate::new(429))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/agents/a1/conversations/c/messages"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"id": "SRV1"})))
            .expect(1)
            .mount(&server)
            .await;

        let backend = test_backend(&server.uri());
        let receipt = backend
            .send_text(&AgentId::from("a1"), &outbound("hello"))
            .await
            .unwrap();
        assert_eq!(receipt.id.as_str(), "SRV1");
    }

    #[tokio::test]
    async fn send_failing_with_server_error_is_not_resent() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/agents/a1/conversations/c/messages"))
            .respond_with(ResponseTemplate::new(500))
            .expect(1)
            .mount(&server)
            .await;

        let backend = test_backend(&server.uri());
        let err = backend
            .send_text(&AgentId::from("a1"), &outbound("hello"))
            .await
            .unwrap_err();
        assert!(matches!(err, ZaplineError::Backend { status: Some(500), .. }));
    }

    #[tokio::test]
    async fn pairing_accepts_inline_or_empty_reply() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/agents/a1/session"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"qr": "2@xyz"})))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/agents/a2/session"))
            .respond_with(ResponseTemplate::new(202))
            .mount(&server)
            .await;

        let backend = test_backend(&server.uri());
        let inline = backend.request_pairing(&AgentId::from("a1")).await.unwrap();
        assert_eq!(inline.artifact.as_deref(), Some("2@xyz"));
        let deferred = backend.request_pairing(&AgentId::from("a2")).await.unwrap();
        assert!(deferred.artifact.is_none());
    }

    #[tokio::test]
    async fn pairing_failure_is_reported_as_pairing_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/agents/a1/session"))
            .respond_with(ResponseTemplate::new(409).set_body_string("session exists"))
            .mount(&server)
            .await;

        let backend = test_backend(&server.uri());
        let err = backend.request_pairing(&AgentId::from("a1")).await.unwrap_err();
        assert!(matches!(err, ZaplineError::Pairing(ref m) if m.contains("409")));
    }

    #[tokio::test]
    async fn end_session_issues_delete() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/agents/a1/session"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let backend = test_backend(&server.uri());
        backend.end_session(&AgentId::from("a1")).await.unwrap();
    }

    #[tokio::test]
    async fn health_check_reports_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/health"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let backend = test_backend(&server.uri());
        assert!(matches!(
            backend.health_check().await.unwrap(),
            HealthStatus::Degraded(_)
        ));
    }
}
