// SPDX-FileCopyrightText: 2026 Zapline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! WebSocket connector for the bridge event bus.
//!
//! Each [`connect`](PushConnector::connect) opens a fresh socket and splits
//! it into a decoded event stream and a signal sink. Reconnects are driven
//! by the session's push channel client, not here.

use std::time::Duration;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt, future};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::http::header::AUTHORIZATION;
use tracing::debug;
use zapline_config::ZaplineConfig;
use zapline_core::events::AgentSignal;
use zapline_core::traits::{PluginAdapter, PushConnection, PushConnector};
use zapline_core::types::{AdapterType, HealthStatus};
use zapline_core::ZaplineError;

use crate::wire::{decode_frame, encode_signal};

pub struct WsConnector {
    url: String,
    api_token: Option<String>,
    connect_timeout: Duration,
}

impl WsConnector {
    pub fn new(url: impl Into<String>, api_token: Option<String>, connect_timeout: Duration) -> Self {
        Self {
            url: url.into(),
            api_token,
            connect_timeout,
        }
    }

    pub fn from_config(config: &ZaplineConfig) -> Self {
        Self::new(
            config.push.url.clone(),
            config.backend.api_token.clone(),
            config.backend.request_timeout(),
        )
    }

    fn transport_error(message: String, source: tokio_tungstenite::tungstenite::Error) -> ZaplineError {
        ZaplineError::Transport {
            message,
            source: Some(Box::new(source)),
        }
    }
}

/// Maps one socket message to an event; control frames yield nothing.
fn decode_message(
    message: Result<Message, tokio_tungstenite::tungstenite::Error>,
) -> Option<Result<zapline_core::PushEvent, ZaplineError>> {
    match message {
        Ok(Message::Text(text)) => Some(decode_frame(text.as_str())),
        Ok(Message::Binary(bytes)) => Some(
            std::str::from_utf8(&bytes)
                .map_err(|e| ZaplineError::malformed(format!("binary frame is not UTF-8: {e}")))
                .and_then(decode_frame),
        ),
        Ok(Message::Close(frame)) => {
            debug!(?frame, "event socket closed by server");
            None
        }
        Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_)) => None,
        Err(e) => Some(Err(WsConnector::transport_error(
            format!("event socket read failed: {e}"),
            e,
        ))),
    }
}

#[async_trait]
impl PluginAdapter for WsConnector {
    fn name(&self) -> &str {
        "whatsapp-events"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Transport
    }

    async fn health_check(&self) -> Result<HealthStatus, ZaplineError> {
        Ok(match self.url.as_str().into_client_request() {
            Ok(_) => HealthStatus::Healthy,
            Err(e) => HealthStatus::Unhealthy(format!("invalid event socket URL: {e}")),
        })
    }

    async fn shutdown(&self) -> Result<(), ZaplineError> {
        Ok(())
    }
}

#[async_trait]
impl PushConnector for WsConnector {
    async fn connect(&self) -> Result<PushConnection, ZaplineError> {
        let mut request = self
            .url
            .as_str()
            .into_client_request()
            .map_err(|e| Self::transport_error(format!("invalid event socket URL {}: {e}", self.url), e))?;
        if let Some(token) = &self.api_token {
            let value = HeaderValue::from_str(&format!("Bearer {token}"))
                .map_err(|e| ZaplineError::Config(format!("invalid API token header value: {e}")))?;
            request.headers_mut().insert(AUTHORIZATION, value);
        }

        let (socket, response) = tokio::time::timeout(
            self.connect_timeout,
            tokio_tungstenite::connect_async(request),
        )
        .await
        .map_err(|_| ZaplineError::Timeout {
            duration: self.connect_timeout,
        })?
        .map_err(|e| Self::transport_error(format!("event socket handshake failed: {e}"), e))?;
        debug!(url = %self.url, status = %response.status(), "event socket connected");

        let (sink, stream) = socket.split();
        let events = stream.filter_map(|message| future::ready(decode_message(message)));
        let signals = sink
            .sink_map_err(|e| Self::transport_error(format!("event socket write failed: {e}"), e))
            .with(|signal: AgentSignal| future::ready(encode_signal(&signal).map(Message::text)));

        Ok(PushConnection::new(events, signals))
    }
}
