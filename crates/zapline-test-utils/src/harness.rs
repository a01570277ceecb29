// SPDX-FileCopyrightText: 2026 Zapline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test harness for end-to-end session testing.
//!
//! `SessionHarness` spawns a real agent session wired to mock adapters and
//! offers helpers to drive it through pairing and connection set-up.

use std::sync::Arc;
use std::time::Duration;

use zapline_config::ZaplineConfig;
use zapline_core::ZaplineError;
use zapline_core::events::{AgentSignal, PushEvent};
use zapline_core::traits::{LeadStore, MessagingBackend, PushConnector};
use zapline_core::types::{AgentId, ChatMessage, ConnectionStatus, ConversationId};
use zapline_sync::{
    AgentSession, ChannelStatus, SessionClient, SessionDeps, SessionSettings, SessionView,
};

use crate::mock_backend::MockBackend;
use crate::mock_lead_store::MockLeadStore;
use crate::mock_push::{MockConnector, MockLink};

const WAIT: Duration = Duration::from_secs(5);

/// Builder for creating test sessions with configurable options.
pub struct SessionHarnessBuilder {
    agent_id: AgentId,
    config: ZaplineConfig,
    snapshots: Vec<(ConversationId, Vec<ChatMessage>)>,
    with_lead_store: bool,
}

impl SessionHarnessBuilder {
    fn new() -> Self {
        let mut config = ZaplineConfig::default();
        config.push.initial_backoff_ms = 10;
        config.push.max_backoff_ms = 50;
        config.backend.snapshot_fetch_attempts = 3;
        Self {
            agent_id: AgentId::from("agent-1"),
            config,
            snapshots: Vec::new(),
            with_lead_store: true,
        }
    }

    pub fn with_agent(mut self, agent_id: &str) -> Self {
        self.agent_id = AgentId::from(agent_id);
        self
    }

    /// Replace the configuration the session settings are derived from.
    pub fn with_config(mut self, config: ZaplineConfig) -> Self {
        self.config = config;
        self
    }

    /// Seed the mock backend with the REST state of a conversation.
    pub fn with_snapshot(mut self, conversation: &str, messages: Vec<ChatMessage>) -> Self {
        self.snapshots.push((ConversationId::from(conversation), messages));
        self
    }

    pub fn without_heartbeat(mut self) -> Self {
        self.config.heartbeat.enabled = false;
        self
    }

    pub fn without_lead_store(mut self) -> Self {
        self.with_lead_store = false;
        self
    }

    /// Spawn the session.
    pub async fn build(self) -> SessionHarness {
        let backend = Arc::new(MockBackend::new());
        for (id, messages) in self.snapshots {
            backend.set_snapshot(id, messages).await;
        }
        let connector = Arc::new(MockConnector::new());
        let lead_store = Arc::new(MockLeadStore::new());

        let deps = SessionDeps {
            backend: Arc::clone(&backend) as Arc<dyn MessagingBackend>,
            connector: Arc::clone(&connector) as Arc<dyn PushConnector>,
            lead_store: self
                .with_lead_store
                .then(|| Arc::clone(&lead_store) as Arc<dyn LeadStore>),
        };
        let settings = SessionSettings::from_config(&self.config);
        let session = zapline_sync::spawn_session(self.agent_id.clone(), settings, deps);

        SessionHarness {
            agent_id: self.agent_id,
            client: session.client().clone(),
            backend,
            connector,
            lead_store,
            session: Some(session),
        }
    }
}

/// A running session with mock adapters.
pub struct SessionHarness {
    pub agent_id: AgentId,
    pub backend: Arc<MockBackend>,
    pub connector: Arc<MockConnector>,
    pub lead_store: Arc<MockLeadStore>,
    client: SessionClient,
    session: Option<AgentSession>,
}

impl SessionHarness {
    /// Create a new builder for configuring the harness.
    pub fn builder() -> SessionHarnessBuilder {
        SessionHarnessBuilder::new()
    }

    pub fn client(&self) -> SessionClient {
        self.client.clone()
    }

    pub fn view(&self) -> SessionView {
        self.client.view()
    }

    /// Waits for the push channel, consumes the join signal and waits for
    /// the session to report the channel as connected.
    pub async fn connected(&self, index: usize) -> Result<Arc<MockLink>, ZaplineError> {
        let link = self.connector.link(index).await;
        match link.next_signal_within(WAIT).await {
            Some(AgentSignal::Join { agent_id }) if agent_id == self.agent_id => {}
            other => {
                return Err(ZaplineError::Internal(format!(
                    "expected join as first signal, got {other:?}"
                )));
            }
        }
        self.wait_for(|v| v.channel == ChannelStatus::Connected).await?;
        Ok(link)
    }

    /// Drives the session from offline to online over `link`.
    pub async fn pair(&self, link: &MockLink) -> Result<(), ZaplineError> {
        self.client().initiate_pairing().await?;
        link.emit(PushEvent::PairingArtifact {
            artifact: "qr-payload".into(),
        });
        self.wait_for(|v| v.status == ConnectionStatus::Connecting).await?;
        link.emit(PushEvent::ConnectSuccess {
            line_identifier: "+5511999990000".into(),
        });
        self.wait_for(|v| v.status == ConnectionStatus::Online).await?;
        Ok(())
    }

    /// Waits until the published view satisfies `predicate`.
    pub async fn wait_for<F>(&self, predicate: F) -> Result<SessionView, ZaplineError>
    where
        F: FnMut(&SessionView) -> bool,
    {
        tokio::time::timeout(WAIT, self.client.wait_for(predicate))
            .await
            .map_err(|_| {
                tracing::error!(agent_id = %self.agent_id, view = ?self.view(), "session view never matched in test harness");
                ZaplineError::Timeout { duration: WAIT }
            })?
    }

    /// Polls the ledger of `conversation` until `predicate` holds.
    pub async fn wait_for_messages<F>(
        &self,
        conversation: &str,
        mut predicate: F,
    ) -> Result<Vec<ChatMessage>, ZaplineError>
    where
        F: FnMut(&[ChatMessage]) -> bool,
    {
        let id = ConversationId::from(conversation);
        let client = &self.client;
        let poll = async {
            loop {
                let messages = client.messages(id.clone()).await?;
                if predicate(&messages) {
                    return Ok::<_, ZaplineError>(messages);
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        };
        tokio::time::timeout(WAIT, poll)
            .await
            .map_err(|_| {
                tracing::error!(conversation_id = %id, "ledger never matched in test harness");
                ZaplineError::Timeout { duration: WAIT }
            })?
    }

    pub async fn logout(&mut self) {
        if let Some(session) = self.session.take() {
            session.logout(WAIT).await;
        }
    }

    pub async fn shutdown(&mut self) {
        if let Some(session) = self.session.take() {
            session.shutdown(WAIT).await;
        }
    }
}
