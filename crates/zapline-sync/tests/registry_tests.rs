// SPDX-FileCopyrightText: 2026 Zapline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use std::sync::Arc;
use std::time::Duration;

use zapline_config::ZaplineConfig;
use zapline_core::events::AgentSignal;
use zapline_core::types::{AgentId, ConversationId};
use zapline_core::{LeadStore, MessagingBackend, PushConnector, ZaplineError};
use zapline_sync::{SessionDeps, SessionRegistry, SessionSettings, drain_sessions};
use zapline_test_utils::{MockBackend, MockConnector, MockLeadStore};

fn registry() -> (SessionRegistry, Arc<MockConnector>) {
    let mut config = ZaplineConfig::default();
    config.push.initial_backoff_ms = 10;
    config.push.max_backoff_ms = 50;
    let connector = Arc::new(MockConnector::new());
    let deps = SessionDeps {
        backend: Arc::new(MockBackend::new()) as Arc<dyn MessagingBackend>,
        connector: Arc::clone(&connector) as Arc<dyn PushConnector>,
        lead_store: Some(Arc::new(MockLeadStore::new()) as Arc<dyn LeadStore>),
    };
    (
        SessionRegistry::new(SessionSettings::from_config(&config), deps),
        connector,
    )
}

#[tokio::test]
async fn login_is_idempotent_per_agent() {
    let (registry, connector) = registry();

    let first = registry.login(AgentId::from("a"));
    let second = registry.login(AgentId::from("a"));
    let link = connector.link(0).await;

    assert_eq!(registry.len(), 1);
    assert_eq!(first.agent_id(), second.agent_id());
    assert_eq!(
        link.next_signal().await,
        Some(AgentSignal::Join {
            agent_id: AgentId::from("a")
        })
    );
    registry.shutdown_all(Duration::from_secs(1)).await;
}

#[tokio::test]
async fn sessions_are_independent() {
    let (registry, connector) = registry();
    let a = registry.login(AgentId::from("a"));
    let b = registry.login(AgentId::from("b"));
    connector.link(1).await;

    registry
        .logout(&AgentId::from("a"), Duration::from_secs(1))
        .await
        .unwrap();

    assert_eq!(registry.agents(), vec![AgentId::from("b")]);
    assert!(matches!(
        a.messages(ConversationId::from("c")).await,
        Err(ZaplineError::SessionClosed { .. })
    ));
    assert!(b.messages(ConversationId::from("c")).await.unwrap().is_empty());
    registry.shutdown_all(Duration::from_secs(1)).await;
}

#[tokio::test]
async fn logout_of_unknown_agent_fails() {
    let (registry, _) = registry();
    let err = registry
        .logout(&AgentId::from("ghost"), Duration::from_secs(1))
        .await
        .unwrap_err();
    assert!(matches!(err, ZaplineError::SessionClosed { .. }));
}

#[tokio::test]
async fn drain_stops_every_session() {
    let (registry, connector) = registry();
    let a = registry.login(AgentId::from("a"));
    registry.login(AgentId::from("b"));
    connector.link(1).await;

    drain_sessions(&registry, Duration::from_secs(1)).await;

    assert!(registry.is_empty());
    assert!(a.messages(ConversationId::from("c")).await.is_err());
}
