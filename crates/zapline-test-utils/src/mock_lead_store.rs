// SPDX-FileCopyrightText: 2026 Zapline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock lead store that records change notifications.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use zapline_core::ZaplineError;
use zapline_core::traits::{LeadStore, PluginAdapter};
use zapline_core::types::{AdapterType, AgentId, ConversationId, HealthStatus};

pub struct MockLeadStore {
    changes: Arc<Mutex<Vec<(AgentId, ConversationId)>>>,
}

impl MockLeadStore {
    pub fn new() -> Self {
        Self {
            changes: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Every notification received, in order.
    pub async fn changes(&self) -> Vec<(AgentId, ConversationId)> {
        self.changes.lock().await.clone()
    }

    pub async fn change_count(&self, conversation_id: &ConversationId) -> usize {
        self.changes
            .lock()
            .await
            .iter()
            .filter(|(_, id)| id == conversation_id)
            .count()
    }
}

impl Default for MockLeadStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PluginAdapter for MockLeadStore {
    fn name(&self) -> &str {
        "mock-lead-store"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::LeadStore
    }

    async fn health_check(&self) -> Result<HealthStatus, ZaplineError> {
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), ZaplineError> {
        Ok(())
    }
}

#[async_trait]
impl LeadStore for MockLeadStore {
    async fn conversation_changed(
        &self,
        agent: &AgentId,
        conversation: &ConversationId,
    ) -> Result<(), ZaplineError> {
        self.changes
            .lock()
            .await
            .push((agent.clone(), conversation.clone()));
        Ok(())
    }
}
