// SPDX-FileCopyrightText: 2026 Zapline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use async_trait::async_trait;

use crate::error::ZaplineError;
use crate::traits::adapter::PluginAdapter;
use crate::types::{AgentId, ConversationId};

/// CRM lead list that re-sorts and re-previews conversations when they change.
#[async_trait]
pub trait LeadStore: PluginAdapter {
    /// Notifies the store that a conversation received a new message or a
    /// status change. Implementations must tolerate duplicate notifications.
    async fn conversation_changed(
        &self,
        agent: &AgentId,
        conversation: &ConversationId,
    ) -> Result<(), ZaplineError>;
}
