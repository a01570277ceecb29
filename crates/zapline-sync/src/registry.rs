// SPDX-FileCopyrightText: 2026 Zapline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Registry of live agent sessions.

use std::time::Duration;

use dashmap::DashMap;
use tracing::{debug, info};
use zapline_core::error::ZaplineError;
use zapline_core::types::AgentId;

use crate::agent::{AgentSession, SessionClient, SessionDeps, SessionSettings, spawn_session};
use crate::metrics;

/// Owns one [`AgentSession`] per logged-in agent.
///
/// Sessions are independent: each has its own push channel, heartbeat and
/// ledger, and logging one agent out leaves the others untouched.
pub struct SessionRegistry {
    settings: SessionSettings,
    deps: SessionDeps,
    sessions: DashMap<AgentId, AgentSession>,
}

impl SessionRegistry {
    pub fn new(settings: SessionSettings, deps: SessionDeps) -> Self {
        Self {
            settings,
            deps,
            sessions: DashMap::new(),
        }
    }

    /// Starts a session for `agent_id`, or returns the running one.
    pub fn login(&self, agent_id: AgentId) -> SessionClient {
        let entry = self.sessions.entry(agent_id.clone()).or_insert_with(|| {
            spawn_session(agent_id.clone(), self.settings.clone(), self.deps.clone())
        });
        let client = entry.client().clone();
        drop(entry);
        metrics::set_active_sessions(self.sessions.len());
        client
    }

    pub fn get(&self, agent_id: &AgentId) -> Option<SessionClient> {
        self.sessions.get(agent_id).map(|s| s.client().clone())
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Agent ids with a live session, sorted.
    pub fn agents(&self) -> Vec<AgentId> {
        let mut agents: Vec<AgentId> = self.sessions.iter().map(|e| e.key().clone()).collect();
        agents.sort();
        agents
    }

    /// Logs `agent_id` out and waits for its session to stop.
    pub async fn logout(&self, agent_id: &AgentId, timeout: Duration) -> Result<(), ZaplineError> {
        let (_, session) = self
            .sessions
            .remove(agent_id)
            .ok_or_else(|| ZaplineError::SessionClosed {
                agent_id: agent_id.to_string(),
            })?;
        metrics::set_active_sessions(self.sessions.len());
        session.logout(timeout).await;
        info!(agent_id = %agent_id, "agent logged out");
        Ok(())
    }

    /// Stops every session, giving each up to `timeout` to wind down.
    pub async fn shutdown_all(&self, timeout: Duration) {
        let agents = self.agents();
        if agents.is_empty() {
            debug!("no sessions to stop");
            return;
        }
        info!(count = agents.len(), "stopping agent sessions");

        let stops = agents
            .iter()
            .filter_map(|id| self.sessions.remove(id))
            .map(|(_, session)| session.shutdown(timeout));
        futures::future::join_all(stops).await;
        metrics::set_active_sessions(self.sessions.len());
    }
}
