// SPDX-FileCopyrightText: 2026 Zapline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-agent WhatsApp session state.
//!
//! Holds the connection phase, the current pairing artifact and the line
//! identifier. Pure state: every mutation goes through [`SessionStore::move_to`]
//! or one of its wrappers, which keep the artifact and line fields consistent
//! with the phase.

use zapline_core::types::{AgentId, ConnectionStatus};

/// Internal lifecycle phase of an agent's WhatsApp line.
///
/// Finer-grained than [`ConnectionStatus`]: a requested pairing that has not
/// yet produced an artifact still reads as `offline`, and a failed pairing
/// keeps its failure reason until the next attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionPhase {
    /// No line and no pairing attempt.
    Offline,
    /// Pairing requested from the backend, no artifact received yet.
    PairingRequested,
    /// Artifact shown, waiting for the phone to scan it.
    AwaitingScan,
    /// Line paired and online.
    Online,
    /// Last pairing attempt timed out or was rejected; retryable.
    PairingFailed,
}

impl SessionPhase {
    /// Status exposed to the UI.
    pub fn status(self) -> ConnectionStatus {
        match self {
            SessionPhase::Offline | SessionPhase::PairingRequested | SessionPhase::PairingFailed => {
                ConnectionStatus::Offline
            }
            SessionPhase::AwaitingScan => ConnectionStatus::Connecting,
            SessionPhase::Online => ConnectionStatus::Online,
        }
    }

    /// A pairing attempt is in progress.
    pub fn is_pairing(self) -> bool {
        matches!(self, SessionPhase::PairingRequested | SessionPhase::AwaitingScan)
    }
}

impl std::fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionPhase::Offline => write!(f, "offline"),
            SessionPhase::PairingRequested => write!(f, "pairing_requested"),
            SessionPhase::AwaitingScan => write!(f, "awaiting_scan"),
            SessionPhase::Online => write!(f, "online"),
            SessionPhase::PairingFailed => write!(f, "pairing_failed"),
        }
    }
}

/// Session state for one agent.
#[derive(Debug, Clone)]
pub struct SessionStore {
    agent_id: AgentId,
    phase: SessionPhase,
    pairing_artifact: Option<String>,
    line_identifier: Option<String>,
    last_failure: Option<String>,
}

impl SessionStore {
    /// A fresh session starts offline.
    pub fn new(agent_id: AgentId) -> Self {
        Self {
            agent_id,
            phase: SessionPhase::Offline,
            pairing_artifact: None,
            line_identifier: None,
            last_failure: None,
        }
    }

    pub fn agent_id(&self) -> &AgentId {
        &self.agent_id
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn status(&self) -> ConnectionStatus {
        self.phase.status()
    }

    /// Present only while awaiting a scan.
    pub fn pairing_artifact(&self) -> Option<&str> {
        self.pairing_artifact.as_deref()
    }

    /// Present only while online.
    pub fn line_identifier(&self) -> Option<&str> {
        self.line_identifier.as_deref()
    }

    /// Reason of the last failed pairing attempt, kept until the next one.
    pub fn last_failure(&self) -> Option<&str> {
        self.last_failure.as_deref()
    }

    /// Moves to `phase`, clearing every field that phase does not carry.
    pub(crate) fn move_to(&mut self, phase: SessionPhase) {
        self.phase = phase;
        if phase != SessionPhase::AwaitingScan {
            self.pairing_artifact = None;
        }
        if phase != SessionPhase::Online {
            self.line_identifier = None;
        }
        if phase != SessionPhase::PairingFailed {
            self.last_failure = None;
        }
    }

    pub(crate) fn show_artifact(&mut self, artifact: String) {
        self.move_to(SessionPhase::AwaitingScan);
        self.pairing_artifact = Some(artifact);
    }

    pub(crate) fn go_online(&mut self, line_identifier: String) {
        self.move_to(SessionPhase::Online);
        self.line_identifier = Some(line_identifier);
    }

    pub(crate) fn fail(&mut self, reason: String) {
        self.move_to(SessionPhase::PairingFailed);
        self.last_failure = Some(reason);
    }
}
