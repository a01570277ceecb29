// SPDX-FileCopyrightText: 2026 Zapline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Pairing flow controller.
//!
//! Drives the connect/disconnect lifecycle of an agent's line over a
//! [`SessionStore`]:
//!
//! ```text
//! offline --initiate--> pairing_requested --artifact--> awaiting_scan
//! awaiting_scan --artifact--> awaiting_scan (refreshed QR)
//! pairing_requested | awaiting_scan --connect success--> online
//! pairing_requested | awaiting_scan | online --disconnect--> offline
//! pairing_requested | awaiting_scan --timeout | request failure--> pairing_failed
//! ```
//!
//! Every attempt carries a number. Timer expiries and backend replies name
//! the attempt they belong to and are discarded once that attempt is over.

use tracing::{debug, info, warn};
use zapline_core::types::PairingTicket;

use crate::session::{SessionPhase, SessionStore};

/// Result of feeding one event to the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PairingOutcome {
    /// The event matched no outgoing edge of the current phase.
    Ignored,
    /// The session moved (or its artifact was refreshed).
    Moved,
    /// A new attempt opened; the backend must be asked for an artifact and
    /// the attempt's timeout armed.
    Started { attempt: u64 },
}

/// Single-flight pairing state machine.
#[derive(Debug, Default)]
pub struct PairingController {
    live_attempt: Option<u64>,
    attempts: u64,
}

impl PairingController {
    pub fn new() -> Self {
        Self::default()
    }

    /// The attempt currently in progress, if any.
    pub fn live_attempt(&self) -> Option<u64> {
        self.live_attempt
    }

    fn open_attempt(&mut self) -> u64 {
        self.attempts += 1;
        self.live_attempt = Some(self.attempts);
        self.attempts
    }

    /// Agent asked to connect. Only valid while offline; repeated requests
    /// during an attempt collapse into the first.
    pub fn initiate(&mut self, store: &mut SessionStore) -> PairingOutcome {
        match store.phase() {
            SessionPhase::Offline | SessionPhase::PairingFailed => {
                let attempt = self.open_attempt();
                store.move_to(SessionPhase::PairingRequested);
                info!(agent_id = %store.agent_id(), attempt, "pairing requested");
                PairingOutcome::Started { attempt }
            }
            phase => {
                debug!(agent_id = %store.agent_id(), %phase, "pairing already in flight or online");
                PairingOutcome::Ignored
            }
        }
    }

    /// A pairing artifact arrived over the push channel.
    ///
    /// Only an open attempt can show one; an artifact left over from a
    /// timed-out or disconnected attempt is ignored.
    pub fn on_artifact(&mut self, store: &mut SessionStore, artifact: String) -> PairingOutcome {
        if !store.phase().is_pairing() {
            return ignored(store, "pairing_artifact");
        }
        store.show_artifact(artifact);
        debug!(agent_id = %store.agent_id(), attempt = ?self.live_attempt, "pairing artifact shown");
        PairingOutcome::Moved
    }

    /// The phone completed pairing.
    pub fn on_connected(&mut self, store: &mut SessionStore, line_identifier: String) -> PairingOutcome {
        if !store.phase().is_pairing() {
            return ignored(store, "connect_success");
        }
        self.live_attempt = None;
        info!(agent_id = %store.agent_id(), line = %line_identifier, "whatsapp line online");
        store.go_online(line_identifier);
        PairingOutcome::Moved
    }

    /// Explicit or provider-initiated disconnect.
    pub fn on_disconnect(&mut self, store: &mut SessionStore, reason: Option<&str>) -> PairingOutcome {
        match store.phase() {
            SessionPhase::PairingRequested | SessionPhase::AwaitingScan | SessionPhase::Online => {
                self.live_attempt = None;
                info!(agent_id = %store.agent_id(), reason = reason.unwrap_or("unspecified"), "whatsapp line offline");
                store.move_to(SessionPhase::Offline);
                PairingOutcome::Moved
            }
            _ => ignored(store, "disconnect"),
        }
    }

    /// The timeout armed for `attempt` fired.
    pub fn on_timeout(&mut self, store: &mut SessionStore, attempt: u64) -> PairingOutcome {
        if !self.is_current(store, attempt) {
            debug!(agent_id = %store.agent_id(), attempt, "stale pairing timeout discarded");
            return PairingOutcome::Ignored;
        }
        self.live_attempt = None;
        warn!(agent_id = %store.agent_id(), attempt, "pairing timed out");
        store.fail("pairing timed out before the code was scanned".to_string());
        PairingOutcome::Moved
    }

    /// The backend answered the pairing request of `attempt`.
    pub fn on_request_result(
        &mut self,
        store: &mut SessionStore,
        attempt: u64,
        result: Result<PairingTicket, String>,
    ) -> PairingOutcome {
        if !self.is_current(store, attempt) {
            debug!(agent_id = %store.agent_id(), attempt, "abandoned pairing reply discarded");
            return PairingOutcome::Ignored;
        }
        match result {
            Ok(PairingTicket {
                artifact: Some(artifact),
            }) => {
                store.show_artifact(artifact);
                PairingOutcome::Moved
            }
            // Artifact will follow over the push channel.
            Ok(PairingTicket { artifact: None }) => PairingOutcome::Ignored,
            Err(reason) => {
                self.live_attempt = None;
                warn!(agent_id = %store.agent_id(), attempt, %reason, "pairing request failed");
                store.fail(reason);
                PairingOutcome::Moved
            }
        }
    }

    /// Logout: drop any attempt and return to offline.
    pub fn reset(&mut self, store: &mut SessionStore) {
        self.live_attempt = None;
        store.move_to(SessionPhase::Offline);
    }

    fn is_current(&self, store: &SessionStore, attempt: u64) -> bool {
        self.live_attempt == Some(attempt) && store.phase().is_pairing()
    }
}

fn ignored(store: &SessionStore, event: &'static str) -> PairingOutcome {
    debug!(agent_id = %store.agent_id(), phase = %store.phase(), event, "event has no edge from current phase");
    crate::metrics::record_stale(event);
    PairingOutcome::Ignored
}
