// SPDX-FileCopyrightText: 2026 Zapline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs.
//!
//! All structs use `#[serde(deny_unknown_fields)]` so a misspelled key is
//! rejected at startup instead of silently falling back to a default.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Top-level Zapline configuration. Every section is optional.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ZaplineConfig {
    /// Process-level settings.
    #[serde(default)]
    pub agent: AgentConfig,

    /// Which agents to run and per-session queue sizes.
    #[serde(default)]
    pub sync: SyncConfig,

    /// Messaging backend REST settings.
    #[serde(default)]
    pub backend: BackendConfig,

    /// Push-channel (event bus) settings.
    #[serde(default)]
    pub push: PushConfig,

    #[serde(default)]
    pub pairing: PairingConfig,

    #[serde(default)]
    pub heartbeat: HeartbeatConfig,

    /// Ledger reconciliation tuning.
    #[serde(default)]
    pub reconcile: ReconcileConfig,
}

/// Process-level configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct AgentConfig {
    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Session registry configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SyncConfig {
    /// Agent ids to log in when `zapline serve` starts.
    #[serde(default)]
    pub agents: Vec<String>,

    /// Capacity of each agent session's input queue.
    #[serde(default = "default_mailbox_capacity")]
    pub mailbox_capacity: usize,

    /// Seconds to wait for sessions to close during shutdown.
    #[serde(default = "default_drain_timeout_secs")]
    pub drain_timeout_secs: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            agents: Vec::new(),
            mailbox_capacity: default_mailbox_capacity(),
            drain_timeout_secs: default_drain_timeout_secs(),
        }
    }
}

impl SyncConfig {
    pub fn drain_timeout(&self) -> Duration {
        Duration::from_secs(self.drain_timeout_secs)
    }
}

fn default_mailbox_capacity() -> usize {
    256
}

fn default_drain_timeout_secs() -> u64 {
    10
}

/// Messaging backend REST configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct BackendConfig {
    /// Base URL of the WhatsApp bridge / Cloud API proxy.
    #[serde(default = "default_backend_url")]
    pub base_url: String,

    /// Bearer token sent with every request.
    #[serde(default)]
    pub api_token: Option<String>,

    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Bridge client retries. Idempotent requests retry on 429, 5xx and
    /// connect errors; sends only on 429/503. Snapshots are retried by the
    /// session instead, see `snapshot_fetch_attempts`.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Attempts per conversation snapshot fetch before giving up.
    #[serde(default = "default_snapshot_fetch_attempts")]
    pub snapshot_fetch_attempts: u32,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: default_backend_url(),
            api_token: None,
            request_timeout_secs: default_request_timeout_secs(),
            max_retries: default_max_retries(),
            snapshot_fetch_attempts: default_snapshot_fetch_attempts(),
        }
    }
}

impl BackendConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

fn default_backend_url() -> String {
    "http://127.0.0.1:3000".to_string()
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_max_retries() -> u32 {
    1
}

fn default_snapshot_fetch_attempts() -> u32 {
    3
}

/// Push-channel configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct PushConfig {
    /// WebSocket URL of the event bus.
    #[serde(default = "default_push_url")]
    pub url: String,

    /// First reconnect delay.
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    /// Upper bound for the doubling reconnect delay.
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,

    /// Capacity of the outgoing signal queue (join, heartbeat, presence).
    #[serde(default = "default_outbound_buffer")]
    pub outbound_buffer: usize,
}

impl Default for PushConfig {
    fn default() -> Self {
        Self {
            url: default_push_url(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            outbound_buffer: default_outbound_buffer(),
        }
    }
}

impl PushConfig {
    pub fn initial_backoff(&self) -> Duration {
        Duration::from_millis(self.initial_backoff_ms)
    }

    pub fn max_backoff(&self) -> Duration {
        Duration::from_millis(self.max_backoff_ms)
    }
}

fn default_push_url() -> String {
    "ws://127.0.0.1:3000/events".to_string()
}

fn default_initial_backoff_ms() -> u64 {
    500
}

fn default_max_backoff_ms() -> u64 {
    30_000
}

fn default_outbound_buffer() -> usize {
    32
}

/// Pairing flow configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct PairingConfig {
    /// Seconds a pairing attempt may stay in `connecting` before it is
    /// abandoned and the session returns to `offline`.
    #[serde(default = "default_pairing_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for PairingConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_pairing_timeout_secs(),
        }
    }
}

impl PairingConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

fn default_pairing_timeout_secs() -> u64 {
    120
}

/// Heartbeat scheduler configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct HeartbeatConfig {
    #[serde(default = "default_heartbeat_enabled")]
    pub enabled: bool,

    #[serde(default = "default_heartbeat_interval_secs")]
    pub interval_secs: u64,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            enabled: default_heartbeat_enabled(),
            interval_secs: default_heartbeat_interval_secs(),
        }
    }
}

impl HeartbeatConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

fn default_heartbeat_enabled() -> bool {
    true
}

fn default_heartbeat_interval_secs() -> u64 {
    25
}

/// Upper bound for `reconcile.match_window_secs` (one day).
pub const MAX_MATCH_WINDOW_SECS: u64 = 86_400;

/// Reconciliation engine configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ReconcileConfig {
    /// Window within which an optimistic record and a server record with the
    /// same sender and payload are treated as one message.
    #[serde(default = "default_match_window_secs")]
    pub match_window_secs: u64,

    /// Events held for conversations whose snapshot has not loaded yet.
    #[serde(default = "default_pending_buffer_cap")]
    pub pending_buffer_cap: usize,

    /// Buffered events older than this are discarded.
    #[serde(default = "default_pending_ttl_secs")]
    pub pending_ttl_secs: u64,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            match_window_secs: default_match_window_secs(),
            pending_buffer_cap: default_pending_buffer_cap(),
            pending_ttl_secs: default_pending_ttl_secs(),
        }
    }
}

impl ReconcileConfig {
    pub fn match_window(&self) -> Duration {
        Duration::from_secs(self.match_window_secs)
    }

    pub fn pending_ttl(&self) -> Duration {
        Duration::from_secs(self.pending_ttl_secs)
    }
}

fn default_match_window_secs() -> u64 {
    30
}

fn default_pending_buffer_cap() -> usize {
    256
}

fn default_pending_ttl_secs() -> u64 {
    120
}
