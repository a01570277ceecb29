// SPDX-FileCopyrightText: 2026 Zapline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Metric registration and recording helpers.
//!
//! Uses the metrics-rs facade so whichever recorder the host installs
//! collects these. Without a recorder every call is a no-op.

use metrics::{describe_counter, describe_gauge};

/// Register metric descriptions. Call once after installing a recorder.
pub fn register_metrics() {
    describe_counter!(
        "zapline_push_events_total",
        "Push events applied by agent sessions, by kind"
    );
    describe_counter!(
        "zapline_stale_events_total",
        "Out-of-order or duplicate events ignored by the reconciliation engine"
    );
    describe_counter!(
        "zapline_pending_dropped_total",
        "Buffered events discarded by overflow or expiry"
    );
    describe_counter!(
        "zapline_malformed_events_total",
        "Push frames skipped because they could not be decoded"
    );
    describe_counter!(
        "zapline_reconnects_total",
        "Push channel reconnections after a drop"
    );
    describe_counter!(
        "zapline_snapshot_fetches_total",
        "Conversation snapshot fetches, by outcome"
    );
    describe_gauge!("zapline_active_sessions", "Agent sessions currently running");
    describe_gauge!(
        "zapline_open_conversations",
        "Conversations tracked for gap recovery"
    );
}

pub fn record_event(kind: &'static str) {
    metrics::counter!("zapline_push_events_total", "kind" => kind).increment(1);
}

pub fn record_stale(kind: &'static str) {
    metrics::counter!("zapline_stale_events_total", "kind" => kind).increment(1);
}

/// `reason` is `overflow` or `expired`.
pub fn record_pending_dropped(reason: &'static str, count: usize) {
    metrics::counter!("zapline_pending_dropped_total", "reason" => reason).increment(count as u64);
}

pub fn record_malformed() {
    metrics::counter!("zapline_malformed_events_total").increment(1);
}

pub fn record_reconnect() {
    metrics::counter!("zapline_reconnects_total").increment(1);
}

pub fn record_snapshot_fetch(outcome: &'static str) {
    metrics::counter!("zapline_snapshot_fetches_total", "outcome" => outcome).increment(1);
}

pub fn set_active_sessions(count: usize) {
    metrics::gauge!("zapline_active_sessions").set(count as f64);
}

pub fn set_open_conversations(agent: &str, count: usize) {
    metrics::gauge!("zapline_open_conversations", "agent" => agent.to_string()).set(count as f64);
}
