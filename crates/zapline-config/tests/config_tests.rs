// SPDX-FileCopyrightText: 2026 Zapline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Integration tests for the Zapline configuration system.

use std::io::Write;

use zapline_config::diagnostic::ConfigError;
use zapline_config::{
    load_and_validate_path, load_and_validate_str, load_config_from_str, ZaplineConfig,
};

#[test]
fn full_toml_deserializes() {
    let toml = r#"
[agent]
log_level = "debug"

[sync]
agents = ["ana", "bruno"]
mailbox_capacity = 64

[backend]
base_url = "https://bridge.example.com"
api_token = "secret"
request_timeout_secs = 10
max_retries = 2

[push]
url = "wss://bridge.example.com/events"
initial_backoff_ms = 250
max_backoff_ms = 8000

[pairing]
timeout_secs = 90

[heartbeat]
enabled = false
interval_secs = 15

[reconcile]
match_window_secs = 20
pending_buffer_cap = 32
"#;

    let config = load_and_validate_str(toml).expect("valid config");
    assert_eq!(config.agent.log_level, "debug");
    assert_eq!(config.sync.agents, vec!["ana", "bruno"]);
    assert_eq!(config.sync.mailbox_capacity, 64);
    assert_eq!(config.backend.api_token.as_deref(), Some("secret"));
    assert_eq!(config.backend.max_retries, 2);
    assert_eq!(config.push.max_backoff_ms, 8000);
    assert_eq!(config.pairing.timeout_secs, 90);
    assert!(!config.heartbeat.enabled);
    assert_eq!(config.reconcile.pending_buffer_cap, 32);
    // Untouched keys keep their defaults.
    assert_eq!(config.reconcile.pending_ttl_secs, 120);
    assert_eq!(config.push.outbound_buffer, 32);
}

#[test]
fn empty_toml_yields_defaults() {
    let config = load_config_from_str("").expect("empty config is valid");
    let defaults = ZaplineConfig::default();
    assert_eq!(config.backend.base_url, defaults.backend.base_url);
    assert_eq!(config.heartbeat.interval_secs, defaults.heartbeat.interval_secs);
}

#[test]
fn unknown_section_is_reported_with_suggestion() {
    let errors = load_and_validate_str("[heartbaet]\ninterval_secs = 5\n").unwrap_err();
    assert_eq!(errors.len(), 1);
    match &errors[0] {
        ConfigError::UnknownKey {
            key, suggestion, ..
        } => {
            assert_eq!(key, "heartbaet");
            assert_eq!(suggestion.as_deref(), Some("heartbeat"));
        }
        other => panic!("expected UnknownKey, got {other:?}"),
    }
}

#[test]
fn wrong_type_is_reported() {
    let errors = load_and_validate_str("[pairing]\ntimeout_secs = \"soon\"\n").unwrap_err();
    match &errors[0] {
        ConfigError::InvalidType { key, .. } => assert_eq!(key, "pairing.timeout_secs"),
        other => panic!("expected InvalidType, got {other:?}"),
    }
}

#[test]
fn semantic_errors_surface_after_parsing() {
    let errors = load_and_validate_str(
        r#"
[push]
url = "http://not-a-socket"
initial_backoff_ms = 5000
max_backoff_ms = 100
"#,
    )
    .unwrap_err();
    assert_eq!(errors.len(), 2);
    assert!(errors
        .iter()
        .all(|e| matches!(e, ConfigError::Validation { .. })));
}

#[test]
fn explicit_path_is_loaded() {
    let mut file = tempfile::NamedTempFile::new().expect("temp file");
    writeln!(file, "[sync]\nagents = [\"carla\"]").expect("write config");

    let config = load_and_validate_path(file.path()).expect("valid config");
    assert_eq!(config.sync.agents, vec!["carla"]);
}

#[test]
fn diagnostics_render_without_panicking() {
    let errors = load_and_validate_str("[backend]\nbase_ur = \"x\"\n").unwrap_err();
    zapline_config::render_errors(&errors);
}

#[test]
fn out_of_range_match_window_is_rejected() {
    let errors = load_and_validate_str(
        r#"
[reconcile]
match_window_secs = 10000000000000000
"#,
    )
    .unwrap_err();
    assert_eq!(errors.len(), 1);
    assert!(errors[0].to_string().contains("match_window_secs"));
}
