// SPDX-FileCopyrightText: 2026 Zapline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation for configuration values.
//!
//! Checks semantic constraints serde cannot express: URL schemes, positive
//! intervals, bounded windows, backoff ordering and non-empty agent ids.

use std::collections::HashSet;

use crate::diagnostic::ConfigError;
use crate::model::{MAX_MATCH_WINDOW_SECS, ZaplineConfig};

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Validate a deserialized configuration.
///
/// Collects every problem instead of failing on the first one.
pub fn validate_config(config: &ZaplineConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();

    if !LOG_LEVELS.contains(&config.agent.log_level.as_str()) {
        errors.push(invalid(format!(
            "agent.log_level `{}` must be one of {}",
            config.agent.log_level,
            LOG_LEVELS.join(", ")
        )));
    }

    check_url(&mut errors, "backend.base_url", &config.backend.base_url, &["http", "https"]);
    check_url(&mut errors, "push.url", &config.push.url, &["ws", "wss"]);

    if let Some(token) = &config.backend.api_token
        && token.trim().is_empty()
    {
        errors.push(invalid("backend.api_token must not be empty when set"));
    }

    check_positive(&mut errors, "backend.request_timeout_secs", config.backend.request_timeout_secs);
    check_positive(
        &mut errors,
        "backend.snapshot_fetch_attempts",
        u64::from(config.backend.snapshot_fetch_attempts),
    );
    check_positive(&mut errors, "push.initial_backoff_ms", config.push.initial_backoff_ms);
    check_positive(&mut errors, "pairing.timeout_secs", config.pairing.timeout_secs);
    check_positive(&mut errors, "heartbeat.interval_secs", config.heartbeat.interval_secs);
    check_positive(&mut errors, "reconcile.pending_buffer_cap", config.reconcile.pending_buffer_cap as u64);
    check_positive(&mut errors, "reconcile.pending_ttl_secs", config.reconcile.pending_ttl_secs);
    check_positive(&mut errors, "sync.mailbox_capacity", config.sync.mailbox_capacity as u64);
    check_positive(&mut errors, "push.outbound_buffer", config.push.outbound_buffer as u64);

    if config.reconcile.match_window_secs > MAX_MATCH_WINDOW_SECS {
        errors.push(invalid(format!(
            "reconcile.match_window_secs ({}) must not exceed {MAX_MATCH_WINDOW_SECS}",
            config.reconcile.match_window_secs
        )));
    }

    if config.push.initial_backoff_ms > config.push.max_backoff_ms {
        errors.push(invalid(format!(
            "push.initial_backoff_ms ({}) must not exceed push.max_backoff_ms ({})",
            config.push.initial_backoff_ms, config.push.max_backoff_ms
        )));
    }

    let mut seen = HashSet::new();
    for (i, agent) in config.sync.agents.iter().enumerate() {
        if agent.trim().is_empty() {
            errors.push(invalid(format!("sync.agents[{i}] must not be empty")));
        } else if !seen.insert(agent.as_str()) {
            errors.push(invalid(format!("duplicate agent id `{agent}` in sync.agents")));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn invalid(message: impl Into<String>) -> ConfigError {
    ConfigError::Validation {
        message: message.into(),
    }
}

fn check_positive(errors: &mut Vec<ConfigError>, key: &str, value: u64) {
    if value == 0 {
        errors.push(invalid(format!("{key} must be greater than zero")));
    }
}

fn check_url(errors: &mut Vec<ConfigError>, key: &str, value: &str, schemes: &[&str]) {
    let value = value.trim();
    if value.is_empty() {
        errors.push(invalid(format!("{key} must not be empty")));
        return;
    }
    let valid = value
        .split_once("://")
        .is_some_and(|(scheme, rest)| schemes.contains(&scheme) && !rest.is_empty());
    if !valid {
        errors.push(invalid(format!(
            "{key} `{value}` must be a {} URL",
            schemes.join("/")
        )));
    }
}
