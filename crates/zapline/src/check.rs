// SPDX-FileCopyrightText: 2026 Zapline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `zapline check` command implementation.
//!
//! Probes the bridge REST API and event socket with the loaded
//! configuration and prints one line per check.

use std::io::IsTerminal;
use std::time::{Duration, Instant};

use zapline_config::ZaplineConfig;
use zapline_core::traits::{PluginAdapter, PushConnector};
use zapline_core::types::HealthStatus;
use zapline_core::ZaplineError;
use zapline_whatsapp::{BridgeBackend, WsConnector};

/// Status of a single check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckStatus {
    Pass,
    Warn,
    Fail,
}

/// Result of a single check.
#[derive(Debug, Clone)]
pub struct CheckResult {
    pub name: &'static str,
    pub status: CheckStatus,
    pub message: String,
    pub duration: Duration,
}

/// Run the `zapline check` command.
pub async fn run_check(config: &ZaplineConfig, plain: bool) -> Result<(), ZaplineError> {
    let use_color = !plain && std::io::stdout().is_terminal();

    let results = vec![
        check_config(config),
        check_backend(config).await,
        check_push(config).await,
    ];

    println!();
    println!("  zapline check");
    println!("  {}", "-".repeat(50));
    for result in &results {
        println!("{}", format_result(result, use_color));
    }
    println!();

    let failed = results
        .iter()
        .filter(|r| r.status == CheckStatus::Fail)
        .count();
    if failed > 0 {
        return Err(ZaplineError::Internal(format!("{failed} check(s) failed")));
    }
    Ok(())
}

fn format_result(result: &CheckResult, use_color: bool) -> String {
    let duration_ms = result.duration.as_millis();
    if use_color {
        use colored::Colorize;
        let (symbol, message) = match result.status {
            CheckStatus::Pass => ("✓".green(), result.message.normal()),
            CheckStatus::Warn => ("!".yellow(), result.message.yellow()),
            CheckStatus::Fail => ("✗".red(), result.message.red()),
        };
        format!("    {symbol} {:<12} {message} ({duration_ms}ms)", result.name)
    } else {
        let tag = match result.status {
            CheckStatus::Pass => "[OK]  ",
            CheckStatus::Warn => "[WARN]",
            CheckStatus::Fail => "[FAIL]",
        };
        format!("    {tag} {:<12} {} ({duration_ms}ms)", result.name, result.message)
    }
}

fn check_config(config: &ZaplineConfig) -> CheckResult {
    let (status, message) = if config.sync.agents.is_empty() {
        (CheckStatus::Warn, "valid, but no agents configured".to_string())
    } else {
        (
            CheckStatus::Pass,
            format!("valid, {} agent(s)", config.sync.agents.len()),
        )
    };
    CheckResult {
        name: "config",
        status,
        message,
        duration: Duration::ZERO,
    }
}

async fn check_backend(config: &ZaplineConfig) -> CheckResult {
    let start = Instant::now();
    let (status, message) = match BridgeBackend::new(&config.backend) {
        Err(e) => (CheckStatus::Fail, e.to_string()),
        Ok(backend) => match backend.health_check().await {
            Ok(HealthStatus::Healthy) => (CheckStatus::Pass, config.backend.base_url.clone()),
            Ok(HealthStatus::Degraded(reason)) => (CheckStatus::Warn, reason),
            Ok(HealthStatus::Unhealthy(reason)) => (CheckStatus::Fail, reason),
            Err(e) => (CheckStatus::Fail, e.to_string()),
        },
    };
    CheckResult {
        name: "backend",
        status,
        message,
        duration: start.elapsed(),
    }
}

async fn check_push(config: &ZaplineConfig) -> CheckResult {
    let start = Instant::now();
    let connector = WsConnector::from_config(config);
    let (status, message) = match connector.connect().await {
        Ok(_connection) => (CheckStatus::Pass, config.push.url.clone()),
        Err(e) => (CheckStatus::Fail, e.to_string()),
    };
    CheckResult {
        name: "push",
        status,
        message,
        duration: start.elapsed(),
    }
}
