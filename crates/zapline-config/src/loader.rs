// SPDX-FileCopyrightText: 2026 Zapline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Layered configuration loading.
//!
//! Merge order (later overrides earlier): compiled defaults,
//! `/etc/zapline/zapline.toml`, `~/.config/zapline/zapline.toml`,
//! `./zapline.toml`, then `ZAPLINE_*` environment variables.

#![allow(clippy::result_large_err)] // figment::Error is external

use std::path::{Path, PathBuf};

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};

use crate::model::ZaplineConfig;

pub(crate) const SYSTEM_CONFIG: &str = "/etc/zapline/zapline.toml";
pub(crate) const LOCAL_CONFIG: &str = "zapline.toml";

/// Sections addressable from the environment. `ZAPLINE_BACKEND_API_TOKEN`
/// becomes `backend.api_token`.
const ENV_SECTIONS: &[&str] = &[
    "agent",
    "sync",
    "backend",
    "push",
    "pairing",
    "heartbeat",
    "reconcile",
];

pub(crate) fn user_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("zapline/zapline.toml"))
}

/// Load configuration from the standard hierarchy with env var overrides.
pub fn load_config() -> Result<ZaplineConfig, figment::Error> {
    build_figment().extract()
}

/// Load configuration from a TOML string only (no files, no env).
pub fn load_config_from_str(toml_content: &str) -> Result<ZaplineConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(ZaplineConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Load configuration from a specific file path with env var overrides.
pub fn load_config_from_path(path: &Path) -> Result<ZaplineConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(ZaplineConfig::default()))
        .merge(Toml::file(path))
        .merge(env_provider())
        .extract()
}

/// The Figment used for the standard hierarchy, before extraction.
pub fn build_figment() -> Figment {
    Figment::new()
        .merge(Serialized::defaults(ZaplineConfig::default()))
        .merge(Toml::file(SYSTEM_CONFIG))
        .merge(Toml::file(user_config_path().unwrap_or_default()))
        .merge(Toml::file(LOCAL_CONFIG))
        .merge(env_provider())
}

/// Maps `ZAPLINE_<SECTION>_<KEY>` to `<section>.<key>`.
///
/// Only the first underscore after a known section name becomes a dot, so
/// keys containing underscores (`api_token`, `interval_secs`) survive intact.
pub(crate) fn env_provider() -> Env {
    Env::prefixed("ZAPLINE_").map(|key| map_env_key(key.as_str()).into())
}

fn map_env_key(key: &str) -> String {
    for section in ENV_SECTIONS {
        if let Some(rest) = key.strip_prefix(section).and_then(|r| r.strip_prefix('_')) {
            return format!("{section}.{rest}");
        }
    }
    key.to_string()
}
