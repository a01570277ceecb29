// SPDX-FileCopyrightText: 2026 Zapline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Base adapter trait shared by every external collaborator.

use async_trait::async_trait;

use crate::error::ZaplineError;
use crate::types::{AdapterType, HealthStatus};

/// Identity, health and lifecycle for an adapter plugged into a session.
#[async_trait]
pub trait PluginAdapter: Send + Sync + 'static {
    /// Human-readable name of this adapter instance.
    fn name(&self) -> &str;

    fn version(&self) -> semver::Version;

    /// Kind of adapter (backend, transport, lead store).
    fn adapter_type(&self) -> AdapterType;

    /// Probes the adapter and reports its current status.
    async fn health_check(&self) -> Result<HealthStatus, ZaplineError>;

    /// Releases held resources. Called once during graceful shutdown.
    async fn shutdown(&self) -> Result<(), ZaplineError>;
}
