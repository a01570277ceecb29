// SPDX-FileCopyrightText: 2026 Zapline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test utilities for Zapline integration tests.
//!
//! Provides mock adapters and a session harness for fast, deterministic,
//! CI-runnable tests without a messaging provider.
//!
//! # Components
//!
//! - [`MockBackend`] - Mock REST backend with seeded snapshots and scripted replies
//! - [`MockConnector`] - Mock push connector with event injection and signal capture
//! - [`MockLeadStore`] - Lead store that records change notifications
//! - [`SessionHarness`] - A live agent session wired to the mocks

pub mod fixtures;
pub mod harness;
pub mod mock_backend;
pub mod mock_lead_store;
pub mod mock_push;

pub use harness::{SessionHarness, SessionHarnessBuilder};
pub use mock_backend::{BackendCall, MockBackend};
pub use mock_lead_store::MockLeadStore;
pub use mock_push::{MockConnector, MockLink};
