// SPDX-FileCopyrightText: 2026 Zapline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Adapter trait definitions for the sync engine's external collaborators.
//!
//! All adapters extend the [`PluginAdapter`] base trait and use
//! `#[async_trait]` for dynamic dispatch compatibility.

pub mod adapter;
pub mod backend;
pub mod lead_store;
pub mod transport;

pub use adapter::PluginAdapter;
pub use backend::MessagingBackend;
pub use lead_store::LeadStore;
pub use transport::{EventStream, PushConnection, PushConnector, SignalSink};
