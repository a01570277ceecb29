// SPDX-FileCopyrightText: 2026 Zapline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! WhatsApp bridge adapters for Zapline.
//!
//! The bridge (an unofficial multi-device bridge or a Cloud API proxy)
//! exposes a REST API for pairing, snapshots and sends, and a WebSocket
//! event bus for real-time events. [`BridgeBackend`] implements
//! `MessagingBackend` over the former and [`WsConnector`] implements
//! `PushConnector` over the latter.

pub mod backend;
pub mod socket;
pub mod wire;

pub use backend::BridgeBackend;
pub use socket::WsConnector;
pub use wire::{decode_frame, encode_signal};
