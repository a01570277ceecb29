// SPDX-FileCopyrightText: 2026 Zapline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the Zapline sync engine.

use thiserror::Error;

/// The primary error type used across all Zapline adapter traits and core operations.
#[derive(Debug, Error)]
pub enum ZaplineError {
    /// Configuration errors (invalid TOML, missing required fields, bad URLs).
    #[error("configuration error: {0}")]
    Config(String),

    /// Push-channel transport errors (socket drop, handshake failure, send failure).
    #[error("transport error: {message}")]
    Transport {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Messaging backend errors (REST failure, unexpected status, bad body).
    #[error("backend error: {message}")]
    Backend {
        message: String,
        /// HTTP status returned by the backend, when one was received.
        status: Option<u16>,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Pairing could not be started or did not complete.
    #[error("pairing failed: {0}")]
    Pairing(String),

    /// A push frame or REST record is missing required fields or is not valid JSON.
    #[error("malformed event: {reason}")]
    MalformedEvent { reason: String },

    /// The agent session has been closed (logout or shutdown).
    #[error("session closed for agent {agent_id}")]
    SessionClosed { agent_id: String },

    /// Operation timed out.
    #[error("operation timed out after {duration:?}")]
    Timeout { duration: std::time::Duration },

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ZaplineError {
    /// Shorthand for a transport error without an underlying source.
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            source: None,
        }
    }

    /// Shorthand for a malformed-event error.
    pub fn malformed(reason: impl Into<String>) -> Self {
        Self::MalformedEvent {
            reason: reason.into(),
        }
    }

    /// Whether retrying the same operation later may succeed.
    ///
    /// Transport drops, timeouts, throttling and 5xx backend replies are
    /// transient; configuration, pairing and malformed-payload errors are not.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport { .. } | Self::Timeout { .. } => true,
            Self::Backend { status, .. } => match status {
                None => true,
                Some(code) => *code == 429 || *code >= 500,
            },
            _ => false,
        }
    }
}
