// SPDX-FileCopyrightText: 2026 Zapline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Bounded holding area for events that cannot be applied yet.
//!
//! Two cases land here: events for a conversation whose snapshot has not
//! loaded, and status updates for a message id the ledger has not seen.
//! Entries are replayed in arrival order once their target appears. The
//! buffer is capped; when full the incoming event is dropped with a
//! warning. Entries older than the TTL are discarded on the next access.

use std::collections::VecDeque;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, warn};
use zapline_core::types::{ChatMessage, ConversationId, DeliveryStatus, MessageId};

use crate::metrics;

/// An event waiting for its conversation or message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Deferred {
    Message(ChatMessage),
    Status {
        message_id: MessageId,
        status: DeliveryStatus,
    },
}

impl Deferred {
    fn kind(&self) -> &'static str {
        match self {
            Deferred::Message(_) => "message",
            Deferred::Status { .. } => "status_update",
        }
    }
}

#[derive(Debug, Clone)]
pub struct PendingEntry {
    pub conversation_id: ConversationId,
    pub event: Deferred,
    enqueued_at: Instant,
}

#[derive(Debug)]
pub struct PendingBuffer {
    entries: VecDeque<PendingEntry>,
    capacity: usize,
    ttl: Duration,
}

impl PendingBuffer {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            entries: VecDeque::new(),
            capacity,
            ttl,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Buffers an event. Returns `false` if it was dropped because the
    /// buffer is full.
    pub fn push(&mut self, conversation_id: ConversationId, event: Deferred) -> bool {
        self.purge_expired();
        if self.entries.len() >= self.capacity {
            warn!(
                conversation_id = %conversation_id,
                kind = event.kind(),
                capacity = self.capacity,
                "pending buffer full, dropping event"
            );
            metrics::record_pending_dropped("overflow", 1);
            return false;
        }
        debug!(conversation_id = %conversation_id, kind = event.kind(), "event buffered");
        self.entries.push_back(PendingEntry {
            conversation_id,
            event,
            enqueued_at: Instant::now(),
        });
        true
    }

    /// Puts back an entry taken by [`take_conversation`](Self::take_conversation)
    /// that still cannot be applied. Keeps its original age.
    pub fn restore(&mut self, entry: PendingEntry) {
        self.entries.push_back(entry);
    }

    /// Removes and returns every entry for `conversation_id`, oldest first.
    pub fn take_conversation(&mut self, conversation_id: &ConversationId) -> Vec<PendingEntry> {
        self.purge_expired();
        let (taken, kept): (Vec<_>, Vec<_>) = self
            .entries
            .drain(..)
            .partition(|e| &e.conversation_id == conversation_id);
        self.entries = kept.into();
        taken
    }

    /// Removes and returns the statuses buffered for one message, oldest first.
    pub fn take_statuses(
        &mut self,
        conversation_id: &ConversationId,
        message_id: &MessageId,
    ) -> Vec<DeliveryStatus> {
        self.purge_expired();
        let mut statuses = Vec::new();
        self.entries.retain(|entry| match &entry.event {
            Deferred::Status {
                message_id: id,
                status,
            } if &entry.conversation_id == conversation_id && id == message_id => {
                statuses.push(*status);
                false
            }
            _ => true,
        });
        statuses
    }

    fn purge_expired(&mut self) {
        let now = Instant::now();
        let before = self.entries.len();
        // Restored entries break arrival order, so scan the whole queue.
        self.entries
            .retain(|e| now.saturating_duration_since(e.enqueued_at) < self.ttl);
        let expired = before - self.entries.len();
        if expired > 0 {
            debug!(expired, "expired buffered events discarded");
            metrics::record_pending_dropped("expired", expired);
        }
    }
}
