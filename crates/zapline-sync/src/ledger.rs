// SPDX-FileCopyrightText: 2026 Zapline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Delivery status ledger for one conversation.
//!
//! Holds every message the client knows of, ordered by timestamp, with an
//! id index. Records are never duplicated: an id is present at most once,
//! and the only id change allowed is replacing an optimistic `tmp-` id
//! with the server id of the same message. Statuses only move forward
//! (see [`DeliveryStatus::can_advance_to`]).

use std::collections::HashMap;

use chrono::TimeDelta;
use zapline_core::types::{ChatMessage, ConversationId, DeliveryStatus, MessageId, Sender};

/// Result of applying a status to a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Advance {
    Advanced {
        from: DeliveryStatus,
        to: DeliveryStatus,
    },
    /// Not strictly forward from the current status; ledger unchanged.
    Stale { current: DeliveryStatus },
    Unknown,
}

#[derive(Debug, Clone)]
pub struct ConversationLedger {
    conversation_id: ConversationId,
    entries: Vec<ChatMessage>,
    index: HashMap<MessageId, usize>,
    loaded: bool,
}

impl ConversationLedger {
    pub fn new(conversation_id: ConversationId) -> Self {
        Self {
            conversation_id,
            entries: Vec::new(),
            index: HashMap::new(),
            loaded: false,
        }
    }

    pub fn conversation_id(&self) -> &ConversationId {
        &self.conversation_id
    }

    /// Whether a snapshot has been merged at least once.
    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    pub(crate) fn mark_loaded(&mut self) {
        self.loaded = true;
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, id: &MessageId) -> Option<&ChatMessage> {
        self.index.get(id).map(|&i| &self.entries[i])
    }

    pub fn contains(&self, id: &MessageId) -> bool {
        self.index.contains_key(id)
    }

    /// Inserts a record after every entry with an equal or earlier
    /// timestamp. Returns `false` (and changes nothing) if the id exists.
    pub fn insert(&mut self, message: ChatMessage) -> bool {
        if self.contains(&message.id) {
            return false;
        }
        let pos = self
            .entries
            .partition_point(|e| e.timestamp <= message.timestamp);
        self.entries.insert(pos, message);
        self.reindex_from(pos);
        true
    }

    pub fn advance(&mut self, id: &MessageId, status: DeliveryStatus) -> Advance {
        let Some(&i) = self.index.get(id) else {
            return Advance::Unknown;
        };
        let entry = &mut self.entries[i];
        let current = entry.status;
        if current.can_advance_to(status) {
            entry.status = status;
            Advance::Advanced {
                from: current,
                to: status,
            }
        } else {
            Advance::Stale { current }
        }
    }

    /// Oldest unconfirmed optimistic record that is the same logical
    /// message as `incoming`: agent-sent, equal payload, timestamps within
    /// `window` of each other.
    pub fn find_optimistic_match(
        &self,
        incoming: &ChatMessage,
        window: TimeDelta,
    ) -> Option<MessageId> {
        if incoming.sender != Sender::Agent || incoming.id.is_optimistic() {
            return None;
        }
        self.entries
            .iter()
            .find(|e| {
                e.id.is_optimistic()
                    && e.sender == Sender::Agent
                    && e.payload == incoming.payload
                    && (e.timestamp - incoming.timestamp).abs() <= window
            })
            .map(|e| e.id.clone())
    }

    /// Replaces an optimistic id with its server id, in place. Fails if
    /// `old` is unknown or not optimistic, or `new` is already present.
    pub fn replace_id(&mut self, old: &MessageId, new: MessageId) -> bool {
        if !old.is_optimistic() || self.contains(&new) {
            return false;
        }
        let Some(i) = self.index.remove(old) else {
            return false;
        };
        self.entries[i].id = new.clone();
        self.index.insert(new, i);
        true
    }

    /// Removes a record. Used only to collapse an optimistic duplicate
    /// into its already-present server record.
    pub fn remove(&mut self, id: &MessageId) -> Option<ChatMessage> {
        let i = self.index.remove(id)?;
        let removed = self.entries.remove(i);
        self.reindex_from(i);
        Some(removed)
    }

    fn reindex_from(&mut self, start: usize) {
        for (i, entry) in self.entries.iter().enumerate().skip(start) {
            self.index.insert(entry.id.clone(), i);
        }
    }
}
