// SPDX-FileCopyrightText: 2026 Zapline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock messaging backend for deterministic testing.
//!
//! `MockBackend` implements `MessagingBackend` with configurable snapshots,
//! send receipts and failures, and records every call for assertion.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, watch};

use zapline_core::ZaplineError;
use zapline_core::traits::{MessagingBackend, PluginAdapter};
use zapline_core::types::{
    AdapterType, AgentId, ChatMessage, ConversationId, ConversationSnapshot, DeliveryStatus,
    HealthStatus, MessageId, OutboundText, PairingTicket, SendReceipt,
};

/// One recorded backend call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendCall {
    RequestPairing(AgentId),
    EndSession(AgentId),
    FetchSnapshot(AgentId, ConversationId),
    SendText(AgentId, OutboundText),
}

/// A mock messaging backend for testing.
pub struct MockBackend {
    calls: Arc<Mutex<Vec<BackendCall>>>,
    snapshots: Arc<Mutex<HashMap<ConversationId, Vec<ChatMessage>>>>,
    receipts: Arc<Mutex<VecDeque<Result<SendReceipt, String>>>>,
    pairing_artifact: Arc<Mutex<Option<String>>>,
    pairing_error: Arc<Mutex<Option<String>>>,
    snapshot_failures: AtomicU32,
    sends: AtomicUsize,
    sends_open: watch::Sender<bool>,
}

impl MockBackend {
    pub fn new() -> Self {
        Self {
            calls: Arc::new(Mutex::new(Vec::new())),
            snapshots: Arc::new(Mutex::new(HashMap::new())),
            receipts: Arc::new(Mutex::new(VecDeque::new())),
            pairing_artifact: Arc::new(Mutex::new(None)),
            pairing_error: Arc::new(Mutex::new(None)),
            snapshot_failures: AtomicU32::new(0),
            sends: AtomicUsize::new(0),
            sends_open: watch::Sender::new(true),
        }
    }

    /// Replace the REST state of one conversation.
    pub async fn set_snapshot(&self, conversation_id: ConversationId, messages: Vec<ChatMessage>) {
        self.snapshots.lock().await.insert(conversation_id, messages);
    }

    /// Fail the next `count` snapshot fetches with a 503.
    pub fn fail_snapshots(&self, count: u32) {
        self.snapshot_failures.store(count, Ordering::SeqCst);
    }

    /// Queue the reply for the next `send_text` call.
    ///
    /// Without a queued reply, sends succeed with a fresh `srv-<n>` id.
    pub async fn queue_receipt(&self, receipt: Result<SendReceipt, String>) {
        self.receipts.lock().await.push_back(receipt);
    }

    /// Artifact returned inline by `request_pairing`.
    pub async fn set_pairing_artifact(&self, artifact: Option<String>) {
        *self.pairing_artifact.lock().await = artifact;
    }

    /// Make `request_pairing` fail with `reason` until cleared.
    pub async fn fail_pairing(&self, reason: Option<String>) {
        *self.pairing_error.lock().await = reason;
    }

    /// Hold `send_text` replies until [`release_sends`](Self::release_sends).
    pub fn hold_sends(&self) {
        self.sends_open.send_replace(false);
    }

    pub fn release_sends(&self) {
        self.sends_open.send_replace(true);
    }

    /// All calls received so far, in order.
    pub async fn calls(&self) -> Vec<BackendCall> {
        self.calls.lock().await.clone()
    }

    pub async fn pairing_requests(&self) -> usize {
        self.count(|c| matches!(c, BackendCall::RequestPairing(_))).await
    }

    pub async fn snapshot_fetches(&self, conversation_id: &ConversationId) -> usize {
        self.count(|c| matches!(c, BackendCall::FetchSnapshot(_, id) if id == conversation_id))
            .await
    }

    pub async fn sent_texts(&self) -> Vec<OutboundText> {
        self.calls
            .lock()
            .await
            .iter()
            .filter_map(|c| match c {
                BackendCall::SendText(_, text) => Some(text.clone()),
                _ => None,
            })
            .collect()
    }

    async fn count(&self, pred: impl Fn(&BackendCall) -> bool) -> usize {
        self.calls.lock().await.iter().filter(|c| pred(c)).count()
    }

    async fn record(&self, call: BackendCall) {
        self.calls.lock().await.push(call);
    }
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PluginAdapter for MockBackend {
    fn name(&self) -> &str {
        "mock-backend"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Backend
    }

    async fn health_check(&self) -> Result<HealthStatus, ZaplineError> {
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), ZaplineError> {
        Ok(())
    }
}

#[async_trait]
impl MessagingBackend for MockBackend {
    async fn request_pairing(&self, agent_id: &AgentId) -> Result<PairingTicket, ZaplineError> {
        self.record(BackendCall::RequestPairing(agent_id.clone())).await;
        if let Some(reason) = self.pairing_error.lock().await.clone() {
            return Err(ZaplineError::Pairing(reason));
        }
        Ok(PairingTicket {
            artifact: self.pairing_artifact.lock().await.clone(),
        })
    }

    async fn end_session(&self, agent_id: &AgentId) -> Result<(), ZaplineError> {
        self.record(BackendCall::EndSession(agent_id.clone())).await;
        Ok(())
    }

    async fn fetch_snapshot(
        &self,
        agent_id: &AgentId,
        conversation_id: &ConversationId,
    ) -> Result<ConversationSnapshot, ZaplineError> {
        self.record(BackendCall::FetchSnapshot(
            agent_id.clone(),
            conversation_id.clone(),
        ))
        .await;

        let failing = self
            .snapshot_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(ZaplineError::Backend {
                message: "service unavailable".into(),
                status: Some(503),
                source: None,
            });
        }

        let messages = self
            .snapshots
            .lock()
            .await
            .get(conversation_id)
            .cloned()
            .unwrap_or_default();
        Ok(ConversationSnapshot {
            conversation_id: conversation_id.clone(),
            messages,
        })
    }

    async fn send_text(
        &self,
        agent_id: &AgentId,
        message: &OutboundText,
    ) -> Result<SendReceipt, ZaplineError> {
        self.record(BackendCall::SendText(agent_id.clone(), message.clone()))
            .await;

        let mut open = self.sends_open.subscribe();
        // Sender lives in self; wait_for only fails if it is dropped.
        let _ = open.wait_for(|open| *open).await;

        let queued = self.receipts.lock().await.pop_front();
        match queued {
            Some(Ok(receipt)) => Ok(receipt),
            Some(Err(reason)) => Err(ZaplineError::Backend {
                message: reason,
                status: Some(500),
                source: None,
            }),
            None => {
                let n = self.sends.fetch_add(1, Ordering::SeqCst) + 1;
                Ok(SendReceipt {
                    id: MessageId::new(format!("srv-{n}")),
                    status: DeliveryStatus::Sent,
                })
            }
        }
    }
}
