//! # Optimistic Sends
//!
//! Tracks every message that has been shown to the user before the server
//! accepted it. The store holds the visible entry; this ledger remembers
//! what is needed to resend it and how often that already happened.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use cheffin_chat::client::offline::OptimisticManager;
//! use cheffin_chat::shared::messaging::{ChatMessage, CurrentUser};
//!
//! # async fn example(me: &CurrentUser) {
//! let manager = OptimisticManager::new();
//! let message = ChatMessage::optimistic(me, "chefJane", "Hello");
//! let local = manager.record(&message).await.unwrap();
//! let request = manager.mark_attempt(&local).await;
//! manager.confirm(&local).await;
//! # }
//! ```

use std::collections::HashMap;

use tokio::sync::RwLock;
use uuid::Uuid;

use crate::shared::messaging::{ChatMessage, DeliveryState, MessageId, SendMessageRequest};

/// One message the server has not acknowledged yet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingSend {
    /// The optimistic entry as first shown
    pub message: ChatMessage,
    pub state: DeliveryState,
    /// Transport calls made so far
    pub attempts: u32,
}

impl PendingSend {
    pub fn request(&self) -> SendMessageRequest {
        SendMessageRequest {
            recipient_username: self.message.recipient_username.clone(),
            content: self.message.content.clone(),
        }
    }
}

/// Ledger of in-flight and failed sends
#[derive(Debug, Default)]
pub struct OptimisticManager {
    pending: RwLock<HashMap<Uuid, PendingSend>>,
}

impl OptimisticManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a freshly appended optimistic entry
    pub async fn record(&self, message: &ChatMessage) -> Option<Uuid> {
        let MessageId::Local(local_id) = message.id else {
            return None;
        };
        let send = PendingSend {
            message: message.clone(),
            state: DeliveryState::Optimistic,
            attempts: 0,
        };
        self.pending.write().await.insert(local_id, send);
        Some(local_id)
    }

    /// Move to `Confirming` and count the attempt. Returns the request to
    /// send, or `None` if the entry is unknown or already in flight.
    pub async fn mark_attempt(&self, local_id: &Uuid) -> Option<SendMessageRequest> {
        let mut pending = self.pending.write().await;
        let send = pending.get_mut(local_id)?;
        if send.state == DeliveryState::Confirming {
            return None;
        }
        send.state = DeliveryState::Confirming;
        send.attempts += 1;
        Some(send.request())
    }

    /// Server accepted the message; forget it
    pub async fn confirm(&self, local_id: &Uuid) -> Option<PendingSend> {
        self.pending.write().await.remove(local_id)
    }

    /// Transport rejected the message; keep it for a manual retry
    pub async fn fail(&self, local_id: &Uuid, reason: &str) -> Option<DeliveryState> {
        let mut pending = self.pending.write().await;
        let send = pending.get_mut(local_id)?;
        send.state = DeliveryState::Failed {
            reason: reason.to_string(),
        };
        Some(send.state.clone())
    }

    /// Drop an entry whose server copy arrived through another path
    pub async fn forget(&self, local_id: &Uuid) {
        self.pending.write().await.remove(local_id);
    }

    pub async fn get(&self, local_id: &Uuid) -> Option<PendingSend> {
        self.pending.read().await.get(local_id).cloned()
    }

    /// Sends waiting for a manual retry, oldest first
    pub async fn failed(&self) -> Vec<PendingSend> {
        let mut failed: Vec<PendingSend> = self
            .pending
            .read()
            .await
            .values()
            .filter(|s| s.state.is_failed())
            .cloned()
            .collect();
        failed.sort_by_key(|s| s.message.timestamp);
        failed
    }

    pub async fn len(&self) -> usize {
        self.pending.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.pending.read().await.is_empty()
    }
}
