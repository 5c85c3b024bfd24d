//! Transport Adapter
//!
//! Abstracts the remote messaging service behind two object-safe traits so
//! the engine and scheduler never see HTTP:
//!
//! - [`ChatTransport`] - request/response calls (list, history, send, profiles)
//! - [`PushChannel`] - a persistent channel that pushes `new_message` events
//!
//! [`HttpTransport`] implements both against the REST + Server-Sent Events
//! backend. Tests substitute scripted implementations.
//!
//! # Errors
//!
//! Every call fails with `ChatError::Auth` when no valid credential is
//! present, `ChatError::Network` on transport failure and
//! `ChatError::NotFound` when the referenced participant does not exist.

pub mod http;
pub mod sse;

pub use http::HttpTransport;
pub use sse::{SseFrame, SseParser};

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::shared::error::ChatResult;
use crate::shared::messaging::{
    ChatMessage, Conversation, CurrentUser, ParticipantId, RecipientProfile, SendAck,
    SendMessageRequest,
};

/// Request/response operations against the messaging service
#[async_trait]
pub trait ChatTransport: Send + Sync {
    /// Conversations the signed-in user takes part in
    async fn list_conversations(&self) -> ChatResult<Vec<Conversation>>;

    /// Message history with one participant, ascending by timestamp
    async fn list_messages(&self, participant_id: &ParticipantId) -> ChatResult<Vec<ChatMessage>>;

    /// Deliver one message
    async fn send_message(&self, request: &SendMessageRequest) -> ChatResult<SendAck>;

    /// Public profile of another user
    async fn fetch_profile(&self, username: &str) -> ChatResult<RecipientProfile>;

    /// Identity behind the current credential
    async fn current_user(&self) -> ChatResult<CurrentUser>;
}

/// Event delivered over a push channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushEvent {
    /// Channel is open and delivering
    Connected,
    /// A message was sent to or by the signed-in user
    NewMessage(ChatMessage),
    /// Channel dropped; the subscription yields nothing after this
    Disconnected {
        reason: String,
    },
}

/// Persistent push channel
#[async_trait]
pub trait PushChannel: Send + Sync {
    /// Open the channel. Events arrive on the returned subscription until
    /// it is dropped or a `Disconnected` event is delivered.
    async fn subscribe(&self) -> ChatResult<Subscription>;
}

/// Live push subscription; dropping it stops the reader task
#[derive(Debug)]
pub struct Subscription {
    events: mpsc::Receiver<PushEvent>,
    reader: Option<JoinHandle<()>>,
}

impl Subscription {
    pub fn new(events: mpsc::Receiver<PushEvent>, reader: Option<JoinHandle<()>>) -> Self {
        Self { events, reader }
    }

    /// Subscription fed by something other than a reader task
    pub fn from_receiver(events: mpsc::Receiver<PushEvent>) -> Self {
        Self::new(events, None)
    }

    /// Next event, or `None` once the channel is gone
    pub async fn next(&mut self) -> Option<PushEvent> {
        self.events.recv().await
    }

    pub fn unsubscribe(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(handle) = self.reader.take() {
            handle.abort();
        }
    }
}
