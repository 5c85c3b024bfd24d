//! Chat client core
//!
//! Everything the chat screens need, minus the screens:
//!
//! - **`transport`** - REST + push access to the backend
//! - **`store`** - conversation list, open conversation, profile cache
//! - **`offline`** - optimistic sends, reconciliation, retry
//! - **`sync`** - background polling / push scheduling
//! - **`session`** - credential and signed-in identity
//! - **`config`** - layered client configuration
//!
//! [`ChatClient`] wires them together: the UI dispatches intents (open,
//! send, retry, dismiss) and renders [`ChatSnapshot`]s.

pub mod config;
pub mod offline;
pub mod session;
pub mod store;
pub mod sync;
pub mod transport;

use std::sync::Arc;

use tokio::sync::watch;
use uuid::Uuid;

use crate::shared::error::{ChatError, ChatResult};
use crate::shared::messaging::{Conversation, MessageId, RecipientProfile};
use config::ClientConfig;
use offline::{EnginePolicies, ReconciliationEngine};
use session::Session;
use store::ActiveConversation;
use sync::{ConnectivityState, SyncPolicy, SyncScheduler};
use transport::{ChatTransport, HttpTransport, PushChannel};

/// Point-in-time view of the chat state for rendering
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatSnapshot {
    /// Most recent activity first
    pub conversations: Vec<Conversation>,
    pub active: Option<ActiveConversation>,
    /// Cached profile of the open conversation's participant
    pub active_profile: Option<RecipientProfile>,
    /// Session-level error (list fetch, identity)
    pub error: Option<String>,
    pub connectivity: ConnectivityState,
}

/// Facade over engine and scheduler for one signed-in session
#[derive(Debug)]
pub struct ChatClient {
    engine: Arc<ReconciliationEngine>,
    scheduler: SyncScheduler,
}

impl ChatClient {
    pub fn new(
        config: &ClientConfig,
        session: Arc<Session>,
        transport: Arc<dyn ChatTransport>,
        push: Option<Arc<dyn PushChannel>>,
    ) -> Self {
        let policies = EnginePolicies::from(config);
        let engine = Arc::new(ReconciliationEngine::new(transport, session, policies));
        let policy = SyncPolicy::from_config(config);
        let scheduler = SyncScheduler::new(Arc::clone(&engine), push, policy);
        Self { engine, scheduler }
    }

    /// Client talking HTTP to the configured backend
    pub fn connect(config: &ClientConfig, session: Arc<Session>) -> ChatResult<Self> {
        let app_config = config
            .app_config()
            .map_err(|e| ChatError::invalid(format!("invalid configuration: {}", e)))?;
        let http = Arc::new(HttpTransport::new(app_config, Arc::clone(&session))?);
        let transport: Arc<dyn ChatTransport> = http.clone();
        let push: Arc<dyn PushChannel> = http;
        Ok(Self::new(config, session, transport, Some(push)))
    }

    pub fn engine(&self) -> &Arc<ReconciliationEngine> {
        &self.engine
    }

    /// Begin background synchronization
    pub fn start(&self) -> ChatResult<()> {
        self.scheduler.start()
    }

    pub fn shutdown(&self) {
        self.scheduler.stop();
    }

    pub fn connectivity(&self) -> watch::Receiver<ConnectivityState> {
        self.scheduler.connectivity()
    }

    pub async fn open_conversation(&self, username: &str) -> ChatResult<()> {
        self.engine.open_conversation(username).await
    }

    pub async fn close_conversation(&self) {
        self.engine.close_conversation().await;
    }

    pub async fn send(&self, content: &str) -> ChatResult<MessageId> {
        self.engine.send_message(content).await
    }

    pub async fn set_draft(&self, text: &str) {
        self.engine.set_draft(text).await;
    }

    pub async fn send_draft(&self) -> ChatResult<MessageId> {
        self.engine.send_draft().await
    }

    /// Resend a message flagged as failed
    pub async fn retry(&self, message: &MessageId) -> ChatResult<()> {
        match message {
            MessageId::Local(local) => self.engine.retry_failed(*local).await,
            MessageId::Server(_) => Err(ChatError::invalid("message was already delivered")),
        }
    }

    pub async fn retry_local(&self, local: Uuid) -> ChatResult<()> {
        self.engine.retry_failed(local).await
    }

    /// Remove a failed message without resending it
    pub async fn discard(&self, message: &MessageId) -> ChatResult<()> {
        match message {
            MessageId::Local(local) => self.engine.discard_failed(*local).await,
            MessageId::Server(_) => Err(ChatError::invalid("message was already delivered")),
        }
    }

    pub async fn dismiss_error(&self) {
        self.engine.dismiss_error().await;
    }

    /// Manual refresh (pull-to-refresh)
    pub async fn refresh(&self) -> ChatResult<()> {
        let conversations = self.engine.refresh_conversations().await;
        let messages = self.engine.refresh_active_messages().await;
        conversations.and(messages)
    }

    pub async fn profile(&self, username: &str, force: bool) -> ChatResult<RecipientProfile> {
        self.engine.fetch_profile(username, force).await
    }

    pub async fn search(&self, query: &str) -> Vec<Conversation> {
        self.engine.store().read().await.search(query)
    }

    pub async fn snapshot(&self) -> ChatSnapshot {
        let store = self.engine.store();
        let store = store.read().await;
        let active = store.active().cloned();
        let active_profile = active
            .as_ref()
            .and_then(|a| store.profile(&a.participant_username))
            .cloned();
        ChatSnapshot {
            conversations: store.conversations(),
            active,
            active_profile,
            error: store.error().map(str::to_string),
            connectivity: self.scheduler.status(),
        }
    }
}
