//! # Reconciliation Engine
//!
//! Keeps the local view consistent with the server while the user keeps
//! typing. Every send goes through the same state machine:
//!
//! ```text
//! Composing -> Optimistic -> Confirming -> Confirmed
//!                                      \-> Failed --(retry_failed)--> Confirming
//! ```
//!
//! Server copies of a message may arrive through the send acknowledgement,
//! the push channel or a history poll, in any order; the store's
//! confirm-replace and dedup rules make them converge on a single entry.
//!
//! Nothing is resent automatically. A failed entry stays visible, flagged,
//! until the user retries it.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::optimistic::OptimisticManager;
use super::retry::{retry, retry_when, RetryPolicy};
use crate::client::config::ClientConfig;
use crate::client::session::Session;
use crate::client::store::{AppendOutcome, ConversationStore, Generation};
use crate::client::transport::ChatTransport;
use crate::shared::error::{ChatError, ChatResult};
use crate::shared::messaging::{
    ChatMessage, ConversationPatch, CurrentUser, DeliveryState, MessageId, ParticipantId,
    RecipientProfile, SendAck, SendMessageRequest,
};

/// Surfaced when the signed-in user's identity never became available
pub const USER_NOT_LOADED: &str = "user data not loaded";

/// Surfaced when a new conversation's participant id could not be learned
pub const ID_UNRESOLVED: &str = "could not establish conversation id";

/// Retry budgets and presentation knobs used by the engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnginePolicies {
    pub fetch: RetryPolicy,
    pub id_resolution: RetryPolicy,
    pub identity: RetryPolicy,
    pub preview_len: usize,
}

impl Default for EnginePolicies {
    fn default() -> Self {
        Self {
            fetch: RetryPolicy::fetch_default(),
            id_resolution: RetryPolicy::id_resolution_default(),
            identity: RetryPolicy::identity_default(),
            preview_len: 60,
        }
    }
}

impl From<&ClientConfig> for EnginePolicies {
    fn from(config: &ClientConfig) -> Self {
        Self {
            fetch: config.fetch_retry.policy(),
            id_resolution: config.id_resolution_retry.policy(),
            identity: config.identity_retry.policy(),
            preview_len: config.preview_len,
        }
    }
}

pub struct ReconciliationEngine {
    transport: Arc<dyn ChatTransport>,
    store: Arc<RwLock<ConversationStore>>,
    session: Arc<Session>,
    pending: OptimisticManager,
    policies: EnginePolicies,
}

impl std::fmt::Debug for ReconciliationEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReconciliationEngine")
            .field("policies", &self.policies)
            .finish_non_exhaustive()
    }
}

impl ReconciliationEngine {
    pub fn new(
        transport: Arc<dyn ChatTransport>,
        session: Arc<Session>,
        policies: EnginePolicies,
    ) -> Self {
        Self {
            transport,
            store: Arc::new(RwLock::new(ConversationStore::new())),
            session,
            pending: OptimisticManager::new(),
            policies,
        }
    }

    pub fn store(&self) -> Arc<RwLock<ConversationStore>> {
        Arc::clone(&self.store)
    }

    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    pub fn pending(&self) -> &OptimisticManager {
        &self.pending
    }

    // ===== Startup =====

    /// Initial load: credential check, identity, conversation list.
    ///
    /// Only an authentication failure is returned; anything else is stored
    /// on the session-level error and the caller keeps running.
    pub async fn bootstrap(&self) -> ChatResult<()> {
        self.session.bearer_token().await?;

        match self.ensure_identity().await {
            Ok(user) => tracing::info!("[SYNC] signed in as {}", user.username),
            Err(e) if e.is_auth() => return Err(e),
            Err(e) => {
                tracing::warn!("[SYNC] identity unavailable: {}", e);
                self.store.write().await.set_error(USER_NOT_LOADED);
            }
        }

        match self.refresh_conversations().await {
            Err(e) if e.is_auth() => Err(e),
            _ => Ok(()),
        }
    }

    /// Current user, waiting out the window where a token exists but the
    /// identity has not been loaded yet
    pub async fn ensure_identity(&self) -> ChatResult<CurrentUser> {
        if let Some(user) = self.session.current_user().await {
            return Ok(user);
        }

        let session = &self.session;
        let transport = &self.transport;
        let user = retry_when(
            &self.policies.identity,
            "load current user",
            move |_| async move {
                // Another component may have filled it in meanwhile
                if let Some(user) = session.current_user().await {
                    return Ok(user);
                }
                transport.current_user().await
            },
            |e| e.is_retryable() || e.is_not_found(),
        )
        .await?;

        self.session.set_current_user(Some(user.clone())).await;
        Ok(user)
    }

    // ===== Fetching =====

    /// Fetch the conversation list and merge it into the store
    pub async fn refresh_conversations(&self) -> ChatResult<()> {
        let transport = &self.transport;
        let fetched = retry(&self.policies.fetch, "list conversations", move |_| {
            transport.list_conversations()
        })
        .await;
        match fetched {
            Ok(list) => {
                tracing::debug!("[SYNC] fetched {} conversations", list.len());
                self.store.write().await.merge_conversations(list);
                self.load_learned_history().await;
                Ok(())
            }
            Err(e) => {
                tracing::warn!("[SYNC] failed to load conversations: {}", e);
                self.store
                    .write()
                    .await
                    .set_error(format!("failed to load conversations: {}", e));
                Err(e)
            }
        }
    }

    /// Open a conversation by username (sidebar click or deep link)
    pub async fn open_conversation(&self, username: &str) -> ChatResult<()> {
        let username = username.trim();
        if username.is_empty() {
            return Err(ChatError::invalid("no participant given"));
        }

        let (generation, participant_id) = {
            let mut store = self.store.write().await;
            let generation = store.set_active(username, None);
            let participant_id = store.active().and_then(|a| a.participant_id.clone());
            (generation, participant_id)
        };
        tracing::info!(
            "[SYNC] opened conversation with {} (generation {})",
            username,
            generation.value()
        );

        let (profile, history) = tokio::join!(
            self.fetch_profile(username, false),
            self.load_history(generation, participant_id)
        );

        if let Err(e) = profile {
            tracing::warn!("[SYNC] profile of {} unavailable: {}", username, e);
            if e.is_not_found() {
                let mut store = self.store.write().await;
                if store.is_current(generation) {
                    store.set_active_error(format!("user {} not found", username));
                }
            }
        }
        history
    }

    pub async fn close_conversation(&self) {
        self.store.write().await.clear_active();
    }

    /// Re-fetch the open conversation's history
    pub async fn refresh_active_messages(&self) -> ChatResult<()> {
        let active = {
            let store = self.store.read().await;
            store.active().map(|a| (a.generation, a.participant_id.clone()))
        };
        match active {
            Some((generation, participant_id)) => {
                self.load_history(generation, participant_id).await
            }
            None => Ok(()),
        }
    }

    async fn load_history(
        &self,
        generation: Generation,
        participant_id: Option<ParticipantId>,
    ) -> ChatResult<()> {
        let Some(participant_id) = participant_id else {
            // Nothing persisted yet, or the id is still unknown; the history
            // is fetched once the id is learned
            self.store.write().await.apply_history(generation, Vec::new());
            return Ok(());
        };

        let transport = &self.transport;
        let id = &participant_id;
        let result = retry(&self.policies.fetch, "list messages", move |_| {
            transport.list_messages(id)
        })
        .await;

        let settled = {
            let mut store = self.store.write().await;
            match result {
                Ok(history) => {
                    let count = history.len();
                    let settled = store.apply_history(generation, history);
                    if settled.is_some() {
                        tracing::debug!("[SYNC] loaded {} messages for {}", count, participant_id);
                    }
                    settled.unwrap_or_default()
                }
                Err(e) => {
                    let message = format!("failed to load messages: {}", e);
                    if store.fail_load(generation, message) {
                        tracing::warn!(
                            "[SYNC] failed to load messages for {}: {}",
                            participant_id,
                            e
                        );
                    }
                    return Err(e);
                }
            }
        };

        // The server has these; a failed copy must not be resent
        for local in settled {
            self.pending.forget(&local).await;
        }
        Ok(())
    }

    /// Fetch the open conversation's history once its participant id
    /// becomes known (deep link opened before the first list arrived, or
    /// the first message just persisted)
    async fn load_learned_history(&self) {
        let learned = self.store.write().await.take_learned_id();
        if let Some((generation, participant_id)) = learned {
            tracing::info!("[SYNC] conversation id {} learned, loading history", participant_id);
            if let Err(e) = self.load_history(generation, Some(participant_id)).await {
                tracing::debug!("[SYNC] history after id resolution failed: {}", e);
            }
        }
    }

    /// One polling round: only does work while a conversation is open
    pub async fn poll_tick(&self) -> ChatResult<()> {
        if self.store.read().await.active().is_none() {
            return Ok(());
        }
        let conversations = self.refresh_conversations().await;
        let messages = self.refresh_active_messages().await;
        conversations.and(messages)
    }

    /// Recipient profile, cached per username unless `force` is set
    pub async fn fetch_profile(&self, username: &str, force: bool) -> ChatResult<RecipientProfile> {
        if !force {
            if let Some(profile) = self.store.read().await.profile(username) {
                return Ok(profile.clone());
            }
        }

        let transport = &self.transport;
        let profile = retry(&self.policies.fetch, "fetch profile", move |_| {
            transport.fetch_profile(username)
        })
        .await?;
        self.store.write().await.cache_profile(profile.clone());
        Ok(profile)
    }

    // ===== Sending =====

    /// Send `content` to the open conversation.
    ///
    /// Guard failures are returned before anything becomes visible. Once
    /// the optimistic entry is shown, a transport failure flags it as
    /// failed and is returned as well.
    pub async fn send_message(&self, content: &str) -> ChatResult<MessageId> {
        let message = self.prepare(content).await?;
        let MessageId::Local(local) = message.id else {
            return Err(ChatError::invalid("optimistic message without a local id"));
        };

        {
            let mut store = self.store.write().await;
            store.append_message(message.clone());
            store.set_draft(String::new());
        }
        self.pending.record(&message).await;
        tracing::info!("[SEND] optimistic {} to {}", message.id, message.recipient_username);

        self.deliver(local).await?;
        Ok(message.id)
    }

    /// Send whatever is in the draft box
    pub async fn send_draft(&self) -> ChatResult<MessageId> {
        let draft = self
            .store
            .read()
            .await
            .active()
            .map(|a| a.draft.clone())
            .unwrap_or_default();
        self.send_message(&draft).await
    }

    pub async fn set_draft(&self, text: &str) {
        self.store.write().await.set_draft(text);
    }

    /// Drop a failed message instead of retrying it
    pub async fn discard_failed(&self, local: Uuid) -> ChatResult<()> {
        match self.pending.get(&local).await {
            None => Err(ChatError::invalid("message was already delivered")),
            Some(send) if !send.state.is_failed() => {
                Err(ChatError::invalid("message is still being sent"))
            }
            Some(_) => {
                self.pending.forget(&local).await;
                self.store.write().await.discard_failed(local);
                tracing::info!("[SEND] discarded {}", MessageId::Local(local));
                Ok(())
            }
        }
    }

    /// Resend a failed message. Never called automatically.
    pub async fn retry_failed(&self, local: Uuid) -> ChatResult<()> {
        match self.pending.get(&local).await {
            None => Err(ChatError::invalid("message was already delivered")),
            Some(send) if !send.state.is_failed() => {
                Err(ChatError::invalid("message is still being sent"))
            }
            Some(_) => {
                tracing::info!("[SEND] retrying {}", MessageId::Local(local));
                self.deliver(local).await
            }
        }
    }

    /// Validate a send and build its optimistic entry
    async fn prepare(&self, content: &str) -> ChatResult<ChatMessage> {
        let content = content.trim();
        if content.is_empty() {
            return Err(ChatError::invalid("message is empty"));
        }

        let recipient = self
            .store
            .read()
            .await
            .active()
            .map(|a| a.participant_username.clone())
            .ok_or_else(|| ChatError::invalid("no conversation is open"))?;

        self.session.bearer_token().await?;
        // Startup may still be loading the identity
        let me = match self.ensure_identity().await {
            Ok(user) => user,
            Err(e) if e.is_auth() => return Err(e),
            Err(e) => {
                tracing::warn!("[SEND] identity unavailable: {}", e);
                return Err(ChatError::invalid(USER_NOT_LOADED));
            }
        };

        if me.username == recipient {
            tracing::warn!("[SEND] refusing to send a message to yourself");
            return Err(ChatError::invalid("you cannot send messages to yourself"));
        }

        Ok(ChatMessage::optimistic(&me, &recipient, content))
    }

    /// Hand one pending send to the transport
    async fn deliver(&self, local: Uuid) -> ChatResult<()> {
        let request = self
            .pending
            .mark_attempt(&local)
            .await
            .ok_or_else(|| ChatError::invalid("message is already being sent"))?;
        self.store.write().await.mark_delivery(local, DeliveryState::Confirming);

        match self.transport.send_message(&request).await {
            Ok(ack) => {
                self.on_ack(local, &request, ack).await;
                Ok(())
            }
            Err(e) => {
                tracing::warn!("[SEND] delivery to {} failed: {}", request.recipient_username, e);
                let reason = e.to_string();
                self.pending.fail(&local, &reason).await;
                let mut store = self.store.write().await;
                store.mark_delivery(local, DeliveryState::Failed { reason });
                let still_open = store
                    .active()
                    .map(|a| a.participant_username == request.recipient_username)
                    .unwrap_or(false);
                if still_open {
                    store.set_active_error(format!("failed to send message: {}", e));
                }
                Err(e)
            }
        }
    }

    async fn on_ack(&self, local: Uuid, request: &SendMessageRequest, ack: SendAck) {
        // Missing when a push copy already settled this send
        let pending = self.pending.confirm(&local).await;
        let recipient = request.recipient_username.as_str();

        let known_id = {
            let mut store = self.store.write().await;
            let outcome = store.confirm(local, ack.message.clone());
            tracing::info!("[SEND] {} confirmed ({:?})", MessageId::Local(local), outcome);

            let latest = match (ack.message, pending) {
                (Some(message), _) => Some(message),
                (None, Some(send)) => Some(ChatMessage {
                    timestamp: Utc::now(),
                    ..send.message
                }),
                (None, None) => None,
            };
            let mut patch = ConversationPatch::participant(recipient, ack.participant_id);
            if let Some(latest) = &latest {
                patch = patch.with_message(latest, self.policies.preview_len);
            }
            store.upsert_conversation(&patch);
            store.participant_id(recipient)
        };
        self.load_learned_history().await;

        if known_id.is_none() {
            self.resolve_participant_id(recipient).await;
        }
    }

    /// Learn a new conversation's participant id by polling the list
    async fn resolve_participant_id(&self, username: &str) {
        let transport = &self.transport;
        let result = retry_when(
            &self.policies.id_resolution,
            "resolve conversation id",
            move |_| async move {
                transport
                    .list_conversations()
                    .await?
                    .into_iter()
                    .find(|c| c.participant_username == username)
                    .and_then(|c| c.participant_id)
                    .ok_or_else(|| ChatError::not_found(format!("conversation with {}", username)))
            },
            |e| e.is_retryable() || e.is_not_found(),
        )
        .await;

        let mut store = self.store.write().await;
        match result {
            Ok(id) => {
                tracing::info!("[SYNC] conversation with {} has id {}", username, id);
                store.resolve_participant(username, id);
                drop(store);
                self.load_learned_history().await;
            }
            Err(e) => {
                tracing::warn!("[SYNC] {} for {}: {}", ID_UNRESOLVED, username, e);
                if store.active().map(|a| a.participant_username == username).unwrap_or(false) {
                    store.set_warning(ID_UNRESOLVED);
                }
            }
        }
    }

    // ===== Incoming =====

    /// Route a message that arrived from the server outside a send
    pub async fn apply_incoming(&self, message: ChatMessage) -> AppendOutcome {
        let Some(me) = self.session.current_user().await else {
            tracing::warn!("[PUSH] dropping message {} before identity is known", message.id);
            return AppendOutcome::Ignored;
        };
        if message.sender_username != me.username && message.recipient_username != me.username {
            tracing::debug!("[PUSH] message {} is not addressed to us", message.id);
            return AppendOutcome::Ignored;
        }

        let (counterpart, counterpart_id) = message.counterpart(&me.username);
        let patch = ConversationPatch::participant(counterpart, counterpart_id.cloned())
            .with_message(&message, self.policies.preview_len);

        let outcome = {
            let mut store = self.store.write().await;
            store.upsert_conversation(&patch);
            store.append_message(message)
        };

        if let AppendOutcome::Replaced { local } = outcome {
            self.pending.forget(&local).await;
        }
        self.load_learned_history().await;
        outcome
    }

    pub async fn dismiss_error(&self) {
        self.store.write().await.dismiss_errors();
    }
}
