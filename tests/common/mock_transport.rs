//! Scripted transport doubles
//!
//! `MockTransport` answers each operation from a queue of scripted results,
//! falling back to a default once the queue is drained, and records every
//! call. `MockPush` hands out subscriptions whose events the test feeds by
//! hand.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use cheffin_chat::client::transport::{ChatTransport, PushChannel, PushEvent, Subscription};
use cheffin_chat::shared::error::{ChatError, ChatResult};
use cheffin_chat::shared::messaging::{
    ChatMessage, Conversation, CurrentUser, ParticipantId, RecipientProfile, SendAck,
    SendMessageRequest,
};
use tokio::sync::{mpsc, Notify};

/// Queue of results for one operation
#[derive(Debug)]
struct Script<T> {
    queue: VecDeque<ChatResult<T>>,
    fallback: Option<ChatResult<T>>,
    calls: usize,
}

impl<T: Clone> Script<T> {
    fn new(fallback: Option<ChatResult<T>>) -> Self {
        Self {
            queue: VecDeque::new(),
            fallback,
            calls: 0,
        }
    }

    fn next(&mut self) -> Option<ChatResult<T>> {
        self.calls += 1;
        self.queue.pop_front().or_else(|| self.fallback.clone())
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

#[derive(Debug)]
pub struct MockTransport {
    conversations: Mutex<Script<Vec<Conversation>>>,
    messages: Mutex<Script<Vec<ChatMessage>>>,
    sends: Mutex<Script<SendAck>>,
    profiles: Mutex<Script<RecipientProfile>>,
    users: Mutex<Script<CurrentUser>>,
    sent: Mutex<Vec<SendMessageRequest>>,
    history_requests: Mutex<Vec<ParticipantId>>,
    send_gate: Mutex<Option<Arc<Notify>>>,
    history_gate: Mutex<Option<Arc<Notify>>>,
}

impl Default for MockTransport {
    fn default() -> Self {
        Self {
            conversations: Mutex::new(Script::new(Some(Ok(Vec::new())))),
            messages: Mutex::new(Script::new(Some(Ok(Vec::new())))),
            sends: Mutex::new(Script::new(Some(Ok(SendAck::default())))),
            profiles: Mutex::new(Script::new(None)),
            users: Mutex::new(Script::new(Some(Err(ChatError::network(
                "identity service unavailable",
            ))))),
            sent: Mutex::new(Vec::new()),
            history_requests: Mutex::new(Vec::new()),
            send_gate: Mutex::new(None),
            history_gate: Mutex::new(None),
        }
    }
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    // ===== Scripting =====

    pub fn with_conversations(self, list: Vec<Conversation>) -> Self {
        lock(&self.conversations).fallback = Some(Ok(list));
        self
    }

    pub fn with_messages(self, list: Vec<ChatMessage>) -> Self {
        lock(&self.messages).fallback = Some(Ok(list));
        self
    }

    pub fn with_current_user(self, user: CurrentUser) -> Self {
        lock(&self.users).fallback = Some(Ok(user));
        self
    }

    pub fn queue_conversations(&self, result: ChatResult<Vec<Conversation>>) {
        lock(&self.conversations).queue.push_back(result);
    }

    pub fn queue_messages(&self, result: ChatResult<Vec<ChatMessage>>) {
        lock(&self.messages).queue.push_back(result);
    }

    pub fn queue_send(&self, result: ChatResult<SendAck>) {
        lock(&self.sends).queue.push_back(result);
    }

    pub fn queue_profile(&self, result: ChatResult<RecipientProfile>) {
        lock(&self.profiles).queue.push_back(result);
    }

    pub fn queue_user(&self, result: ChatResult<CurrentUser>) {
        lock(&self.users).queue.push_back(result);
    }

    /// Hold the next send until the returned handle is notified
    pub fn gate_next_send(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *lock(&self.send_gate) = Some(Arc::clone(&gate));
        gate
    }

    /// Hold the next history fetch until the returned handle is notified
    pub fn gate_next_history(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *lock(&self.history_gate) = Some(Arc::clone(&gate));
        gate
    }

    // ===== Inspection =====

    pub fn sent(&self) -> Vec<SendMessageRequest> {
        lock(&self.sent).clone()
    }

    pub fn history_requests(&self) -> Vec<ParticipantId> {
        lock(&self.history_requests).clone()
    }

    pub fn conversation_calls(&self) -> usize {
        lock(&self.conversations).calls
    }

    pub fn message_calls(&self) -> usize {
        lock(&self.messages).calls
    }

    pub fn user_calls(&self) -> usize {
        lock(&self.users).calls
    }

    pub fn profile_calls(&self) -> usize {
        lock(&self.profiles).calls
    }
}

#[async_trait]
impl ChatTransport for MockTransport {
    async fn list_conversations(&self) -> ChatResult<Vec<Conversation>> {
        lock(&self.conversations)
            .next()
            .unwrap_or_else(|| Err(ChatError::network("no scripted conversations")))
    }

    async fn list_messages(&self, participant_id: &ParticipantId) -> ChatResult<Vec<ChatMessage>> {
        lock(&self.history_requests).push(participant_id.clone());
        let result = lock(&self.messages)
            .next()
            .unwrap_or_else(|| Err(ChatError::network("no scripted messages")));
        let gate = lock(&self.history_gate).take();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        result
    }

    async fn send_message(&self, request: &SendMessageRequest) -> ChatResult<SendAck> {
        lock(&self.sent).push(request.clone());
        let result = lock(&self.sends)
            .next()
            .unwrap_or_else(|| Err(ChatError::network("no scripted send")));
        let gate = lock(&self.send_gate).take();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        result
    }

    async fn fetch_profile(&self, username: &str) -> ChatResult<RecipientProfile> {
        lock(&self.profiles).next().unwrap_or_else(|| {
            Ok(RecipientProfile {
                username: username.to_string(),
                ..Default::default()
            })
        })
    }

    async fn current_user(&self) -> ChatResult<CurrentUser> {
        lock(&self.users)
            .next()
            .unwrap_or_else(|| Err(ChatError::not_found("current user")))
    }
}

/// Push channel whose subscriptions are fed by the test
#[derive(Debug, Default)]
pub struct MockPush {
    failures: Mutex<VecDeque<ChatError>>,
    always_fail: Mutex<Option<ChatError>>,
    senders: Mutex<Vec<mpsc::Sender<PushEvent>>>,
    subscribes: Mutex<usize>,
}

impl MockPush {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_next(&self, error: ChatError) {
        lock(&self.failures).push_back(error);
    }

    pub fn fail_always(&self, error: ChatError) {
        *lock(&self.always_fail) = Some(error);
    }

    pub fn subscribe_count(&self) -> usize {
        *lock(&self.subscribes)
    }

    /// Deliver an event on the newest subscription
    pub async fn send(&self, event: PushEvent) {
        let sender = lock(&self.senders).last().cloned();
        match sender {
            Some(sender) => {
                let _ = sender.send(event).await;
            }
            None => panic!("no open subscription"),
        }
    }

    /// Close every open subscription from the server side
    pub fn disconnect(&self) {
        lock(&self.senders).clear();
    }
}

#[async_trait]
impl PushChannel for MockPush {
    async fn subscribe(&self) -> ChatResult<Subscription> {
        *lock(&self.subscribes) += 1;
        if let Some(error) = lock(&self.failures).pop_front() {
            return Err(error);
        }
        if let Some(error) = lock(&self.always_fail).clone() {
            return Err(error);
        }
        let (tx, rx) = mpsc::channel(16);
        lock(&self.senders).push(tx);
        Ok(Subscription::from_receiver(rx))
    }
}
