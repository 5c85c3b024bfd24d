//! Conversation Store
//!
//! Single owner of the conversation list, the active conversation's
//! history and the recipient profile cache. All mutation goes through the
//! methods below so the invariants hold no matter in which order fetches,
//! acknowledgements and push events arrive:
//!
//! - at most one [`Conversation`] per participant
//! - the active history is non-decreasing by timestamp, ties in arrival order
//! - one optimistic entry per send, replaced at most once by its server copy
//! - a history response for a conversation that is no longer active is ignored
//!
//! The store is synchronous; the engine wraps it in `Arc<RwLock<_>>` and
//! never holds the lock across a network call.

use std::collections::{HashMap, HashSet};

use uuid::Uuid;

use crate::shared::messaging::{
    ChatMessage, Conversation, ConversationPatch, DeliveryState, MessageId, ParticipantId,
    RecipientProfile,
};

/// Monotonic token identifying one "conversation is open" period
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Generation(u64);

impl Generation {
    pub fn value(self) -> u64 {
        self.0
    }
}

/// State of the conversation currently on screen
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveConversation {
    pub participant_username: String,
    /// Unknown until the first message persists
    pub participant_id: Option<ParticipantId>,
    pub messages: Vec<ChatMessage>,
    pub draft: String,
    pub loading: bool,
    pub error: Option<String>,
    /// Non-fatal notice, e.g. the conversation id could not be learned yet
    pub warning: Option<String>,
    pub generation: Generation,
}

impl ActiveConversation {
    fn new(
        participant_username: String,
        participant_id: Option<ParticipantId>,
        generation: Generation,
    ) -> Self {
        Self {
            participant_username,
            participant_id,
            messages: Vec::new(),
            draft: String::new(),
            loading: true,
            error: None,
            warning: None,
            generation,
        }
    }

    pub fn message(&self, id: &MessageId) -> Option<&ChatMessage> {
        self.messages.iter().find(|m| &m.id == id)
    }

    /// Whether a message was exchanged with this conversation's participant
    pub fn involves(&self, message: &ChatMessage) -> bool {
        message.sender_username == self.participant_username
            || message.recipient_username == self.participant_username
    }

    fn insert_sorted(&mut self, message: ChatMessage) {
        let at = self.messages.partition_point(|m| m.timestamp <= message.timestamp);
        self.messages.insert(at, message);
    }

    fn position(&self, id: &MessageId) -> Option<usize> {
        self.messages.iter().position(|m| &m.id == id)
    }
}

/// What [`ConversationStore::append_message`] did with a message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppendOutcome {
    /// New entry
    Inserted,
    /// Server copy replaced the optimistic entry with this local id
    Replaced { local: Uuid },
    /// Server id already present; entry refreshed in place
    Duplicate,
    /// No active conversation, or the message belongs to another one
    Ignored,
}

#[derive(Debug, Default)]
pub struct ConversationStore {
    conversations: Vec<Conversation>,
    active: Option<ActiveConversation>,
    profiles: HashMap<String, RecipientProfile>,
    generation: u64,
    /// Set when the open conversation learns its participant id
    id_learned: Option<Generation>,
    /// Error not tied to the active conversation (list fetch, identity)
    error: Option<String>,
}

impl ConversationStore {
    pub fn new() -> Self {
        Self::default()
    }

    // ===== Conversation list =====

    /// Conversations, most recent activity first
    pub fn conversations(&self) -> Vec<Conversation> {
        let mut list = self.conversations.clone();
        // Stable sort keeps insertion order among equal timestamps
        list.sort_by(|a, b| b.last_message_at.cmp(&a.last_message_at));
        list
    }

    pub fn conversation(&self, username: &str) -> Option<&Conversation> {
        self.conversations.iter().find(|c| c.participant_username == username)
    }

    pub fn participant_id(&self, username: &str) -> Option<ParticipantId> {
        self.conversation(username).and_then(|c| c.participant_id.clone())
    }

    /// Merge by participant id when known, otherwise by username
    pub fn upsert_conversation(&mut self, patch: &ConversationPatch) {
        let by_id = patch.participant_id.as_ref().and_then(|id| {
            self.conversations
                .iter()
                .position(|c| c.participant_id.as_ref() == Some(id))
        });
        let by_name = self.conversations.iter().position(|c| {
            c.participant_id.is_none() && c.participant_username == patch.participant_username
        });

        match (by_id, by_name) {
            (Some(keep), Some(orphan)) => {
                // An id-less entry created before the first send; fold it in
                let orphan_entry = self.conversations.remove(orphan);
                let keep = if orphan < keep { keep - 1 } else { keep };
                self.conversations[keep].apply(patch);
                self.conversations[keep].absorb(orphan_entry);
                tracing::debug!("[STORE] merged id-less entry for {}", patch.participant_username);
            }
            (Some(index), None) | (None, Some(index)) => self.conversations[index].apply(patch),
            (None, None) => {
                let by_any_name = match patch.participant_id {
                    None => self
                        .conversations
                        .iter()
                        .position(|c| c.participant_username == patch.participant_username),
                    Some(_) => None,
                };
                match by_any_name {
                    Some(index) => self.conversations[index].apply(patch),
                    None => {
                        let mut conversation =
                            Conversation::new(patch.participant_username.clone());
                        conversation.apply(patch);
                        tracing::debug!(
                            "[STORE] new conversation with {}",
                            conversation.participant_username
                        );
                        self.conversations.push(conversation);
                    }
                }
            }
        }

        if let (Some(active), Some(id)) = (self.active.as_mut(), patch.participant_id.as_ref()) {
            if active.participant_id.is_none()
                && active.participant_username == patch.participant_username
            {
                active.participant_id = Some(id.clone());
                self.id_learned = Some(active.generation);
            }
        }
    }

    /// Replace the list with a server snapshot. Entries the server does not
    /// know about yet (no id, or the open conversation) survive.
    pub fn merge_conversations(&mut self, server: Vec<Conversation>) {
        let server_ids: HashSet<ParticipantId> =
            server.iter().filter_map(|c| c.participant_id.clone()).collect();
        let active_name = self.active.as_ref().map(|a| a.participant_username.clone());

        self.conversations.retain(|c| match &c.participant_id {
            None => true,
            Some(id) => {
                server_ids.contains(id)
                    || active_name.as_deref() == Some(c.participant_username.as_str())
            }
        });

        for conversation in &server {
            self.upsert_conversation(&ConversationPatch::from(conversation));
        }
        tracing::debug!("[STORE] conversation list now has {} entries", self.conversations.len());
    }

    /// Record a newly learned participant id everywhere it is missing
    pub fn resolve_participant(&mut self, username: &str, id: ParticipantId) {
        self.upsert_conversation(&ConversationPatch::participant(username, Some(id)));
    }

    /// Case-insensitive match on username or cached display name
    pub fn search(&self, query: &str) -> Vec<Conversation> {
        let query = query.trim().to_lowercase();
        let list = self.conversations();
        if query.is_empty() {
            return list;
        }

        list.into_iter()
            .filter(|c| {
                c.participant_username.to_lowercase().contains(query.as_str())
                    || self
                        .profiles
                        .get(&c.participant_username)
                        .and_then(|p| p.full_name.as_ref())
                        .map(|n| n.to_lowercase().contains(query.as_str()))
                        .unwrap_or(false)
            })
            .collect()
    }

    // ===== Active conversation =====

    pub fn active(&self) -> Option<&ActiveConversation> {
        self.active.as_ref()
    }

    /// Open a conversation, replacing whichever was open
    pub fn set_active(
        &mut self,
        username: &str,
        participant_id: Option<ParticipantId>,
    ) -> Generation {
        let generation = self.bump();
        let participant_id = participant_id.or_else(|| self.participant_id(username));
        self.active = Some(ActiveConversation::new(
            username.to_string(),
            participant_id,
            generation,
        ));
        self.id_learned = None;
        generation
    }

    pub fn clear_active(&mut self) {
        self.bump();
        self.active = None;
        self.id_learned = None;
    }

    /// The open conversation's newly learned participant id, once. Its
    /// history has not been fetched yet.
    pub fn take_learned_id(&mut self) -> Option<(Generation, ParticipantId)> {
        let generation = self.id_learned.take()?;
        let active = self.active.as_ref().filter(|a| a.generation == generation)?;
        Some((generation, active.participant_id.clone()?))
    }

    /// Whether `generation` still identifies the open conversation
    pub fn is_current(&self, generation: Generation) -> bool {
        self.active.as_ref().map(|a| a.generation == generation).unwrap_or(false)
    }

    fn bump(&mut self) -> Generation {
        self.generation += 1;
        Generation(self.generation)
    }

    /// Install a fetched history.
    ///
    /// Local entries the server has not caught up with yet are kept, and so
    /// are server entries newer than anything in the response (confirmed by
    /// an ack or pushed while a lagging replica answered). Returns `None`
    /// when the response is stale, otherwise the local ids it settled.
    pub fn apply_history(
        &mut self,
        generation: Generation,
        history: Vec<ChatMessage>,
    ) -> Option<Vec<Uuid>> {
        if !self.is_current(generation) {
            tracing::debug!("[STORE] dropping stale history for generation {}", generation.value());
            return None;
        }
        let active = self.active.as_mut()?;

        let previous = std::mem::take(&mut active.messages);
        let fetched: HashSet<&MessageId> = history.iter().map(|m| &m.id).collect();
        let newest = history.iter().map(|m| m.timestamp).max();
        let known: HashSet<&MessageId> = previous
            .iter()
            .filter(|m| !m.id.is_local())
            .map(|m| &m.id)
            .collect();
        let mut claimed = vec![false; history.len()];
        let mut settled = Vec::new();
        let mut survivors = Vec::new();

        for message in &previous {
            match &message.id {
                MessageId::Local(uuid) => {
                    // Each newly seen server message confirms at most one local entry
                    let matched = history.iter().enumerate().position(|(i, m)| {
                        !claimed[i] && !known.contains(&m.id) && m.same_payload(message)
                    });
                    match matched {
                        Some(i) => {
                            claimed[i] = true;
                            settled.push(*uuid);
                        }
                        None => survivors.push(message.clone()),
                    }
                }
                MessageId::Server(_) => {
                    let ahead = newest.map(|n| message.timestamp >= n).unwrap_or(true);
                    if !fetched.contains(&message.id) && ahead {
                        survivors.push(message.clone());
                    }
                }
            }
        }
        if survivors.iter().any(|m| !m.id.is_local()) {
            tracing::debug!("[STORE] history is behind, keeping newer server messages");
        }

        active.messages = history;
        active.messages.sort_by_key(|m| m.timestamp);
        for message in survivors {
            active.insert_sorted(message);
        }
        active.loading = false;
        active.error = None;
        Some(settled)
    }

    /// Record a failed history fetch; existing messages stay
    pub fn fail_load(&mut self, generation: Generation, error: impl Into<String>) -> bool {
        if !self.is_current(generation) {
            return false;
        }
        if let Some(active) = self.active.as_mut() {
            active.loading = false;
            active.error = Some(error.into());
        }
        true
    }

    /// Add a message to the open conversation with confirm-replace and dedup
    pub fn append_message(&mut self, message: ChatMessage) -> AppendOutcome {
        let Some(active) = self.active.as_mut() else {
            return AppendOutcome::Ignored;
        };
        if !active.involves(&message) {
            return AppendOutcome::Ignored;
        }

        if message.id.is_local() {
            if active.position(&message.id).is_some() {
                return AppendOutcome::Duplicate;
            }
            active.insert_sorted(message);
            return AppendOutcome::Inserted;
        }

        if let Some(index) = active.position(&message.id) {
            active.messages[index] = message;
            active.messages.sort_by_key(|m| m.timestamp);
            return AppendOutcome::Duplicate;
        }

        // Oldest matching optimistic entry, preferring ones still in flight
        let candidate = active
            .messages
            .iter()
            .enumerate()
            .filter(|(_, m)| m.id.is_local() && m.same_payload(&message))
            .min_by_key(|(i, m)| (m.delivery.is_failed(), *i))
            .map(|(i, _)| i);

        match candidate {
            Some(index) => {
                let local = active.messages.remove(index);
                active.insert_sorted(message);
                match local.id {
                    MessageId::Local(uuid) => AppendOutcome::Replaced { local: uuid },
                    MessageId::Server(_) => AppendOutcome::Inserted,
                }
            }
            None => {
                active.insert_sorted(message);
                AppendOutcome::Inserted
            }
        }
    }

    /// Settle an optimistic entry. With a server copy the local entry is
    /// replaced (or dropped if the copy already arrived by push); without
    /// one it is simply marked confirmed.
    pub fn confirm(&mut self, local: Uuid, server: Option<ChatMessage>) -> AppendOutcome {
        let local_id = MessageId::Local(local);
        let Some(active) = self.active.as_mut() else {
            return AppendOutcome::Ignored;
        };
        let Some(index) = active.position(&local_id) else {
            // Push (or a poll) got there first
            return match server {
                Some(message) => self.append_message(message),
                None => AppendOutcome::Ignored,
            };
        };

        match server {
            Some(mut message) => {
                message.delivery = DeliveryState::Confirmed;
                active.messages.remove(index);
                if active.position(&message.id).is_none() {
                    active.insert_sorted(message);
                }
                AppendOutcome::Replaced { local }
            }
            None => {
                active.messages[index].delivery = DeliveryState::Confirmed;
                AppendOutcome::Duplicate
            }
        }
    }

    /// Update the delivery tag of a local entry
    pub fn mark_delivery(&mut self, local: Uuid, state: DeliveryState) -> bool {
        let id = MessageId::Local(local);
        match self.active.as_mut().and_then(|a| a.messages.iter_mut().find(|m| m.id == id)) {
            Some(message) => {
                message.delivery = state;
                true
            }
            None => false,
        }
    }

    /// Drop a failed local entry the user gave up on
    pub fn discard_failed(&mut self, local: Uuid) -> bool {
        let id = MessageId::Local(local);
        let Some(active) = self.active.as_mut() else {
            return false;
        };
        match active.position(&id) {
            Some(index) if active.messages[index].delivery.is_failed() => {
                active.messages.remove(index);
                true
            }
            _ => false,
        }
    }

    pub fn set_draft(&mut self, text: impl Into<String>) {
        if let Some(active) = self.active.as_mut() {
            active.draft = text.into();
        }
    }

    pub fn take_draft(&mut self) -> String {
        self.active.as_mut().map(|a| std::mem::take(&mut a.draft)).unwrap_or_default()
    }

    pub fn set_active_error(&mut self, error: impl Into<String>) {
        if let Some(active) = self.active.as_mut() {
            active.error = Some(error.into());
        }
    }

    pub fn set_warning(&mut self, warning: impl Into<String>) {
        if let Some(active) = self.active.as_mut() {
            active.warning = Some(warning.into());
        }
    }

    // ===== Session-level state =====

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn set_error(&mut self, error: impl Into<String>) {
        self.error = Some(error.into());
    }

    /// Clear every surfaced error and warning
    pub fn dismiss_errors(&mut self) {
        self.error = None;
        if let Some(active) = self.active.as_mut() {
            active.error = None;
            active.warning = None;
        }
    }

    // ===== Profiles =====

    pub fn profile(&self, username: &str) -> Option<&RecipientProfile> {
        self.profiles.get(username)
    }

    pub fn cache_profile(&mut self, profile: RecipientProfile) {
        self.profiles.insert(profile.username.clone(), profile);
    }
}
