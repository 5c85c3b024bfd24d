//! Conversation Data Structure
//!
//! Represents a direct conversation with one other participant, as listed
//! in the conversations sidebar.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::message::{ChatMessage, ParticipantId};

/// Represents a conversation with another user
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    /// Participant id, absent until the first message persists
    #[serde(default)]
    pub participant_id: Option<ParticipantId>,
    /// Username of the other participant
    #[serde(rename = "username")]
    pub participant_username: String,
    /// Preview text of last message
    #[serde(rename = "lastMessage", default)]
    pub last_message: String,
    /// Timestamp of last message
    #[serde(rename = "timestamp", default)]
    pub last_message_at: Option<DateTime<Utc>>,
}

impl Conversation {
    /// Create an empty conversation known only by username
    pub fn new(participant_username: impl Into<String>) -> Self {
        Self {
            participant_id: None,
            participant_username: participant_username.into(),
            last_message: String::new(),
            last_message_at: None,
        }
    }

    /// Apply a patch; the last message only moves forward in time
    pub fn apply(&mut self, patch: &ConversationPatch) {
        if self.participant_id.is_none() {
            self.participant_id = patch.participant_id.clone();
        }
        if !patch.participant_username.is_empty() {
            self.participant_username = patch.participant_username.clone();
        }
        if let Some(text) = &patch.last_message {
            let newer = match (self.last_message_at, patch.last_message_at) {
                (Some(current), Some(incoming)) => incoming >= current,
                (Some(_), None) => false,
                (None, _) => true,
            };
            if newer {
                self.last_message = text.clone();
                self.last_message_at = patch.last_message_at;
            }
        }
    }

    /// Fold a duplicate entry for the same participant into this one
    pub fn absorb(&mut self, other: Conversation) {
        let patch = ConversationPatch {
            participant_id: other.participant_id,
            participant_username: String::new(),
            last_message: Some(other.last_message),
            last_message_at: other.last_message_at,
        };
        self.apply(&patch);
    }
}

/// Partial update of a conversation, keyed by participant identity
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationPatch {
    pub participant_id: Option<ParticipantId>,
    pub participant_username: String,
    pub last_message: Option<String>,
    pub last_message_at: Option<DateTime<Utc>>,
}

impl ConversationPatch {
    /// Patch that only asserts a participant exists
    pub fn participant(username: impl Into<String>, id: Option<ParticipantId>) -> Self {
        Self {
            participant_id: id,
            participant_username: username.into(),
            last_message: None,
            last_message_at: None,
        }
    }

    /// Patch that records a message as the conversation's latest
    pub fn with_message(mut self, message: &ChatMessage, preview_len: usize) -> Self {
        self.last_message = Some(message.preview(preview_len));
        self.last_message_at = Some(message.timestamp);
        self
    }
}

impl From<&Conversation> for ConversationPatch {
    fn from(conversation: &Conversation) -> Self {
        Self {
            participant_id: conversation.participant_id.clone(),
            participant_username: conversation.participant_username.clone(),
            last_message: Some(conversation.last_message.clone()),
            last_message_at: conversation.last_message_at,
        }
    }
}
