//! Chat Message Data Structure
//!
//! Represents a direct message between two users, together with the
//! identifiers and delivery tags the client uses to reconcile optimistic
//! local entries against server-confirmed ones.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use super::profile::CurrentUser;
use crate::shared::error::{ChatError, ChatResult};

/// Wire prefix of client-generated message ids
pub const LOCAL_ID_PREFIX: &str = "temp-";

/// Ids arrive from the backend either as strings or as bare numbers
#[derive(Deserialize)]
#[serde(untagged)]
enum RawId {
    Text(String),
    Number(i64),
}

impl From<RawId> for String {
    fn from(raw: RawId) -> Self {
        match raw {
            RawId::Text(text) => text,
            RawId::Number(n) => n.to_string(),
        }
    }
}

/// Server-assigned identity of a chat participant
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "RawId", into = "String")]
pub struct ParticipantId(String);

impl ParticipantId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<RawId> for ParticipantId {
    fn from(raw: RawId) -> Self {
        Self(raw.into())
    }
}

impl From<ParticipantId> for String {
    fn from(id: ParticipantId) -> Self {
        id.0
    }
}

impl From<&str> for ParticipantId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Message identity: client-generated until the server confirms it
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "RawId", into = "String")]
pub enum MessageId {
    /// Optimistic entry created on submit (`temp-<uuid>` on the wire)
    Local(Uuid),
    /// Id assigned by the backend
    Server(String),
}

impl MessageId {
    /// Generate a fresh local id
    pub fn new_local() -> Self {
        Self::Local(Uuid::new_v4())
    }

    pub fn server(id: impl Into<String>) -> Self {
        Self::Server(id.into())
    }

    pub fn is_local(&self) -> bool {
        matches!(self, Self::Local(_))
    }
}

impl From<String> for MessageId {
    fn from(raw: String) -> Self {
        if let Some(rest) = raw.strip_prefix(LOCAL_ID_PREFIX) {
            if let Ok(uuid) = Uuid::parse_str(rest) {
                return Self::Local(uuid);
            }
        }
        Self::Server(raw)
    }
}

impl From<RawId> for MessageId {
    fn from(raw: RawId) -> Self {
        String::from(raw).into()
    }
}

impl From<MessageId> for String {
    fn from(id: MessageId) -> Self {
        id.to_string()
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local(uuid) => write!(f, "{}{}", LOCAL_ID_PREFIX, uuid),
            Self::Server(id) => f.write_str(id),
        }
    }
}

/// Delivery state of a message as shown to the user
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum DeliveryState {
    /// Appended locally, not yet handed to the transport
    Optimistic,
    /// Send request in flight
    Confirming,
    /// Accepted by the server
    #[default]
    Confirmed,
    /// Rejected; kept visible until the user retries or discards it
    Failed {
        /// Why the send failed
        reason: String,
    },
}

impl DeliveryState {
    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Optimistic | Self::Confirming)
    }
}

/// Represents a chat message
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    /// Local or server message id
    #[serde(alias = "_id")]
    pub id: MessageId,
    /// Sender's participant id, when the server reports it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender_id: Option<ParticipantId>,
    pub sender_username: String,
    /// Recipient's participant id, when the server reports it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recipient_id: Option<ParticipantId>,
    pub recipient_username: String,
    /// Message text, never empty
    pub content: String,
    /// When the message was sent
    #[serde(alias = "createdAt")]
    pub timestamp: DateTime<Utc>,
    /// Client-side delivery tag; server payloads are always confirmed
    #[serde(skip)]
    pub delivery: DeliveryState,
}

impl ChatMessage {
    /// Build the optimistic entry appended the moment the user hits send
    pub fn optimistic(sender: &CurrentUser, recipient_username: &str, content: &str) -> Self {
        Self {
            id: MessageId::new_local(),
            sender_id: Some(sender.id.clone()),
            sender_username: sender.username.clone(),
            recipient_id: None,
            recipient_username: recipient_username.to_string(),
            content: content.to_string(),
            timestamp: Utc::now(),
            delivery: DeliveryState::Optimistic,
        }
    }

    /// Whether two entries describe the same logical message
    pub fn same_payload(&self, other: &ChatMessage) -> bool {
        self.sender_username == other.sender_username
            && self.recipient_username == other.recipient_username
            && self.content == other.content
    }

    /// The other party of the message, seen from `me`
    pub fn counterpart(&self, me: &str) -> (&str, Option<&ParticipantId>) {
        if self.sender_username == me {
            (&self.recipient_username, self.recipient_id.as_ref())
        } else {
            (&self.sender_username, self.sender_id.as_ref())
        }
    }

    /// Get a preview of the message (first N characters)
    pub fn preview(&self, max_len: usize) -> String {
        if self.content.chars().count() <= max_len {
            self.content.clone()
        } else {
            let mut preview: String =
                self.content.chars().take(max_len.saturating_sub(3)).collect();
            preview.push_str("...");
            preview
        }
    }
}

/// Request to send a message
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SendMessageRequest {
    pub recipient_username: String,
    pub content: String,
}

/// Server acknowledgement of a sent message
///
/// The backend either echoes the persisted message, wraps it as
/// `{ "message": {...}, "participantId": ... }`, or returns an empty body.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SendAck {
    /// Persisted message, when echoed
    pub message: Option<ChatMessage>,
    /// Participant id of the recipient, when reported
    pub participant_id: Option<ParticipantId>,
}

impl SendAck {
    /// Interpret an arbitrary acknowledgement body
    pub fn from_value(value: serde_json::Value) -> ChatResult<Self> {
        let Some(object) = value.as_object() else {
            return Ok(Self::default());
        };

        let message = if object.contains_key("content") && object.contains_key("senderUsername") {
            Some(serde_json::from_value::<ChatMessage>(value.clone())?)
        } else {
            match object.get("message") {
                Some(nested) if nested.is_object() => {
                    Some(serde_json::from_value::<ChatMessage>(nested.clone())?)
                }
                _ => None,
            }
        };

        let top_level_id = object
            .get("participantId")
            .or_else(|| object.get("recipientId"))
            .filter(|v| !v.is_null())
            .map(|v| serde_json::from_value::<ParticipantId>(v.clone()))
            .transpose()?;

        let participant_id =
            top_level_id.or_else(|| message.as_ref().and_then(|m| m.recipient_id.clone()));

        Ok(Self {
            message,
            participant_id,
        })
    }

    /// Fail unless the acknowledged message matches what was sent
    pub fn check_matches(&self, request: &SendMessageRequest) -> ChatResult<()> {
        match &self.message {
            Some(message) if message.recipient_username != request.recipient_username => {
                Err(ChatError::serialization(format!(
                    "ack for recipient {} does not match request for {}",
                    message.recipient_username, request.recipient_username
                )))
            }
            _ => Ok(()),
        }
    }
}
