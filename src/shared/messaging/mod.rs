//! Messaging Module
//!
//! This module contains all the data structures for direct messaging:
//!
//! - `Conversation` - A conversation with another user
//! - `ChatMessage` - A message in a conversation, with its delivery state
//! - `RecipientProfile` / `CurrentUser` - The two sides of a conversation
//!
//! # Usage
//!
//! ```rust
//! use cheffin_chat::shared::messaging::{ChatMessage, Conversation, MessageId};
//! ```

pub mod conversation;
pub mod message;
pub mod profile;

// Re-export all types
pub use conversation::{Conversation, ConversationPatch};
pub use message::{
    ChatMessage, DeliveryState, MessageId, ParticipantId, SendAck, SendMessageRequest,
    LOCAL_ID_PREFIX,
};
pub use profile::{CurrentUser, RecipientProfile};
