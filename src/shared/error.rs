//! Shared Error Types
//!
//! This module defines the error taxonomy used by every layer of the chat
//! client: transports produce these errors, the reconciliation engine and
//! scheduler decide from them whether to retry, and the UI decides from
//! them whether to redirect to login or show a dismissable banner.
//!
//! # Error Categories
//!
//! - `Auth` - No credential, or the credential was rejected. Never retried;
//!   the caller is expected to send the user through the login flow.
//! - `Network` - Transport failure. Retried with bounded backoff.
//! - `NotFound` - A referenced participant or profile does not exist.
//! - `InvalidOperation` - Rejected locally before anything hits the wire
//!   (empty message, chatting with yourself, no open conversation).
//! - `Serialization` - The server answered with a body we could not decode.
//!
//! # Usage
//!
//! ```rust
//! use cheffin_chat::shared::error::ChatError;
//!
//! let error = ChatError::invalid("cannot send a message to yourself");
//! assert!(!error.is_retryable());
//! ```
//!
//! # Thread Safety
//!
//! All error types are `Send + Sync` and `Clone`, so they can be stored in
//! the conversation store and handed to UI snapshots.
use thiserror::Error;

/// Convenience alias used throughout the client
pub type ChatResult<T> = Result<T, ChatError>;

/// Errors surfaced by the chat synchronization client
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ChatError {
    /// Missing, expired or rejected credential
    #[error("Authentication error: {message}")]
    Auth {
        /// Human-readable error message
        message: String,
    },

    /// Transient transport failure
    #[error("Network error: {message}")]
    Network {
        /// Human-readable error message
        message: String,
    },

    /// Referenced resource does not exist
    #[error("Not found: {what}")]
    NotFound {
        /// Description of the missing resource
        what: String,
    },

    /// Operation rejected locally
    #[error("Invalid operation: {message}")]
    InvalidOperation {
        /// Human-readable error message
        message: String,
    },

    /// JSON serialization or deserialization error
    #[error("Serialization error: {message}")]
    Serialization {
        /// Human-readable error message
        message: String,
    },
}

impl ChatError {
    /// Create a new authentication error
    pub fn auth(message: impl Into<String>) -> Self {
        Self::Auth {
            message: message.into(),
        }
    }

    /// Create a new network error
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
        }
    }

    /// Create a new not-found error
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound { what: what.into() }
    }

    /// Create a new invalid-operation error
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidOperation {
            message: message.into(),
        }
    }

    /// Create a new serialization error
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization {
            message: message.into(),
        }
    }

    /// Whether a retry has any chance of succeeding
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Network { .. })
    }

    pub fn is_auth(&self) -> bool {
        matches!(self, Self::Auth { .. })
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    pub fn is_invalid(&self) -> bool {
        matches!(self, Self::InvalidOperation { .. })
    }
}

impl From<serde_json::Error> for ChatError {
    fn from(err: serde_json::Error) -> Self {
        Self::serialization(format!("JSON error: {}", err))
    }
}
