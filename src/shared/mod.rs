//! Shared Module
//!
//! Types shared by every layer of the chat client: the wire model exchanged
//! with the backend, the error taxonomy and the validated connection
//! configuration. Nothing in here performs I/O.

/// Messaging types (conversations, messages, profiles)
pub mod messaging;

/// Shared error types
pub mod error;

/// Application configuration
pub mod config;

/// Re-export commonly used types for convenience
pub use config::{AppConfig, AppConfigBuilder, ConfigError};
pub use error::{ChatError, ChatResult};
