//! Cheffin Chat - client core
//!
//! Direct messaging between users of the chef discovery app, without the
//! screens. The crate keeps a conversation list and the open conversation's
//! history consistent with a remote REST backend while the user types:
//! messages appear instantly, are confirmed or flagged when the server
//! answers, and never show up twice regardless of whether the server copy
//! arrives via the send acknowledgement, the push channel or a poll.
//!
//! # Module Structure
//!
//! - **`shared`** - wire model, error taxonomy, connection config
//!   - `Conversation`, `ChatMessage`, `MessageId`, `DeliveryState`
//!   - `ChatError` / `ChatResult`
//!   - `AppConfig` builder
//!
//! - **`client`** - the moving parts
//!   - `transport`: `ChatTransport` / `PushChannel`, HTTP + SSE implementation
//!   - `store`: `ConversationStore`
//!   - `offline`: `ReconciliationEngine`, optimistic sends, retry policies
//!   - `sync`: `SyncScheduler` with polling and push policies
//!   - `ChatClient` facade and `ChatSnapshot`
//!
//! # Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use cheffin_chat::client::{config::ClientConfig, session::{Credential, Session}, ChatClient};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ClientConfig::load()?;
//! let session = Arc::new(Session::with_credential(Credential::new("jwt")));
//! let client = ChatClient::connect(&config, session)?;
//! client.start()?;
//!
//! client.open_conversation("chefJane").await?;
//! client.send("Are you free on Saturday?").await?;
//!
//! let snapshot = client.snapshot().await;
//! println!("{} conversations", snapshot.conversations.len());
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod shared;
