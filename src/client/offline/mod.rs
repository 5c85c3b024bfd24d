//! # Optimistic Messaging
//!
//! Everything between "user pressed send" and "the server agrees":
//!
//! - `optimistic.rs`: ledger of sends not yet acknowledged
//! - `retry.rs`: bounded retry and backoff shared by every fetch
//! - `reconciliation.rs`: the engine that merges local and server state
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use cheffin_chat::client::offline::{EnginePolicies, ReconciliationEngine};
//! # use cheffin_chat::client::{session::Session, transport::ChatTransport};
//!
//! # async fn example(transport: Arc<dyn ChatTransport>, session: Arc<Session>) {
//! let engine = ReconciliationEngine::new(transport, session, EnginePolicies::default());
//! engine.bootstrap().await.ok();
//! engine.open_conversation("chefJane").await.ok();
//! engine.send_message("Hello").await.ok();
//! # }
//! ```

pub mod optimistic;
pub mod reconciliation;
pub mod retry;

pub use optimistic::{OptimisticManager, PendingSend};
pub use reconciliation::{EnginePolicies, ReconciliationEngine, ID_UNRESOLVED, USER_NOT_LOADED};
pub use retry::{retry, retry_when, BackoffStrategy, RetryPolicy};
