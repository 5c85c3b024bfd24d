//! # Background Synchronization
//!
//! - `scheduler.rs`: polling and push policies, task lifecycle
//! - `connectivity.rs`: connection state published to the UI

pub mod connectivity;
pub mod scheduler;

pub use connectivity::{ConnectivityMonitor, ConnectivityState};
pub use scheduler::{SyncPolicy, SyncScheduler};
