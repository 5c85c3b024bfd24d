//! # Connectivity Monitor
//!
//! Publishes the scheduler's view of the backend connection so the UI can
//! show a banner ("reconnecting...", "offline, polling") without polling
//! the scheduler itself.

use std::fmt;

use tokio::sync::watch;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectivityState {
    /// Scheduler not started
    #[default]
    Idle,
    /// Initial load or first push subscription in progress
    Connecting,
    /// Polling on schedule, or push channel open
    Connected,
    /// Push channel dropped; this is the n-th consecutive reconnect attempt
    Reconnecting { attempt: u32 },
    /// Push gave up; polling instead
    PollingFallback,
    /// No usable credential; the caller should send the user to log in
    Unauthenticated,
    /// Scheduler shut down
    Stopped,
}

impl ConnectivityState {
    pub fn is_online(&self) -> bool {
        matches!(self, Self::Connected | Self::PollingFallback)
    }
}

impl fmt::Display for ConnectivityState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => f.write_str("idle"),
            Self::Connecting => f.write_str("connecting"),
            Self::Connected => f.write_str("connected"),
            Self::Reconnecting { attempt } => write!(f, "reconnecting (attempt {})", attempt),
            Self::PollingFallback => f.write_str("polling fallback"),
            Self::Unauthenticated => f.write_str("unauthenticated"),
            Self::Stopped => f.write_str("stopped"),
        }
    }
}

/// Owner side of the connectivity channel
#[derive(Debug)]
pub struct ConnectivityMonitor {
    sender: watch::Sender<ConnectivityState>,
}

impl Default for ConnectivityMonitor {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectivityMonitor {
    pub fn new() -> Self {
        let (sender, _) = watch::channel(ConnectivityState::Idle);
        Self { sender }
    }

    pub fn get_status(&self) -> ConnectivityState {
        *self.sender.borrow()
    }

    /// Publish a new state; unchanged states do not wake subscribers
    pub fn set_status(&self, state: ConnectivityState) {
        self.sender.send_if_modified(|current| {
            if *current == state {
                return false;
            }
            tracing::debug!("[SYNC] connectivity {} -> {}", current, state);
            *current = state;
            true
        });
    }

    pub fn subscribe(&self) -> watch::Receiver<ConnectivityState> {
        self.sender.subscribe()
    }
}
