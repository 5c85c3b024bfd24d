//! # Sync Scheduler
//!
//! Drives the engine in the background for one session. Two policies:
//!
//! - **Polling**: load once on start, then on every tick refresh the open
//!   conversation and the conversation list. Ticks with nothing open are
//!   skipped.
//! - **Push**: keep one subscription open and route its messages to the
//!   engine. Dropped channels are reopened with backoff; after too many
//!   consecutive failures the scheduler falls back to polling.
//!
//! The scheduler owns exactly one task. `stop()` or dropping the scheduler
//! aborts it, which also drops any open subscription.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use super::connectivity::{ConnectivityMonitor, ConnectivityState};
use crate::client::config::{ClientConfig, SyncMode};
use crate::client::offline::reconciliation::ReconciliationEngine;
use crate::client::offline::retry::{BackoffStrategy, RetryPolicy};
use crate::client::transport::{PushChannel, PushEvent};
use crate::shared::error::{ChatError, ChatResult};

/// First delay before reopening a dropped push channel
const RECONNECT_BASE_DELAY: Duration = Duration::from_secs(1);
const RECONNECT_MAX_DELAY: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncPolicy {
    Polling {
        interval: Duration,
    },
    Push {
        /// Consecutive failures before switching to polling
        reconnect_threshold: u32,
        /// Delay schedule between reconnect attempts
        backoff: RetryPolicy,
        /// Polling interval once fallen back
        fallback_interval: Duration,
    },
}

impl SyncPolicy {
    pub fn polling(interval: Duration) -> Self {
        Self::Polling { interval }
    }

    pub fn push(reconnect_threshold: u32, fallback_interval: Duration) -> Self {
        Self::Push {
            reconnect_threshold: reconnect_threshold.max(1),
            backoff: RetryPolicy::new(
                reconnect_threshold,
                RECONNECT_BASE_DELAY,
                BackoffStrategy::Exponential {
                    max_delay: RECONNECT_MAX_DELAY,
                },
            ),
            fallback_interval,
        }
    }

    pub fn from_config(config: &ClientConfig) -> Self {
        match config.sync_mode {
            SyncMode::Polling => Self::polling(config.poll_interval()),
            SyncMode::Push => Self::push(config.push_reconnect_threshold, config.poll_interval()),
        }
    }
}

/// Background synchronization for one session
pub struct SyncScheduler {
    engine: Arc<ReconciliationEngine>,
    push: Option<Arc<dyn PushChannel>>,
    policy: SyncPolicy,
    monitor: Arc<ConnectivityMonitor>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for SyncScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncScheduler")
            .field("policy", &self.policy)
            .field("state", &self.monitor.get_status())
            .finish_non_exhaustive()
    }
}

impl SyncScheduler {
    pub fn new(
        engine: Arc<ReconciliationEngine>,
        push: Option<Arc<dyn PushChannel>>,
        policy: SyncPolicy,
    ) -> Self {
        Self {
            engine,
            push,
            policy,
            monitor: Arc::new(ConnectivityMonitor::new()),
            task: Mutex::new(None),
        }
    }

    pub fn policy(&self) -> &SyncPolicy {
        &self.policy
    }

    pub fn connectivity(&self) -> watch::Receiver<ConnectivityState> {
        self.monitor.subscribe()
    }

    pub fn status(&self) -> ConnectivityState {
        self.monitor.get_status()
    }

    pub fn is_running(&self) -> bool {
        let task = self.task.lock().unwrap_or_else(|e| e.into_inner());
        task.as_ref().map(|t| !t.is_finished()).unwrap_or(false)
    }

    /// Spawn the background task. Must be called inside a tokio runtime.
    pub fn start(&self) -> ChatResult<()> {
        let mut task = self.task.lock().unwrap_or_else(|e| e.into_inner());
        if task.as_ref().map(|t| !t.is_finished()).unwrap_or(false) {
            return Err(ChatError::invalid("scheduler is already running"));
        }

        let push = match (&self.policy, &self.push) {
            (SyncPolicy::Push { .. }, None) => {
                return Err(ChatError::invalid("push policy selected without a push channel"));
            }
            (SyncPolicy::Push { .. }, Some(push)) => Some(Arc::clone(push)),
            (SyncPolicy::Polling { .. }, _) => None,
        };

        tracing::info!("[SYNC] starting scheduler ({:?})", self.policy);
        let engine = Arc::clone(&self.engine);
        let monitor = Arc::clone(&self.monitor);
        let policy = self.policy.clone();
        *task = Some(tokio::spawn(run(engine, push, policy, monitor)));
        Ok(())
    }

    /// Abort the background task. Safe to call more than once.
    pub fn stop(&self) {
        let handle = self.task.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(handle) = handle {
            handle.abort();
            tracing::info!("[SYNC] scheduler stopped");
        }
        self.monitor.set_status(ConnectivityState::Stopped);
    }
}

impl Drop for SyncScheduler {
    fn drop(&mut self) {
        let handle = self.task.get_mut().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(handle) = handle {
            handle.abort();
        }
    }
}

async fn run(
    engine: Arc<ReconciliationEngine>,
    push: Option<Arc<dyn PushChannel>>,
    policy: SyncPolicy,
    monitor: Arc<ConnectivityMonitor>,
) {
    monitor.set_status(ConnectivityState::Connecting);

    if let Err(e) = engine.bootstrap().await {
        tracing::warn!("[SYNC] cannot start: {}", e);
        monitor.set_status(ConnectivityState::Unauthenticated);
        return;
    }

    match (policy, push) {
        (SyncPolicy::Push { reconnect_threshold, backoff, fallback_interval }, Some(push)) => {
            push_loop(&engine, push.as_ref(), &monitor, reconnect_threshold, &backoff).await;
            if monitor.get_status() == ConnectivityState::PollingFallback {
                poll_loop(&engine, &monitor, fallback_interval).await;
            }
        }
        (SyncPolicy::Push { fallback_interval, .. }, None)
        | (SyncPolicy::Polling { interval: fallback_interval }, _) => {
            monitor.set_status(ConnectivityState::Connected);
            poll_loop(&engine, &monitor, fallback_interval).await;
        }
    }
}

/// Tick until the task is aborted or the credential is rejected
async fn poll_loop(
    engine: &ReconciliationEngine,
    monitor: &ConnectivityMonitor,
    interval: Duration,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    // The first tick completes immediately; bootstrap already fetched
    ticker.tick().await;

    loop {
        ticker.tick().await;
        match engine.poll_tick().await {
            Ok(()) => {}
            Err(e) if e.is_auth() => {
                tracing::warn!("[SYNC] credential rejected while polling: {}", e);
                monitor.set_status(ConnectivityState::Unauthenticated);
                return;
            }
            Err(e) => tracing::debug!("[SYNC] poll round failed: {}", e),
        }
    }
}

/// Run the push channel until it is abandoned. Returns with the monitor
/// showing either `PollingFallback` or `Unauthenticated`.
async fn push_loop(
    engine: &ReconciliationEngine,
    push: &dyn PushChannel,
    monitor: &ConnectivityMonitor,
    reconnect_threshold: u32,
    backoff: &RetryPolicy,
) {
    let mut failures = 0u32;
    let mut connected_before = false;

    loop {
        match push.subscribe().await {
            Err(e) if e.is_auth() => {
                tracing::warn!("[PUSH] subscription rejected: {}", e);
                monitor.set_status(ConnectivityState::Unauthenticated);
                return;
            }
            Err(e) => tracing::warn!("[PUSH] subscribe failed: {}", e),
            Ok(mut subscription) => {
                while let Some(event) = subscription.next().await {
                    match event {
                        PushEvent::Connected => {
                            if connected_before {
                                catch_up(engine).await;
                            }
                            connected_before = true;
                            failures = 0;
                            monitor.set_status(ConnectivityState::Connected);
                            tracing::info!("[PUSH] channel open");
                        }
                        PushEvent::NewMessage(message) => {
                            let outcome = engine.apply_incoming(message).await;
                            tracing::debug!("[PUSH] incoming message: {:?}", outcome);
                        }
                        PushEvent::Disconnected { reason } => {
                            tracing::warn!("[PUSH] disconnected: {}", reason);
                            break;
                        }
                    }
                }
            }
        }

        failures += 1;
        if failures >= reconnect_threshold {
            tracing::warn!(
                "[PUSH] giving up after {} consecutive failures, falling back to polling",
                failures
            );
            monitor.set_status(ConnectivityState::PollingFallback);
            return;
        }

        monitor.set_status(ConnectivityState::Reconnecting { attempt: failures });
        tokio::time::sleep(backoff.delay_for(failures)).await;
    }
}

/// Fetch whatever was missed while the channel was down
async fn catch_up(engine: &ReconciliationEngine) {
    tracing::info!("[PUSH] reconnected, catching up");
    if let Err(e) = engine.refresh_conversations().await {
        tracing::debug!("[PUSH] catch-up list fetch failed: {}", e);
    }
    if let Err(e) = engine.refresh_active_messages().await {
        tracing::debug!("[PUSH] catch-up history fetch failed: {}", e);
    }
}
