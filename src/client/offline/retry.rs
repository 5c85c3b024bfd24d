//! # Retry Logic and Backoff Strategies
//!
//! One parametrised retry helper used by every fetch, by first-message id
//! resolution, by the identity wait at startup and by push reconnects.
//!
//! ## Features
//!
//! - **Bounded**: a policy always has a finite number of attempts
//! - **Selective**: only errors the caller deems transient are retried
//! - **Backoff**: fixed, linear or capped exponential delays
//!
//! ## Usage
//!
//! ```rust,no_run
//! use cheffin_chat::client::offline::retry::{retry, RetryPolicy};
//!
//! # async fn example(transport: &dyn cheffin_chat::client::transport::ChatTransport) {
//! let policy = RetryPolicy::fetch_default();
//! let conversations =
//!     retry(&policy, "list conversations", |_| transport.list_conversations()).await;
//! # }
//! ```

use crate::shared::error::{ChatError, ChatResult};
use std::future::Future;
use std::time::Duration;

/// How the delay grows between attempts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackoffStrategy {
    /// Same delay before every retry
    Fixed,
    /// `base * attempt`
    Linear,
    /// `base * 2^(attempt - 1)`, capped
    Exponential {
        /// Upper bound for a single delay
        max_delay: Duration,
    },
}

/// Bounded retry policy
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first one
    pub max_attempts: u32,
    /// Delay unit the strategy scales
    pub base_delay: Duration,
    pub strategy: BackoffStrategy,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration, strategy: BackoffStrategy) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            strategy,
        }
    }

    /// Conversation and history fetches: 1s then 2s between three attempts
    pub fn fetch_default() -> Self {
        Self::new(3, Duration::from_secs(1), BackoffStrategy::Linear)
    }

    /// Learning a new conversation's participant id after the first send
    pub fn id_resolution_default() -> Self {
        Self::new(
            3,
            Duration::from_millis(500),
            BackoffStrategy::Exponential {
                max_delay: Duration::from_secs(4),
            },
        )
    }

    /// Waiting for the signed-in user's identity at startup
    pub fn identity_default() -> Self {
        Self::new(4, Duration::from_secs(1), BackoffStrategy::Fixed)
    }

    /// A policy that never retries
    pub fn once() -> Self {
        Self::new(1, Duration::ZERO, BackoffStrategy::Fixed)
    }

    /// Delay after the given failed attempt (1-based)
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let attempt = attempt.max(1);
        match self.strategy {
            BackoffStrategy::Fixed => self.base_delay,
            BackoffStrategy::Linear => self.base_delay.saturating_mul(attempt),
            BackoffStrategy::Exponential { max_delay } => {
                let factor = 2u32.saturating_pow(attempt - 1);
                self.base_delay.saturating_mul(factor).min(max_delay)
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::fetch_default()
    }
}

/// Run `op` until it succeeds, fails with an error `should_retry` rejects,
/// or the policy runs out of attempts. `op` receives the 1-based attempt.
pub async fn retry_when<T, F, Fut, P>(
    policy: &RetryPolicy,
    label: &str,
    mut op: F,
    should_retry: P,
) -> ChatResult<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = ChatResult<T>>,
    P: Fn(&ChatError) -> bool,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        match op(attempt).await {
            Ok(value) => {
                if attempt > 1 {
                    tracing::debug!(
                        "[RETRY] {} succeeded on attempt {}/{}",
                        label,
                        attempt,
                        max_attempts
                    );
                }
                return Ok(value);
            }
            Err(err) if attempt < max_attempts && should_retry(&err) => {
                let delay = policy.delay_for(attempt);
                tracing::warn!(
                    "[RETRY] {} failed (attempt {}/{}): {}; retrying in {:?}",
                    label,
                    attempt,
                    max_attempts,
                    err,
                    delay
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(err) => {
                if attempt > 1 {
                    tracing::warn!(
                        "[RETRY] {} giving up after {} attempts: {}",
                        label,
                        attempt,
                        err
                    );
                }
                return Err(err);
            }
        }
    }
}

/// Retry transient (network) failures only
pub async fn retry<T, F, Fut>(policy: &RetryPolicy, label: &str, op: F) -> ChatResult<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = ChatResult<T>>,
{
    retry_when(policy, label, op, ChatError::is_retryable).await
}
