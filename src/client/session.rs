//! Session context
//!
//! Holds the bearer credential and the signed-in user's identity. A single
//! `Session` is created by the embedding application and handed to the
//! transport and the engine at construction; nothing reads credentials
//! from global state.

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::shared::error::{ChatError, ChatResult};
use crate::shared::messaging::CurrentUser;

/// Bearer token plus optional expiry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credential {
    pub token: String,
    pub expires_at: Option<DateTime<Utc>>,
}

impl Credential {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            expires_at: None,
        }
    }

    pub fn expiring_at(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.map(|exp| exp <= now).unwrap_or(false)
    }
}

#[derive(Debug, Default)]
struct SessionState {
    credential: Option<Credential>,
    current_user: Option<CurrentUser>,
}

/// Shared authentication context
#[derive(Debug, Default)]
pub struct Session {
    state: RwLock<SessionState>,
}

impl Session {
    /// Create a signed-out session
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a session with a credential but no identity yet
    pub fn with_credential(credential: Credential) -> Self {
        Self {
            state: RwLock::new(SessionState {
                credential: Some(credential),
                current_user: None,
            }),
        }
    }

    pub async fn set_credential(&self, credential: Option<Credential>) {
        self.state.write().await.credential = credential;
    }

    pub async fn set_current_user(&self, user: Option<CurrentUser>) {
        self.state.write().await.current_user = user;
    }

    /// Current bearer token, or `Auth` if absent or expired
    pub async fn bearer_token(&self) -> ChatResult<String> {
        let state = self.state.read().await;
        match &state.credential {
            None => Err(ChatError::auth("no credential present, please log in")),
            Some(credential) if credential.is_expired(Utc::now()) => {
                Err(ChatError::auth("credential expired, please log in again"))
            }
            Some(credential) => Ok(credential.token.clone()),
        }
    }

    pub async fn current_user(&self) -> Option<CurrentUser> {
        self.state.read().await.current_user.clone()
    }

    pub async fn is_authenticated(&self) -> bool {
        self.bearer_token().await.is_ok()
    }

    /// Forget credential and identity (logout or rejected token)
    pub async fn clear(&self) {
        let mut state = self.state.write().await;
        state.credential = None;
        state.current_user = None;
    }
}
