//! REST + Server-Sent Events transport
//!
//! Talks to the chat backend over plain HTTP. Every authenticated request
//! carries the session's bearer token; the push channel additionally passes
//! it as a `token` query parameter for proxies that strip headers on
//! long-lived connections.

use std::sync::Arc;

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::header::ACCEPT;
use reqwest::{Client, RequestBuilder, Response, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::mpsc;

use super::sse::SseParser;
use super::{ChatTransport, PushChannel, PushEvent, Subscription};
use crate::client::session::Session;
use crate::shared::config::AppConfig;
use crate::shared::error::{ChatError, ChatResult};
use crate::shared::messaging::{
    ChatMessage, Conversation, CurrentUser, ParticipantId, RecipientProfile, SendAck,
    SendMessageRequest,
};

/// Capacity of the push event buffer between reader task and consumer
const PUSH_BUFFER: usize = 64;

/// HTTP implementation of [`ChatTransport`] and [`PushChannel`]
#[derive(Debug, Clone)]
pub struct HttpTransport {
    config: AppConfig,
    session: Arc<Session>,
    client: Client,
    stream_client: Client,
}

impl HttpTransport {
    pub fn new(config: AppConfig, session: Arc<Session>) -> ChatResult<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| ChatError::network(format!("failed to build HTTP client: {}", e)))?;
        // The stream stays open indefinitely, so only the connect phase is bounded
        let stream_client = Client::builder()
            .connect_timeout(config.request_timeout)
            .build()
            .map_err(|e| ChatError::network(format!("failed to build stream client: {}", e)))?;

        Ok(Self {
            config,
            session,
            client,
            stream_client,
        })
    }

    /// Build an endpoint URL from path segments, percent-encoding each one
    fn url(&self, segments: &[&str]) -> ChatResult<Url> {
        let base = &self.config.server_url;
        let mut url = Url::parse(base)
            .map_err(|e| ChatError::invalid(format!("bad server URL {}: {}", base, e)))?;
        url.path_segments_mut()
            .map_err(|_| ChatError::invalid(format!("server URL {} cannot be a base", base)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn authorized(&self, request: RequestBuilder) -> ChatResult<RequestBuilder> {
        let token = self.session.bearer_token().await?;
        Ok(request.bearer_auth(token))
    }

    async fn get_json<T: DeserializeOwned>(&self, what: &str, url: Url) -> ChatResult<T> {
        let request = self
            .authorized(self.client.get(url).header(ACCEPT, "application/json"))
            .await?;
        let response = request.send().await.map_err(request_error)?;
        let response = check_status(response, what).await?;
        response.json::<T>().await.map_err(|e| undecodable(what, e))
    }
}

#[async_trait]
impl ChatTransport for HttpTransport {
    async fn list_conversations(&self) -> ChatResult<Vec<Conversation>> {
        let body: Value = self
            .get_json("list conversations", self.url(&["chat", "conversations"])?)
            .await?;
        decode_list(body, "conversations")
    }

    async fn list_messages(&self, participant_id: &ParticipantId) -> ChatResult<Vec<ChatMessage>> {
        let body: Value = self
            .get_json("list messages", self.url(&["chat", "messages", participant_id.as_str()])?)
            .await?;
        let mut messages: Vec<ChatMessage> = decode_list(body, "messages")?;
        // Backend promises ascending order; keep the promise even if it slips
        messages.sort_by_key(|m| m.timestamp);
        Ok(messages)
    }

    async fn send_message(&self, request: &SendMessageRequest) -> ChatResult<SendAck> {
        let url = self.url(&["chat", "send"])?;
        let builder = self.authorized(self.client.post(url).json(request)).await?;
        let response = builder.send().await.map_err(request_error)?;
        let response = check_status(response, "send message").await?;

        let text = response.text().await.map_err(request_error)?;
        let body = if text.trim().is_empty() {
            Value::Null
        } else {
            serde_json::from_str(&text).map_err(|e| undecodable("send message", e))?
        };
        let ack = SendAck::from_value(body).map_err(|e| undecodable("send message", e))?;
        ack.check_matches(request)?;
        Ok(ack)
    }

    async fn fetch_profile(&self, username: &str) -> ChatResult<RecipientProfile> {
        let url = self.url(&["users", "profile", username])?;
        // Public endpoint: the token is attached when we have one
        let mut request = self.client.get(url).header(ACCEPT, "application/json");
        if let Ok(token) = self.session.bearer_token().await {
            request = request.bearer_auth(token);
        }
        let response = request.send().await.map_err(request_error)?;
        let response = check_status(response, &format!("profile of {}", username)).await?;
        response
            .json::<RecipientProfile>()
            .await
            .map_err(|e| undecodable(&format!("profile of {}", username), e))
    }

    async fn current_user(&self) -> ChatResult<CurrentUser> {
        self.get_json("current user", self.url(&["users", "profile"])?).await
    }
}

#[async_trait]
impl PushChannel for HttpTransport {
    async fn subscribe(&self) -> ChatResult<Subscription> {
        let token = self.session.bearer_token().await?;
        let mut url = self.url(&["chat", "stream"])?;
        url.query_pairs_mut().append_pair("token", &token);

        tracing::info!("[PUSH] subscribing to {}", self.url(&["chat", "stream"])?);
        let response = self
            .stream_client
            .get(url)
            .bearer_auth(&token)
            .header(ACCEPT, "text/event-stream")
            .send()
            .await
            .map_err(request_error)?;
        let response = check_status(response, "push subscription").await?;

        let (tx, rx) = mpsc::channel(PUSH_BUFFER);
        let reader = tokio::spawn(async move {
            if tx.send(PushEvent::Connected).await.is_err() {
                return;
            }

            let mut stream = response.bytes_stream();
            let mut parser = SseParser::new();
            let reason = loop {
                match stream.next().await {
                    Some(Ok(chunk)) => {
                        for frame in parser.feed(&chunk) {
                            if let Some(event) = frame.into_event() {
                                if tx.send(event).await.is_err() {
                                    // Subscriber went away
                                    return;
                                }
                            }
                        }
                    }
                    Some(Err(e)) => break format!("stream error: {}", e),
                    None => break "stream closed by server".to_string(),
                }
            };

            tracing::warn!("[PUSH] channel dropped: {}", reason);
            let _ = tx.send(PushEvent::Disconnected { reason }).await;
        });

        Ok(Subscription::new(rx, Some(reader)))
    }
}

fn request_error(err: reqwest::Error) -> ChatError {
    if err.is_timeout() {
        ChatError::network(format!("request timed out: {}", err))
    } else {
        ChatError::network(err.to_string())
    }
}

/// A body the client cannot read is treated like a failed exchange
fn undecodable(what: &str, err: impl std::fmt::Display) -> ChatError {
    ChatError::network(format!("{}: undecodable response: {}", what, err))
}

/// Map non-success statuses onto the error taxonomy
async fn check_status(response: Response, what: &str) -> ChatResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let detail = server_message(&body).unwrap_or_else(|| status.to_string());

    Err(match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            ChatError::auth(format!("{}: {}", what, detail))
        }
        StatusCode::NOT_FOUND => ChatError::not_found(format!("{}: {}", what, detail)),
        _ => ChatError::network(format!("{} failed: {} - {}", what, status, detail)),
    })
}

/// The backend reports failures as `{ "message": "..." }`
fn server_message(body: &str) -> Option<String> {
    serde_json::from_str::<Value>(body)
        .ok()?
        .get("message")?
        .as_str()
        .map(str::to_string)
}

/// Decode a JSON array, treating any other shape as an empty list
fn decode_list<T: DeserializeOwned>(body: Value, what: &str) -> ChatResult<Vec<T>> {
    if !body.is_array() {
        tracing::warn!("[SYNC] backend returned non-array response for {}: {}", what, body);
        return Ok(Vec::new());
    }
    serde_json::from_value(body).map_err(|e| undecodable(what, e))
}
