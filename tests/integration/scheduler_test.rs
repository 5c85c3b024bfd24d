//! Scheduler lifecycle and policies on a paused clock

use std::sync::Arc;
use std::time::Duration;

use cheffin_chat::client::config::{ClientConfig, SyncMode};
use cheffin_chat::client::session::Session;
use cheffin_chat::client::sync::ConnectivityState;
use cheffin_chat::client::transport::{ChatTransport, PushChannel, PushEvent};
use cheffin_chat::client::ChatClient;
use cheffin_chat::shared::error::ChatError;
use cheffin_chat::shared::messaging::ParticipantId;
use pretty_assertions::assert_eq;

use crate::assert_chat_err;
use crate::common::*;

fn polling_config() -> ClientConfig {
    ClientConfig::default()
}

fn push_config(threshold: u32) -> ClientConfig {
    ClientConfig {
        sync_mode: SyncMode::Push,
        push_reconnect_threshold: threshold,
        ..ClientConfig::default()
    }
}

fn client(
    config: &ClientConfig,
    session: Arc<Session>,
    transport: &Arc<MockTransport>,
    push: Option<&Arc<MockPush>>,
) -> ChatClient {
    let transport: Arc<dyn ChatTransport> = transport.clone();
    let push = push.map(|p| {
        let push: Arc<dyn PushChannel> = p.clone();
        push
    });
    ChatClient::new(config, session, transport, push)
}

/// Let the background task run; the paused clock jumps ahead when idle
async fn settle(duration: Duration) {
    tokio::time::sleep(duration).await;
}

#[tokio::test(start_paused = true)]
async fn test_polling_refreshes_only_open_conversation() {
    let transport = Arc::new(
        MockTransport::new()
            .with_conversations(vec![conversation("42", JANE, "hi", 1)])
            .with_messages(vec![server_message("j1", JANE, ME, "hi", 1)]),
    );
    let client = client(&polling_config(), signed_in_session().await, &transport, None);

    client.start().unwrap();
    settle(Duration::from_millis(10)).await;
    assert_eq!(transport.conversation_calls(), 1);
    assert_eq!(client.snapshot().await.connectivity, ConnectivityState::Connected);

    // Nothing open: ticks are skipped
    settle(Duration::from_secs(31)).await;
    assert_eq!(transport.conversation_calls(), 1);
    assert_eq!(transport.message_calls(), 0);

    client.open_conversation(JANE).await.unwrap();
    assert_eq!(transport.message_calls(), 1);

    settle(Duration::from_secs(15)).await;
    assert_eq!(transport.conversation_calls(), 2);
    assert_eq!(transport.message_calls(), 2);

    client.shutdown();
    assert_eq!(client.snapshot().await.connectivity, ConnectivityState::Stopped);
    settle(Duration::from_secs(60)).await;
    assert_eq!(transport.message_calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_no_token_means_unauthenticated() {
    let transport = Arc::new(MockTransport::new());
    let client = client(&polling_config(), Arc::new(Session::new()), &transport, None);

    client.start().unwrap();
    settle(Duration::from_millis(10)).await;

    assert_eq!(*client.connectivity().borrow(), ConnectivityState::Unauthenticated);
    assert_eq!(transport.conversation_calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_start_twice_is_rejected() {
    let transport = Arc::new(MockTransport::new());
    let client = client(&polling_config(), signed_in_session().await, &transport, None);

    client.start().unwrap();
    assert_chat_err!(client.start(), InvalidOperation);
    client.shutdown();
}

#[tokio::test(start_paused = true)]
async fn test_push_policy_requires_channel() {
    let transport = Arc::new(MockTransport::new());
    let client = client(&push_config(3), signed_in_session().await, &transport, None);

    assert_chat_err!(client.start(), InvalidOperation);
}

#[tokio::test(start_paused = true)]
async fn test_push_messages_reach_the_store() {
    let transport = Arc::new(MockTransport::new());
    let push = Arc::new(MockPush::new());
    let client = client(&push_config(3), signed_in_session().await, &transport, Some(&push));

    client.start().unwrap();
    settle(Duration::from_millis(10)).await;
    assert_eq!(push.subscribe_count(), 1);

    client.open_conversation(JANE).await.unwrap();
    push.send(PushEvent::Connected).await;
    push.send(PushEvent::NewMessage(server_message("j1", JANE, ME, "Dinner?", 5))).await;
    push.send(PushEvent::NewMessage(server_message("j1", JANE, ME, "Dinner?", 5))).await;
    settle(Duration::from_millis(10)).await;

    let snapshot = client.snapshot().await;
    assert_eq!(snapshot.connectivity, ConnectivityState::Connected);
    assert_eq!(snapshot.conversations.len(), 1);
    assert_eq!(snapshot.conversations[0].last_message, "Dinner?");
    assert_eq!(snapshot.active.unwrap().messages.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_push_reconnects_and_catches_up() {
    let transport = Arc::new(MockTransport::new());
    let push = Arc::new(MockPush::new());
    let client = client(&push_config(3), signed_in_session().await, &transport, Some(&push));

    client.start().unwrap();
    settle(Duration::from_millis(10)).await;
    push.send(PushEvent::Connected).await;
    settle(Duration::from_millis(10)).await;
    let fetched_before = transport.conversation_calls();

    push.disconnect();
    settle(Duration::from_millis(10)).await;
    assert_eq!(
        *client.connectivity().borrow(),
        ConnectivityState::Reconnecting { attempt: 1 }
    );

    // First reconnect delay is one second
    settle(Duration::from_secs(1)).await;
    assert_eq!(push.subscribe_count(), 2);

    push.send(PushEvent::Connected).await;
    settle(Duration::from_millis(10)).await;
    assert_eq!(transport.conversation_calls(), fetched_before + 1);
    assert_eq!(*client.connectivity().borrow(), ConnectivityState::Connected);
}

#[tokio::test(start_paused = true)]
async fn test_push_falls_back_to_polling() {
    let transport =
        Arc::new(MockTransport::new().with_conversations(vec![conversation("42", JANE, "hi", 1)]));
    let push = Arc::new(MockPush::new());
    push.fail_always(ChatError::network("stream refused"));
    let client = client(&push_config(3), signed_in_session().await, &transport, Some(&push));

    client.start().unwrap();
    // Delays of 1s and 2s between the three attempts
    settle(Duration::from_secs(4)).await;

    assert_eq!(push.subscribe_count(), 3);
    assert_eq!(*client.connectivity().borrow(), ConnectivityState::PollingFallback);

    client.open_conversation(JANE).await.unwrap();
    let polled = transport.message_calls();
    settle(Duration::from_secs(15)).await;
    assert_eq!(transport.message_calls(), polled + 1);
}

#[tokio::test(start_paused = true)]
async fn test_push_rejected_credential() {
    let transport = Arc::new(MockTransport::new());
    let push = Arc::new(MockPush::new());
    push.fail_next(ChatError::auth("token revoked"));
    let client = client(&push_config(3), signed_in_session().await, &transport, Some(&push));

    client.start().unwrap();
    settle(Duration::from_millis(10)).await;

    assert_eq!(*client.connectivity().borrow(), ConnectivityState::Unauthenticated);
    assert_eq!(push.subscribe_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_identity_is_awaited_before_first_fetch() {
    let transport = Arc::new(MockTransport::new());
    transport.queue_user(Err(ChatError::not_found("user")));
    transport.queue_user(Ok(chef_marco()));
    let session = token_only_session();
    let client = client(&polling_config(), Arc::clone(&session), &transport, None);

    client.start().unwrap();
    settle(Duration::from_millis(10)).await;
    // Still waiting out the first retry delay
    assert_eq!(transport.conversation_calls(), 0);

    settle(Duration::from_secs(1)).await;
    assert_eq!(session.current_user().await, Some(chef_marco()));
    assert_eq!(transport.conversation_calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_deep_link_right_after_start() {
    let transport = Arc::new(
        MockTransport::new()
            .with_conversations(vec![conversation("42", JANE, "hi", 1)])
            .with_messages(vec![server_message("j1", JANE, ME, "hi", 1)])
            .with_current_user(chef_marco()),
    );
    let client = client(&polling_config(), token_only_session(), &transport, None);

    // What the binary does: start, open the linked user, send
    client.start().unwrap();
    client.open_conversation(JANE).await.unwrap();
    let sent = client.send("Hello").await;
    settle(Duration::from_secs(5)).await;

    assert!(sent.is_ok(), "send failed: {:?}", sent);
    assert_eq!(transport.sent().len(), 1);
    assert!(transport.history_requests().contains(&ParticipantId::new("42")));

    let active = client.snapshot().await.active.unwrap();
    assert_eq!(active.participant_id, Some(ParticipantId::new("42")));
    let contents: Vec<&str> = active.messages.iter().map(|m| m.content.as_str()).collect();
    assert_eq!(contents, vec!["hi", "Hello"]);
}
