//! HTTP transport against a local mock server

use std::sync::Arc;

use cheffin_chat::client::session::{Credential, Session};
use cheffin_chat::client::transport::{ChatTransport, HttpTransport, PushChannel, PushEvent};
use cheffin_chat::shared::config::AppConfig;
use cheffin_chat::shared::messaging::{MessageId, ParticipantId, SendMessageRequest};
use pretty_assertions::assert_eq;
use serde_json::json;
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::assert_chat_err;
use crate::common::*;

fn transport(server: &MockServer, session: Session) -> HttpTransport {
    let config = AppConfig::builder().server_url(server.uri()).build().unwrap();
    HttpTransport::new(config, Arc::new(session)).unwrap()
}

fn signed_in() -> Session {
    Session::with_credential(Credential::new("jwt"))
}

fn message_json(id: &str, from: &str, to: &str, content: &str) -> serde_json::Value {
    json!({
        "_id": id,
        "senderUsername": from,
        "recipientUsername": to,
        "content": content,
        "createdAt": "2024-05-01T10:00:05Z"
    })
}

#[tokio::test]
async fn test_list_conversations_sends_bearer_token() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/chat/conversations"))
        .and(header("authorization", "Bearer jwt"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {
                "participantId": 42,
                "username": JANE,
                "lastMessage": "Hello",
                "timestamp": "2024-05-01T10:00:05Z"
            },
            { "username": LUIGI }
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let list = transport(&server, signed_in()).list_conversations().await.unwrap();

    assert_eq!(list.len(), 2);
    assert_eq!(list[0].participant_id, Some(ParticipantId::new("42")));
    assert_eq!(list[0].last_message, "Hello");
    assert_eq!(list[1].participant_id, None);
}

#[tokio::test]
async fn test_non_array_body_is_empty_list() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/chat/conversations"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "conversations": null })))
        .mount(&server)
        .await;

    let list = transport(&server, signed_in()).list_conversations().await.unwrap();
    assert!(list.is_empty());
}

#[tokio::test]
async fn test_history_is_sorted() {
    let server = MockServer::start().await;
    let mut late = message_json("m2", JANE, ME, "later");
    late["createdAt"] = json!("2024-05-01T10:09:00Z");
    Mock::given(method("GET"))
        .and(path("/chat/messages/42"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!([late, message_json("m1", ME, JANE, "first")])),
        )
        .mount(&server)
        .await;

    let history = transport(&server, signed_in())
        .list_messages(&ParticipantId::new("42"))
        .await
        .unwrap();

    assert_eq!(history.len(), 2);
    assert_eq!(history[0].id, MessageId::server("m1"));
    assert!(history.iter().all(|m| !m.delivery.is_pending()));
}

#[tokio::test]
async fn test_send_message_reads_wrapped_ack() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/send"))
        .and(header("authorization", "Bearer jwt"))
        .and(body_json(json!({ "recipientUsername": JANE, "content": "Hello" })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "message": message_json("m1", ME, JANE, "Hello"),
            "participantId": "42"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let ack = transport(&server, signed_in())
        .send_message(&SendMessageRequest {
            recipient_username: JANE.to_string(),
            content: "Hello".to_string(),
        })
        .await
        .unwrap();

    assert_eq!(ack.participant_id, Some(ParticipantId::new("42")));
    assert_eq!(ack.message.unwrap().id, MessageId::server("m1"));
}

#[tokio::test]
async fn test_send_accepts_empty_body() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/send"))
        .respond_with(ResponseTemplate::new(204))
        .mount(&server)
        .await;

    let ack = transport(&server, signed_in())
        .send_message(&SendMessageRequest {
            recipient_username: JANE.to_string(),
            content: "Hello".to_string(),
        })
        .await
        .unwrap();

    assert!(ack.message.is_none());
    assert!(ack.participant_id.is_none());
}

#[tokio::test]
async fn test_status_mapping() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/chat/conversations"))
        .respond_with(
            ResponseTemplate::new(401).set_body_json(json!({ "message": "Token expired" })),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/users/profile/ghost"))
        .respond_with(
            ResponseTemplate::new(404).set_body_json(json!({ "message": "User not found" })),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/chat/messages/42"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let transport = transport(&server, signed_in());
    assert_chat_err!(transport.list_conversations().await, Auth);
    assert_chat_err!(transport.fetch_profile("ghost").await, NotFound);
    assert_chat_err!(transport.list_messages(&ParticipantId::new("42")).await, Network);
}

#[tokio::test]
async fn test_undecodable_body_is_network_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/users/profile"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>maintenance</html>"))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/chat/send"))
        .respond_with(ResponseTemplate::new(200).set_body_string("{truncated"))
        .mount(&server)
        .await;

    let transport = transport(&server, signed_in());
    let result = transport.current_user().await;
    assert!(result.as_ref().unwrap_err().is_retryable());
    assert_chat_err!(result, Network);

    let request = SendMessageRequest {
        recipient_username: JANE.to_string(),
        content: "Hello".to_string(),
    };
    assert_chat_err!(transport.send_message(&request).await, Network);
}

#[tokio::test]
async fn test_missing_token_never_hits_the_network() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(0)
        .mount(&server)
        .await;

    let transport = transport(&server, Session::new());
    assert_chat_err!(transport.list_conversations().await, Auth);
    assert_chat_err!(transport.subscribe().await, Auth);
}

#[tokio::test]
async fn test_unreachable_server_is_network_error() {
    let config = AppConfig::builder().server_url("http://127.0.0.1:9").build().unwrap();
    let transport = HttpTransport::new(config, Arc::new(signed_in())).unwrap();

    assert_chat_err!(transport.current_user().await, Network);
}

#[tokio::test]
async fn test_profile_lookup() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/users/profile/chefJane"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "username": JANE,
            "_id": "42",
            "fullName": "Jane Doe",
            "isChef": true
        })))
        .mount(&server)
        .await;

    let profile = transport(&server, signed_in()).fetch_profile(JANE).await.unwrap();
    assert_eq!(profile.display_name(), "Jane Doe");
    assert!(profile.is_chef);
}

#[tokio::test]
async fn test_push_stream_delivers_messages() {
    let server = MockServer::start().await;
    let body = format!(
        ": keep-alive\n\nevent: new_message\ndata: {}\n\n",
        message_json("m7", JANE, ME, "Dinner?")
    );
    Mock::given(method("GET"))
        .and(path("/chat/stream"))
        .and(query_param("token", "jwt"))
        .and(header("authorization", "Bearer jwt"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
        .mount(&server)
        .await;

    let mut subscription = transport(&server, signed_in()).subscribe().await.unwrap();

    assert_eq!(subscription.next().await, Some(PushEvent::Connected));
    match subscription.next().await {
        Some(PushEvent::NewMessage(message)) => {
            assert_eq!(message.id, MessageId::server("m7"));
            assert_eq!(message.content, "Dinner?");
        }
        other => panic!("expected a message, got {:?}", other),
    }
    // Body ends, so the channel reports the drop
    assert!(matches!(subscription.next().await, Some(PushEvent::Disconnected { .. })));
    assert_eq!(subscription.next().await, None);
}
