use serde_json::json;
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use partychat::{ApiClient, ChatBackend, ChatError, Draft, Upload};

fn wire(id: &str, content: &str) -> serde_json::Value {
    json!({
        "id": id,
        "conversationId": "c1",
        "senderId": "u1",
        "content": content,
        "createdAt": "2024-05-01T10:00:00Z"
    })
}

#[tokio::test]
async fn fetches_conversations_with_bearer_token() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/conversations"))
        .and(header("Authorization", "Bearer secret"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [{"id": "c1", "unreadCount": 2}, {"id": "c2"}]
        })))
        .mount(&server)
        .await;

    let client = ApiClient::new(&server.uri(), Some("secret".into()));
    let list = client.fetch_conversations().await.unwrap();
    assert_eq!(list.len(), 2);
    assert_eq!(list[0].unread_count, 2);
}

#[tokio::test]
async fn fetches_a_history_page() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/conversations/c1/messages"))
        .and(query_param("limit", "20"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([wire("m1", "a"), wire("m2", "b")])))
        .mount(&server)
        .await;

    let client = ApiClient::new(&server.uri(), None);
    let page = client.fetch_messages("c1", 20).await.unwrap();
    let ids: Vec<_> = page.iter().filter_map(|m| m.id()).collect();
    assert_eq!(ids, ["m1", "m2"]);
}

#[tokio::test]
async fn submit_returns_the_stored_message() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/conversations/c1/messages"))
        .and(body_json(json!({"content": "hi", "tempId": "tmp-1"})))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"message": wire("m9", "hi")})))
        .mount(&server)
        .await;

    let client = ApiClient::new(&server.uri(), None);
    let stored = client.submit_message("c1", "tmp-1", &Draft::text("hi")).await.unwrap();
    assert_eq!(stored.unwrap().id(), Some("m9"));
}

#[tokio::test]
async fn submit_with_empty_body_is_accepted() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/conversations/c1/messages"))
        .respond_with(ResponseTemplate::new(202))
        .mount(&server)
        .await;

    let client = ApiClient::new(&server.uri(), None);
    let draft = Draft {
        content: None,
        attachment: Some(Upload { file_name: "plan.pdf".into(), bytes: vec![1, 2, 3] }),
    };
    assert!(client.submit_message("c1", "tmp-2", &draft).await.unwrap().is_none());
}

#[tokio::test]
async fn partial_echo_takes_the_conversation_from_the_path() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/conversations/c1/messages"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"id": "m1", "content": "hi"})))
        .mount(&server)
        .await;

    let client = ApiClient::new(&server.uri(), None);
    let stored = client.submit_message("c1", "tmp-4", &Draft::text("hi")).await.unwrap().unwrap();
    assert_eq!(stored.id(), Some("m1"));
    assert_eq!(stored.conversation_id, "c1");
}

#[tokio::test]
async fn unreadable_echo_is_still_accepted() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/conversations/c1/messages"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"id": "m1", "createdAt": {"seconds": 5}})))
        .mount(&server)
        .await;

    let client = ApiClient::new(&server.uri(), None);
    let result = client.submit_message("c1", "tmp-5", &Draft::text("hi")).await;
    assert!(matches!(result, Ok(None)));
}

#[tokio::test]
async fn rejected_submission_reports_the_status() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/conversations/c1/messages"))
        .respond_with(ResponseTemplate::new(422))
        .mount(&server)
        .await;

    let client = ApiClient::new(&server.uri(), None);
    let err = client.submit_message("c1", "tmp-3", &Draft::text("hi")).await.unwrap_err();
    assert!(matches!(err, ChatError::Status(422)));
}

#[tokio::test]
async fn starts_a_conversation_with_a_provider() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/conversations"))
        .and(body_json(json!({"providerId": "p1"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "conversation": {"id": "c5", "participants": {"provider": {"id": "p1", "name": "Balloon Co"}}}
        })))
        .mount(&server)
        .await;

    let client = ApiClient::new(&format!("{}/api/", server.uri()), None);
    let c = client.start_conversation("p1").await.unwrap();
    assert_eq!(c.id, "c5");
    assert_eq!(c.title_for("u1"), "Balloon Co");
}

#[tokio::test]
async fn conversation_without_id_is_an_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/conversations"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
        .mount(&server)
        .await;

    let client = ApiClient::new(&server.uri(), None);
    assert!(matches!(client.start_conversation("p1").await, Err(ChatError::MissingField("id"))));
}
