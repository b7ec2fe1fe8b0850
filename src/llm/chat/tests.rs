use super::*;
use serde_json::json;
use std::time::Duration;
use url::Url;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client_for(server: &MockServer) -> ChatClient {
    let provider = ProviderClient::with_base_url(
        Url::parse(&server.uri()).expect("mock server uri should parse"),
        Some("test-key".to_string()),
    )
    .with_retry_delay(Duration::from_millis(10));
    ChatClient::with_provider(provider, "test-chat".to_string(), 0.0)
}

fn completion(content: &str) -> serde_json::Value {
    json!({
        "id": "chatcmpl-1",
        "object": "chat.completion",
        "choices": [{
            "index": 0,
            "message": {"role": "assistant", "content": content},
            "finish_reason": "stop"
        }]
    })
}

#[test]
fn client_configuration() {
    let client = ChatClient::new(&Config::default()).expect("Failed to create client");
    assert_eq!(client.model(), "gpt-4o-mini");
    assert!(client.temperature().abs() < f32::EPSILON);
}

#[tokio::test]
async fn sends_single_user_message_at_zero_temperature() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(body_partial_json(json!({
            "model": "test-chat",
            "temperature": 0.0,
            "messages": [{"role": "user", "content": "What is 2 + 2?"}]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion("4")))
        .expect(1)
        .mount(&server)
        .await;

    let answer = client_for(&server)
        .complete("What is 2 + 2?")
        .expect("completion should succeed");
    assert_eq!(answer, "4");
}

#[tokio::test]
async fn completion_is_trimmed() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion("  November 2.\n")))
        .mount(&server)
        .await;

    let answer = client_for(&server)
        .complete("When?")
        .expect("completion should succeed");
    assert_eq!(answer, "November 2.");
}

#[tokio::test]
async fn no_choices_is_an_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"choices": []})))
        .mount(&server)
        .await;

    let error = client_for(&server)
        .complete("Hello")
        .expect_err("no choices should fail");
    assert!(error.to_string().contains("no choices"));
}

#[tokio::test]
async fn empty_completion_is_an_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{"index": 0, "message": {"role": "assistant", "content": null}}]
        })))
        .mount(&server)
        .await;

    let error = client_for(&server)
        .complete("Hello")
        .expect_err("empty completion should fail");
    assert!(error.to_string().contains("empty completion"));
}

#[tokio::test]
async fn unauthorized_is_reported() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;

    let error = client_for(&server)
        .complete("Hello")
        .expect_err("401 should fail");
    assert!(format!("{error:#}").contains("HTTP 401"));
}
