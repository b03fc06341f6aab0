use serde_json::json;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use lookout::error::ProviderError;
use lookout::provider::{OpenAiResponsesClient, ResearchProvider, ResearchRequest, RunStatus};

fn request() -> ResearchRequest {
    ResearchRequest {
        model: "o4-mini-deep-research-2025-06-26".to_string(),
        prompt: "latest machine learning papers".to_string(),
    }
}

fn client_for(server: &MockServer) -> OpenAiResponsesClient {
    OpenAiResponsesClient::with_base_url(Some("test-key"), Some(&format!("{}/v1", server.uri())))
}

#[tokio::test]
async fn submit_posts_a_background_run_and_parses_the_response() {
    let server = MockServer::start().await;

    let expected_body = json!({
        "model": "o4-mini-deep-research-2025-06-26",
        "input": [{
            "role": "user",
            "content": [{"type": "input_text", "text": "latest machine learning papers"}]
        }],
        "tools": [{"type": "web_search_preview"}],
        "background": true,
    });

    Mock::given(method("POST"))
        .and(path("/v1/responses"))
        .and(header("authorization", "Bearer test-key"))
        .and(body_json(expected_body))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "resp_123",
            "status": "queued",
        })))
        .expect(1)
        .mount(&server)
        .await;

    let response = client_for(&server)
        .submit(&request())
        .await
        .expect("submit should succeed");

    assert_eq!(response.id, "resp_123");
    assert_eq!(response.status, RunStatus::Queued);
    server.verify().await;
}

#[tokio::test]
async fn retrieve_fetches_a_run_by_id() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v1/responses/resp_42"))
        .and(header("authorization", "Bearer test-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "resp_42",
            "status": "completed",
            "output": [
                {"type": "web_search_call", "id": "ws_1"},
                {"type": "message", "content": [{"type": "output_text", "text": "findings"}]}
            ],
            "usage": {"input_tokens": 1200, "output_tokens": 480}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let response = client_for(&server)
        .retrieve("resp_42")
        .await
        .expect("retrieve should succeed");

    assert_eq!(response.status, RunStatus::Completed);
    assert_eq!(response.primary_text(), Some("findings"));
    assert_eq!(response.web_search_calls(), 1);
    assert_eq!(response.usage_tokens(), (1200, 480));
    server.verify().await;
}

#[tokio::test]
async fn http_429_maps_to_a_retryable_rate_limit() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/responses"))
        .respond_with(
            ResponseTemplate::new(429)
                .set_body_string(r#"{"error": {"message": "Rate limit reached for requests"}}"#),
        )
        .mount(&server)
        .await;

    let err = client_for(&server)
        .submit(&request())
        .await
        .expect_err("429 should be an error");

    assert!(matches!(err, ProviderError::RateLimited { .. }));
    assert!(err.is_rate_limited());
    assert!(err.to_string().contains("Rate limit reached"));
}

#[tokio::test]
async fn http_500_maps_to_a_non_retryable_api_error() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/responses"))
        .respond_with(ResponseTemplate::new(500).set_body_string("upstream exploded"))
        .mount(&server)
        .await;

    let err = client_for(&server)
        .submit(&request())
        .await
        .expect_err("500 should be an error");

    match &err {
        ProviderError::Api { status, message } => {
            assert_eq!(*status, 500);
            assert_eq!(message, "upstream exploded");
        }
        other => panic!("expected Api error, got {other:?}"),
    }
    assert!(!err.is_rate_limited());
}

#[tokio::test]
async fn error_bodies_are_scrubbed_and_truncated() {
    let server = MockServer::start().await;

    let leaky = format!(
        "bad request: key sk-{} was rejected. {}",
        "a".repeat(40),
        "x".repeat(400)
    );
    Mock::given(method("POST"))
        .and(path("/v1/responses"))
        .respond_with(ResponseTemplate::new(400).set_body_string(leaky))
        .mount(&server)
        .await;

    let err = client_for(&server)
        .submit(&request())
        .await
        .expect_err("400 should be an error");

    let rendered = err.to_string();
    assert!(!rendered.contains("sk-a"), "api keys never leave the client");
    assert!(rendered.contains("[REDACTED]"));
    assert!(rendered.ends_with("..."), "long bodies are truncated");
}
