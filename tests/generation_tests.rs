use galley::config::GenerationConfig;
use galley::error::GenerationError;
use galley::generate::GenerationClient;
use galley::models::GenerationRequest;
use serde_json::json;
use wiremock::matchers::{body_string_contains, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn request() -> GenerationRequest {
    GenerationRequest {
        keyword: "bamboo flooring".to_string(),
        host_niche: "home improvement".to_string(),
        target_url: "https://floors.example/guide".to_string(),
        anchor_text: "bamboo flooring guide".to_string(),
        target_niche: "flooring retail".to_string(),
    }
}

fn client(server: &MockServer) -> GenerationClient {
    let config = GenerationConfig {
        endpoint: server.uri(),
        model: "test-model".to_string(),
        ..GenerationConfig::default()
    };
    GenerationClient::new(config).expect("client")
}

const GENERATE_PATH: &str = "/v1beta/models/test-model:generateContent";

fn completion(text: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "candidates": [{ "content": { "parts": [{ "text": text }] } }]
    }))
}

fn provider_error(status: u16, message: &str) -> ResponseTemplate {
    ResponseTemplate::new(status).set_body_json(json!({
        "error": { "message": message }
    }))
}

#[tokio::test]
async fn first_working_key_is_used_and_prompt_carries_the_keyword() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(GENERATE_PATH))
        .and(query_param("key", "alpha"))
        .and(body_string_contains("bamboo flooring"))
        .respond_with(completion(
            "# Bamboo Flooring\n\nSee [bamboo flooring guide](https://floors.example/guide).",
        ))
        .expect(1)
        .mount(&server)
        .await;

    let keys = vec!["alpha".to_string(), "beta".to_string()];
    let text = client(&server)
        .generate(&request(), &keys)
        .await
        .expect("generation");

    assert!(text.starts_with("# Bamboo Flooring"));
    assert_eq!(server.received_requests().await.unwrap().len(), 1);
}

#[tokio::test]
async fn rejected_key_rotates_to_the_next_one() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(GENERATE_PATH))
        .and(query_param("key", "alpha"))
        .respond_with(provider_error(403, "API key not valid"))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(GENERATE_PATH))
        .and(query_param("key", "beta"))
        .respond_with(completion("# Draft\n\nbody"))
        .expect(1)
        .mount(&server)
        .await;

    let keys = vec!["alpha".to_string(), "beta".to_string()];
    let text = client(&server)
        .generate(&request(), &keys)
        .await
        .expect("generation");

    assert!(text.contains("body"));
}

#[tokio::test]
async fn empty_completion_rotates_like_a_failure() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(GENERATE_PATH))
        .and(query_param("key", "alpha"))
        .respond_with(completion("   "))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(GENERATE_PATH))
        .and(query_param("key", "beta"))
        .respond_with(completion("# Draft\n\nreal text"))
        .expect(1)
        .mount(&server)
        .await;

    let keys = vec!["alpha".to_string(), "beta".to_string()];
    let text = client(&server)
        .generate(&request(), &keys)
        .await
        .expect("generation");
    assert!(text.contains("real text"));
}

#[tokio::test]
async fn no_keys_fails_without_any_request() {
    let server = MockServer::start().await;

    let err = client(&server)
        .generate(&request(), &[])
        .await
        .expect_err("should fail");

    assert!(matches!(err, GenerationError::NoApiKeys));
    assert!(err.to_string().contains("galley key add"));
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn exhausted_keys_return_the_last_provider_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(GENERATE_PATH))
        .and(query_param("key", "alpha"))
        .respond_with(provider_error(429, "rate limited"))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(GENERATE_PATH))
        .and(query_param("key", "beta"))
        .respond_with(provider_error(500, "backend exploded"))
        .expect(1)
        .mount(&server)
        .await;

    let keys = vec!["alpha".to_string(), "beta".to_string()];
    let err = client(&server)
        .generate(&request(), &keys)
        .await
        .expect_err("should fail");

    match err {
        GenerationError::Provider { status, message } => {
            assert_eq!(status, 500);
            assert_eq!(message, "backend exploded");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn plain_text_error_body_is_reported_verbatim() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(GENERATE_PATH))
        .respond_with(ResponseTemplate::new(503).set_body_string("upstream timeout"))
        .expect(1)
        .mount(&server)
        .await;

    let keys = vec!["alpha".to_string()];
    let err = client(&server)
        .generate(&request(), &keys)
        .await
        .expect_err("should fail");

    match err {
        GenerationError::Provider { status, message } => {
            assert_eq!(status, 503);
            assert_eq!(message, "upstream timeout");
        }
        other => panic!("unexpected error: {other}"),
    }
}
