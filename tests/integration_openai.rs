#![expect(
    clippy::tests_outside_test_module,
    reason = "integration tests are only compiled in test mode"
)]

// Embeddings client tests against a mock OpenAI-compatible server

use pdf_rag::RagError;
use pdf_rag::config::{ApiKey, Config};
use pdf_rag::embeddings::{Embedder, OpenAiClient};
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const TEST_KEY: &str = "sk-integration-000000000000";

fn test_config(server: &MockServer) -> Config {
    let mut config = Config {
        api_key: Some(ApiKey::new(TEST_KEY)),
        ..Config::default()
    };
    config.embedding.api_base = format!("{}/v1", server.uri());
    config.embedding.model = "text-embedding-ada-002".to_string();
    config.embedding.batch_size = 2;
    config
}

fn embedding_body(vectors: &[Vec<f32>]) -> serde_json::Value {
    let data: Vec<_> = vectors
        .iter()
        .enumerate()
        .map(|(index, embedding)| {
            json!({"object": "embedding", "index": index, "embedding": embedding})
        })
        .collect();
    json!({
        "object": "list",
        "data": data,
        "model": "text-embedding-ada-002",
        "usage": {"prompt_tokens": 1, "total_tokens": 1}
    })
}

async fn mount_model(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/v1/models/text-embedding-ada-002"))
        .and(header("Authorization", format!("Bearer {}", TEST_KEY).as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "text-embedding-ada-002",
            "object": "model",
            "created": 1_671_217_299,
            "owned_by": "openai-internal"
        })))
        .mount(server)
        .await;
}

#[tokio::test(flavor = "multi_thread")]
async fn connect_validates_model() {
    let server = MockServer::start().await;
    mount_model(&server).await;
    let config = test_config(&server);

    let result = tokio::task::spawn_blocking(move || OpenAiClient::connect(&config))
        .await
        .expect("blocking task should complete");

    assert!(result.is_ok(), "connect failed: {:?}", result.err());
}

#[tokio::test(flavor = "multi_thread")]
async fn unknown_model_fails_with_model_init() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/models/text-embedding-ada-002"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({
            "error": {"message": "The model does not exist", "type": "invalid_request_error"}
        })))
        .expect(1)
        .mount(&server)
        .await;
    let config = test_config(&server);

    let result = tokio::task::spawn_blocking(move || OpenAiClient::connect(&config))
        .await
        .expect("blocking task should complete");

    assert!(matches!(result, Err(RagError::ModelInit(_))));
}

#[tokio::test(flavor = "multi_thread")]
async fn embed_many_batches_and_preserves_order() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/embeddings"))
        .and(header("Authorization", format!("Bearer {}", TEST_KEY).as_str()))
        .and(body_partial_json(json!({"input": ["first", "second"]})))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(embedding_body(&[vec![1.0, 0.0], vec![0.0, 1.0]])),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/embeddings"))
        .and(body_partial_json(json!({"input": ["third"]})))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(embedding_body(&[vec![0.5, 0.5]])),
        )
        .expect(1)
        .mount(&server)
        .await;

    let config = test_config(&server);
    let texts = vec!["first".to_string(), "second".to_string(), "third".to_string()];

    let result = tokio::task::spawn_blocking(move || {
        let client = OpenAiClient::new(&config)?.with_retry_attempts(1);
        client.embed_many(&texts)
    })
    .await
    .expect("blocking task should complete");

    let embeddings = result.expect("should generate embeddings");
    assert_eq!(embeddings, vec![vec![1.0, 0.0], vec![0.0, 1.0], vec![0.5, 0.5]]);
}

#[tokio::test(flavor = "multi_thread")]
async fn embed_one_returns_single_vector() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/embeddings"))
        .and(body_partial_json(json!({
            "model": "text-embedding-ada-002",
            "input": ["What is a vector store?"]
        })))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(embedding_body(&[vec![0.1, 0.2, 0.3]])),
        )
        .mount(&server)
        .await;
    let config = test_config(&server);

    let result = tokio::task::spawn_blocking(move || {
        let client = OpenAiClient::new(&config)?.with_retry_attempts(1);
        client.embed_one("What is a vector store?")
    })
    .await
    .expect("blocking task should complete");

    assert_eq!(result.expect("should embed query"), vec![0.1, 0.2, 0.3]);
}

#[tokio::test(flavor = "multi_thread")]
async fn unauthorized_is_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/embeddings"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "error": {"message": "Incorrect API key provided", "type": "invalid_request_error"}
        })))
        .expect(1)
        .mount(&server)
        .await;
    let config = test_config(&server);

    let result = tokio::task::spawn_blocking(move || {
        let client = OpenAiClient::new(&config)?.with_retry_attempts(3);
        client.embed_many(&["text".to_string()])
    })
    .await
    .expect("blocking task should complete");

    assert!(matches!(result, Err(RagError::Embedding(_))));
}

#[tokio::test(flavor = "multi_thread")]
async fn server_errors_are_retried() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/embeddings"))
        .respond_with(ResponseTemplate::new(503))
        .expect(2)
        .mount(&server)
        .await;
    let config = test_config(&server);

    let result = tokio::task::spawn_blocking(move || {
        let client = OpenAiClient::new(&config)?.with_retry_attempts(2);
        client.embed_many(&["text".to_string()])
    })
    .await
    .expect("blocking task should complete");

    assert!(matches!(result, Err(RagError::Embedding(_))));
}

#[tokio::test(flavor = "multi_thread")]
async fn malformed_response_is_embedding_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/embeddings"))
        .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
        .mount(&server)
        .await;
    let config = test_config(&server);

    let result = tokio::task::spawn_blocking(move || {
        let client = OpenAiClient::new(&config)?.with_retry_attempts(1);
        client.embed_many(&["text".to_string()])
    })
    .await
    .expect("blocking task should complete");

    assert!(matches!(result, Err(RagError::Embedding(_))));
}

#[tokio::test(flavor = "multi_thread")]
async fn large_batch_response_exceeds_default_body_limit() {
    const INPUTS: usize = 700;
    const DIMENSION: usize = 1536;

    // Full-precision components, as the real API returns them
    let vector = vec!["-0.012345678"; DIMENSION].join(",");
    let data: Vec<String> = (0..INPUTS)
        .map(|index| {
            format!(
                r#"{{"object":"embedding","index":{},"embedding":[{}]}}"#,
                index, vector
            )
        })
        .collect();
    let body = format!(
        r#"{{"object":"list","data":[{}],"model":"text-embedding-ada-002"}}"#,
        data.join(",")
    );
    assert!(body.len() > 10 * 1024 * 1024, "body is {} bytes", body.len());

    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/embeddings"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("Content-Type", "application/json")
                .set_body_string(body),
        )
        .expect(1)
        .mount(&server)
        .await;

    let mut config = test_config(&server);
    config.embedding.dimension = DIMENSION as u32;
    config.embedding.batch_size = INPUTS as u32;
    let texts: Vec<String> = (0..INPUTS).map(|i| format!("chunk {}", i)).collect();

    let result = tokio::task::spawn_blocking(move || {
        let client = OpenAiClient::new(&config)?.with_retry_attempts(1);
        client.embed_many(&texts)
    })
    .await
    .expect("blocking task should complete");

    let embeddings = result.expect("large batch should be accepted");
    assert_eq!(embeddings.len(), INPUTS);
    assert!(embeddings.iter().all(|e| e.len() == DIMENSION));
}
