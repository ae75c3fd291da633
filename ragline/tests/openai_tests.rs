//! OpenAI-compatible clients against an in-process mock server.
#![cfg(feature = "openai")]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::post;
use axum::{Json, Router};
use ragline::openai::{OpenAIEmbeddingClient, OpenAIGenerationClient};
use ragline::{
    Deadline, EmbeddingClient, ErrorKind, GenerationClient, GenerationParams, Prompt, Role,
};
use serde_json::{Value, json};

/// Request bodies and `Authorization` headers seen by the mock server.
type Seen = Arc<Mutex<Vec<(Value, Option<String>)>>>;

async fn spawn_server(path: &str, status: StatusCode, body: Value) -> (String, Seen) {
    let seen: Seen = Arc::default();
    let recorder = seen.clone();
    let app = Router::new().route(
        path,
        post(move |headers: HeaderMap, Json(request): Json<Value>| {
            let recorder = recorder.clone();
            let body = body.clone();
            async move {
                let auth = headers
                    .get("authorization")
                    .and_then(|v| v.to_str().ok())
                    .map(str::to_string);
                recorder.lock().unwrap().push((request, auth));
                (status, Json(body)).into_response()
            }
        }),
    );

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind test listener");
    let addr = listener.local_addr().expect("listener addr");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("server run");
    });
    (format!("http://{addr}/v1"), seen)
}

fn deadline() -> Deadline {
    Deadline::after(Duration::from_secs(5))
}

fn prompt() -> Prompt {
    Prompt::new(GenerationParams::default())
        .with_turn(Role::System, "Answer in English.")
        .with_turn(Role::User, "Question: hi")
}

fn chat_reply(choices: Value) -> Value {
    json!({"id": "chatcmpl-1", "object": "chat.completion", "choices": choices})
}

#[tokio::test]
async fn embeddings_are_reordered_by_index() {
    let (base, seen) = spawn_server(
        "/v1/embeddings",
        StatusCode::OK,
        json!({
            "object": "list",
            "data": [
                {"object": "embedding", "index": 1, "embedding": [0.0, 1.0]},
                {"object": "embedding", "index": 0, "embedding": [1.0, 0.0]}
            ]
        }),
    )
    .await;
    let client = OpenAIEmbeddingClient::new(&base, "text-embedding-3-small")
        .unwrap()
        .with_api_key("sk-test")
        .with_dimensions(2);

    let vectors = client.embed_batch(&["first", "second"], &deadline()).await.unwrap();

    assert_eq!(vectors, vec![vec![1.0, 0.0], vec![0.0, 1.0]]);
    let seen = seen.lock().unwrap();
    let (request, auth) = &seen[0];
    assert_eq!(auth.as_deref(), Some("Bearer sk-test"));
    assert_eq!(request["model"], "text-embedding-3-small");
    assert_eq!(request["input"], json!(["first", "second"]));
    assert_eq!(request["dimensions"], 2);
}

#[tokio::test]
async fn duplicate_indices_are_upstream_error() {
    let (base, _) = spawn_server(
        "/v1/embeddings",
        StatusCode::OK,
        json!({"data": [
            {"index": 0, "embedding": [1.0]},
            {"index": 0, "embedding": [2.0]}
        ]}),
    )
    .await;
    let client = OpenAIEmbeddingClient::new(&base, "text-embedding-3-small").unwrap();

    let err = client.embed_batch(&["a", "b"], &deadline()).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UpstreamError);
}

#[tokio::test]
async fn local_server_gets_no_authorization_header() {
    let (base, seen) = spawn_server(
        "/v1/chat/completions",
        StatusCode::OK,
        chat_reply(json!([
            {
                "index": 0,
                "message": {"role": "assistant", "content": "hello"},
                "finish_reason": "stop"
            }
        ])),
    )
    .await;
    let client = OpenAIGenerationClient::new(&base, "local-model").unwrap().with_api_key("");

    client.generate(&prompt(), &deadline()).await.unwrap();
    assert_eq!(seen.lock().unwrap()[0].1, None);
}

#[tokio::test]
async fn first_choice_is_returned() {
    let (base, seen) = spawn_server(
        "/v1/chat/completions",
        StatusCode::OK,
        chat_reply(json!([
            {
                "index": 0,
                "message": {"role": "assistant", "content": "first"},
                "finish_reason": "stop"
            },
            {
                "index": 1,
                "message": {"role": "assistant", "content": "second"},
                "finish_reason": "stop"
            }
        ])),
    )
    .await;
    let client = OpenAIGenerationClient::new(&base, "gpt-4o-mini").unwrap();

    let completion = client.generate(&prompt(), &deadline()).await.unwrap();

    assert_eq!(completion.text, "first");
    assert_eq!(completion.finish_reason.as_deref(), Some("stop"));
    let seen = seen.lock().unwrap();
    let request = &seen[0].0;
    assert_eq!(request["max_tokens"], 150);
    assert_eq!(request["messages"][0]["role"], "system");
    assert_eq!(request["messages"][1]["content"], "Question: hi");
}

#[tokio::test]
async fn no_choices_is_upstream_error() {
    let (base, _) =
        spawn_server("/v1/chat/completions", StatusCode::OK, chat_reply(json!([]))).await;
    let client = OpenAIGenerationClient::new(&base, "gpt-4o-mini").unwrap();

    let err = client.generate(&prompt(), &deadline()).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UpstreamError);
}

#[tokio::test]
async fn content_filter_is_refusal() {
    let (base, _) = spawn_server(
        "/v1/chat/completions",
        StatusCode::OK,
        chat_reply(json!([
            {
                "index": 0,
                "message": {"role": "assistant", "content": ""},
                "finish_reason": "content_filter"
            }
        ])),
    )
    .await;
    let client = OpenAIGenerationClient::new(&base, "gpt-4o-mini").unwrap();

    let err = client.generate(&prompt(), &deadline()).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UpstreamRefused);
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn explicit_refusal_is_refusal() {
    let (base, _) = spawn_server(
        "/v1/chat/completions",
        StatusCode::OK,
        chat_reply(json!([{
            "index": 0,
            "message": {"role": "assistant", "content": null, "refusal": "I can't help with that."},
            "finish_reason": "stop"
        }])),
    )
    .await;
    let client = OpenAIGenerationClient::new(&base, "gpt-4o-mini").unwrap();

    let err = client.generate(&prompt(), &deadline()).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UpstreamRefused);
    assert!(err.to_string().contains("I can't help with that."));
}

#[tokio::test]
async fn policy_violation_status_is_refusal() {
    let (base, _) = spawn_server(
        "/v1/chat/completions",
        StatusCode::BAD_REQUEST,
        json!({"error": {
            "message": "Your request was rejected by the safety system.",
            "type": "invalid_request_error",
            "code": "content_policy_violation"
        }}),
    )
    .await;
    let client = OpenAIGenerationClient::new(&base, "gpt-4o-mini").unwrap();

    let err = client.generate(&prompt(), &deadline()).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UpstreamRefused);
}

#[tokio::test]
async fn rate_limit_is_unavailable() {
    let (base, _) = spawn_server(
        "/v1/chat/completions",
        StatusCode::TOO_MANY_REQUESTS,
        json!({"error": {"message": "Rate limit reached", "code": "rate_limit_exceeded"}}),
    )
    .await;
    let client = OpenAIGenerationClient::new(&base, "gpt-4o-mini").unwrap();

    let err = client.generate(&prompt(), &deadline()).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UpstreamUnavailable);
    assert!(err.to_string().contains("Rate limit reached"));
}
