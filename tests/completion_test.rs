//! Completion Client Tests
//!
//! Runs `CompletionClient` against a local upstream that streams SSE
//! records split at awkward byte positions.

use axum::{
    body::{Body, Bytes},
    http::{header, StatusCode},
    response::IntoResponse,
    routing::post,
    Router,
};
use chat_gateway::{ChatBackend, CompletionClient, GatewayError, Turn};
use std::time::Duration;
use tokio_test::{assert_err, assert_ok};

async fn spawn_upstream(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{}/v1/chat/completions", addr)
}

fn client(url: &str, timeout: Duration) -> CompletionClient {
    CompletionClient::new(url, Some("test-key"), "test-model", timeout)
}

async fn chunked_stream() -> impl IntoResponse {
    let payload = concat!(
        "data: {\"choices\":[{\"delta\":{\"role\":\"assistant\"}}]}\n\n",
        "data: {\"choices\":[{\"delta\":{\"content\":\"Hola, \"}}]}\n\n",
        "data: not json\n\n",
        "data: {\"choices\":[{\"delta\":{\"content\":\"señor 👋\"}}]}\n\n",
        "data: [DONE]\n\n",
    )
    .as_bytes()
    .to_vec();

    // Cut inside the prefix, inside a JSON object and inside multi-byte chars
    let cuts = [3, 40, 97, 150, 162, 168, payload.len()];
    let mut chunks = Vec::new();
    let mut start = 0;
    for end in cuts {
        chunks.push(Ok::<_, std::io::Error>(Bytes::copy_from_slice(&payload[start..end])));
        start = end;
    }

    (
        [(header::CONTENT_TYPE, "text/event-stream")],
        Body::from_stream(futures_util::stream::iter(chunks)),
    )
}

#[tokio::test]
async fn test_assembles_streamed_answer() {
    let url = spawn_upstream(Router::new().route("/v1/chat/completions", post(chunked_stream))).await;

    let answer = assert_ok!(
        client(&url, Duration::from_secs(5))
            .complete(&[Turn::user("hola")])
            .await
    );

    assert_eq!(answer, "Hola, señor 👋");
}

#[tokio::test]
async fn test_non_success_status_is_upstream_error() {
    let url = spawn_upstream(Router::new().route(
        "/v1/chat/completions",
        post(|| async { (StatusCode::TOO_MANY_REQUESTS, "slow down") }),
    ))
    .await;

    let err = assert_err!(
        client(&url, Duration::from_secs(5))
            .complete(&[Turn::user("hi")])
            .await
    );

    match err {
        GatewayError::Upstream { status, body } => {
            assert_eq!(status, 429);
            assert_eq!(body, "slow down");
        }
        other => panic!("expected upstream error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_stalled_stream_times_out() {
    let url = spawn_upstream(Router::new().route(
        "/v1/chat/completions",
        post(|| async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            "data: [DONE]\n"
        }),
    ))
    .await;

    let err = assert_err!(
        client(&url, Duration::from_millis(100))
            .complete(&[Turn::user("hi")])
            .await
    );

    assert!(matches!(err, GatewayError::Timeout(_)));
}

#[tokio::test]
async fn test_connection_refused_is_transport_error() {
    let err = assert_err!(
        client("http://127.0.0.1:9/v1/chat/completions", Duration::from_secs(5))
            .complete(&[Turn::user("hi")])
            .await
    );

    assert!(matches!(err, GatewayError::Transport(_)));
}
