//! HTTP Server
//!
//! Axum router with the Telegram webhook, a CORS-enabled completion proxy,
//! a health endpoint and graceful shutdown.

use crate::config::Config;
use crate::dispatcher::Gateway;
use crate::telegram::Update;
use axum::{
    body::{Body, Bytes},
    extract::State,
    http::{header, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{any, get, post},
    Router,
};
use reqwest::Client;
use serde::Serialize;
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tokio::signal;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info, warn};

/// Forwards raw completion requests upstream with the server-side key
#[derive(Clone)]
pub struct CompletionProxy {
    client: Client,
    api_url: String,
    api_key: Option<String>,
}

impl CompletionProxy {
    pub fn new(api_url: &str, api_key: Option<&str>) -> Self {
        Self {
            client: Client::new(),
            api_url: api_url.to_string(),
            api_key: api_key.map(str::to_string),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(&config.chat_api_url, config.upstream_api_key.as_deref())
    }

    async fn forward(&self, body: Bytes) -> Response {
        let Some(api_key) = self.api_key.as_deref() else {
            return error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                json!({ "error": "OLLAMA_API_KEY not configured" }),
            );
        };

        let response = match self
            .client
            .post(&self.api_url)
            .bearer_auth(api_key)
            .header(header::CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                error!("Completion proxy transport error: {}", e);
                return error_response(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({ "error": e.to_string() }),
                );
            }
        };

        let status = response.status();
        if !status.is_success() {
            let details = response.text().await.unwrap_or_default();
            warn!("Completion proxy upstream returned {}", status);
            return error_response(
                StatusCode::from_u16(status.as_u16()).unwrap_or(StatusCode::BAD_GATEWAY),
                json!({
                    "error": "API request failed",
                    "status": status.as_u16(),
                    "details": details,
                }),
            );
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|value| HeaderValue::from_bytes(value.as_bytes()).ok())
            .unwrap_or_else(|| HeaderValue::from_static("text/event-stream"));

        let mut proxied = Body::from_stream(response.bytes_stream()).into_response();
        proxied
            .headers_mut()
            .insert(header::CONTENT_TYPE, content_type);
        proxied
            .headers_mut()
            .insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
        proxied
    }
}

fn error_response(status: StatusCode, body: serde_json::Value) -> Response {
    (status, Json(body)).into_response()
}

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub gateway: Gateway,
    pub proxy: CompletionProxy,
    pub start_time: Instant,
    pub version: &'static str,
}

impl AppState {
    pub fn new(gateway: Gateway, proxy: CompletionProxy) -> Self {
        Self {
            gateway,
            proxy,
            start_time: Instant::now(),
            version: env!("CARGO_PKG_VERSION"),
        }
    }

    pub fn uptime_secs(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub uptime_secs: u64,
    /// ISO 8601
    pub timestamp: String,
}

async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: state.version,
        uptime_secs: state.uptime_secs(),
        timestamp: chrono::Utc::now().to_rfc3339(),
    })
}

/// Telegram webhook. Always acknowledges so Telegram never retries.
async fn webhook(State(state): State<Arc<AppState>>, body: Bytes) -> &'static str {
    match serde_json::from_slice::<Update>(&body) {
        Ok(update) => {
            let outcome = state.gateway.handle(update).await;
            debug!("Dispatch outcome: {:?}", outcome);
        }
        Err(e) => debug!("Ignoring unparseable webhook body: {}", e),
    }
    "OK"
}

/// Webhook for POST; every other method is acknowledged without processing
async fn root(state: State<Arc<AppState>>, method: Method, body: Bytes) -> &'static str {
    if method == Method::POST {
        webhook(state, body).await
    } else {
        "OK"
    }
}

async fn completions(State(state): State<Arc<AppState>>, body: Bytes) -> Response {
    state.proxy.forward(body).await
}

/// Build the router with all routes and middleware
pub fn build_router(state: AppState) -> Router {
    let state = Arc::new(state);

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]);

    let proxy = Router::new()
        .route("/v1/chat/completions", post(completions))
        .layer(cors);

    Router::new()
        .route("/", any(root))
        .route("/webhook", any(root))
        .route("/health", get(health_check))
        .merge(proxy)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind and serve until Ctrl+C or SIGTERM
pub async fn serve(addr: SocketAddr, state: AppState) -> std::io::Result<()> {
    let router = build_router(state);

    info!("Starting HTTP server on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("HTTP server shut down gracefully");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down"),
        _ = terminate => info!("Received SIGTERM, shutting down"),
    }
}
