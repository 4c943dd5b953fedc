//! HTTP bridge between chat clients and the Gemini upstream
//!
//! Accepts a [`ChatRequest`], builds the system prompt and relays the
//! upstream answer either as one JSON body or as a stream of `data:` frames
//! terminated by `data: [DONE]`. When the upstream fails mid-stream the body
//! is aborted without `[DONE]`, so clients see a transport error rather than
//! a clean end.

use crate::config::{Config, UpstreamConfig};
use crate::error::{ApiError, BridgeError, Result};
use async_stream::stream;
use axum::{
    Json, Router,
    body::{Body, Bytes},
    extract::State,
    http::{HeaderMap, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use futures::{Stream, StreamExt};
use juris_ai::prompt::{PromptInput, build_system_prompt};
use juris_ai::providers::{GenerateRequest, GoogleProvider, LlmProvider, TextStream};
use juris_ai::wire::{encode_delta, encode_done};
use juris_ai::{ChatRequest, ChatResponse};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::signal;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Shared application state for all handlers
#[derive(Clone)]
pub struct AppState {
    /// `None` when no API key is configured; chat requests then fail with 500
    pub provider: Option<Arc<dyn LlmProvider>>,
}

impl AppState {
    pub fn new(provider: Option<Arc<dyn LlmProvider>>) -> Self {
        Self { provider }
    }

    /// Build the upstream provider from configuration
    pub fn from_config(config: &Config) -> Result<Self> {
        let Some(api_key) = config.api_key() else {
            tracing::warn!("no API key configured; chat requests will fail until one is set");
            return Ok(Self::new(None));
        };

        let client = upstream_client(&config.upstream)?;
        let provider = GoogleProvider::new(api_key)
            .with_client(client)
            .with_base_url(&config.upstream.base_url)
            .with_model(&config.upstream.model)
            .with_max_output_tokens(config.upstream.max_output_tokens);
        tracing::info!(model = provider.model(), "upstream configured");

        let provider: Arc<dyn LlmProvider> = Arc::new(provider);
        Ok(Self::new(Some(provider)))
    }
}

/// HTTP client for the upstream.
///
/// Only connecting and each read are bounded; a long answer that keeps
/// arriving is never cut off.
pub fn upstream_client(config: &UpstreamConfig) -> reqwest::Result<reqwest::Client> {
    reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
        .read_timeout(Duration::from_secs(config.timeout_secs))
        .build()
}

/// The bridge server
pub struct BridgeServer {
    listen_addr: String,
    state: Arc<AppState>,
}

impl BridgeServer {
    pub fn new(listen_addr: impl Into<String>, state: AppState) -> Self {
        Self {
            listen_addr: listen_addr.into(),
            state: Arc::new(state),
        }
    }

    /// Start the server and listen until Ctrl+C or SIGTERM
    pub async fn serve(&self) -> Result<()> {
        let addr: SocketAddr =
            self.listen_addr
                .parse()
                .map_err(|source| BridgeError::InvalidListenAddr {
                    addr: self.listen_addr.clone(),
                    source,
                })?;

        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| BridgeError::Bind {
                addr: addr.to_string(),
                source,
            })?;

        tracing::info!("Starting juris bridge on {addr}");
        if self.state.provider.is_none() {
            tracing::warn!("Upstream credential missing");
        }

        axum::serve(listener, create_router(self.state.clone()))
            .with_graceful_shutdown(shutdown_signal())
            .await
            .map_err(BridgeError::Serve)?;

        tracing::info!("Bridge shut down gracefully");
        Ok(())
    }
}

/// Create the router with all routes configured
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/api/chat", post(chat_handler))
        .route("/chat", post(chat_handler))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn health_handler() -> Json<serde_json::Value> {
    Json(serde_json::json!({"status": "ok"}))
}

/// Whether the caller asked for a streamed answer
fn wants_stream(headers: &HeaderMap) -> bool {
    headers
        .get(header::ACCEPT)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.contains("text/event-stream"))
}

async fn chat_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> std::result::Result<Response, ApiError> {
    let provider = state
        .provider
        .clone()
        .ok_or(juris_ai::Error::MissingCredential)?;

    let request: ChatRequest = serde_json::from_slice(&body)
        .map_err(|e| ApiError::BadRequest(format!("Requisição inválida: {e}")))?;
    if request.messages.is_empty() {
        return Err(ApiError::BadRequest("Nenhuma mensagem enviada.".to_string()));
    }

    let input = PromptInput::from_request(&request);
    tracing::info!(
        mode = %input.mode,
        level = ?input.level,
        turns = request.messages.len(),
        files = request.files.len(),
        references = input.references.len(),
        "chat request"
    );

    let generate = GenerateRequest::new(request.messages)
        .with_system_prompt(build_system_prompt(&input))
        .with_files(request.files);

    if !wants_stream(&headers) {
        let text = provider.generate(&generate).await?;
        return Ok(Json(ChatResponse { data: text }).into_response());
    }

    // upstream rejections surface here, before any byte is sent
    let upstream = provider.stream(&generate).await?;
    Ok((
        [
            (header::CONTENT_TYPE, "text/event-stream"),
            (header::CACHE_CONTROL, "no-cache"),
        ],
        Body::from_stream(relay_frames(upstream)),
    )
        .into_response())
}

/// Re-encode upstream fragments as `data:` frames.
///
/// `[DONE]` is sent only when the upstream finished cleanly; an upstream
/// error ends the stream with that error, which aborts the response body.
fn relay_frames(upstream: TextStream) -> impl Stream<Item = juris_ai::Result<String>> + Send {
    stream! {
        let mut upstream = upstream;
        let mut fragments = 0usize;

        while let Some(item) = upstream.next().await {
            match item {
                Ok(text) if text.is_empty() => {}
                Ok(text) => {
                    fragments += 1;
                    yield Ok(encode_delta(&text));
                }
                Err(e) => {
                    tracing::error!(error = %e, fragments, "upstream failed mid-stream");
                    yield Err(e);
                    return;
                }
            }
        }

        tracing::debug!(fragments, "relay finished");
        yield Ok(encode_done());
    }
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, initiating graceful shutdown");
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{Request, StatusCode};
    use juris_ai::error::{INVALID_KEY_MESSAGE, MISSING_KEY_MESSAGE, RATE_LIMIT_MESSAGE};
    use juris_ai::{ChatMode, ErrorBody};
    use juris_client::{
        ChatSession, ClientConfig, Interruption, MessageStatus, StreamHandle, StreamOutcome,
    };
    use std::convert::Infallible;
    use tower::ServiceExt;
    use wiremock::matchers::{self, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const STREAM_PATH: &str = "/models/gemini-2.0-flash:streamGenerateContent";
    const GENERATE_PATH: &str = "/models/gemini-2.0-flash:generateContent";

    fn text_object(text: &str) -> String {
        serde_json::json!({
            "candidates": [{"content": {"role": "model", "parts": [{"text": text}]}}]
        })
        .to_string()
    }

    fn state_for(server: &MockServer) -> Arc<AppState> {
        let provider: Arc<dyn LlmProvider> =
            Arc::new(GoogleProvider::new("test-key").with_base_url(server.uri()));
        Arc::new(AppState::new(Some(provider)))
    }

    fn chat_request(body: serde_json::Value, stream: bool) -> Request<Body> {
        let mut builder = Request::builder()
            .method("POST")
            .uri("/api/chat")
            .header("content-type", "application/json");
        if stream {
            builder = builder.header("accept", "text/event-stream");
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    fn question() -> serde_json::Value {
        serde_json::json!({
            "messages": [{"role": "user", "content": "O que é dolo?"}],
            "mode": "study",
            "responseLevel": "basic"
        })
    }

    async fn body_string(response: Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    async fn error_body(response: Response) -> ErrorBody {
        serde_json::from_str(&body_string(response).await).unwrap()
    }

    #[tokio::test]
    async fn test_health_check() {
        let app = create_router(Arc::new(AppState::new(None)));
        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert!(body_string(response).await.contains("\"status\":\"ok\""));
    }

    #[tokio::test]
    async fn test_missing_key_is_500() {
        let app = create_router(Arc::new(AppState::new(None)));
        let response = app.oneshot(chat_request(question(), true)).await.unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(error_body(response).await.error, MISSING_KEY_MESSAGE);
    }

    #[tokio::test]
    async fn test_empty_messages_is_400() {
        let server = MockServer::start().await;
        let app = create_router(state_for(&server));
        let response = app
            .oneshot(chat_request(serde_json::json!({"messages": []}), false))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(!error_body(response).await.error.is_empty());
    }

    #[tokio::test]
    async fn test_malformed_body_is_400() {
        let server = MockServer::start().await;
        let app = create_router(state_for(&server));
        let request = Request::builder()
            .method("POST")
            .uri("/chat")
            .body(Body::from("{not json"))
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_streaming_relay() {
        let server = MockServer::start().await;
        let upstream = format!(
            "[{},\r\n{},\r\n{}]",
            text_object("Dolo é a"),
            text_object(" intenção de"),
            text_object(" causar o resultado.")
        );
        Mock::given(method("POST"))
            .and(path(STREAM_PATH))
            .and(matchers::header("x-goog-api-key", "test-key"))
            .respond_with(ResponseTemplate::new(200).set_body_string(upstream))
            .mount(&server)
            .await;

        let app = create_router(state_for(&server));
        let response = app.oneshot(chat_request(question(), true)).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "text/event-stream"
        );
        assert_eq!(response.headers()[header::CACHE_CONTROL], "no-cache");

        let expected = [
            encode_delta("Dolo é a"),
            encode_delta(" intenção de"),
            encode_delta(" causar o resultado."),
            encode_done(),
        ]
        .concat();
        assert_eq!(body_string(response).await, expected);
    }

    #[tokio::test]
    async fn test_single_json_response() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(GENERATE_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_string(text_object("Resposta completa.")))
            .mount(&server)
            .await;

        let app = create_router(state_for(&server));
        let response = app.oneshot(chat_request(question(), false)).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let parsed: ChatResponse = serde_json::from_str(&body_string(response).await).unwrap();
        assert_eq!(parsed.data, "Resposta completa.");
    }

    #[tokio::test]
    async fn test_upstream_rate_limit_before_stream() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(STREAM_PATH))
            .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "5"))
            .mount(&server)
            .await;

        let app = create_router(state_for(&server));
        let response = app.oneshot(chat_request(question(), true)).await.unwrap();

        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(error_body(response).await.error, RATE_LIMIT_MESSAGE);
    }

    #[tokio::test]
    async fn test_upstream_bad_key() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(STREAM_PATH))
            .respond_with(ResponseTemplate::new(400).set_body_string(
                r#"{"error":{"code":400,"message":"API key not valid. Please pass a valid API key.","status":"INVALID_ARGUMENT"}}"#,
            ))
            .mount(&server)
            .await;

        let app = create_router(state_for(&server));
        let response = app.oneshot(chat_request(question(), true)).await.unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(error_body(response).await.error, INVALID_KEY_MESSAGE);
    }

    #[tokio::test]
    async fn test_mid_stream_failure_aborts_body_without_done() {
        let server = MockServer::start().await;
        let upstream = format!(
            "[{},{{\"error\":{{\"code\":500,\"message\":\"internal\"}}}}]",
            text_object("Parcial")
        );
        Mock::given(method("POST"))
            .and(path(STREAM_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_string(upstream))
            .mount(&server)
            .await;

        let app = create_router(state_for(&server));
        let response = app.oneshot(chat_request(question(), true)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let mut frames = response.into_body().into_data_stream();
        let first = frames.next().await.unwrap().unwrap();
        assert_eq!(first, encode_delta("Parcial").as_bytes());
        assert!(frames.next().await.unwrap().is_err());
    }

    #[tokio::test]
    async fn test_transport_error_does_not_leak_key() {
        // nothing listens on port 1
        let provider: Arc<dyn LlmProvider> = Arc::new(
            GoogleProvider::new("SECRET-KEY-123").with_base_url("http://127.0.0.1:1"),
        );
        let app = create_router(Arc::new(AppState::new(Some(provider))));

        for stream in [false, true] {
            let response = app
                .clone()
                .oneshot(chat_request(question(), stream))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
            let body = body_string(response).await;
            assert!(!body.contains("SECRET-KEY-123"), "{body}");
            assert!(!body.contains("127.0.0.1"), "{body}");
        }
    }

    /// Serve an upstream that sends one Gemini object and then goes silent
    async fn stalling_upstream(first: &str) -> String {
        let first = format!("[{first}");
        let app = Router::new().fallback(move || {
            let first = first.clone();
            async move {
                let body = futures::stream::iter([Ok::<_, Infallible>(first)])
                    .chain(futures::stream::pending());
                Body::from_stream(body)
            }
        });
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    async fn spawn_bridge(state: Arc<AppState>) -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, create_router(state)).await.unwrap();
        });
        addr
    }

    #[tokio::test]
    async fn test_stalled_upstream_yields_partial_message() {
        let upstream = stalling_upstream(&text_object("Primeira parte longa da resposta sobre dolo.")).await;
        let client = upstream_client(&UpstreamConfig {
            timeout_secs: 1,
            ..Default::default()
        })
        .unwrap();
        let provider: Arc<dyn LlmProvider> = Arc::new(
            GoogleProvider::new("test-key")
                .with_client(client)
                .with_base_url(upstream),
        );
        let addr = spawn_bridge(Arc::new(AppState::new(Some(provider)))).await;

        let config = ClientConfig {
            endpoint: format!("http://{addr}/api/chat"),
            ..Default::default()
        };
        let mut session = ChatSession::new(config, ChatMode::Study);
        let outcome = session
            .send_message("O que é dolo?", vec![], &StreamHandle::new())
            .await
            .unwrap();

        let StreamOutcome::Partial { message, cause } = outcome else {
            panic!("expected partial, got {outcome:?}");
        };
        assert!(matches!(cause, Interruption::Transport(_)));
        assert_eq!(message.status, MessageStatus::PartialFinalized);
        assert_eq!(message.content, "Primeira parte longa da resposta sobre dolo.");
    }

    #[tokio::test]
    async fn test_session_through_bridge() {
        let upstream_server = MockServer::start().await;
        let upstream = format!(
            "[{},{},{}]",
            text_object("Dolo é a"),
            text_object(" intenção de"),
            text_object(" causar o resultado.")
        );
        Mock::given(method("POST"))
            .and(path(STREAM_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_string(upstream))
            .mount(&upstream_server)
            .await;

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = create_router(state_for(&upstream_server));
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let config = ClientConfig {
            endpoint: format!("http://{addr}/api/chat"),
            ..Default::default()
        };
        let mut session = ChatSession::new(config, ChatMode::Study);
        let outcome = session
            .send_message("O que é dolo?", vec![], &StreamHandle::new())
            .await
            .unwrap();

        let StreamOutcome::Completed(message) = outcome else {
            panic!("expected completed, got {outcome:?}");
        };
        assert_eq!(message.content, "Dolo é a intenção de causar o resultado.");
        assert!(!message.is_streaming);
        assert_eq!(message.metrics.unwrap().word_count, 8);
    }
}
