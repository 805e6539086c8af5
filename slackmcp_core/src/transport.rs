//! Transports: stdio (line-delimited JSON-RPC), plus SSE and streamable
//! HTTP shells on axum. All three feed the same `JsonRpcHandler`; the
//! HTTP-facing ones extract the Authorization header into an
//! `AuthContext` before dispatch.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader as AsyncBufReader};
use tokio::sync::mpsc;
use tracing::{debug, error, info};

use crate::auth::{self, AuthContext};
use crate::config;
use crate::error::ServerError;
use crate::mcp_server::JsonRpcHandler;

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 13080;

/// Stdio transport: one JSON-RPC message per line on stdin/stdout.
pub struct StdioTransport {
    handler: Arc<JsonRpcHandler>,
}

impl StdioTransport {
    pub fn new(handler: Arc<JsonRpcHandler>) -> Self {
        Self { handler }
    }

    pub async fn run(&self) -> std::io::Result<()> {
        info!("starting stdio transport");

        let (tx, mut rx) = mpsc::unbounded_channel::<String>();
        tokio::spawn(async move {
            let stdin = tokio::io::stdin();
            let mut reader = AsyncBufReader::new(stdin);
            let mut line = String::new();
            loop {
                line.clear();
                match reader.read_line(&mut line).await {
                    Ok(0) => {
                        debug!("EOF on stdin");
                        break;
                    }
                    Ok(_) => {
                        if !line.trim().is_empty() && tx.send(line.clone()).is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        error!(error = %e, "stdin read failed");
                        break;
                    }
                }
            }
        });

        // stdio requests carry no Authorization header; the transport is
        // implicitly trusted.
        let auth = AuthContext::default();
        while let Some(line) = rx.recv().await {
            match serde_json::from_str::<Value>(&line) {
                Ok(request) => {
                    if let Some(response) = self.handler.handle_request(request, &auth).await {
                        write_line(&response).await?;
                    }
                }
                Err(e) => {
                    error!(error = %e, "failed to parse JSON-RPC request");
                    let response = serde_json::json!({
                        "jsonrpc": "2.0",
                        "error": {"code": -32700, "message": "Parse error", "data": e.to_string()},
                        "id": null,
                    });
                    write_line(&response).await?;
                }
            }
        }
        Ok(())
    }
}

async fn write_line(response: &Value) -> std::io::Result<()> {
    let mut stdout = tokio::io::stdout();
    stdout.write_all(response.to_string().as_bytes()).await?;
    stdout.write_all(b"\n").await?;
    stdout.flush().await
}

fn bind_address() -> String {
    let host = {
        let h = config::env(config::ENV_HOST);
        if h.is_empty() {
            DEFAULT_HOST.to_string()
        } else {
            h
        }
    };
    let port = {
        let p = config::env(config::ENV_PORT);
        if p.is_empty() {
            DEFAULT_PORT.to_string()
        } else {
            p
        }
    };
    format!("{}:{}", host, port)
}

struct HttpState {
    handler: Arc<JsonRpcHandler>,
    sessions: tokio::sync::Mutex<HashMap<u64, mpsc::Sender<Value>>>,
    next_session: AtomicU64,
}

impl HttpState {
    async fn auth_context(&self, headers: &HeaderMap) -> AuthContext {
        let header = headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok());
        auth::context_from_header(header, &self.handler.server().token_store()).await
    }
}

/// Streamable-HTTP transport: POST /mcp with a JSON-RPC body.
pub async fn run_http(handler: Arc<JsonRpcHandler>) -> Result<(), ServerError> {
    let state = Arc::new(HttpState {
        handler,
        sessions: tokio::sync::Mutex::new(HashMap::new()),
        next_session: AtomicU64::new(1),
    });
    let app = Router::new()
        .route("/mcp", post(http_post))
        .with_state(state);
    serve(app).await
}

/// SSE transport: GET /sse opens the event stream and announces the
/// message endpoint; POST /messages?sessionId=N feeds requests in.
pub async fn run_sse(handler: Arc<JsonRpcHandler>) -> Result<(), ServerError> {
    let state = Arc::new(HttpState {
        handler,
        sessions: tokio::sync::Mutex::new(HashMap::new()),
        next_session: AtomicU64::new(1),
    });
    let app = Router::new()
        .route("/sse", get(sse_get))
        .route("/messages", post(sse_post))
        .with_state(state);
    serve(app).await
}

async fn serve(app: Router) -> Result<(), ServerError> {
    let addr = bind_address();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(ServerError::Io)?;
    info!(addr = %addr, "HTTP transport listening");
    axum::serve(listener, app).await.map_err(ServerError::Io)
}

async fn http_post(
    State(state): State<Arc<HttpState>>,
    headers: HeaderMap,
    Json(request): Json<Value>,
) -> impl IntoResponse {
    let auth = state.auth_context(&headers).await;
    match state.handler.handle_request(request, &auth).await {
        Some(response) => (StatusCode::OK, Json(response)).into_response(),
        None => StatusCode::ACCEPTED.into_response(),
    }
}

#[derive(serde::Deserialize)]
struct SessionQuery {
    #[serde(rename = "sessionId")]
    session_id: u64,
}

async fn sse_get(State(state): State<Arc<HttpState>>) -> impl IntoResponse {
    let session_id = state.next_session.fetch_add(1, Ordering::Relaxed);
    let (tx, rx) = mpsc::channel::<Value>(64);
    state.sessions.lock().await.insert(session_id, tx);
    debug!(session_id, "SSE session opened");

    let stream = event_stream(session_id, rx);
    Sse::new(stream).keep_alive(KeepAlive::default())
}

fn event_stream(
    session_id: u64,
    rx: mpsc::Receiver<Value>,
) -> impl futures_util::Stream<Item = Result<Event, std::convert::Infallible>> {
    futures_util::stream::unfold((true, rx), move |(first, mut rx)| async move {
        if first {
            let endpoint = format!("/messages?sessionId={}", session_id);
            let event = Event::default().event("endpoint").data(endpoint);
            return Some((Ok(event), (false, rx)));
        }
        let value = rx.recv().await?;
        let event = Event::default().event("message").data(value.to_string());
        Some((Ok(event), (false, rx)))
    })
}

async fn sse_post(
    State(state): State<Arc<HttpState>>,
    Query(query): Query<SessionQuery>,
    headers: HeaderMap,
    Json(request): Json<Value>,
) -> impl IntoResponse {
    let auth = state.auth_context(&headers).await;
    let response = state.handler.handle_request(request, &auth).await;

    if let Some(response) = response {
        let sender = state.sessions.lock().await.get(&query.session_id).cloned();
        match sender {
            Some(tx) => {
                if tx.send(response).await.is_err() {
                    state.sessions.lock().await.remove(&query.session_id);
                    return StatusCode::GONE.into_response();
                }
            }
            None => return StatusCode::NOT_FOUND.into_response(),
        }
    }
    (StatusCode::ACCEPTED, "Accepted").into_response()
}
