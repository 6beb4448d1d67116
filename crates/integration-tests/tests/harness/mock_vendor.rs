//! Scripted vendor backend for integration tests
//!
//! Accepts a POST on any path, records it, and answers with the next
//! scripted reply. Requests past the end of the script get a 500.

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use axum::Router;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode, Uri, header};
use axum::response::{IntoResponse, Response};
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;

/// One canned answer
pub enum Reply {
    /// JSON body with a status code
    Json(StatusCode, Value),
    /// `text/event-stream` body; each entry becomes one `data:` frame
    Sse(Vec<String>),
}

impl Reply {
    /// 200 with a JSON body
    pub const fn ok(body: Value) -> Self {
        Self::Json(StatusCode::OK, body)
    }

    /// Error status with a JSON body
    pub fn status(status: u16, body: Value) -> Self {
        Self::Json(
            StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
            body,
        )
    }

    /// Plain 500
    pub fn server_error() -> Self {
        Self::status(500, json!({"error": {"message": "internal error"}}))
    }

    /// Event stream of JSON frames
    pub fn sse(frames: impl IntoIterator<Item = Value>) -> Self {
        Self::Sse(frames.into_iter().map(|frame| frame.to_string()).collect())
    }

    /// Event stream of JSON frames followed by `[DONE]`
    pub fn sse_done(frames: impl IntoIterator<Item = Value>) -> Self {
        let mut data: Vec<String> = frames.into_iter().map(|frame| frame.to_string()).collect();
        data.push("[DONE]".to_owned());
        Self::Sse(data)
    }
}

/// A request as received by the mock
#[derive(Debug, Clone)]
pub struct Recorded {
    pub path: String,
    pub query: Option<String>,
    pub headers: HeaderMap,
    pub body: Value,
}

impl Recorded {
    /// Header value as a string, if present
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|value| value.to_str().ok())
    }
}

/// Mock vendor server
pub struct MockVendor {
    addr: SocketAddr,
    shutdown: CancellationToken,
    state: Arc<MockState>,
}

struct MockState {
    request_count: AtomicU32,
    replies: Mutex<VecDeque<Reply>>,
    requests: Mutex<Vec<Recorded>>,
}

impl MockVendor {
    /// Start the mock server with a script of replies, returning immediately
    pub async fn start(replies: impl IntoIterator<Item = Reply>) -> anyhow::Result<Self> {
        let state = Arc::new(MockState {
            request_count: AtomicU32::new(0),
            replies: Mutex::new(replies.into_iter().collect()),
            requests: Mutex::new(Vec::new()),
        });

        let app = Router::new().fallback(handle).with_state(Arc::clone(&state));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let shutdown = CancellationToken::new();
        let shutdown_clone = shutdown.clone();

        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    shutdown_clone.cancelled().await;
                })
                .await
                .ok();
        });

        Ok(Self { addr, shutdown, state })
    }

    /// Endpoint under `prefix`, e.g. `/v1` or `/v1beta`
    pub fn base_url(&self, prefix: &str) -> String {
        format!("http://{}{prefix}", self.addr)
    }

    /// Number of requests received
    pub fn request_count(&self) -> u32 {
        self.state.request_count.load(Ordering::Relaxed)
    }

    /// Snapshot of the received requests, oldest first
    pub fn requests(&self) -> Vec<Recorded> {
        self.state.requests.lock().unwrap().clone()
    }

    /// The most recent request
    pub fn last_request(&self) -> Recorded {
        self.requests().pop().expect("no request received")
    }
}

impl Drop for MockVendor {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

async fn handle(State(state): State<Arc<MockState>>, uri: Uri, headers: HeaderMap, body: Bytes) -> Response {
    state.request_count.fetch_add(1, Ordering::Relaxed);
    state.requests.lock().unwrap().push(Recorded {
        path: uri.path().to_owned(),
        query: uri.query().map(str::to_owned),
        headers,
        body: serde_json::from_slice(&body).unwrap_or(Value::Null),
    });

    let reply = state.replies.lock().unwrap().pop_front();
    match reply {
        Some(Reply::Json(status, body)) => (status, axum::Json(body)).into_response(),
        Some(Reply::Sse(frames)) => {
            let body: String = frames.iter().map(|data| format!("data: {data}\n\n")).collect();
            ([(header::CONTENT_TYPE, "text/event-stream")], body).into_response()
        }
        None => (
            StatusCode::INTERNAL_SERVER_ERROR,
            axum::Json(json!({"error": {"message": "no scripted reply"}})),
        )
            .into_response(),
    }
}
