//! In-memory provider that replays scripted outcomes

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use futures_util::stream;

use super::{ChunkStream, Provider, Vendor};
use crate::error::LlmError;
use crate::types::{ChatRequest, LlmResponse, StreamChunk};

/// Outcome of one streaming attempt
pub enum StreamScript {
    /// Connection refused before any frame
    Refuse(LlmError),
    /// Frames delivered in order, then the stream ends
    Frames(Vec<Result<StreamChunk, LlmError>>),
}

pub struct ScriptedProvider {
    vendor: Vendor,
    completions: Mutex<VecDeque<Result<LlmResponse, LlmError>>>,
    streams: Mutex<VecDeque<StreamScript>>,
    attempts: AtomicU32,
    requests: Mutex<Vec<ChatRequest>>,
}

impl ScriptedProvider {
    pub fn new(vendor: Vendor) -> Self {
        Self {
            vendor,
            completions: Mutex::new(VecDeque::new()),
            streams: Mutex::new(VecDeque::new()),
            attempts: AtomicU32::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn with_completions(self, outcomes: impl IntoIterator<Item = Result<LlmResponse, LlmError>>) -> Self {
        self.completions.lock().unwrap().extend(outcomes);
        self
    }

    pub fn with_streams(self, scripts: impl IntoIterator<Item = StreamScript>) -> Self {
        self.streams.lock().unwrap().extend(scripts);
        self
    }

    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().unwrap().clone()
    }

    fn record(&self, request: &ChatRequest) {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request.clone());
    }
}

/// Transient server error for tests
pub fn server_error(vendor: Vendor) -> LlmError {
    LlmError::ServerError {
        vendor,
        model: "test-model".to_owned(),
        status: 500,
        message: "internal error".to_owned(),
    }
}

#[async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    fn vendor(&self) -> Vendor {
        self.vendor
    }

    async fn complete(&self, request: &ChatRequest) -> Result<LlmResponse, LlmError> {
        self.record(request);
        self.completions
            .lock()
            .unwrap()
            .pop_front()
            .expect("no scripted completion left")
    }

    async fn open_stream(&self, request: &ChatRequest) -> Result<ChunkStream, LlmError> {
        self.record(request);
        let script = self.streams.lock().unwrap().pop_front().expect("no scripted stream left");
        match script {
            StreamScript::Refuse(err) => Err(err),
            StreamScript::Frames(frames) => Ok(Box::pin(stream::iter(frames))),
        }
    }
}
