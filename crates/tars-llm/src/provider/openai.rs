//! OpenAI-compatible provider implementation

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde_json::{Value, json};
use url::Url;

use super::{ChunkStream, Provider, Vendor, classify_status, decode_json, send_checked, sse_chunks};
use crate::convert::openai::openai_chunk_to_chunks;
use crate::error::LlmError;
use crate::protocol::openai::{OpenAiRequest, OpenAiResponse, OpenAiStreamChunk, OpenAiStreamOptions};
use crate::types::{ChatRequest, LlmResponse};

/// OpenAI-compatible provider (`OpenAI`, Groq, Together, `OpenRouter`, ...)
pub struct OpenAiProvider {
    name: String,
    client: Client,
    base_url: Url,
    api_key: SecretString,
    include_usage: bool,
}

impl OpenAiProvider {
    /// Create a provider for one OpenAI-compatible endpoint
    ///
    /// `include_usage` asks for a usage frame at the end of streams; several
    /// compatible vendors reject the option, so it is only set for known ones.
    pub fn new(name: impl Into<String>, base_url: Url, api_key: SecretString, include_usage: bool) -> Self {
        Self {
            name: name.into(),
            client: Client::new(),
            base_url,
            api_key,
            include_usage,
        }
    }

    /// Build the chat completions URL
    fn completions_url(&self) -> String {
        let base = self.base_url.as_str().trim_end_matches('/');
        format!("{base}/chat/completions")
    }
}

#[async_trait]
impl Provider for OpenAiProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn vendor(&self) -> Vendor {
        Vendor::OpenAiCompatible
    }

    async fn complete(&self, request: &ChatRequest) -> Result<LlmResponse, LlmError> {
        let wire_request: OpenAiRequest = request.into();

        let builder = self
            .client
            .post(self.completions_url())
            .bearer_auth(self.api_key.expose_secret())
            .json(&wire_request);

        let response = send_checked(self.vendor(), &request.model, builder).await?;
        let wire_response: OpenAiResponse = decode_json(self.vendor(), &request.model, response).await?;

        Ok(wire_response.into())
    }

    async fn open_stream(&self, request: &ChatRequest) -> Result<ChunkStream, LlmError> {
        let mut wire_request: OpenAiRequest = request.into();
        wire_request.stream = Some(true);
        wire_request.stream_options = self
            .include_usage
            .then_some(OpenAiStreamOptions { include_usage: true });

        let builder = self
            .client
            .post(self.completions_url())
            .bearer_auth(self.api_key.expose_secret())
            .json(&wire_request);

        let response = send_checked(self.vendor(), &request.model, builder).await?;

        let vendor = self.vendor();
        let model = request.model.clone();
        Ok(sse_chunks(vendor, &request.model, response, move |mut chunk: OpenAiStreamChunk| {
            match chunk.error.take() {
                Some(error) => Err(stream_error(vendor, &model, error)),
                None => Ok(openai_chunk_to_chunks(chunk)),
            }
        }))
    }
}

/// Classify an `error` object delivered inside the stream
///
/// The status comes from a numeric `code` when the vendor sends one and
/// defaults to 400 otherwise.
fn stream_error(vendor: Vendor, model: &str, error: Value) -> LlmError {
    let status = error
        .get("code")
        .and_then(Value::as_u64)
        .and_then(|code| u16::try_from(code).ok())
        .filter(|code| (100..=599).contains(code))
        .unwrap_or(400);
    tracing::warn!(vendor = %vendor, model, status, "error frame in stream");

    let body = json!({ "error": error }).to_string();
    classify_status(vendor, model, status, &body)
}
