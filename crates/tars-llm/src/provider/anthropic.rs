//! Anthropic Messages API provider implementation

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use url::Url;

use super::{ChunkStream, Provider, Vendor, classify_status, decode_json, send_checked, sse_chunks};
use crate::convert::anthropic::anthropic_event_to_chunks;
use crate::error::LlmError;
use crate::protocol::anthropic::{AnthropicErrorResponse, AnthropicRequest, AnthropicResponse, AnthropicStreamEvent};
use crate::types::{ChatRequest, LlmResponse};

/// Anthropic API version header value
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Anthropic provider
pub struct AnthropicProvider {
    name: String,
    client: Client,
    base_url: Url,
    api_key: SecretString,
}

impl AnthropicProvider {
    /// Create a provider against `base_url` (e.g. `https://api.anthropic.com/v1`)
    pub fn new(name: impl Into<String>, base_url: Url, api_key: SecretString) -> Self {
        Self {
            name: name.into(),
            client: Client::new(),
            base_url,
            api_key,
        }
    }

    /// Build the messages endpoint URL
    fn messages_url(&self) -> String {
        let base = self.base_url.as_str().trim_end_matches('/');
        format!("{base}/messages")
    }

    fn post(&self, body: &AnthropicRequest) -> reqwest::RequestBuilder {
        self.client
            .post(self.messages_url())
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("x-api-key", self.api_key.expose_secret())
            .json(body)
    }
}

/// Status an in-stream error type would have carried as an HTTP response
fn status_for_error_type(error_type: &str) -> u16 {
    match error_type {
        "rate_limit_error" => 429,
        "overloaded_error" => 529,
        "api_error" => 500,
        _ => 400,
    }
}

#[async_trait]
impl Provider for AnthropicProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn vendor(&self) -> Vendor {
        Vendor::Anthropic
    }

    async fn complete(&self, request: &ChatRequest) -> Result<LlmResponse, LlmError> {
        let wire_request: AnthropicRequest = request.into();

        let response = send_checked(self.vendor(), &request.model, self.post(&wire_request)).await?;
        let wire_response: AnthropicResponse = decode_json(self.vendor(), &request.model, response).await?;

        Ok(wire_response.into())
    }

    async fn open_stream(&self, request: &ChatRequest) -> Result<ChunkStream, LlmError> {
        let mut wire_request: AnthropicRequest = request.into();
        wire_request.stream = Some(true);

        let response = send_checked(self.vendor(), &request.model, self.post(&wire_request)).await?;

        let vendor = self.vendor();
        let model = request.model.clone();
        Ok(sse_chunks(vendor, &request.model, response, move |event: AnthropicStreamEvent| {
            anthropic_event_to_chunks(event).map_err(|error| {
                tracing::warn!(vendor = %vendor, model = %model, error_type = %error.error_type, "error event in stream");
                let status = status_for_error_type(&error.error_type);
                let body = serde_json::to_string(&AnthropicErrorResponse { error }).unwrap_or_default();
                classify_status(vendor, &model, status, &body)
            })
        }))
    }
}
