//! Google Generative Language API provider implementation

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use url::Url;

use super::{ChunkStream, Provider, Vendor, decode_json, send_checked, sse_chunks};
use crate::convert::google::google_chunk_to_chunks;
use crate::error::LlmError;
use crate::protocol::google::{GoogleRequest, GoogleResponse};
use crate::types::{ChatRequest, LlmResponse};

/// Google AI provider
pub struct GoogleProvider {
    name: String,
    client: Client,
    base_url: Url,
    api_key: SecretString,
}

impl GoogleProvider {
    /// Create a provider against `base_url` (e.g. `https://generativelanguage.googleapis.com/v1beta`)
    pub fn new(name: impl Into<String>, base_url: Url, api_key: SecretString) -> Self {
        Self {
            name: name.into(),
            client: Client::new(),
            base_url,
            api_key,
        }
    }

    /// Build the `generateContent` endpoint URL for a model
    fn generate_url(&self, model: &str) -> String {
        let base = self.base_url.as_str().trim_end_matches('/');
        format!("{base}/models/{model}:generateContent")
    }

    /// Build the `streamGenerateContent` endpoint URL for a model
    fn stream_url(&self, model: &str) -> String {
        let base = self.base_url.as_str().trim_end_matches('/');
        format!("{base}/models/{model}:streamGenerateContent?alt=sse")
    }
}

#[async_trait]
impl Provider for GoogleProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn vendor(&self) -> Vendor {
        Vendor::Google
    }

    async fn complete(&self, request: &ChatRequest) -> Result<LlmResponse, LlmError> {
        let wire_request: GoogleRequest = request.into();

        let builder = self
            .client
            .post(self.generate_url(&request.model))
            .header("x-goog-api-key", self.api_key.expose_secret())
            .json(&wire_request);

        let response = send_checked(self.vendor(), &request.model, builder).await?;
        let wire_response: GoogleResponse = decode_json(self.vendor(), &request.model, response).await?;

        Ok(wire_response.into())
    }

    async fn open_stream(&self, request: &ChatRequest) -> Result<ChunkStream, LlmError> {
        let wire_request: GoogleRequest = request.into();

        let builder = self
            .client
            .post(self.stream_url(&request.model))
            .header("x-goog-api-key", self.api_key.expose_secret())
            .json(&wire_request);

        let response = send_checked(self.vendor(), &request.model, builder).await?;

        Ok(sse_chunks(
            self.vendor(),
            &request.model,
            response,
            |chunk: GoogleResponse| Ok(google_chunk_to_chunks(chunk)),
        ))
    }
}
