//! Provider trait and implementations for the three vendor protocols
//!
//! A provider performs exactly one network attempt per call. Retries,
//! recovery and stream restarts are layered on top in [`crate::retry`] and
//! [`crate::stream`].

pub mod anthropic;
pub mod google;
pub mod openai;
#[cfg(test)]
pub(crate) mod scripted;

use std::fmt;
use std::pin::Pin;

use async_trait::async_trait;
use eventsource_stream::Eventsource;
use futures_util::{Stream, StreamExt, stream};
use reqwest::{RequestBuilder, Response};
use serde::de::DeserializeOwned;

use crate::error::LlmError;
use crate::types::{ChatRequest, LlmResponse, StreamChunk};

/// Stream of normalized chunks from one connection
pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<StreamChunk, LlmError>> + Send>>;

/// Wire protocol family spoken by a provider
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Vendor {
    /// Anthropic Messages API
    Anthropic,
    /// Google `generateContent` API
    Google,
    /// `OpenAI` chat completions and compatible vendors
    OpenAiCompatible,
}

impl fmt::Display for Vendor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Anthropic => "anthropic",
            Self::Google => "google",
            Self::OpenAiCompatible => "openai-compatible",
        })
    }
}

/// Trait implemented by each vendor backend
#[async_trait]
pub trait Provider: Send + Sync {
    /// Configured provider name (e.g. "groq")
    fn name(&self) -> &str;

    /// Wire protocol family
    fn vendor(&self) -> Vendor;

    /// Send one blocking completion request
    async fn complete(&self, request: &ChatRequest) -> Result<LlmResponse, LlmError>;

    /// Open one streaming completion
    ///
    /// Failures before the first byte are returned here; later failures
    /// arrive as stream items. The stream ends after the vendor's terminal
    /// frame or when the connection drops.
    async fn open_stream(&self, request: &ChatRequest) -> Result<ChunkStream, LlmError>;
}

/// Send a request, mapping transport failures and error statuses
pub(crate) async fn send_checked(
    vendor: Vendor,
    model: &str,
    builder: RequestBuilder,
) -> Result<Response, LlmError> {
    let response = builder.send().await.map_err(|e| {
        if e.is_builder() {
            tracing::error!(vendor = %vendor, model, error = %e, "request could not be built");
            return LlmError::Configuration(format!("invalid request for {vendor}: {e}"));
        }
        tracing::error!(vendor = %vendor, model, error = %e, "upstream request failed");
        LlmError::Connection {
            vendor,
            model: model.to_owned(),
            message: e.to_string(),
        }
    })?;

    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    tracing::warn!(vendor = %vendor, model, status = status.as_u16(), "upstream returned error");

    Err(classify_status(vendor, model, status.as_u16(), &body))
}

/// Read and decode a JSON response body
pub(crate) async fn decode_json<T: DeserializeOwned>(
    vendor: Vendor,
    model: &str,
    response: Response,
) -> Result<T, LlmError> {
    let bytes = response.bytes().await.map_err(|e| LlmError::Connection {
        vendor,
        model: model.to_owned(),
        message: format!("failed to read response body: {e}"),
    })?;

    serde_json::from_slice(&bytes).map_err(|e| LlmError::Decode {
        vendor,
        model: model.to_owned(),
        message: e.to_string(),
    })
}

/// Classify a vendor error response into the error taxonomy
///
/// Checked in order: an OpenAI-compatible malformed tool call, throttling,
/// then server failure or overload. Anything else is a fatal rejection.
pub fn classify_status(vendor: Vendor, model: &str, status: u16, body: &str) -> LlmError {
    let parsed = serde_json::from_str::<serde_json::Value>(body).ok();
    let message = parsed
        .as_ref()
        .and_then(|value| value.pointer("/error/message"))
        .and_then(serde_json::Value::as_str)
        .map_or_else(|| body.to_owned(), ToOwned::to_owned);
    let lowered = body.to_ascii_lowercase();
    let model = model.to_owned();

    if vendor == Vendor::OpenAiCompatible && (lowered.contains("tool_use_failed") || lowered.contains("failed_generation"))
    {
        return LlmError::MalformedToolCall {
            vendor,
            model,
            body: parsed,
            raw: body.to_owned(),
        };
    }

    if status == 429 || ["rate_limit", "rate limit", "resource_exhausted"].iter().any(|m| lowered.contains(m)) {
        return LlmError::RateLimited { vendor, model, message };
    }

    if status >= 500 || lowered.contains("overloaded") {
        return LlmError::ServerError {
            vendor,
            model,
            status,
            message,
        };
    }

    LlmError::Upstream {
        vendor,
        model,
        status,
        message,
    }
}

/// Turn an SSE response into a stream of normalized chunks
///
/// Empty frames and the `[DONE]` sentinel are skipped, as are frames that
/// fail to deserialize.
pub(crate) fn sse_chunks<T, F>(vendor: Vendor, model: &str, response: Response, mut decode: F) -> ChunkStream
where
    T: DeserializeOwned,
    F: FnMut(T) -> Result<Vec<StreamChunk>, LlmError> + Send + 'static,
{
    let model = model.to_owned();

    let mapped = response
        .bytes_stream()
        .eventsource()
        .map(move |result| match result {
            Ok(event) => {
                let data = event.data.trim();
                if data.is_empty() || data == "[DONE]" {
                    return Vec::new();
                }

                match serde_json::from_str::<T>(data) {
                    Ok(frame) => match decode(frame) {
                        Ok(chunks) => chunks.into_iter().map(Ok).collect(),
                        Err(e) => vec![Err(e)],
                    },
                    Err(e) => {
                        tracing::debug!(vendor = %vendor, error = %e, data = %data, "skipping unparseable SSE chunk");
                        Vec::new()
                    }
                }
            }
            Err(e) => {
                tracing::error!(vendor = %vendor, model = %model, error = %e, "stream interrupted");
                vec![Err(LlmError::Streaming {
                    vendor,
                    model: model.clone(),
                    message: e.to_string(),
                })]
            }
        })
        .flat_map(stream::iter);

    Box::pin(mapped)
}
