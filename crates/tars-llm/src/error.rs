use thiserror::Error;

use crate::backoff::BackoffTier;
use crate::provider::Vendor;

/// Errors that can occur during LLM operations
#[derive(Debug, Error)]
pub enum LlmError {
    /// Gateway could not be built from its configuration
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Vendor throttled the request
    #[error("{vendor} rate limited request for {model}: {message}")]
    RateLimited {
        vendor: Vendor,
        model: String,
        message: String,
    },

    /// Vendor failed or reported overload
    #[error("{vendor} server error {status} for {model}: {message}")]
    ServerError {
        vendor: Vendor,
        model: String,
        status: u16,
        message: String,
    },

    /// Request could not be sent or timed out
    #[error("{vendor} connection failed for {model}: {message}")]
    Connection {
        vendor: Vendor,
        model: String,
        message: String,
    },

    /// Stream was interrupted or carried an undecodable frame
    #[error("{vendor} stream failed for {model}: {message}")]
    Streaming {
        vendor: Vendor,
        model: String,
        message: String,
    },

    /// Vendor rejected the model's attempted tool call as malformed
    #[error("{vendor} rejected malformed tool call from {model}: {raw}")]
    MalformedToolCall {
        vendor: Vendor,
        model: String,
        /// Parsed error body, when the vendor sent JSON
        body: Option<serde_json::Value>,
        /// Raw error text
        raw: String,
    },

    /// Any other vendor rejection
    #[error("{vendor} returned {status} for {model}: {message}")]
    Upstream {
        vendor: Vendor,
        model: String,
        status: u16,
        message: String,
    },

    /// Successful response whose body could not be decoded
    #[error("failed to decode {vendor} response for {model}: {message}")]
    Decode {
        vendor: Vendor,
        model: String,
        message: String,
    },

    /// Transient failures persisted through every allowed attempt
    #[error("{vendor} request for {model} failed after {attempts} attempts: {last_error}")]
    RetriesExhausted {
        vendor: Vendor,
        model: String,
        attempts: u32,
        last_error: Box<LlmError>,
    },

    /// Final message requested before the stream was fully consumed
    #[error("stream has not been fully consumed")]
    StreamIncomplete,
}

impl LlmError {
    /// Backoff tier for transient errors, `None` for fatal ones
    pub const fn backoff_tier(&self) -> Option<BackoffTier> {
        match self {
            Self::RateLimited { .. } => Some(BackoffTier::RateLimit),
            Self::ServerError { .. }
            | Self::Connection { .. }
            | Self::Streaming { .. }
            | Self::MalformedToolCall { .. } => Some(BackoffTier::ServerError),
            Self::Configuration(_)
            | Self::Upstream { .. }
            | Self::Decode { .. }
            | Self::RetriesExhausted { .. }
            | Self::StreamIncomplete => None,
        }
    }

    /// Whether another attempt may succeed
    pub const fn is_retryable(&self) -> bool {
        self.backoff_tier().is_some()
    }
}
