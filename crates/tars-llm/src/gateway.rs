//! Gateway facade: one backend chosen from configuration

use std::sync::Arc;

use secrecy::ExposeSecret;
use tars_config::LlmConfig;
use url::Url;

use crate::error::LlmError;
use crate::provider::anthropic::AnthropicProvider;
use crate::provider::google::GoogleProvider;
use crate::provider::openai::OpenAiProvider;
use crate::provider::{Provider, Vendor};
use crate::retry::{RetryPolicy, complete_with_retry};
use crate::stream::StreamSession;
use crate::types::{ChatRequest, LlmResponse};

/// Known provider name, its protocol and default endpoint
struct Preset {
    name: &'static str,
    vendor: Vendor,
    base_url: &'static str,
    /// Accepts `stream_options.include_usage`
    include_usage: bool,
}

const PRESETS: &[Preset] = &[
    Preset {
        name: "anthropic",
        vendor: Vendor::Anthropic,
        base_url: "https://api.anthropic.com/v1",
        include_usage: false,
    },
    Preset {
        name: "google",
        vendor: Vendor::Google,
        base_url: "https://generativelanguage.googleapis.com/v1beta",
        include_usage: false,
    },
    Preset {
        name: "openai",
        vendor: Vendor::OpenAiCompatible,
        base_url: "https://api.openai.com/v1",
        include_usage: true,
    },
    Preset {
        name: "groq",
        vendor: Vendor::OpenAiCompatible,
        base_url: "https://api.groq.com/openai/v1",
        include_usage: false,
    },
    Preset {
        name: "together",
        vendor: Vendor::OpenAiCompatible,
        base_url: "https://api.together.xyz/v1",
        include_usage: true,
    },
    Preset {
        name: "openrouter",
        vendor: Vendor::OpenAiCompatible,
        base_url: "https://openrouter.ai/api/v1",
        include_usage: true,
    },
    Preset {
        name: "deepseek",
        vendor: Vendor::OpenAiCompatible,
        base_url: "https://api.deepseek.com/v1",
        include_usage: true,
    },
    Preset {
        name: "gemini",
        vendor: Vendor::OpenAiCompatible,
        base_url: "https://generativelanguage.googleapis.com/v1beta/openai/",
        include_usage: false,
    },
];

/// Single entry point for model completions
///
/// Holds only read-only configuration, so one gateway can serve concurrent
/// callers. No deadline is applied to calls; callers that need one wrap
/// [`Gateway::create`] or [`StreamSession::next`] in `tokio::time::timeout`.
#[derive(Clone)]
pub struct Gateway {
    provider: Arc<dyn Provider>,
    policy: RetryPolicy,
}

impl Gateway {
    /// Build the backend named by `config.provider`
    ///
    /// Known names use their preset protocol and endpoint (`base_url`
    /// overrides the endpoint). Any other name is treated as an
    /// OpenAI-compatible vendor and requires `base_url`.
    pub fn new(config: &LlmConfig) -> Result<Self, LlmError> {
        if config.api_key.expose_secret().trim().is_empty() {
            return Err(LlmError::Configuration(format!(
                "missing API key for provider '{}'",
                config.provider
            )));
        }

        let name = config.provider.trim().to_ascii_lowercase();
        let preset = PRESETS.iter().find(|preset| preset.name == name);

        let base_url = match (&config.base_url, preset) {
            (Some(url), _) => url.clone(),
            (None, Some(preset)) => Url::parse(preset.base_url)
                .map_err(|e| LlmError::Configuration(format!("invalid endpoint for '{name}': {e}")))?,
            (None, None) => {
                return Err(LlmError::Configuration(format!(
                    "unknown provider '{}' and no base_url given",
                    config.provider
                )));
            }
        };

        let vendor = preset.map_or(Vendor::OpenAiCompatible, |preset| preset.vendor);
        let api_key = config.api_key.clone();

        let provider: Arc<dyn Provider> = match vendor {
            Vendor::Anthropic => Arc::new(AnthropicProvider::new(name, base_url, api_key)),
            Vendor::Google => Arc::new(GoogleProvider::new(name, base_url, api_key)),
            Vendor::OpenAiCompatible => {
                let include_usage = preset.is_some_and(|preset| preset.include_usage);
                Arc::new(OpenAiProvider::new(name, base_url, api_key, include_usage))
            }
        };

        tracing::debug!(provider = provider.name(), vendor = %vendor, "gateway configured");

        Ok(Self::with_provider(provider, RetryPolicy::from(&config.retry)))
    }

    /// Build a gateway around an existing backend
    pub fn with_provider(provider: Arc<dyn Provider>, policy: RetryPolicy) -> Self {
        Self { provider, policy }
    }

    /// Protocol family of the configured backend
    pub fn vendor(&self) -> Vendor {
        self.provider.vendor()
    }

    /// Configured provider name
    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    /// Blocking completion with retries and malformed tool call recovery
    ///
    /// Temperature defaults to 0 so tool selection is deterministic.
    pub async fn create(&self, mut request: ChatRequest) -> Result<LlmResponse, LlmError> {
        request.temperature.get_or_insert(0.0);
        complete_with_retry(self.provider.as_ref(), &self.policy, &request).await
    }

    /// Open a streamed completion
    ///
    /// The vendor's default temperature applies unless the request sets one.
    pub async fn stream(&self, request: ChatRequest) -> Result<StreamSession, LlmError> {
        let mut session = StreamSession::new(Arc::clone(&self.provider), request, self.policy);
        session.open().await?;
        Ok(session)
    }
}
