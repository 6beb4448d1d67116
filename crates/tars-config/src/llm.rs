use std::time::Duration;

use secrecy::SecretString;
use serde::{Deserialize, Deserializer};
use url::Url;

/// Default number of attempts for a single logical request
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// LLM vendor configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LlmConfig {
    /// Provider name (`anthropic`, `google`, `openai`, `groq`, ...)
    pub provider: String,
    /// API key for the selected provider
    pub api_key: SecretString,
    /// Endpoint override; required for providers without a known URL
    #[serde(default)]
    pub base_url: Option<Url>,
    /// Retry and backoff settings
    #[serde(default)]
    pub retry: RetryConfig,
}

/// Retry settings shared by blocking and streaming calls
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RetryConfig {
    /// Total attempts per logical request, including the first
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Backoff used after a rate-limit response
    #[serde(default = "BackoffConfig::rate_limit")]
    pub rate_limit: BackoffConfig,
    /// Backoff used after server errors and connection failures
    #[serde(default = "BackoffConfig::server_error")]
    pub server_error: BackoffConfig,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            rate_limit: BackoffConfig::rate_limit(),
            server_error: BackoffConfig::server_error(),
        }
    }
}

const fn default_max_attempts() -> u32 {
    DEFAULT_MAX_ATTEMPTS
}

/// Full-jitter backoff bounds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BackoffConfig {
    /// Delay scale for the first retry (e.g. "1s")
    #[serde(deserialize_with = "deserialize_duration")]
    pub base: Duration,
    /// Upper bound on any single delay (e.g. "30s")
    #[serde(deserialize_with = "deserialize_duration")]
    pub cap: Duration,
}

impl BackoffConfig {
    /// Rate-limit tier: 2s base, 90s cap
    pub const fn rate_limit() -> Self {
        Self {
            base: Duration::from_secs(2),
            cap: Duration::from_secs(90),
        }
    }

    /// Transient server error tier: 1s base, 30s cap
    pub const fn server_error() -> Self {
        Self {
            base: Duration::from_secs(1),
            cap: Duration::from_secs(30),
        }
    }
}

fn deserialize_duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    duration_str::parse(&raw).map_err(|e| serde::de::Error::custom(format!("invalid duration '{raw}': {e}")))
}
