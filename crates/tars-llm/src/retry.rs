//! Retry policy and the blocking-call retry loop

use std::time::Duration;

use tars_config::{BackoffConfig, RetryConfig};
use tokio::time::sleep;

use crate::backoff::{self, BackoffTier};
use crate::error::LlmError;
use crate::provider::{Provider, Vendor};
use crate::recovery;
use crate::types::{ChatRequest, LlmResponse};

/// Attempt budget and backoff tiers for one logical request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    pub max_attempts: u32,
    /// Backoff after a rate-limit response
    pub rate_limit: BackoffConfig,
    /// Backoff after server, connection and stream failures
    pub server_error: BackoffConfig,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetryConfig::default())
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            rate_limit: config.rate_limit,
            server_error: config.server_error,
        }
    }
}

impl RetryPolicy {
    /// Backoff bounds for a tier
    pub const fn backoff(&self, tier: BackoffTier) -> BackoffConfig {
        match tier {
            BackoffTier::RateLimit => self.rate_limit,
            BackoffTier::ServerError => self.server_error,
        }
    }

    /// Policy that never sleeps
    #[cfg(test)]
    pub(crate) const fn immediate(max_attempts: u32) -> Self {
        let zero = BackoffConfig {
            base: Duration::ZERO,
            cap: Duration::ZERO,
        };
        Self {
            max_attempts,
            rate_limit: zero,
            server_error: zero,
        }
    }
}

/// Decide how to continue after attempt number `attempt` failed
///
/// Returns the delay before the next attempt. Fatal errors come back
/// unchanged; transient errors past the budget become
/// [`LlmError::RetriesExhausted`].
pub(crate) fn next_delay(
    policy: &RetryPolicy,
    vendor: Vendor,
    model: &str,
    error: LlmError,
    attempt: u32,
) -> Result<Duration, LlmError> {
    let Some(tier) = error.backoff_tier() else {
        return Err(error);
    };

    if attempt >= policy.max_attempts {
        tracing::error!(vendor = %vendor, model, attempts = attempt, error = %error, "retries exhausted");
        return Err(LlmError::RetriesExhausted {
            vendor,
            model: model.to_owned(),
            attempts: attempt,
            last_error: Box::new(error),
        });
    }

    let bounds = policy.backoff(tier);
    let delay = backoff::delay(attempt, bounds.base, bounds.cap, &mut rand::rng());
    tracing::warn!(
        vendor = %vendor,
        model,
        attempt,
        max_attempts = policy.max_attempts,
        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
        error = %error,
        "retrying after transient error"
    );

    Ok(delay)
}

/// Run a blocking completion with retries
///
/// A malformed tool call rejection is first handed to recovery; only when
/// nothing can be recovered does it count as a failed attempt.
pub async fn complete_with_retry(
    provider: &dyn Provider,
    policy: &RetryPolicy,
    request: &ChatRequest,
) -> Result<LlmResponse, LlmError> {
    let mut attempt = 0;

    loop {
        attempt += 1;

        let error = match provider.complete(request).await {
            Ok(response) => return Ok(response),
            Err(error) => error,
        };

        if matches!(error, LlmError::MalformedToolCall { .. })
            && let Some(recovered) = recovery::recover(&error)
        {
            return Ok(recovered);
        }

        let delay = next_delay(policy, provider.vendor(), &request.model, error, attempt)?;
        sleep(delay).await;
    }
}
