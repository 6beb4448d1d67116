use std::path::Path;

use secrecy::ExposeSecret;

use crate::Config;

impl Config {
    /// Load configuration from a TOML file
    ///
    /// Reads the file, expands `{{ env.VAR }}` placeholders, then
    /// deserializes and validates the result.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, a placeholder cannot be
    /// resolved, the TOML is malformed, or validation fails
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("failed to read config file {}: {e}", path.display()))?;

        let config = Self::from_toml(&raw)?;
        tracing::debug!(path = %path.display(), provider = %config.llm.provider, "configuration loaded");

        Ok(config)
    }

    /// Parse and validate configuration from TOML text
    ///
    /// # Errors
    ///
    /// Returns an error if expansion, parsing or validation fails
    pub fn from_toml(raw: &str) -> anyhow::Result<Self> {
        let expanded =
            crate::env::expand_env(raw).map_err(|e| anyhow::anyhow!("config variable expansion failed: {e}"))?;

        let config: Self = toml::from_str(&expanded).map_err(|e| anyhow::anyhow!("failed to parse config: {e}"))?;

        config.validate()?;

        Ok(config)
    }

    /// Validate that the configuration is internally consistent
    ///
    /// Provider names are not checked here; an unrecognised provider without
    /// a `base_url` is rejected when the gateway is constructed.
    ///
    /// # Errors
    ///
    /// Returns an error if the API key is blank, no attempts are allowed, or a
    /// backoff tier has `base` greater than `cap`
    pub fn validate(&self) -> anyhow::Result<()> {
        let llm = &self.llm;

        if llm.provider.trim().is_empty() {
            anyhow::bail!("llm.provider must not be empty");
        }

        if llm.api_key.expose_secret().trim().is_empty() {
            anyhow::bail!("llm.api_key must not be empty for provider '{}'", llm.provider);
        }

        if llm.retry.max_attempts == 0 {
            anyhow::bail!("llm.retry.max_attempts must be at least 1");
        }

        for (tier, backoff) in [("rate_limit", &llm.retry.rate_limit), ("server_error", &llm.retry.server_error)] {
            if backoff.base > backoff.cap {
                anyhow::bail!("llm.retry.{tier}: base ({:?}) exceeds cap ({:?})", backoff.base, backoff.cap);
            }
        }

        Ok(())
    }
}
