#![allow(clippy::must_use_candidate)]

//! Configuration for the TARS LLM gateway
//!
//! Loaded from a TOML file whose string values may reference environment
//! variables through `{{ env.VAR }}` placeholders.

mod env;
pub mod llm;
mod loader;
pub mod telemetry;

use serde::Deserialize;

pub use llm::*;
pub use telemetry::{LogFormat, TelemetryConfig};

/// Top-level TARS configuration
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// LLM vendor selection and retry behaviour
    pub llm: LlmConfig,
    /// Log output configuration
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}
