use std::path::PathBuf;

use clap::Parser;

/// TARS LLM gateway client
#[derive(Debug, Parser)]
#[command(name = "tars", about = "Send a prompt to the configured LLM vendor")]
pub struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "tars.toml", env = "TARS_CONFIG")]
    pub config: PathBuf,

    /// Model identifier passed to the vendor
    #[arg(short, long, env = "TARS_MODEL")]
    pub model: String,

    /// Upper bound on generated tokens
    #[arg(long, default_value_t = 1024)]
    pub max_tokens: u32,

    /// System prompt
    #[arg(short, long, default_value = "")]
    pub system: String,

    /// Sampling temperature (0 for blocking calls when unset)
    #[arg(short, long)]
    pub temperature: Option<f64>,

    /// Print text as it is generated
    #[arg(long)]
    pub stream: bool,

    /// User prompt
    pub prompt: String,
}
