//! Typed configuration from environment variables and option files.
//!
//! Loads once at startup, fails fast if required vars are missing.
//! The Redis URL may carry a password, so it is wrapped in
//! secrecy::SecretString to keep it out of logs.

pub mod options;

pub use options::{OptionsFile, PoolOptions, QueueOptions, ReplicaSyncOptions, UniqueQueueOptions};
pub use secrecy::{ExposeSecret, SecretString};

use crate::error::{Error, Result};
use std::path::PathBuf;

#[derive(Debug)]
pub struct Config {
    pub redis_url: SecretString,
    pub otel_endpoint: Option<String>,
    pub log_level: String,
    /// Optional TOML file with `[queue]`, `[unique_queue]` and `[pool]` sections.
    pub options_path: Option<PathBuf>,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// In local dev, call `dotenvy::dotenv().ok()` before this.
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            redis_url: SecretString::from(required_var("REDIS_URL")?),
            otel_endpoint: std::env::var("OTEL_ENDPOINT").ok(),
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            options_path: std::env::var("REDQ_OPTIONS").ok().map(PathBuf::from),
        })
    }

    /// Primitive options from `options_path`, or all defaults when unset.
    pub fn load_options(&self) -> Result<OptionsFile> {
        match &self.options_path {
            Some(path) => OptionsFile::load(path),
            None => Ok(OptionsFile::default()),
        }
    }
}

fn required_var(name: &str) -> Result<String> {
    std::env::var(name)
        .map_err(|_| Error::Config(format!("required environment variable {name} is not set")))
}
