use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

pub use crate::config::language::{Language, SOURCE_PLACEHOLDER, SourceName};

pub mod language;
mod loader;

/// Example configuration embedded at compile time.
///
/// Library users can access this to generate a starter config file.
pub const EXAMPLE_CONFIG: &str = include_str!("../../polyrun.example.toml");

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid source file name '{0}'")]
    InvalidSourceName(String),

    #[error("failed to parse config: {0}")]
    Parse(#[from] config::ConfigError),

    #[error("language '{0}' not found in configuration")]
    LanguageNotFound(String),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Config for polyrun
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Host directory holding one workspace per submission
    #[serde(default = "default_workspace_root")]
    pub workspace_root: PathBuf,

    /// HTTP server settings
    #[serde(default)]
    pub server: ServerConfig,

    /// Container runtime settings
    #[serde(default)]
    pub docker: DockerConfig,

    /// Language configurations keyed by language ID
    #[serde(default, alias = "language")]
    pub languages: HashMap<String, Language>,
}

/// HTTP server settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,

    pub port: u16,

    /// Return raw error text to callers instead of the error kind only
    pub expose_error_details: bool,

    /// Deadline for a single build or run job, in seconds
    pub job_timeout_secs: Option<u64>,

    /// Longest output line forwarded in one piece
    pub max_line_bytes: usize,

    /// Number of lines buffered between a job and its caller
    pub stream_buffer: usize,
}

impl ServerConfig {
    pub fn job_timeout(&self) -> Option<Duration> {
        self.job_timeout_secs.map(Duration::from_secs)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_owned(),
            port: 8080,
            expose_error_details: true,
            job_timeout_secs: None,
            max_line_bytes: 64 * 1024,
            stream_buffer: 16,
        }
    }
}

/// Container runtime settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DockerConfig {
    /// Docker socket path (uses the local defaults if not specified)
    pub socket: Option<String>,

    /// Pull every configured image before serving
    pub pull_on_startup: bool,
}

impl Default for DockerConfig {
    fn default() -> Self {
        Self {
            socket: None,
            pull_on_startup: true,
        }
    }
}

impl Config {
    /// Create a new config with embedded default languages
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty config with no languages
    pub fn empty() -> Self {
        Self {
            workspace_root: default_workspace_root(),
            server: ServerConfig::default(),
            docker: DockerConfig::default(),
            languages: HashMap::new(),
        }
    }

    /// Get a language by ID
    pub fn get_language(&self, id: &str) -> Result<&Language, ConfigError> {
        self.languages
            .get(id)
            .ok_or_else(|| ConfigError::LanguageNotFound(id.to_string()))
    }

    /// Distinct images referenced by the configured languages, sorted
    pub fn images(&self) -> Vec<&str> {
        let mut images: Vec<&str> = self
            .languages
            .values()
            .map(|lang| lang.image.as_str())
            .collect();
        images.sort_unstable();
        images.dedup();
        images
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::parse_toml(EXAMPLE_CONFIG).expect("embedded default config should be valid")
    }
}

fn default_workspace_root() -> PathBuf {
    PathBuf::from("/tmp/compiler")
}
