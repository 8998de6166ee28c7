//! Configuration file loading for polyrun
//!
//! Handles loading and parsing configuration files using the config crate.
//! The file format is inferred from the extension, so both the TOML layout
//! and the older YAML layout (`language:` with `docker_image`, `build_cmd`,
//! `run_cmd` and `code_file`) are accepted.

use std::path::Path;

use config::{Config as ConfigBuilder, File, FileFormat};

use crate::config::{Config, ConfigError};

impl Config {
    /// Load configuration from a file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let config = ConfigBuilder::builder()
            .add_source(File::from(path))
            .build()?;

        let config: Config = config.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from a TOML string
    pub fn parse_toml(content: &str) -> Result<Self, ConfigError> {
        Self::parse_str(content, FileFormat::Toml)
    }

    /// Parse configuration from a string in the given format
    pub fn parse_str(content: &str, format: FileFormat) -> Result<Self, ConfigError> {
        let config = ConfigBuilder::builder()
            .add_source(File::from_str(content, format))
            .build()?;

        let config: Config = config.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    fn validate(&self) -> Result<(), ConfigError> {
        for (id, lang) in &self.languages {
            if lang.name.is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "language '{id}' has empty name"
                )));
            }
            if lang.image.is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "language '{id}' has empty image"
                )));
            }
            if lang.run.is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "language '{id}' has empty run command"
                )));
            }
        }

        if self.server.max_line_bytes == 0 {
            return Err(ConfigError::Invalid(
                "server.max_line_bytes must be greater than zero".to_owned(),
            ));
        }
        if self.server.stream_buffer == 0 {
            return Err(ConfigError::Invalid(
                "server.stream_buffer must be greater than zero".to_owned(),
            ));
        }

        Ok(())
    }
}
