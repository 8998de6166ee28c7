use serde::{Deserialize, Deserializer, Serialize, de};

use crate::config::ConfigError;

/// Placeholder expanded to the language's source file name
pub const SOURCE_PLACEHOLDER: &str = "{source}";

/// Configuration for a programming language
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Language {
    /// Human-readable name for the language (e.g., "C (GCC 13)")
    pub name: String,

    /// Container image that provides the toolchain
    #[serde(alias = "docker_image")]
    pub image: String,

    /// Build command and arguments (empty for interpreted languages)
    #[serde(default, alias = "build_cmd")]
    pub build: Vec<String>,

    /// Run command and arguments
    #[serde(alias = "run_cmd")]
    pub run: Vec<String>,

    /// Name of the source file inside the workspace (e.g., "main.c")
    #[serde(alias = "code_file")]
    pub source_name: SourceName,
}

impl Language {
    /// Check if the language has a build step
    pub fn is_compiled(&self) -> bool {
        !self.build.is_empty()
    }

    /// Build command with placeholders expanded
    pub fn build_command(&self) -> Vec<String> {
        Self::expand_command(&self.build, self.source_name.as_str())
    }

    /// Run command with placeholders expanded
    pub fn run_command(&self) -> Vec<String> {
        Self::expand_command(&self.run, self.source_name.as_str())
    }

    /// Expand placeholders in the given command
    pub fn expand_command(command: &[String], source: &str) -> Vec<String> {
        command
            .iter()
            .map(|arg| arg.replace(SOURCE_PLACEHOLDER, source))
            .collect()
    }
}

/// Plain file name of a workspace source file (e.g., "main.c")
///
/// Rejects anything that could resolve outside the workspace directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceName(String);

impl SourceName {
    pub fn new(name: &str) -> Result<Self, ConfigError> {
        if name.is_empty() || name == "." || name.contains('/') || name.contains("..") {
            return Err(ConfigError::InvalidSourceName(name.to_owned()));
        }
        Ok(Self(name.to_owned()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl<'de> Deserialize<'de> for SourceName {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        SourceName::new(&s).map_err(|_| {
            de::Error::invalid_value(
                de::Unexpected::Str(&s),
                &"a plain file name without '/' or '..'",
            )
        })
    }
}

impl std::fmt::Display for SourceName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
