use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::workspace::SubmissionKey;

/// Source code submitted for building or running
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Submission {
    /// Language ID as configured (e.g., "c", "python")
    pub language: String,

    /// Source code text
    pub code: String,

    /// Input fed to the program on a run (ignored by builds)
    pub stdin: Option<String>,
}

impl Submission {
    pub fn new(language: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            language: language.into(),
            code: code.into(),
            stdin: None,
        }
    }

    pub fn with_stdin(mut self, stdin: impl Into<String>) -> Self {
        self.stdin = Some(stdin.into());
        self
    }

    /// Content address of this submission's workspace
    ///
    /// Depends on the language and code only; stdin never affects the key.
    pub fn key(&self) -> SubmissionKey {
        SubmissionKey::compute(&self.language, &self.code)
    }
}

/// Descriptor of an execution unit known to the sandbox runtime
///
/// Field names follow the Docker container listing so existing clients of
/// `GET /node` keep working.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SandboxUnit {
    pub id: String,
    pub names: Vec<String>,
    pub image: String,
    pub command: String,
    /// Creation time as a Unix timestamp
    pub created: i64,
    pub state: String,
    pub status: String,
    pub labels: HashMap<String, String>,
}
