use sha2::{Digest, Sha256};

/// Content address of a submission
///
/// A SHA-256 digest over the language ID and the source code. The language ID
/// is length-prefixed so that ("ab", "c") and ("a", "bc") hash differently.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubmissionKey(String);

impl SubmissionKey {
    pub fn compute(language: &str, code: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update((language.len() as u64).to_le_bytes());
        hasher.update(language.as_bytes());
        hasher.update(code.as_bytes());
        Self(hex::encode(hasher.finalize()))
    }

    /// Lowercase hex digest, also used as the workspace directory name
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SubmissionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
