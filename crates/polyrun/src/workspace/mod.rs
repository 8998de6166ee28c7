//! Content-addressed workspaces
//!
//! Every submission owns one directory under the store root, named by its
//! [`SubmissionKey`]. The directory holds the source file and whatever the
//! build step leaves behind, and is bind-mounted into each job.

use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, instrument};

pub use crate::workspace::key::SubmissionKey;
pub use crate::workspace::locks::{WorkspaceGuard, WorkspaceLocks};
use crate::config::Language;

mod key;
mod locks;

/// Errors that occur while preparing a workspace
#[derive(Debug, Error)]
pub enum WorkspaceError {
    #[error("workspace I/O failed at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl WorkspaceError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Directory store with one workspace per submission key
#[derive(Debug, Clone)]
pub struct WorkspaceStore {
    root: PathBuf,
}

impl WorkspaceStore {
    /// Open a store, creating the root if needed
    ///
    /// The root is canonicalized because workspace paths are handed to the
    /// container runtime as bind-mount sources, which must be absolute.
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self, WorkspaceError> {
        let root = root.into();
        tokio::fs::create_dir_all(&root)
            .await
            .map_err(|e| WorkspaceError::io(&root, e))?;
        let root = tokio::fs::canonicalize(&root)
            .await
            .map_err(|e| WorkspaceError::io(&root, e))?;

        debug!(?root, "opened workspace store");
        Ok(Self { root })
    }

    /// Get the store root
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Host path of the workspace for a key (whether or not it exists)
    pub fn path(&self, key: &SubmissionKey) -> PathBuf {
        self.root.join(key.as_str())
    }

    /// Host path of a language's source file inside a workspace
    pub fn source_path(&self, key: &SubmissionKey, language: &Language) -> PathBuf {
        self.path(key).join(language.source_name.as_str())
    }

    /// Create the workspace directory if absent
    #[instrument(skip(self, key), fields(key = %key))]
    pub async fn ensure(&self, key: &SubmissionKey) -> Result<PathBuf, WorkspaceError> {
        let path = self.path(key);
        tokio::fs::create_dir_all(&path)
            .await
            .map_err(|e| WorkspaceError::io(&path, e))?;
        Ok(path)
    }

    /// Write or overwrite the source file of a workspace
    ///
    /// The write is not atomic; callers serialize writers per key.
    #[instrument(skip(self, key, language, code), fields(key = %key, source = %language.source_name))]
    pub async fn write_source(
        &self,
        key: &SubmissionKey,
        language: &Language,
        code: &[u8],
    ) -> Result<(), WorkspaceError> {
        let path = self.source_path(key, language);
        tokio::fs::write(&path, code)
            .await
            .map_err(|e| WorkspaceError::io(&path, e))?;
        debug!(?path, len = code.len(), "wrote source file");
        Ok(())
    }

    /// Check if a workspace holds the language's source file
    pub async fn exists(&self, key: &SubmissionKey, language: &Language) -> bool {
        tokio::fs::metadata(self.source_path(key, language))
            .await
            .map(|meta| meta.is_file())
            .unwrap_or(false)
    }
}
