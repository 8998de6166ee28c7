//! Sandbox runtime abstraction
//!
//! Jobs run as ephemeral containers: created with the language image and the
//! workspace bind-mounted at [`WORKDIR`], attached for output (and stdin),
//! started, and removed by the runtime once they exit. The [`SandboxRuntime`]
//! trait is the seam to the container engine; [`DockerRuntime`] talks to
//! Docker and [`MockRuntime`] records calls in memory for tests.

use std::path::PathBuf;
use std::pin::Pin;

use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use thiserror::Error;
use tokio::io::AsyncWrite;

pub use crate::sandbox::docker::DockerRuntime;
pub use crate::sandbox::mock::MockRuntime;
pub use crate::sandbox::orchestrator::{ExecutionJob, SandboxOrchestrator};
use crate::types::SandboxUnit;

mod docker;
mod mock;
mod orchestrator;

/// Working directory of every job; the workspace is mounted here
pub const WORKDIR: &str = "/workspace";

/// Label attached to every unit created by polyrun
pub const MANAGED_BY_LABEL: &str = "managed-by";

/// Value of [`MANAGED_BY_LABEL`]
pub const MANAGED_BY_VALUE: &str = "polyrun";

/// Combined stdout/stderr of a job, in emission order
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, SandboxError>> + Send>>;

/// Write side of a job's stdin
pub type StdinSink = Pin<Box<dyn AsyncWrite + Send>>;

/// Errors reported by the sandbox runtime
#[derive(Debug, Error)]
pub enum SandboxError {
    #[error("failed to connect to container runtime: {0}")]
    Connect(String),

    #[error("failed to pull image '{image}': {message}")]
    ImagePull { image: String, message: String },

    #[error("failed to create container: {0}")]
    Create(String),

    #[error("failed to start container {id}: {message}")]
    Start { id: String, message: String },

    #[error("failed to read logs of container {id}: {message}")]
    Logs { id: String, message: String },

    #[error("failed to remove container {id}: {message}")]
    Remove { id: String, message: String },

    #[error("failed to list containers: {0}")]
    List(String),
}

impl SandboxError {
    /// Short name of the error kind, safe to show to callers
    pub fn kind(&self) -> &'static str {
        match self {
            SandboxError::Connect(_) => "sandbox runtime unavailable",
            SandboxError::ImagePull { .. } => "image pull failed",
            SandboxError::Create(_) => "sandbox create failed",
            SandboxError::Start { .. } => "sandbox start failed",
            SandboxError::Logs { .. } => "sandbox log stream failed",
            SandboxError::Remove { .. } => "sandbox remove failed",
            SandboxError::List(_) => "sandbox listing failed",
        }
    }
}

/// What to run and where
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobSpec {
    /// Container image reference
    pub image: String,

    /// Host path of the workspace, mounted read-write at [`WORKDIR`]
    pub workspace: PathBuf,

    /// Command and arguments, already expanded
    pub command: Vec<String>,

    /// Keep stdin open so input can be written after start
    pub open_stdin: bool,
}

/// Reference to a created execution unit
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct JobHandle {
    id: String,
    open_stdin: bool,
}

impl JobHandle {
    pub fn new(id: impl Into<String>, open_stdin: bool) -> Self {
        Self {
            id: id.into(),
            open_stdin,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn has_stdin(&self) -> bool {
        self.open_stdin
    }
}

impl std::fmt::Display for JobHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Docker IDs are long; the 12-char prefix is what `docker ps` shows
        write!(f, "{}", self.id.get(..12).unwrap_or(&self.id))
    }
}

/// Output stream of a job plus its stdin, if it was created with one
pub struct LogAttachment {
    pub output: ByteStream,
    pub stdin: Option<StdinSink>,
}

impl std::fmt::Debug for LogAttachment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogAttachment")
            .field("stdin", &self.stdin.is_some())
            .finish_non_exhaustive()
    }
}

/// Container engine operations used by the orchestrator
#[async_trait]
pub trait SandboxRuntime: Send + Sync {
    /// Fetch an image so later creates do not stall on it
    async fn pull_image(&self, image: &str) -> Result<(), SandboxError>;

    /// Create an execution unit that removes itself once it exits
    async fn create(&self, spec: &JobSpec) -> Result<JobHandle, SandboxError>;

    /// Attach to the unit's combined output from the beginning
    async fn attach(&self, handle: &JobHandle) -> Result<LogAttachment, SandboxError>;

    /// Start a created unit
    async fn start(&self, handle: &JobHandle) -> Result<(), SandboxError>;

    /// Kill and remove a unit; removing an already gone unit succeeds
    async fn remove(&self, handle: &JobHandle) -> Result<(), SandboxError>;

    /// All units the runtime knows about, including stopped ones
    async fn list(&self) -> Result<Vec<SandboxUnit>, SandboxError>;
}
