//! Job lifecycle on top of a [`SandboxRuntime`]

use std::path::Path;
use std::sync::Arc;

use tokio::io::AsyncWriteExt;
use tracing::{debug, info, instrument, warn};

use crate::config::{Config, Language};
use crate::sandbox::{ByteStream, JobHandle, JobSpec, LogAttachment, SandboxError, SandboxRuntime};
use crate::types::SandboxUnit;

/// A started job and its combined output
pub struct ExecutionJob {
    pub handle: JobHandle,
    pub output: ByteStream,
}

impl std::fmt::Debug for ExecutionJob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionJob")
            .field("handle", &self.handle)
            .finish_non_exhaustive()
    }
}

/// Creates, starts, attaches to and tears down jobs
#[derive(Clone)]
pub struct SandboxOrchestrator {
    runtime: Arc<dyn SandboxRuntime>,
}

impl SandboxOrchestrator {
    pub fn new(runtime: Arc<dyn SandboxRuntime>) -> Self {
        Self { runtime }
    }

    /// Pull every configured image, failing on the first error
    #[instrument(skip_all)]
    pub async fn pull_images(&self, config: &Config) -> Result<(), SandboxError> {
        for image in config.images() {
            info!(image, "pulling image");
            self.runtime.pull_image(image).await?;
        }
        Ok(())
    }

    /// Create a job for a language with the workspace mounted
    pub async fn create(
        &self,
        language: &Language,
        workspace: &Path,
        command: Vec<String>,
        open_stdin: bool,
    ) -> Result<JobHandle, SandboxError> {
        let spec = JobSpec {
            image: language.image.clone(),
            workspace: workspace.to_path_buf(),
            command,
            open_stdin,
        };
        self.runtime.create(&spec).await
    }

    pub async fn attach_logs(&self, handle: &JobHandle) -> Result<LogAttachment, SandboxError> {
        self.runtime.attach(handle).await
    }

    pub async fn start(&self, handle: &JobHandle) -> Result<(), SandboxError> {
        self.runtime.start(handle).await
    }

    /// Force-remove a job, logging instead of failing
    pub async fn teardown(&self, handle: &JobHandle) {
        match self.runtime.remove(handle).await {
            Ok(()) => debug!(id = %handle, "job torn down"),
            Err(e) => warn!(id = %handle, error = %e, "failed to tear down job"),
        }
    }

    pub async fn list(&self) -> Result<Vec<SandboxUnit>, SandboxError> {
        self.runtime.list().await
    }

    /// Create, attach and start a job, then feed it stdin
    ///
    /// Output is attached before start so nothing emitted by a short-lived job
    /// is lost to auto-removal. When `stdin` is given the job is created with
    /// stdin open; the bytes are written and the pipe closed in the background
    /// so a job that never reads does not stall the caller.
    #[instrument(skip(self, language, workspace, command, stdin), fields(language = %language.name))]
    pub async fn launch(
        &self,
        language: &Language,
        workspace: &Path,
        command: Vec<String>,
        stdin: Option<Vec<u8>>,
    ) -> Result<ExecutionJob, SandboxError> {
        let handle = self
            .create(language, workspace, command, stdin.is_some())
            .await?;
        debug!(id = %handle, "job created");

        let attachment = match self.attach_logs(&handle).await {
            Ok(attachment) => attachment,
            Err(e) => {
                self.teardown(&handle).await;
                return Err(e);
            }
        };

        if let Err(e) = self.start(&handle).await {
            self.teardown(&handle).await;
            return Err(e);
        }
        debug!(id = %handle, "job started");

        let LogAttachment { output, stdin: sink } = attachment;
        if let (Some(mut sink), Some(input)) = (sink, stdin) {
            let id = handle.to_string();
            tokio::spawn(async move {
                if let Err(e) = sink.write_all(&input).await {
                    debug!(id, error = %e, "job closed stdin early");
                }
                if let Err(e) = sink.shutdown().await {
                    debug!(id, error = %e, "failed to close job stdin");
                }
            });
        }

        Ok(ExecutionJob { handle, output })
    }
}
