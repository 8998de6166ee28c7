//! Build and run coordination
//!
//! A [`Runner`] sequences the workspace store, the per-key locks and the
//! sandbox orchestrator for the two request flows, [`Runner::build`] and
//! [`Runner::run`]. Both hand back a [`LogStream`] fed by a background task
//! that owns the job and the workspace lock until the output ends or the
//! caller goes away.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{Instrument, debug, info_span, warn};

pub use crate::runner::build::BuildOutcome;

mod build;
mod run;

use crate::config::{Config, Language};
use crate::sandbox::{ExecutionJob, JobHandle, SandboxError, SandboxOrchestrator};
use crate::stream::{LineStream, LogStream, StreamError};
use crate::workspace::{WorkspaceError, WorkspaceGuard, WorkspaceLocks, WorkspaceStore};

/// Errors that end a build or run request before output starts
#[derive(Debug, Error)]
pub enum RequestError {
    #[error("language '{0}' is not configured")]
    UnknownLanguage(String),

    #[error("source has not been built; build it before running")]
    MustBuildFirst,

    #[error(transparent)]
    Workspace(#[from] WorkspaceError),

    #[error(transparent)]
    Sandbox(#[from] SandboxError),
}

impl RequestError {
    /// Short name of the error kind, safe to show to callers
    pub fn kind(&self) -> &'static str {
        match self {
            RequestError::UnknownLanguage(_) => "unknown language",
            RequestError::MustBuildFirst => "must build first",
            RequestError::Workspace(_) => "workspace unavailable",
            RequestError::Sandbox(e) => e.kind(),
        }
    }

    /// Whether the request itself was at fault
    pub fn is_caller_error(&self) -> bool {
        matches!(
            self,
            RequestError::UnknownLanguage(_) | RequestError::MustBuildFirst
        )
    }
}

/// Coordinates builds and runs of submissions
#[derive(Clone)]
pub struct Runner {
    config: Arc<Config>,
    store: WorkspaceStore,
    locks: WorkspaceLocks,
    orchestrator: SandboxOrchestrator,
}

impl Runner {
    pub fn new(
        config: Arc<Config>,
        store: WorkspaceStore,
        orchestrator: SandboxOrchestrator,
    ) -> Self {
        Self {
            config,
            store,
            locks: WorkspaceLocks::new(),
            orchestrator,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn store(&self) -> &WorkspaceStore {
        &self.store
    }

    pub fn locks(&self) -> &WorkspaceLocks {
        &self.locks
    }

    pub fn orchestrator(&self) -> &SandboxOrchestrator {
        &self.orchestrator
    }

    fn language(&self, id: &str) -> Result<&Language, RequestError> {
        self.config
            .languages
            .get(id)
            .ok_or_else(|| RequestError::UnknownLanguage(id.to_owned()))
    }

    /// Pump a job's output into a bounded channel
    ///
    /// The spawned task owns `guard` until it returns. It stops at end of
    /// output, after forwarding a read error, when the job deadline passes, or
    /// when the receiver is dropped. In the last three cases the job is
    /// force-removed.
    fn stream_job(&self, job: ExecutionJob, guard: WorkspaceGuard) -> LogStream {
        let (tx, stream) = LogStream::channel(self.config.server.stream_buffer);
        let orchestrator = self.orchestrator.clone();
        let max_line_bytes = self.config.server.max_line_bytes;
        let timeout = self.config.server.job_timeout();
        let ExecutionJob { handle, output } = job;
        let span = info_span!("job", id = %handle, key = %guard.key());

        tokio::spawn(
            async move {
                let mut lines = LineStream::new(output, max_line_bytes);
                let deadline = deadline(timeout);
                tokio::pin!(deadline);

                loop {
                    let line = tokio::select! {
                        _ = tx.closed() => {
                            debug!("caller went away");
                            orchestrator.teardown(&handle).await;
                            break;
                        }
                        limit = &mut deadline => {
                            expire(&orchestrator, &handle, &tx, limit).await;
                            break;
                        }
                        line = lines.next_line() => line,
                    };

                    match line {
                        Some(Ok(line)) => {
                            // A slow reader must not stretch the deadline
                            let sent = tokio::select! {
                                sent = tx.send(Ok(line)) => sent.is_ok(),
                                limit = &mut deadline => {
                                    expire(&orchestrator, &handle, &tx, limit).await;
                                    break;
                                }
                            };
                            if !sent {
                                debug!("caller went away");
                                orchestrator.teardown(&handle).await;
                                break;
                            }
                        }
                        Some(Err(e)) => {
                            warn!(error = %e, "job output failed");
                            let _ = tx.send(Err(e)).await;
                            orchestrator.teardown(&handle).await;
                            break;
                        }
                        None => {
                            debug!("job output finished");
                            break;
                        }
                    }
                }

                // Release the workspace before the caller sees end of output
                drop(guard);
                drop(tx);
            }
            .instrument(span),
        );

        stream
    }
}

/// Tear down a job that ran out of time, then tell the caller why
async fn expire(
    orchestrator: &SandboxOrchestrator,
    handle: &JobHandle,
    tx: &mpsc::Sender<Result<String, StreamError>>,
    limit: Duration,
) {
    warn!(?limit, "job deadline passed");
    orchestrator.teardown(handle).await;
    let _ = tx.send(Err(StreamError::Deadline(limit))).await;
}

/// Resolves after `timeout`, or never
async fn deadline(timeout: Option<Duration>) -> Duration {
    match timeout {
        Some(limit) => {
            tokio::time::sleep(limit).await;
            limit
        }
        None => std::future::pending().await,
    }
}
