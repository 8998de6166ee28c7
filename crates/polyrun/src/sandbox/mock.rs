//! In-memory sandbox runtime for tests

use std::collections::{HashMap, HashSet};
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll};

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{self, StreamExt};
use tokio::io::AsyncWrite;
use tokio::sync::Notify;

use crate::sandbox::{
    JobHandle, JobSpec, LogAttachment, MANAGED_BY_LABEL, MANAGED_BY_VALUE, SandboxError,
    SandboxRuntime,
};
use crate::types::SandboxUnit;

/// How a job's output ends once the scripted chunks are exhausted
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
enum Ending {
    #[default]
    Exit,
    ReadError,
    HoldOpen,
}

#[derive(Debug, Default)]
struct MockState {
    output: Vec<Bytes>,
    output_by_program: HashMap<String, Vec<Bytes>>,
    ending: Ending,
    fail_create: bool,
    fail_attach: bool,
    fail_start: bool,
    fail_pull: bool,
    next_id: usize,
    created: Vec<(JobHandle, JobSpec)>,
    started: Vec<String>,
    removed: Vec<String>,
    pulled: Vec<String>,
    stdin: HashMap<String, Vec<u8>>,
    stdin_closed: HashSet<String>,
}

/// Sandbox runtime that scripts job output and records every call
///
/// Clones share state, so a test can keep one handle for inspection while the
/// code under test owns another.
#[derive(Debug, Clone, Default)]
pub struct MockRuntime {
    state: Arc<Mutex<MockState>>,
    stdin_closed: Arc<Notify>,
}

impl MockRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    /// Output every job emits, one chunk per entry
    pub fn with_output(self, chunks: &[&str]) -> Self {
        self.with_chunks(chunks.iter().map(|c| Bytes::copy_from_slice(c.as_bytes())))
    }

    pub fn with_chunks(self, chunks: impl IntoIterator<Item = Bytes>) -> Self {
        self.lock().output = chunks.into_iter().collect();
        self
    }

    /// Output of jobs whose command starts with `program`
    pub fn on_program(self, program: &str, chunks: &[&str]) -> Self {
        let chunks = chunks
            .iter()
            .map(|c| Bytes::copy_from_slice(c.as_bytes()))
            .collect();
        self.lock()
            .output_by_program
            .insert(program.to_owned(), chunks);
        self
    }

    /// End every output stream with a read error
    pub fn failing_read(self) -> Self {
        self.lock().ending = Ending::ReadError;
        self
    }

    /// Keep every output stream open after its chunks
    pub fn holding_open(self) -> Self {
        self.lock().ending = Ending::HoldOpen;
        self
    }

    pub fn failing_create(self) -> Self {
        self.lock().fail_create = true;
        self
    }

    pub fn failing_attach(self) -> Self {
        self.lock().fail_attach = true;
        self
    }

    pub fn failing_start(self) -> Self {
        self.lock().fail_start = true;
        self
    }

    pub fn failing_pull(self) -> Self {
        self.lock().fail_pull = true;
        self
    }

    /// Specs of every created job, in order
    pub fn created(&self) -> Vec<JobSpec> {
        self.lock()
            .created
            .iter()
            .map(|(_, spec)| spec.clone())
            .collect()
    }

    /// IDs of started jobs, in order
    pub fn started(&self) -> Vec<String> {
        self.lock().started.clone()
    }

    /// IDs of removed jobs, in order
    pub fn removed(&self) -> Vec<String> {
        self.lock().removed.clone()
    }

    /// Images pulled, in order
    pub fn pulled(&self) -> Vec<String> {
        self.lock().pulled.clone()
    }

    /// Wait until a job's stdin is closed and return what was written
    pub async fn wait_for_stdin(&self, id: &str) -> Vec<u8> {
        loop {
            let notified = self.stdin_closed.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let state = self.lock();
                if state.stdin_closed.contains(id) {
                    return state.stdin.get(id).cloned().unwrap_or_default();
                }
            }

            notified.await;
        }
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Stdin sink that records into the shared mock state
struct MockStdin {
    id: String,
    state: Arc<Mutex<MockState>>,
    closed: Arc<Notify>,
}

impl MockStdin {
    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl AsyncWrite for MockStdin {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<std::io::Result<usize>> {
        self.lock()
            .stdin
            .entry(self.id.clone())
            .or_default()
            .extend_from_slice(buf);
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        {
            let mut state = self.lock();
            state.stdin.entry(self.id.clone()).or_default();
            state.stdin_closed.insert(self.id.clone());
        }
        self.closed.notify_waiters();
        Poll::Ready(Ok(()))
    }
}

#[async_trait]
impl SandboxRuntime for MockRuntime {
    async fn pull_image(&self, image: &str) -> Result<(), SandboxError> {
        let mut state = self.lock();
        state.pulled.push(image.to_owned());
        if state.fail_pull {
            return Err(SandboxError::ImagePull {
                image: image.to_owned(),
                message: "pull access denied".to_owned(),
            });
        }
        Ok(())
    }

    async fn create(&self, spec: &JobSpec) -> Result<JobHandle, SandboxError> {
        let mut state = self.lock();
        if state.fail_create {
            return Err(SandboxError::Create(format!(
                "No such image: {}",
                spec.image
            )));
        }

        state.next_id += 1;
        let handle = JobHandle::new(format!("mock-{}", state.next_id), spec.open_stdin);
        state.created.push((handle.clone(), spec.clone()));
        Ok(handle)
    }

    async fn attach(&self, handle: &JobHandle) -> Result<LogAttachment, SandboxError> {
        let state = self.lock();
        if state.fail_attach {
            return Err(SandboxError::Logs {
                id: handle.id().to_owned(),
                message: "attach refused".to_owned(),
            });
        }

        let program = state
            .created
            .iter()
            .find(|(created, _)| created == handle)
            .and_then(|(_, spec)| spec.command.first().cloned());
        let chunks = program
            .and_then(|program| state.output_by_program.get(&program).cloned())
            .unwrap_or_else(|| state.output.clone());

        let head = stream::iter(chunks.into_iter().map(Ok));
        let output = match state.ending {
            Ending::Exit => head.boxed(),
            Ending::ReadError => {
                let error = SandboxError::Logs {
                    id: handle.id().to_owned(),
                    message: "connection reset".to_owned(),
                };
                head.chain(stream::once(async move { Err(error) })).boxed()
            }
            Ending::HoldOpen => head.chain(stream::pending()).boxed(),
        };

        let stdin = handle.has_stdin().then(|| {
            Box::pin(MockStdin {
                id: handle.id().to_owned(),
                state: self.state.clone(),
                closed: self.stdin_closed.clone(),
            }) as Pin<Box<dyn AsyncWrite + Send>>
        });

        Ok(LogAttachment { output, stdin })
    }

    async fn start(&self, handle: &JobHandle) -> Result<(), SandboxError> {
        let mut state = self.lock();
        if state.fail_start {
            return Err(SandboxError::Start {
                id: handle.id().to_owned(),
                message: "exec format error".to_owned(),
            });
        }
        state.started.push(handle.id().to_owned());
        Ok(())
    }

    async fn remove(&self, handle: &JobHandle) -> Result<(), SandboxError> {
        self.lock().removed.push(handle.id().to_owned());
        Ok(())
    }

    async fn list(&self) -> Result<Vec<SandboxUnit>, SandboxError> {
        let state = self.lock();
        let units = state
            .created
            .iter()
            .filter(|(handle, _)| !state.removed.iter().any(|id| id == handle.id()))
            .map(|(handle, spec)| {
                let running = state.started.iter().any(|id| id == handle.id());
                SandboxUnit {
                    id: handle.id().to_owned(),
                    names: vec![format!("/{}", handle.id())],
                    image: spec.image.clone(),
                    command: spec.command.join(" "),
                    state: if running { "running" } else { "created" }.to_owned(),
                    status: if running { "Up" } else { "Created" }.to_owned(),
                    labels: HashMap::from([(
                        MANAGED_BY_LABEL.to_owned(),
                        MANAGED_BY_VALUE.to_owned(),
                    )]),
                    ..Default::default()
                }
            })
            .collect();
        Ok(units)
    }
}
