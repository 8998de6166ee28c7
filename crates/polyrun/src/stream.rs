//! Line-oriented job output
//!
//! [`LineStream`] turns the raw byte stream of a job into text lines, each
//! ending in `\n`. [`LogStream`] is the receiving end handed to callers; a pump
//! task owned by the runner feeds it through a bounded channel.

use std::time::Duration;

use bytes::BytesMut;
use futures::{Stream, StreamExt};
use thiserror::Error;
use tokio::sync::mpsc;

use crate::sandbox::{ByteStream, SandboxError};

/// Errors that end a job's output stream early
#[derive(Debug, Error)]
pub enum StreamError {
    #[error("reading job output failed: {0}")]
    Read(#[source] SandboxError),

    #[error("job exceeded its deadline of {0:?}")]
    Deadline(Duration),
}

impl StreamError {
    pub fn kind(&self) -> &'static str {
        match self {
            StreamError::Read(e) => e.kind(),
            StreamError::Deadline(_) => "job deadline exceeded",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Open,
    Eof,
    Failed,
}

/// Splits a byte stream into lines
///
/// Lines are yielded as soon as their terminator arrives. A trailing `\r` is
/// dropped, and an unterminated fragment at end of stream becomes a final
/// line. A line longer than `max_line_bytes` is cut into chunks of that size,
/// so a multi-byte character straddling a cut is replaced lossily.
pub struct LineStream {
    inner: ByteStream,
    buffer: BytesMut,
    max_line_bytes: usize,
    state: State,
}

impl LineStream {
    pub fn new(inner: ByteStream, max_line_bytes: usize) -> Self {
        Self {
            inner,
            buffer: BytesMut::new(),
            max_line_bytes: max_line_bytes.max(1),
            state: State::Open,
        }
    }

    /// Next line, or `None` once the stream has ended
    ///
    /// A read error is yielded once, after which the stream is over.
    pub async fn next_line(&mut self) -> Option<Result<String, StreamError>> {
        loop {
            match self.state {
                State::Failed => return None,
                State::Eof => return self.take_line().or_else(|| self.take_rest()).map(Ok),
                State::Open => {
                    if let Some(line) = self.take_line() {
                        return Some(Ok(line));
                    }
                }
            }

            match self.inner.next().await {
                Some(Ok(chunk)) => self.buffer.extend_from_slice(&chunk),
                Some(Err(e)) => {
                    self.state = State::Failed;
                    self.buffer.clear();
                    return Some(Err(StreamError::Read(e)));
                }
                None => self.state = State::Eof,
            }
        }
    }

    /// Convert into a [`Stream`] of lines
    pub fn into_stream(self) -> impl Stream<Item = Result<String, StreamError>> + Send {
        futures::stream::unfold(self, |mut lines| async move {
            lines.next_line().await.map(|line| (line, lines))
        })
    }

    fn take_line(&mut self) -> Option<String> {
        let newline = self.buffer.iter().position(|&b| b == b'\n');
        match newline {
            Some(end) if content_len(&self.buffer[..end]) <= self.max_line_bytes => {
                let line = self.buffer.split_to(end + 1);
                Some(render(&line[..end], true))
            }
            Some(_) => Some(self.take_chunk()),
            // One byte past the cap may still be the `\r` of a `\r\n`
            None if self.buffer.len() > self.max_line_bytes + 1 => Some(self.take_chunk()),
            None => None,
        }
    }

    fn take_rest(&mut self) -> Option<String> {
        if self.buffer.is_empty() {
            return None;
        }
        if content_len(&self.buffer) > self.max_line_bytes {
            return Some(self.take_chunk());
        }
        let rest = self.buffer.split();
        Some(render(&rest, true))
    }

    fn take_chunk(&mut self) -> String {
        let chunk = self.buffer.split_to(self.max_line_bytes);
        render(&chunk, false)
    }
}

/// Length of a line without its trailing `\r`
fn content_len(bytes: &[u8]) -> usize {
    bytes.len() - usize::from(bytes.last() == Some(&b'\r'))
}

fn render(bytes: &[u8], strip_cr: bool) -> String {
    let bytes = match bytes {
        [head @ .., b'\r'] if strip_cr => head,
        _ => bytes,
    };
    let mut line = String::from_utf8_lossy(bytes).into_owned();
    line.push('\n');
    line
}

/// Lines of a running job, delivered through a bounded channel
///
/// Dropping the stream closes the channel, which the producing task takes as
/// the signal to tear the job down.
#[derive(Debug)]
pub struct LogStream {
    rx: mpsc::Receiver<Result<String, StreamError>>,
}

impl LogStream {
    /// Create a stream and the sender that feeds it
    pub fn channel(buffer: usize) -> (mpsc::Sender<Result<String, StreamError>>, Self) {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        (tx, Self { rx })
    }

    /// Receive the next line
    pub async fn recv(&mut self) -> Option<Result<String, StreamError>> {
        self.rx.recv().await
    }

    /// Collect every remaining line, stopping at the first error
    pub async fn collect_lines(mut self) -> Result<Vec<String>, StreamError> {
        let mut lines = Vec::new();
        while let Some(line) = self.recv().await {
            lines.push(line?);
        }
        Ok(lines)
    }

    pub fn into_stream(self) -> impl Stream<Item = Result<String, StreamError>> + Send {
        futures::stream::unfold(self, |mut stream| async move {
            stream.recv().await.map(|line| (line, stream))
        })
    }
}
