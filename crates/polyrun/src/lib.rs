//! A library for building and running submitted code in ephemeral containers.
//!
//! Polyrun accepts source code in any configured language, stores it in a
//! content-addressed workspace, and runs the language's build and run commands
//! in short-lived sandbox containers with the workspace mounted. Job output is
//! streamed back line by line while the job runs.
//!
//! # Features
//!
//! - **Content-addressed workspaces**: identical submissions share one directory.
//! - **Multi-language**: compiled and interpreted languages from one config file.
//! - **Ephemeral sandboxes**: every build or run is a fresh container, removed on exit.
//! - **Streaming output**: lines are forwarded as soon as the job prints them.
//! - **HTTP front end**: `axum` router with build, run and listing routes.

pub use config::{Config, ConfigError, EXAMPLE_CONFIG, Language};
pub use runner::{BuildOutcome, RequestError, Runner};
pub use sandbox::{
    DockerRuntime, MockRuntime, SandboxError, SandboxOrchestrator, SandboxRuntime,
};
pub use server::{HttpServer, ServerError};
pub use stream::{LineStream, LogStream, StreamError};
pub use types::{SandboxUnit, Submission};
pub use workspace::{SubmissionKey, WorkspaceError, WorkspaceStore};

pub mod config;
pub mod runner;
pub mod sandbox;
pub mod server;
pub mod stream;
pub mod types;
pub mod workspace;
