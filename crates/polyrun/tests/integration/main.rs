//! Integration tests for polyrun
//!
//! The HTTP and config tests run against an in-memory sandbox runtime and need
//! nothing installed. Tests that drive a real Docker daemon live in `docker`
//! and are compiled only with the `integration-tests` feature:
//!    cargo test -p polyrun --features integration-tests -- --include-ignored

use std::fs;
use std::sync::Arc;

use polyrun::config::Config;
use polyrun::sandbox::{MockRuntime, SandboxOrchestrator};
use polyrun::{HttpServer, Runner, WorkspaceStore};

mod config_loading;
#[cfg(feature = "integration-tests")]
mod docker;
mod http_api;

const FIXTURES_PATH: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/tests/fixtures");

/// Helper to get fixture file content
pub(crate) fn fixture_source(name: &str) -> String {
    let path = format!("{FIXTURES_PATH}/sources/{name}");
    fs::read_to_string(&path).unwrap_or_else(|e| panic!("Failed to read fixture {path}: {e}"))
}

/// Path of a config fixture
pub(crate) fn fixture_config(name: &str) -> String {
    format!("{FIXTURES_PATH}/configs/{name}")
}

/// Everything a test needs to drive the router
pub(crate) struct TestApp {
    pub router: axum::Router,
    pub runner: Runner,
    pub mock: MockRuntime,
    _dir: tempfile::TempDir,
}

/// Router over a temporary workspace root and the given mock runtime
pub(crate) async fn test_app(mock: MockRuntime, mut config: Config) -> TestApp {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    config.workspace_root = dir.path().to_path_buf();

    let store = WorkspaceStore::open(&config.workspace_root)
        .await
        .expect("Failed to open workspace store");
    let orchestrator = SandboxOrchestrator::new(Arc::new(mock.clone()));
    let runner = Runner::new(Arc::new(config), store, orchestrator);
    let router = HttpServer::new(runner.clone()).build_router();

    TestApp {
        router,
        runner,
        mock,
        _dir: dir,
    }
}
