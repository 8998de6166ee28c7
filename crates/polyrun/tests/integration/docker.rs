use std::sync::Arc;

use polyrun::config::Config;
use polyrun::runner::BuildOutcome;
use polyrun::sandbox::{DockerRuntime, SandboxOrchestrator};
use polyrun::{Runner, Submission, WorkspaceStore};

use super::fixture_source;

async fn docker_runner() -> (tempfile::TempDir, Runner) {
    let config = Config::default();
    let runtime = DockerRuntime::connect(&config.docker).expect("Failed to connect to docker");
    runtime.ping().await.expect("Docker daemon is not reachable");

    let orchestrator = SandboxOrchestrator::new(Arc::new(runtime));
    orchestrator
        .pull_images(&config)
        .await
        .expect("Failed to pull images");

    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let store = WorkspaceStore::open(dir.path())
        .await
        .expect("Failed to open workspace store");
    (dir, Runner::new(Arc::new(config), store, orchestrator))
}

#[tokio::test]
#[ignore = "requires docker"]
async fn test_c_build_and_run() {
    let (_dir, runner) = docker_runner().await;
    let submission = Submission::new("c", fixture_source("hello.c"));

    let BuildOutcome::Streaming(build) = runner.build(&submission).await.expect("build failed")
    else {
        panic!("c has a build step");
    };
    build.collect_lines().await.expect("build log failed");

    let lines = runner
        .run(&submission)
        .await
        .expect("run failed")
        .collect_lines()
        .await
        .expect("run output failed");
    assert_eq!(lines, vec!["Hello, World!\n"]);
}

#[tokio::test]
#[ignore = "requires docker"]
async fn test_c_run_reads_stdin() {
    let (_dir, runner) = docker_runner().await;
    let submission = Submission::new("c", fixture_source("sum.c")).with_stdin("19 23\n");

    if let BuildOutcome::Streaming(build) = runner.build(&submission).await.expect("build failed") {
        build.collect_lines().await.expect("build log failed");
    }

    let lines = runner
        .run(&submission)
        .await
        .expect("run failed")
        .collect_lines()
        .await
        .expect("run output failed");
    assert_eq!(lines, vec!["42\n"]);
}

#[tokio::test]
#[ignore = "requires docker"]
async fn test_python_staged_run() {
    let (_dir, runner) = docker_runner().await;
    let submission = Submission::new("python", fixture_source("echo.py")).with_stdin("a\nb\n");

    assert!(matches!(
        runner.build(&submission).await.expect("build failed"),
        BuildOutcome::Staged { .. }
    ));

    let lines = runner
        .run(&submission)
        .await
        .expect("run failed")
        .collect_lines()
        .await
        .expect("run output failed");
    assert_eq!(lines, vec!["A\n", "B\n"]);
}

#[tokio::test]
#[ignore = "requires docker"]
async fn test_list_includes_stopped_units() {
    let (_dir, runner) = docker_runner().await;

    let units = runner
        .orchestrator()
        .list()
        .await
        .expect("Failed to list containers");
    assert!(units.iter().all(|unit| !unit.id.is_empty()));
}
