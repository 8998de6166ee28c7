use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use axum::Router;
use polyrun::config::Config;
use polyrun::sandbox::MockRuntime;
use polyrun::server::{MUST_BUILD_FIRST_MESSAGE, PONG, STAGED_MESSAGE};
use serde_json::{Value, json};
use tower::ServiceExt;

use super::{fixture_source, test_app};

struct Reply {
    status: StatusCode,
    content_type: Option<String>,
    body: String,
}

async fn send(router: &Router, request: Request<Body>) -> Reply {
    let response = router
        .clone()
        .oneshot(request)
        .await
        .expect("router is infallible");

    let status = response.status();
    let content_type = response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("Failed to read body");

    Reply {
        status,
        content_type,
        body: String::from_utf8(bytes.to_vec()).expect("body is utf-8"),
    }
}

fn post_json(uri: &str, payload: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(payload.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

#[tokio::test]
async fn test_ping() {
    let app = test_app(MockRuntime::new(), Config::default()).await;

    let reply = send(&app.router, get("/")).await;

    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.body, PONG);
}

#[tokio::test]
async fn test_build_interpreted_language_is_staged() {
    let app = test_app(MockRuntime::new(), Config::default()).await;

    let reply = send(
        &app.router,
        post_json("/build", json!({"language": "python", "code": "print('hi')"})),
    )
    .await;

    assert_eq!(reply.status, StatusCode::CREATED);
    assert_eq!(reply.body, STAGED_MESSAGE);
    assert!(app.mock.created().is_empty());
}

#[tokio::test]
async fn test_run_without_build() {
    let app = test_app(MockRuntime::new(), Config::default()).await;

    let reply = send(
        &app.router,
        post_json(
            "/run",
            json!({"language": "python", "code": "print('never built')", "stdin": ""}),
        ),
    )
    .await;

    assert_eq!(reply.status, StatusCode::BAD_REQUEST);
    assert_eq!(reply.body, MUST_BUILD_FIRST_MESSAGE);
    assert!(app.mock.created().is_empty());
}

#[tokio::test]
async fn test_build_compiled_language_streams_log() {
    let mock = MockRuntime::new().on_program(
        "gcc",
        &["main.c: In function 'main':\n", "main.c:4:5: warning: unused variable\n"],
    );
    let app = test_app(mock, Config::default()).await;

    let reply = send(
        &app.router,
        post_json("/build", json!({"language": "c", "code": fixture_source("hello.c")})),
    )
    .await;

    assert_eq!(reply.status, StatusCode::CREATED);
    assert_eq!(reply.content_type.as_deref(), Some("text/plain; charset=utf-8"));
    assert_eq!(
        reply.body,
        "main.c: In function 'main':\nmain.c:4:5: warning: unused variable\n"
    );

    let created = app.mock.created();
    assert_eq!(created.len(), 1);
    assert_eq!(created[0].command[0], "gcc");
    assert!(!created[0].open_stdin);
}

#[tokio::test]
async fn test_run_compiled_language_streams_output() {
    let mock = MockRuntime::new().on_program("./main", &["Hello, ", "World!\n"]);
    let app = test_app(mock, Config::default()).await;
    let code = fixture_source("hello.c");

    let build = send(
        &app.router,
        post_json("/build", json!({"language": "c", "code": code})),
    )
    .await;
    assert_eq!(build.status, StatusCode::CREATED);

    let run = send(
        &app.router,
        post_json("/run", json!({"language": "c", "code": code, "stdin": "ignored\n"})),
    )
    .await;

    assert_eq!(run.status, StatusCode::OK);
    assert_eq!(run.content_type.as_deref(), Some("text/plain; charset=utf-8"));
    assert_eq!(run.body, "Hello, World!\n");

    let created = app.mock.created();
    assert_eq!(created.len(), 2);
    assert_eq!(created[0].workspace, created[1].workspace);
    assert_eq!(created[1].command, vec!["./main"]);
    assert!(created[1].open_stdin);

    let run_id = app.mock.started()[1].clone();
    assert_eq!(app.mock.wait_for_stdin(&run_id).await, b"ignored\n");
}

#[tokio::test]
async fn test_run_passes_stdin() {
    let mock = MockRuntime::new().on_program("python3", &["HELLO\n"]);
    let app = test_app(mock, Config::default()).await;
    let code = fixture_source("echo.py");

    send(
        &app.router,
        post_json("/build", json!({"language": "python", "code": code})),
    )
    .await;
    let reply = send(
        &app.router,
        post_json("/run", json!({"language": "python", "code": code, "stdin": "hello\n"})),
    )
    .await;

    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.body, "HELLO\n");
    let id = app.mock.started()[0].clone();
    assert_eq!(app.mock.wait_for_stdin(&id).await, b"hello\n");
}

#[tokio::test]
async fn test_node_lists_containers() {
    let mock = MockRuntime::new().holding_open();
    let app = test_app(mock, Config::default()).await;
    let code = fixture_source("hello.c");

    // Keep the build streaming so its container is still listed
    let response = app
        .router
        .clone()
        .oneshot(post_json("/build", json!({"language": "c", "code": code})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    let reply = send(&app.router, get("/node")).await;
    assert_eq!(reply.status, StatusCode::OK);

    let body: Value = serde_json::from_str(&reply.body).unwrap();
    let containers = body["containers"].as_array().unwrap();
    assert_eq!(containers.len(), 1);
    assert_eq!(containers[0]["Image"], "gcc:13");
    assert_eq!(containers[0]["State"], "running");
    assert_eq!(containers[0]["Labels"]["managed-by"], "polyrun");
    assert!(containers[0]["Id"].is_string());

    drop(response);
}

#[tokio::test]
async fn test_node_empty() {
    let app = test_app(MockRuntime::new(), Config::default()).await;

    let reply = send(&app.router, get("/node")).await;

    assert_eq!(reply.status, StatusCode::OK);
    let body: Value = serde_json::from_str(&reply.body).unwrap();
    assert_eq!(body, json!({"containers": []}));
}

#[tokio::test]
async fn test_malformed_json() {
    let app = test_app(MockRuntime::new(), Config::default()).await;

    let request = Request::builder()
        .method("POST")
        .uri("/build")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{\"language\": \"c\", "))
        .unwrap();
    let reply = send(&app.router, request).await;

    assert_eq!(reply.status, StatusCode::BAD_REQUEST);
    assert!(!reply.body.is_empty());
    assert!(app.mock.created().is_empty());
}

#[tokio::test]
async fn test_missing_fields_default_to_empty() {
    let app = test_app(MockRuntime::new(), Config::default()).await;

    let reply = send(&app.router, post_json("/build", json!({}))).await;

    // An empty language ID is simply not configured
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);
    assert_eq!(reply.body, "language '' is not configured");
}

#[tokio::test]
async fn test_unknown_language() {
    let app = test_app(MockRuntime::new(), Config::default()).await;

    let reply = send(
        &app.router,
        post_json("/run", json!({"language": "cobol", "code": "DISPLAY 'HI'."})),
    )
    .await;

    assert_eq!(reply.status, StatusCode::BAD_REQUEST);
    assert!(reply.body.contains("cobol"));
}

#[tokio::test]
async fn test_sandbox_failure_exposes_detail_by_default() {
    let app = test_app(MockRuntime::new().failing_create(), Config::default()).await;

    let reply = send(
        &app.router,
        post_json("/build", json!({"language": "c", "code": fixture_source("hello.c")})),
    )
    .await;

    assert_eq!(reply.status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(reply.body.contains("No such image: gcc:13"));
}

#[tokio::test]
async fn test_sandbox_failure_hides_detail_when_configured() {
    let mut config = Config::default();
    config.server.expose_error_details = false;
    let app = test_app(MockRuntime::new().failing_create(), config).await;

    let reply = send(
        &app.router,
        post_json("/build", json!({"language": "c", "code": fixture_source("hello.c")})),
    )
    .await;

    assert_eq!(reply.status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(reply.body, "sandbox create failed");
}

#[tokio::test]
async fn test_attach_failure_removes_container() {
    let app = test_app(MockRuntime::new().failing_attach(), Config::default()).await;
    let code = fixture_source("echo.py");

    send(
        &app.router,
        post_json("/build", json!({"language": "python", "code": code})),
    )
    .await;
    let reply = send(
        &app.router,
        post_json("/run", json!({"language": "python", "code": code, "stdin": "x\n"})),
    )
    .await;

    assert_eq!(reply.status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(reply.body.contains("attach refused"));
    assert_eq!(app.mock.created().len(), 1);
    assert!(app.mock.started().is_empty());
    assert_eq!(app.mock.removed().len(), 1);
    assert!(app.runner.locks().is_empty());
}

#[tokio::test]
async fn test_cors_allows_any_origin() {
    let app = test_app(MockRuntime::new(), Config::default()).await;

    let request = Request::builder()
        .uri("/")
        .header(header::ORIGIN, "https://editor.example.org")
        .body(Body::empty())
        .unwrap();
    let response = app.router.clone().oneshot(request).await.unwrap();

    assert_eq!(
        response.headers().get(header::ACCESS_CONTROL_ALLOW_ORIGIN).unwrap(),
        "*"
    );
}

#[tokio::test]
async fn test_rebuild_keeps_one_workspace() {
    let app = test_app(MockRuntime::new(), Config::default()).await;
    let payload = json!({"language": "python", "code": "print(1)"});

    for _ in 0..3 {
        let reply = send(&app.router, post_json("/build", payload.clone())).await;
        assert_eq!(reply.status, StatusCode::CREATED);
    }

    let root = app.runner.store().root();
    assert_eq!(std::fs::read_dir(root).unwrap().count(), 1);
}
