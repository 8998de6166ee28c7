//! HTTP front end
//!
//! | Route        | Behavior                                              |
//! |--------------|-------------------------------------------------------|
//! | `GET /`      | liveness check, answers `pong`                        |
//! | `POST /build`| save source, stream the build log (201)               |
//! | `POST /run`  | run a built submission, stream its output (200)       |
//! | `GET /node`  | list the sandbox runtime's units                      |

use std::future::Future;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Json, State};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::runner::{BuildOutcome, RequestError, Runner};
use crate::stream::LogStream;
use crate::types::{SandboxUnit, Submission};

/// Body of `GET /`
pub const PONG: &str = "pong";

/// Body of a build for a language without a build step
pub const STAGED_MESSAGE: &str = "This language hasn't build command and saved";

/// Body of a run whose submission was never built
pub const MUST_BUILD_FIRST_MESSAGE: &str = "Shoud /build before /run";

const TEXT_PLAIN: &str = "text/plain; charset=utf-8";

/// Errors that stop the server
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("server failed: {0}")]
    Serve(#[source] std::io::Error),
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct BuildRequest {
    pub code: String,
    pub language: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct RunRequest {
    pub code: String,
    pub language: String,
    pub stdin: String,
}

#[derive(Debug, Serialize)]
pub struct NodeResponse {
    pub containers: Vec<SandboxUnit>,
}

/// Shared handler state
pub struct AppState {
    pub runner: Runner,
}

/// HTTP server over a [`Runner`]
pub struct HttpServer {
    state: Arc<AppState>,
}

impl HttpServer {
    pub fn new(runner: Runner) -> Self {
        Self {
            state: Arc::new(AppState { runner }),
        }
    }

    pub fn build_router(&self) -> Router {
        Router::new()
            .route("/", get(ping_handler))
            .route("/build", post(build_handler))
            .route("/run", post(run_handler))
            .route("/node", get(node_handler))
            .with_state(self.state.clone())
            .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any))
            .layer(TraceLayer::new_for_http())
    }

    /// Serve on the configured address until `shutdown` resolves
    pub async fn run(
        self,
        shutdown: impl Future<Output = ()> + Send + 'static,
    ) -> Result<(), ServerError> {
        let server = &self.state.runner.config().server;
        let addr = format!("{}:{}", server.host, server.port);
        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .map_err(|source| ServerError::Bind {
                addr: addr.clone(),
                source,
            })?;

        info!(%addr, "polyrun listening");

        axum::serve(listener, self.build_router())
            .with_graceful_shutdown(shutdown)
            .await
            .map_err(ServerError::Serve)
    }
}

async fn ping_handler() -> &'static str {
    PONG
}

async fn build_handler(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<BuildRequest>, JsonRejection>,
) -> Response {
    let Json(request) = match payload {
        Ok(payload) => payload,
        Err(rejection) => return bad_request(rejection),
    };

    let submission = Submission::new(request.language, request.code);
    match state.runner.build(&submission).await {
        Ok(BuildOutcome::Staged { .. }) => (StatusCode::CREATED, STAGED_MESSAGE).into_response(),
        Ok(BuildOutcome::Streaming(stream)) => stream_response(StatusCode::CREATED, stream),
        Err(e) => error_response(&state, e),
    }
}

async fn run_handler(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<RunRequest>, JsonRejection>,
) -> Response {
    let Json(request) = match payload {
        Ok(payload) => payload,
        Err(rejection) => return bad_request(rejection),
    };

    let submission = Submission::new(request.language, request.code).with_stdin(request.stdin);
    match state.runner.run(&submission).await {
        Ok(stream) => stream_response(StatusCode::OK, stream),
        Err(e) => error_response(&state, e),
    }
}

async fn node_handler(State(state): State<Arc<AppState>>) -> Response {
    match state.runner.orchestrator().list().await {
        Ok(containers) => Json(NodeResponse { containers }).into_response(),
        Err(e) => error_response(&state, RequestError::Sandbox(e)),
    }
}

fn bad_request(rejection: JsonRejection) -> Response {
    warn!(error = %rejection, "malformed request");
    (StatusCode::BAD_REQUEST, rejection.body_text()).into_response()
}

fn stream_response(status: StatusCode, stream: LogStream) -> Response {
    (
        status,
        [(header::CONTENT_TYPE, TEXT_PLAIN)],
        Body::from_stream(stream.into_stream()),
    )
        .into_response()
}

fn error_response(state: &AppState, err: RequestError) -> Response {
    if let RequestError::MustBuildFirst = err {
        return (StatusCode::BAD_REQUEST, MUST_BUILD_FIRST_MESSAGE).into_response();
    }

    let status = if err.is_caller_error() {
        warn!(error = %err, "request rejected");
        StatusCode::BAD_REQUEST
    } else {
        error!(error = %err, "request failed");
        StatusCode::INTERNAL_SERVER_ERROR
    };

    let message = if state.runner.config().server.expose_error_details {
        err.to_string()
    } else {
        err.kind().to_owned()
    };
    (status, message).into_response()
}
