//! API Server
//!
//! REST surface over the Shipwright orchestrator. Every response, success or
//! failure, is an [`ApiResponse`] envelope whose `status` matches the HTTP
//! status line.
//!
//! # Endpoints
//!
//! - POST /api/projects - Create a project
//! - GET /api/projects - List projects
//! - GET|PATCH|DELETE /api/projects/:id - Read, update or delete a project
//! - POST /api/projects/:id/start | stop - Lifecycle transitions
//! - POST /api/projects/:id/plan - Generate a plan
//! - GET /api/projects/:id/plan - Active plan
//! - POST /api/projects/:id/execute - Run the active plan
//! - POST /api/projects/:id/validate - Validate the active plan
//! - GET /api/projects/:id/logs?limit=N - Recent telemetry
//! - GET /api/health - System health
//! - GET /api/agents - Registered agents

use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use sdk::{ApiResponse, EngineError, ErrorExt, ErrorKind, Requirements};
use serde::{Deserialize, Serialize};
use shipwright_engine::conductor::ProjectUpdate;
use shipwright_engine::Orchestrator;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

#[derive(Clone)]
struct ServerState {
    orchestrator: Arc<Orchestrator>,
    /// Expose internal error details in responses
    debug: bool,
}

#[derive(Debug, Deserialize)]
struct CreateProjectRequest {
    name: String,
    project_type: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    requirements: Requirements,
}

#[derive(Debug, Deserialize)]
struct LogsQuery {
    limit: Option<usize>,
}

/// Envelope plus the HTTP status it carries
struct Reply(ApiResponse);

impl IntoResponse for Reply {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.0.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(self.0)).into_response()
    }
}

impl ServerState {
    fn reply<T: Serialize>(&self, result: Result<T, EngineError>) -> Reply {
        self.reply_with(200, result)
    }

    fn reply_with<T: Serialize>(&self, status: u16, result: Result<T, EngineError>) -> Reply {
        match result {
            Ok(value) => {
                let mut response = ApiResponse::from_serializable(&value);
                if response.success {
                    response.status = status;
                }
                Reply(response)
            }
            Err(e) => {
                if e.kind() == ErrorKind::Internal {
                    tracing::error!("Request failed: {}", e);
                }
                Reply(ApiResponse::from_error(&e, self.debug))
            }
        }
    }
}

fn bad_body(rejection: JsonRejection) -> Reply {
    Reply(ApiResponse::from_error(
        &EngineError::InvalidInput(rejection.body_text()),
        false,
    ))
}

/// Build the API router over a shared orchestrator
pub fn router(orchestrator: Arc<Orchestrator>, debug: bool) -> Router {
    let state = ServerState {
        orchestrator,
        debug,
    };

    Router::new()
        .route("/api/projects", post(create_project).get(list_projects))
        .route(
            "/api/projects/:id",
            get(get_project).patch(update_project).delete(delete_project),
        )
        .route("/api/projects/:id/start", post(start_project))
        .route("/api/projects/:id/stop", post(stop_project))
        .route("/api/projects/:id/plan", post(generate_plan).get(get_plan))
        .route("/api/projects/:id/execute", post(execute_project))
        .route("/api/projects/:id/validate", post(validate_project))
        .route("/api/projects/:id/logs", get(project_logs))
        .route("/api/health", get(health))
        .route("/api/agents", get(list_agents))
        .fallback(not_found)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn create_project(
    State(state): State<ServerState>,
    body: Result<Json<CreateProjectRequest>, JsonRejection>,
) -> Reply {
    let Json(request) = match body {
        Ok(body) => body,
        Err(rejection) => return bad_body(rejection),
    };
    let result = state
        .orchestrator
        .create_project_with_requirements(
            &request.name,
            &request.project_type,
            &request.description,
            request.requirements,
        )
        .await;
    state.reply_with(201, result)
}

async fn list_projects(State(state): State<ServerState>) -> Reply {
    let projects = state.orchestrator.list_projects().await;
    state.reply(Ok(projects))
}

async fn get_project(State(state): State<ServerState>, Path(id): Path<String>) -> Reply {
    state.reply(state.orchestrator.get_project(&id).await)
}

async fn update_project(
    State(state): State<ServerState>,
    Path(id): Path<String>,
    body: Result<Json<ProjectUpdate>, JsonRejection>,
) -> Reply {
    let Json(update) = match body {
        Ok(body) => body,
        Err(rejection) => return bad_body(rejection),
    };
    state.reply(state.orchestrator.update_project(&id, update).await)
}

async fn delete_project(State(state): State<ServerState>, Path(id): Path<String>) -> Reply {
    state.reply(state.orchestrator.delete_project(&id).await)
}

async fn start_project(State(state): State<ServerState>, Path(id): Path<String>) -> Reply {
    state.reply(state.orchestrator.start_project(&id).await)
}

async fn stop_project(State(state): State<ServerState>, Path(id): Path<String>) -> Reply {
    state.reply(state.orchestrator.stop_project(&id).await)
}

async fn generate_plan(State(state): State<ServerState>, Path(id): Path<String>) -> Reply {
    state.reply_with(201, state.orchestrator.generate_execution_plan(&id).await)
}

async fn get_plan(State(state): State<ServerState>, Path(id): Path<String>) -> Reply {
    state.reply(state.orchestrator.active_plan(&id).await)
}

async fn execute_project(State(state): State<ServerState>, Path(id): Path<String>) -> Reply {
    state.reply(state.orchestrator.execute_project_plan(&id).await)
}

async fn validate_project(State(state): State<ServerState>, Path(id): Path<String>) -> Reply {
    state.reply(state.orchestrator.validate_project(&id).await)
}

async fn project_logs(
    State(state): State<ServerState>,
    Path(id): Path<String>,
    Query(query): Query<LogsQuery>,
) -> Reply {
    state.reply(state.orchestrator.get_project_logs(&id, query.limit).await)
}

async fn health(State(state): State<ServerState>) -> Reply {
    let health = state.orchestrator.get_system_health().await;
    state.reply(Ok(health))
}

async fn list_agents(State(state): State<ServerState>) -> Reply {
    let agents = state.orchestrator.list_agents().await;
    state.reply(Ok(agents))
}

async fn not_found() -> Reply {
    Reply(ApiResponse {
        success: false,
        data: serde_json::Value::Null,
        error: Some("No such endpoint".to_string()),
        status: 404,
    })
}

/// A running API server
pub struct ApiServer {
    addr: SocketAddr,
    shutdown_tx: Option<tokio::sync::oneshot::Sender<()>>,
    handle: tokio::task::JoinHandle<()>,
}

impl ApiServer {
    /// Bind `addr` and serve the router in the background.
    ///
    /// Binding port 0 picks a free port; see [`ApiServer::local_addr`].
    pub async fn start(
        orchestrator: Arc<Orchestrator>,
        debug: bool,
        addr: SocketAddr,
    ) -> Result<Self, EngineError> {
        let listener = tokio::net::TcpListener::bind(addr).await?;
        let addr = listener.local_addr()?;
        let app = router(orchestrator, debug);

        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();

        let handle = tokio::spawn(async move {
            tracing::info!("API server listening on http://{}", addr);

            axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    shutdown_rx.await.ok();
                    tracing::info!("API server shutting down gracefully");
                })
                .await
                .unwrap_or_else(|e| {
                    tracing::error!("API server error: {}", e);
                });
        });

        Ok(Self {
            addr,
            shutdown_tx: Some(shutdown_tx),
            handle,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    /// Stop accepting connections and wait for in-flight requests
    pub async fn stop(mut self) {
        if let Some(shutdown_tx) = self.shutdown_tx.take() {
            shutdown_tx.send(()).ok();
        }
        self.handle.await.ok();
        tracing::info!("API server stopped");
    }
}
