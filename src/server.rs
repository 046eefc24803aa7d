//! HTTP control plane.
//!
//! Routes:
//! - `POST /build`: run the pipeline, return the unified result
//! - `GET /logs?agent=&level=&limit=`: newest-first log entries
//! - `GET /mcp/status`: tool registry snapshot
//! - `GET /mcp/simulate`: fixed demo activity strings
//! - `GET /health`: liveness

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Query, State,
    },
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::core::{
    simulate_activity, LimitViolation, LogQuery, LogStore, Orchestrator, RegistrySnapshot,
    ToolRegistry,
};
use crate::domain::{LogEntry, LogLevel, PipelineResult};

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
    pub logs: Arc<LogStore>,
    pub registry: Arc<ToolRegistry>,
    pub default_log_limit: usize,
}

impl AppState {
    pub fn new(orchestrator: Orchestrator, default_log_limit: usize) -> Self {
        Self {
            logs: orchestrator.logs().clone(),
            registry: orchestrator.registry().clone(),
            orchestrator: Arc::new(orchestrator),
            default_log_limit,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct BuildRequest {
    pub prompt: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct LogsParams {
    pub agent: Option<String>,
    pub level: Option<String>,
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: &'static str,
    pub version: &'static str,
}

/// Client-facing error: 422 with `{error, reason}`
#[derive(Debug)]
pub enum ApiError {
    InvalidPrompt(LimitViolation),
    /// Request body missing, not JSON, or the wrong shape
    InvalidBody(String),
    InvalidQuery(String),
    Internal(String),
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::InvalidBody(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::InvalidQuery(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error, reason) = match self {
            ApiError::InvalidPrompt(v) => {
                (StatusCode::UNPROCESSABLE_ENTITY, "invalid_prompt", v.to_string())
            }
            ApiError::InvalidBody(reason) => {
                (StatusCode::UNPROCESSABLE_ENTITY, "invalid_body", reason)
            }
            ApiError::InvalidQuery(reason) => {
                (StatusCode::UNPROCESSABLE_ENTITY, "invalid_query", reason)
            }
            ApiError::Internal(reason) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", reason)
            }
        };
        (status, Json(json!({ "error": error, "reason": reason }))).into_response()
    }
}

/// Build the application router
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/build", post(build))
        .route("/logs", get(logs))
        .route("/mcp/status", get(mcp_status))
        .route("/mcp/simulate", get(mcp_simulate))
        .route("/health", get(health))
        .with_state(state)
}

/// Serve until ctrl-c
pub async fn serve(state: AppState, bind: &str) -> Result<()> {
    let listener = TcpListener::bind(bind)
        .await
        .with_context(|| format!("Failed to bind {}", bind))?;

    info!(address = %bind, "SYNAPSE-X control plane listening");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!(error = %e, "Failed to listen for shutdown signal");
            }
            info!("Shutting down");
        })
        .await
        .context("Server error")
}

/// Run the pipeline for one prompt.
///
/// The run executes in its own task. If the client goes away the request
/// future is dropped, which cancels the token; the run then stops at the next
/// stage boundary and still records its abort and completion logs.
pub async fn build(
    State(state): State<AppState>,
    payload: Result<Json<BuildRequest>, JsonRejection>,
) -> Result<Json<PipelineResult>, ApiError> {
    let Json(request) = payload?;
    state
        .orchestrator
        .validate_prompt(&request.prompt)
        .map_err(ApiError::InvalidPrompt)?;

    let cancel = CancellationToken::new();
    let _disconnect = cancel.clone().drop_guard();

    let orchestrator = state.orchestrator.clone();
    let handle = tokio::spawn(async move { orchestrator.run(&request.prompt, cancel).await });

    let result = handle
        .await
        .map_err(|e| ApiError::Internal(format!("pipeline task failed: {}", e)))?;

    Ok(Json(result))
}

pub async fn logs(
    State(state): State<AppState>,
    params: Result<Query<LogsParams>, QueryRejection>,
) -> Result<Json<Vec<LogEntry>>, ApiError> {
    let Query(params) = params?;
    let mut query = LogQuery::latest(params.limit.unwrap_or(state.default_log_limit));

    if let Some(agent) = params.agent.filter(|a| !a.is_empty()) {
        query = query.agent(agent);
    }
    if let Some(level) = params.level.filter(|l| !l.is_empty()) {
        let level: LogLevel = level.parse().map_err(ApiError::InvalidQuery)?;
        query = query.level(level);
    }

    Ok(Json(state.logs.query(&query)))
}

pub async fn mcp_status(State(state): State<AppState>) -> Json<RegistrySnapshot> {
    Json(state.registry.snapshot())
}

pub async fn mcp_simulate() -> Json<Vec<String>> {
    Json(simulate_activity())
}

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        service: "SYNAPSE-X",
        version: env!("CARGO_PKG_VERSION"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::FromRequest;

    fn state() -> AppState {
        let orchestrator =
            Orchestrator::new(Arc::new(LogStore::new()), Arc::new(ToolRegistry::new()));
        AppState::new(orchestrator, 50)
    }

    #[tokio::test]
    async fn test_build_rejects_short_prompt() {
        let result = build(
            State(state()),
            Ok(Json(BuildRequest {
                prompt: "hi".to_string(),
            })),
        )
        .await;

        let response = result.unwrap_err().into_response();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn test_build_then_logs_and_status() {
        let state = state();
        let Json(result) = build(
            State(state.clone()),
            Ok(Json(BuildRequest {
                prompt: "Deploy app to production".to_string(),
            })),
        )
        .await
        .unwrap();
        assert!(result.stages.dev.is_skipped());

        let Json(entries) = logs(
            State(state.clone()),
            Ok(Query(LogsParams {
                agent: Some("devops_agent".to_string()),
                ..Default::default()
            })),
        )
        .await
        .unwrap();
        assert_eq!(entries.len(), 1);

        let Json(snapshot) = mcp_status(State(state)).await;
        assert_eq!(snapshot["deployment_mcp"].invocations, 1);
        assert_eq!(snapshot["git_mcp"].invocations, 2);
    }

    #[tokio::test]
    async fn test_logs_rejects_unknown_level() {
        let result = logs(
            State(state()),
            Ok(Query(LogsParams {
                level: Some("verbose".to_string()),
                ..Default::default()
            })),
        )
        .await;
        assert!(matches!(result, Err(ApiError::InvalidQuery(_))));
    }

    async fn error_body(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    async fn build_with_body(body: &'static str) -> Response {
        let request = axum::http::Request::builder()
            .method("POST")
            .uri("/build")
            .header("content-type", "application/json")
            .body(axum::body::Body::from(body))
            .unwrap();
        let payload = Json::<BuildRequest>::from_request(request, &()).await;

        match build(State(state()), payload).await {
            Ok(_) => panic!("malformed body accepted"),
            Err(e) => e.into_response(),
        }
    }

    #[tokio::test]
    async fn test_build_rejects_malformed_body() {
        for body in ["{not json", r#"{"text": "Build a todo api"}"#] {
            let response = build_with_body(body).await;
            assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

            let json = error_body(response).await;
            assert_eq!(json["error"], "invalid_body");
            assert!(json["reason"].as_str().is_some_and(|r| !r.is_empty()));
        }
    }

    #[tokio::test]
    async fn test_logs_rejects_non_numeric_limit() {
        let uri: axum::http::Uri = "/logs?limit=lots".parse().unwrap();
        let params = Query::<LogsParams>::try_from_uri(&uri);
        assert!(params.is_err());

        let response = logs(State(state()), params).await.unwrap_err().into_response();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(error_body(response).await["error"], "invalid_query");
    }

    #[tokio::test]
    async fn test_health() {
        let Json(health) = health().await;
        assert_eq!(health.status, "healthy");
        assert_eq!(health.service, "SYNAPSE-X");
    }
}
