//! Ingress - HTTP front door that authenticates and admits jobs
//!
//! `POST /task` (also served as `POST /quiz`) answers immediately; the work
//! itself runs under the Supervisor and the submitter never sees its outcome.

use std::sync::Arc;

use axum::Router;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::json;
use subtle::ConstantTimeEq;
use tokio::net::TcpListener;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::IngressConfig;
use crate::supervisor::{JobState, Supervisor};

/// Shared state behind every handler
#[derive(Clone)]
pub struct IngressState {
    supervisor: Supervisor,
    secret: Arc<str>,
}

impl IngressState {
    pub fn new(supervisor: Supervisor, secret: impl Into<Arc<str>>) -> Self {
        Self {
            supervisor,
            secret: secret.into(),
        }
    }

    fn authorized(&self, presented: &str) -> bool {
        presented.as_bytes().ct_eq(self.secret.as_bytes()).into()
    }
}

/// Body of `POST /task`
#[derive(Debug, Clone, Deserialize)]
pub struct TaskRequest {
    pub email: String,
    pub secret: String,
    pub url: String,
}

/// Immediate acknowledgement of an accepted job
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskAccepted {
    pub status: String,
    pub job_id: Uuid,
}

/// Build the ingress router
pub fn router(state: IngressState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/task", post(submit_task))
        .route("/quiz", post(submit_task))
        .route("/jobs/{id}", get(job_status))
        .with_state(state)
}

/// Bind and serve until the process is stopped
pub async fn serve(config: &IngressConfig, state: IngressState) -> Result<()> {
    let addr = format!("{}:{}", config.bind, config.port);
    let listener = TcpListener::bind(&addr)
        .await
        .context(format!("Failed to bind {}", addr))?;
    info!(%addr, "Ingress listening");
    axum::serve(listener, router(state)).await.context("Ingress server failed")?;
    Ok(())
}

async fn health() -> &'static str {
    "ok"
}

/// POST /task - authenticate, hand the locator to the supervisor, acknowledge
async fn submit_task(State(state): State<IngressState>, Json(request): Json<TaskRequest>) -> Response {
    debug!(email = %request.email, url = %request.url, "submit_task: called");
    if !state.authorized(&request.secret) {
        warn!(email = %request.email, "Rejected task with invalid secret");
        return (StatusCode::FORBIDDEN, Json(json!({ "detail": "Invalid secret" }))).into_response();
    }

    let job_id = state.supervisor.submit(request.url);
    Json(TaskAccepted {
        status: "ok".to_string(),
        job_id,
    })
    .into_response()
}

/// GET /jobs/{id} - current state of a job
async fn job_status(
    State(state): State<IngressState>,
    Path(id): Path<Uuid>,
) -> Result<Json<JobState>, StatusCode> {
    state.supervisor.status(id).map(Json).ok_or(StatusCode::NOT_FOUND)
}
