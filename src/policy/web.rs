use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};

use crate::policy::polling::VersionPollingService;
use crate::policy::types::{CheckRequest, CheckResponse, ReloadResponse, VersionResponse};

pub fn router(polling: Arc<VersionPollingService>) -> Router {
    Router::new()
        .route("/v1/check", post(handle_check))
        .route("/v1/reload", post(handle_reload))
        .route("/v1/version", get(handle_version))
        .route("/healthz", get(health))
        .with_state(polling)
}

async fn handle_check(
    State(polling): State<Arc<VersionPollingService>>,
    Json(req): Json<CheckRequest>,
) -> impl IntoResponse {
    match polling
        .engine()
        .evaluate(&req.role, &req.resource, &req.action)
        .await
    {
        Ok(allowed) => Json(CheckResponse { allowed }).into_response(),
        Err(e) => e.into_response(),
    }
}

/// Explicit reload: failures are returned to the caller, not swallowed.
async fn handle_reload(State(polling): State<Arc<VersionPollingService>>) -> impl IntoResponse {
    let engine = polling.engine().clone();
    match polling.loader().load_policies(engine.as_ref()).await {
        Ok(report) => Json(ReloadResponse {
            rules_loaded: report.loaded,
        })
        .into_response(),
        Err(e) => e.into_response(),
    }
}

async fn handle_version(State(polling): State<Arc<VersionPollingService>>) -> impl IntoResponse {
    let state = polling.state();
    Json(VersionResponse {
        cached_version: state.cached_version,
        polling_enabled: state.enabled,
        rule_count: polling.engine().rule_count().await,
    })
}

async fn health() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}
