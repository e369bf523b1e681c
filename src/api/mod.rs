//! HTTP trigger surface: manual runs and health/status.

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::get,
};
use chrono::Utc;
use tower_http::cors::CorsLayer;
use tracing::info;

use crate::digest::{AdapterHealth, RunResult};
use crate::scheduler::{Scheduler, Trigger};

/// Build the router for the trigger surface.
pub fn digest_routes(scheduler: Scheduler) -> Router {
    Router::new()
        .route("/", get(index))
        .route(
            "/process-unread-emails",
            get(process_unread).post(process_unread),
        )
        .route("/health", get(health))
        .layer(CorsLayer::permissive())
        .with_state(scheduler)
}

/// HTTP status for a manual run's result.
pub fn status_for(result: &RunResult) -> StatusCode {
    match result {
        RunResult::NoOp | RunResult::Success { .. } | RunResult::Skipped => StatusCode::OK,
        RunResult::PartialFailure { .. } => StatusCode::MULTI_STATUS,
        RunResult::Failed { .. } => StatusCode::BAD_GATEWAY,
    }
}

// ── Index ───────────────────────────────────────────────────────────────

async fn index() -> impl IntoResponse {
    Json(serde_json::json!({
        "service": "inbox-digest",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {
            "process_emails": "/process-unread-emails",
            "health": "/health",
        }
    }))
}

// ── Manual trigger ──────────────────────────────────────────────────────

async fn process_unread(State(scheduler): State<Scheduler>) -> impl IntoResponse {
    info!("Manual digest run requested");
    let result = scheduler.trigger(Trigger::Manual).await;
    (status_for(&result), Json(result))
}

// ── Health ──────────────────────────────────────────────────────────────

fn connectivity(ok: bool) -> &'static str {
    if ok { "connected" } else { "disconnected" }
}

async fn health(State(scheduler): State<Scheduler>) -> impl IntoResponse {
    let AdapterHealth {
        mail,
        summarizer,
        store,
    } = scheduler.adapter_health().await;

    let status = if mail && summarizer && store {
        "healthy"
    } else {
        "degraded"
    };

    Json(serde_json::json!({
        "status": status,
        "timestamp": Utc::now().to_rfc3339(),
        "run_state": scheduler.run_state(),
        "services": {
            "mail": connectivity(mail),
            "summarizer": connectivity(summarizer),
            "store": connectivity(store),
        },
        "last_run": scheduler.last_outcome(),
        "stats": scheduler.stats(),
    }))
}
