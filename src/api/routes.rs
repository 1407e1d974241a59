//! API route definitions.

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::{routing::get, Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::error;

use super::state::AppState;
use crate::results::{HistoryEntry, HISTORY_LIMIT};

pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/execution", get(execution))
        .route("/results", get(latest_results))
        .route("/history", get(history))
}

async fn health() -> Json<Value> {
    Json(json!({
        "data": {
            "status": "ok",
            "version": env!("CARGO_PKG_VERSION")
        },
        "meta": {
            "timestamp": chrono::Utc::now().to_rfc3339(),
            "version": env!("CARGO_PKG_VERSION")
        }
    }))
}

async fn execution(State(state): State<AppState>) -> Json<Value> {
    let tracker = &state.tracker;
    match tracker.current() {
        Some(exec) => Json(json!({
            "data": exec,
            "meta": {
                "phase": tracker.phase(),
                "displayName": exec.display_name(),
                "currentPipelineName": tracker.current_pipeline_name(),
            }
        })),
        None => Json(json!({
            "data": null,
            "meta": { "phase": tracker.phase(), "message": "no pipeline execution tracked" }
        })),
    }
}

async fn latest_results(State(state): State<AppState>) -> Json<Value> {
    match state.tracker.results().latest() {
        Some(summary) => Json(json!({
            "data": summary.as_ref(),
            "meta": { "headline": summary.headline() }
        })),
        None => Json(json!({ "data": null, "meta": { "message": "no test results yet" } })),
    }
}

#[derive(Debug, Deserialize)]
struct HistoryQuery {
    limit: Option<usize>,
}

async fn history(
    State(state): State<AppState>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    let limit = query.limit.unwrap_or(HISTORY_LIMIT).min(HISTORY_LIMIT);
    let history = state.tracker.history();

    let read = history.list(limit).and_then(|entries| Ok((entries, history.trends()?)));
    let (entries, trends): (Vec<HistoryEntry>, _) = read.map_err(|e| {
        error!("Failed to read test history: {}", e);
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": "failed to read test history" })),
        )
    })?;

    Ok(Json(json!({
        "data": entries,
        "meta": { "total": entries.len(), "trends": trends }
    })))
}
