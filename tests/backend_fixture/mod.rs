//! In-process stand-in for the QA backend and the DevOps provider.
#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use axum::extract::{Path, State};
use axum::http::{header, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use tokio::net::TcpListener;

use pipetrack::client::ApiClient;
use pipetrack::config::{ApiConfig, ProviderConfig};
use pipetrack::results::{ResultBroadcaster, TestHistory};
use pipetrack::storage::{open_memory_pool, ExecutionStore, Pool};
use pipetrack::tracker::ExecutionTracker;

#[derive(Clone)]
struct FixtureState {
    base: String,
    hits: Arc<Mutex<Vec<String>>>,
}

impl FixtureState {
    fn hit(&self, uri: &Uri) {
        self.hits.lock().unwrap().push(uri.to_string());
    }
}

pub struct Backend {
    pub base: String,
    hits: Arc<Mutex<Vec<String>>>,
}

impl Backend {
    /// Every request path (with query) seen so far.
    pub fn hits(&self) -> Vec<String> {
        self.hits.lock().unwrap().clone()
    }

    pub fn client(&self) -> ApiClient {
        ApiClient::new(&ApiConfig {
            base_url: self.base.clone(),
            user_id: "7".to_string(),
            ..Default::default()
        })
        .unwrap()
    }

    pub fn tracker(&self) -> (ExecutionTracker, Pool) {
        let pool = open_memory_pool().unwrap();
        let tracker = ExecutionTracker::new(
            self.client().into_shared(),
            ExecutionStore::new(pool.clone()),
            ResultBroadcaster::new(pool.clone()),
            TestHistory::new(pool.clone()),
            ProviderConfig::default(),
        );
        (tracker, pool)
    }
}

pub async fn spawn_backend() -> Backend {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());
    let state = FixtureState {
        base: base.clone(),
        hits: Arc::default(),
    };

    let app = Router::new()
        .route(
            "/api/QAUser/trigger-pipeline/{user}/{project}/{pipeline}",
            post(trigger),
        )
        .route("/api/QAUser/pipeline-status/{project}/{run}", get(status))
        .route("/api/QAUser/azure-logs/{project}/{run}", get(results))
        .route(
            "/api/QAUser/download-artifact/{user}/{project}/{pipeline}/{run}",
            get(artifact),
        )
        .route("/api/Admin/projects", get(projects))
        .route("/api/Admin/projects/{project}/pipelines/sync", get(pipelines))
        .route("/files/{name}", get(file))
        .with_state(state.clone());

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    Backend {
        base,
        hits: state.hits,
    }
}

/// Pipeline ids pick the provider's answer.
async fn trigger(
    State(s): State<FixtureState>,
    uri: Uri,
    Path((_user, _project, pipeline)): Path<(String, String, i64)>,
) -> Response {
    s.hit(&uri);
    match pipeline {
        42 => Json(json!({"RunId": 777, "ExecutionId": "e-1", "State": "completed", "Result": "succeeded"}))
            .into_response(),
        43 => Json(json!({"runId": 12, "state": "inProgress"})).into_response(),
        44 => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({"error": "pipeline disabled"})),
        )
            .into_response(),
        45 => Json(json!({"RunId": 900, "State": "Completed", "Result": "failed"})).into_response(),
        46 => Json(json!({"RunId": 13, "State": "notStarted"})).into_response(),
        47 => Json(json!({"RunId": 404, "State": "inProgress"})).into_response(),
        _ => (StatusCode::NOT_FOUND, "unknown pipeline").into_response(),
    }
}

async fn status(
    State(s): State<FixtureState>,
    uri: Uri,
    Path((_project, run)): Path<(String, i64)>,
) -> Json<Value> {
    s.hit(&uri);
    match run {
        12 => Json(json!({"runId": 12, "state": "completed", "result": "succeeded"})),
        _ => Json(json!({"RunId": run, "State": "inProgress"})),
    }
}

async fn results(
    State(s): State<FixtureState>,
    uri: Uri,
    Path((_project, run)): Path<(String, i64)>,
) -> Response {
    s.hit(&uri);
    match run {
        777 => Json(json!([
            {"Id": 1, "ReportId": "r1", "Feature": "Login", "StepName": "open page", "Status": "PASSED", "Scenario": "valid user"},
            {"Id": 2, "ReportId": "r1", "Feature": "Login", "StepName": "submit", "Status": "PASSED", "Scenario": "valid user"},
            {"Id": 3, "ReportId": "r1", "Feature": "Cart", "StepName": "add item", "Status": "FAILED", "Scenario": "empty cart",
             "ExceptionType": "AssertionError", "ExceptionMessage": "expected 1 item"}
        ]))
        .into_response(),
        12 => Json(json!([
            {"featureName": "Search", "stepName": "query", "status": "passed", "scenario": "by name"},
            {"featureName": "Search", "stepName": "filter", "status": "skipped", "scenario": "by name"}
        ]))
        .into_response(),
        404 => (
            StatusCode::NOT_FOUND,
            "Pipeline execution for build 404 not found",
        )
            .into_response(),
        _ => (StatusCode::INTERNAL_SERVER_ERROR, "boom").into_response(),
    }
}

async fn projects(State(s): State<FixtureState>, uri: Uri) -> Json<Value> {
    s.hit(&uri);
    Json(json!([
        {"Id": "p-1", "Name": "Sample"},
        {"id": "p-2", "name": "Billing"}
    ]))
}

/// Project names pick the catalog shape.
async fn pipelines(
    State(s): State<FixtureState>,
    uri: Uri,
    Path(project): Path<String>,
) -> Response {
    s.hit(&uri);
    match project.as_str() {
        "Sample" => Json(json!([
            {"Id": 42, "Name": "Nightly API"},
            {"id": 43, "name": "Smoke"}
        ]))
        .into_response(),
        "Billing" => Json(json!({"value": [{"id": 7, "name": "Invoices"}]})).into_response(),
        _ => (
            StatusCode::NOT_FOUND,
            Json(json!({"message": "Project not found"})),
        )
            .into_response(),
    }
}

/// Run ids pick which provider file the artifact points at.
async fn artifact(
    State(s): State<FixtureState>,
    uri: Uri,
    Path((_user, _project, _pipeline, run)): Path<(String, String, i64, i64)>,
) -> Json<Value> {
    s.hit(&uri);
    let name = match run {
        1 | 777 => "report",
        2 => "login",
        3 => "empty",
        4 => "forbidden",
        _ => return Json(json!({"Artifacts": [], "Message": "No artifacts found"})),
    };
    Json(json!({
        "Artifacts": [{"ArtifactName": "html-report", "Size": 4, "DownloadUrl": format!("{}/files/{}", s.base, name)}],
        "Message": "ok"
    }))
}

async fn file(State(s): State<FixtureState>, uri: Uri, Path(name): Path<String>) -> Response {
    s.hit(&uri);
    match name.as_str() {
        "report" => (
            [(header::CONTENT_TYPE, "application/zip")],
            b"PK\x03\x04report".to_vec(),
        )
            .into_response(),
        "login" => (
            [(header::CONTENT_TYPE, "text/html; charset=utf-8")],
            "<html><head><title>Sign in to your account</title></head><body><form action=\"/login\"></form></body></html>",
        )
            .into_response(),
        "empty" => (
            [(header::CONTENT_TYPE, "application/octet-stream")],
            Vec::<u8>::new(),
        )
            .into_response(),
        "forbidden" => (StatusCode::FORBIDDEN, "denied").into_response(),
        _ => (StatusCode::NOT_FOUND, "gone").into_response(),
    }
}
