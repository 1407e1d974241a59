//! Backend clients against an in-process HTTP fixture.

mod backend_fixture;

use chrono::{TimeZone, Utc};

use backend_fixture::spawn_backend;
use pipetrack::client::{ClientError, ErrorKind, PipelineApi, RunPhase, RunResult};
use pipetrack::model::StepStatus;

#[tokio::test]
async fn test_trigger_normalizes_pascal_case() {
    let backend = spawn_backend().await;
    let client = backend.client();

    let state = client.trigger("Sample", 42, None).await.unwrap();
    assert_eq!(state.run_id, 777);
    assert_eq!(state.phase, RunPhase::Completed);
    assert_eq!(state.result, Some(RunResult::Succeeded));
    assert!(state.is_success());

    assert_eq!(
        backend.hits(),
        vec!["/api/QAUser/trigger-pipeline/7/Sample/42".to_string()]
    );
}

#[tokio::test]
async fn test_trigger_sends_scheduled_time_without_waiting() {
    let backend = spawn_backend().await;
    let client = backend.client();
    let at = Utc.with_ymd_and_hms(2030, 1, 2, 3, 4, 5).unwrap();

    let state = client.trigger("Sample", 43, Some(at)).await.unwrap();
    assert_eq!(state.run_id, 12);
    assert_eq!(state.phase, RunPhase::Active("inProgress".to_string()));

    let hits = backend.hits();
    assert_eq!(hits.len(), 1);
    assert!(
        hits[0].contains("scheduledTime=2030-01-02T03%3A04%3A05.000Z"),
        "unexpected request: {}",
        hits[0]
    );
}

#[tokio::test]
async fn test_trigger_error_carries_server_message() {
    let backend = spawn_backend().await;
    let err = backend.client().trigger("Sample", 44, None).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Client);
    assert!(matches!(err, ClientError::Http { status: 500, .. }));
    assert!(err.to_string().contains("pipeline disabled"));
}

#[tokio::test]
async fn test_results_for_run_zero_never_hit_the_network() {
    let backend = spawn_backend().await;
    let err = backend.client().fetch_results(0, "Sample").await.unwrap_err();

    assert!(matches!(err, ClientError::NoExecution));
    assert!(err.is_transient());
    assert!(backend.hits().is_empty());
}

#[tokio::test]
async fn test_results_normalize_status_casing() {
    let backend = spawn_backend().await;
    let client = backend.client();

    let steps = client.fetch_results(777, "Sample").await.unwrap();
    assert_eq!(steps.len(), 3);
    assert_eq!(steps[0].status, StepStatus::Passed);
    assert_eq!(steps[2].status, StepStatus::Failed);
    assert_eq!(steps[2].exception_type.as_deref(), Some("AssertionError"));

    let steps = client.fetch_results(12, "Sample").await.unwrap();
    assert_eq!(steps[0].feature, "Search");
    assert_eq!(steps[0].status, StepStatus::Passed);
    assert_eq!(steps[1].status, StepStatus::Skipped);
}

#[tokio::test]
async fn test_results_not_found_is_pending() {
    let backend = spawn_backend().await;
    let client = backend.client();

    let err = client.fetch_results(404, "Sample").await.unwrap_err();
    assert!(matches!(err, ClientError::ExecutionPending(_)));
    assert!(err.is_transient());

    let err = client.fetch_results(500, "Sample").await.unwrap_err();
    assert!(!err.is_transient());
    assert!(err.to_string().contains("boom"));
}

#[tokio::test]
async fn test_download_fetches_zip_bytes() {
    let backend = spawn_backend().await;
    let artifact = backend.client().download_report("Sample", 42, 1).await.unwrap();

    assert_eq!(&artifact.bytes[..], b"PK\x03\x04report");
    assert_eq!(artifact.content_type, "application/zip");

    let hits = backend.hits();
    assert_eq!(hits[0], "/api/QAUser/download-artifact/7/Sample/42/1");
    assert!(hits[1].starts_with("/files/report?"));
    assert!(hits[1].contains("format=zip"));
}

#[tokio::test]
async fn test_download_login_page_is_auth_required() {
    let backend = spawn_backend().await;
    let err = backend.client().download_report("Sample", 42, 2).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::AuthRequired);
    let url = err.login_url().unwrap();
    assert!(url.starts_with(&format!("{}/files/login", backend.base)));
}

#[tokio::test]
async fn test_download_empty_file_is_distinct() {
    let backend = spawn_backend().await;
    let err = backend.client().download_report("Sample", 42, 3).await.unwrap_err();

    assert!(matches!(err, ClientError::EmptyFile));
    assert_ne!(err.kind(), ErrorKind::AuthRequired);
}

#[tokio::test]
async fn test_download_forbidden_is_auth_required() {
    let backend = spawn_backend().await;
    let err = backend.client().download_report("Sample", 42, 4).await.unwrap_err();
    assert!(matches!(err, ClientError::AuthRequired { .. }));
}

#[tokio::test]
async fn test_download_without_artifacts() {
    let backend = spawn_backend().await;
    let err = backend.client().download_report("Sample", 42, 5).await.unwrap_err();
    assert!(matches!(err, ClientError::NoArtifacts));
    assert_eq!(backend.hits().len(), 1);
}

#[tokio::test]
async fn test_catalog_lists_projects_and_pipelines() {
    let backend = spawn_backend().await;
    let client = backend.client();

    let projects = client.projects().await.unwrap();
    let names: Vec<_> = projects.iter().map(|p| p.name.as_str()).collect();
    assert_eq!(names, ["Sample", "Billing"]);
    assert_eq!(projects[1].id, "p-2");

    let pipelines = client.pipelines("Sample").await.unwrap();
    assert_eq!(pipelines.len(), 2);
    assert_eq!(pipelines[0].id, 42);
    assert_eq!(pipelines[0].name, "Nightly API");
    assert_eq!(pipelines[1].name, "Smoke");

    let wrapped = client.pipelines("Billing").await.unwrap();
    assert_eq!(wrapped[0].id, 7);

    assert_eq!(
        backend.hits(),
        vec![
            "/api/Admin/projects".to_string(),
            "/api/Admin/projects/Sample/pipelines/sync".to_string(),
            "/api/Admin/projects/Billing/pipelines/sync".to_string(),
        ]
    );
}

#[tokio::test]
async fn test_catalog_unknown_project() {
    let backend = spawn_backend().await;
    let err = backend.client().pipelines("Missing").await.unwrap_err();
    match err {
        ClientError::Http { status, message } => {
            assert_eq!(status, 404);
            assert_eq!(message, "Project not found");
        }
        other => panic!("unexpected error: {:?}", other),
    }
}
