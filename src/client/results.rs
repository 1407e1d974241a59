//! Step-level result fetches.

use serde::Deserialize;
use tracing::{debug, warn};

use super::error::{server_message, ClientError, Result};
use super::ApiClient;
use crate::config::ResultsRoute;
use crate::model::{StepStatus, TestStepResult};

/// One step as the backend sends it. Field casing varies by integration.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawStepResult {
    #[serde(default, alias = "Feature", alias = "featureName", alias = "FeatureName")]
    feature: Option<String>,
    #[serde(default, alias = "Scenario")]
    scenario: Option<String>,
    #[serde(default, alias = "StepName")]
    step_name: Option<String>,
    #[serde(default, alias = "Status")]
    status: Option<String>,
    #[serde(default, alias = "ExceptionType")]
    exception_type: Option<String>,
    #[serde(default, alias = "ExceptionMessage")]
    exception_message: Option<String>,
}

impl From<RawStepResult> for TestStepResult {
    fn from(raw: RawStepResult) -> Self {
        TestStepResult {
            feature: raw.feature.unwrap_or_default(),
            scenario: raw.scenario.unwrap_or_default(),
            step_name: raw.step_name.unwrap_or_default(),
            status: StepStatus::normalize(raw.status.as_deref().unwrap_or_default()),
            exception_type: raw.exception_type.filter(|s| !s.is_empty()),
            exception_message: raw.exception_message.filter(|s| !s.is_empty()),
        }
    }
}

/// Normalize a results payload. A `null` body is an empty run.
pub fn parse_step_results(body: &str) -> Result<Vec<TestStepResult>> {
    let raw: Option<Vec<RawStepResult>> =
        serde_json::from_str(body).map_err(|e| ClientError::Malformed(e.to_string()))?;
    Ok(raw
        .unwrap_or_default()
        .into_iter()
        .map(TestStepResult::from)
        .collect())
}

/// Whether a failure means the provider has not produced the run yet,
/// e.g. "Pipeline execution for build 0 not found".
pub fn is_pending_message(message: &str) -> bool {
    let lower = message.to_ascii_lowercase();
    lower.contains("not found") && (lower.contains("execution") || lower.contains("build"))
}

impl ApiClient {
    /// Fetch the step results of `run_id`.
    ///
    /// `run_id == 0` fails with [`ClientError::NoExecution`] without sending
    /// anything.
    pub async fn step_results(&self, run_id: i64, project: &str) -> Result<Vec<TestStepResult>> {
        if run_id == 0 {
            return Err(ClientError::NoExecution);
        }

        let run = run_id.to_string();
        let url = match self.results_route {
            ResultsRoute::AzureLogs => self.endpoint(&["azure-logs", project, run.as_str()])?,
            ResultsRoute::TestResults => self.endpoint(&[
                "test-results",
                self.user_id.as_str(),
                project,
                run.as_str(),
            ])?,
        };

        debug!(%url, run_id, project, "Fetching test results");
        let response = self.http.get(url).send().await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            let message = server_message(&body).unwrap_or_else(|| status.to_string());
            if status == reqwest::StatusCode::NOT_FOUND || is_pending_message(&message) {
                debug!(run_id, "Execution not available yet: {}", message);
                return Err(ClientError::ExecutionPending(message));
            }
            warn!(run_id, status = status.as_u16(), "Fetching test results failed: {}", message);
            return Err(ClientError::from_status(status, &body));
        }

        let results = parse_step_results(&body)?;
        debug!(run_id, count = results.len(), "Fetched test results");
        Ok(results)
    }
}
