//! Pipeline trigger and run-status requests.
//!
//! Provider integrations disagree on field names (`RunId` vs `runId`) and
//! on the casing of state strings; both are folded into [`RunState`] here.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Deserialize;
use tracing::{debug, warn};

use super::error::{ClientError, Result};
use super::ApiClient;

/// Whether the provider considers the run finished.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunPhase {
    Completed,
    /// Any non-terminal state, carrying the provider's own label.
    Active(String),
}

impl RunPhase {
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.eq_ignore_ascii_case("completed") {
            RunPhase::Completed
        } else if trimmed.is_empty() {
            RunPhase::Active("pending".to_string())
        } else {
            RunPhase::Active(trimmed.to_string())
        }
    }
}

/// Final result of a completed run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunResult {
    Succeeded,
    PartiallySucceeded,
    Failed,
    Canceled,
    Other(String),
}

impl RunResult {
    /// `None` for an absent result (`""` or `none`).
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        let result = match trimmed.to_ascii_lowercase().as_str() {
            "" | "none" => return None,
            "succeeded" => RunResult::Succeeded,
            "partiallysucceeded" => RunResult::PartiallySucceeded,
            "failed" => RunResult::Failed,
            "canceled" | "cancelled" => RunResult::Canceled,
            _ => RunResult::Other(trimmed.to_string()),
        };
        Some(result)
    }
}

impl std::fmt::Display for RunResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunResult::Succeeded => write!(f, "succeeded"),
            RunResult::PartiallySucceeded => write!(f, "partiallySucceeded"),
            RunResult::Failed => write!(f, "failed"),
            RunResult::Canceled => write!(f, "canceled"),
            RunResult::Other(s) => write!(f, "{}", s),
        }
    }
}

/// Canonical shape of a trigger or status response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunState {
    /// `0` when the provider did not assign a run.
    pub run_id: i64,
    pub phase: RunPhase,
    pub result: Option<RunResult>,
    pub url: Option<String>,
}

impl RunState {
    pub fn is_terminal(&self) -> bool {
        self.phase == RunPhase::Completed
    }

    /// Only a completed run with a `succeeded` result counts.
    pub fn is_success(&self) -> bool {
        self.is_terminal() && self.result == Some(RunResult::Succeeded)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawRunResponse {
    #[serde(default, alias = "RunId", alias = "runID")]
    run_id: Option<i64>,
    #[serde(default, alias = "State")]
    state: Option<String>,
    #[serde(default, alias = "Result")]
    result: Option<String>,
    #[serde(default, alias = "Url")]
    url: Option<String>,
}

impl From<RawRunResponse> for RunState {
    fn from(raw: RawRunResponse) -> Self {
        RunState {
            run_id: raw.run_id.unwrap_or(0),
            phase: RunPhase::parse(raw.state.as_deref().unwrap_or_default()),
            result: raw.result.as_deref().and_then(RunResult::parse),
            url: raw.url.filter(|u| !u.is_empty()),
        }
    }
}

/// Normalize a provider response body into a [`RunState`].
pub fn parse_run_state(body: &str) -> Result<RunState> {
    let raw: RawRunResponse =
        serde_json::from_str(body).map_err(|e| ClientError::Malformed(e.to_string()))?;
    Ok(raw.into())
}

impl ApiClient {
    /// `POST .../trigger-pipeline/{userId}/{project}/{pipelineId}`.
    ///
    /// The request is sent immediately; `scheduled_time` only travels as the
    /// `scheduledTime` query parameter.
    pub async fn trigger_pipeline(
        &self,
        project: &str,
        pipeline_id: i64,
        scheduled_time: Option<DateTime<Utc>>,
    ) -> Result<RunState> {
        let pipeline = pipeline_id.to_string();
        let mut url = self.endpoint(&["trigger-pipeline", self.user_id.as_str(), project, pipeline.as_str()])?;
        if let Some(at) = scheduled_time {
            url.query_pairs_mut()
                .append_pair("scheduledTime", &at.to_rfc3339_opts(SecondsFormat::Millis, true));
        }

        debug!(%url, project, pipeline_id, scheduled = ?scheduled_time, "Triggering pipeline");
        let response = self
            .http
            .post(url)
            .json(&serde_json::json!({}))
            .send()
            .await
            .map_err(|e| {
                warn!(project, pipeline_id, "Trigger request failed: {}", e);
                ClientError::from(e)
            })?;

        let state = read_run_state(response).await?;
        debug!(run_id = state.run_id, phase = ?state.phase, "Pipeline triggered");
        Ok(state)
    }

    /// `GET .../pipeline-status/{project}/{runId}`.
    pub async fn run_status(&self, project: &str, run_id: i64) -> Result<RunState> {
        if run_id == 0 {
            return Err(ClientError::NoExecution);
        }

        let run = run_id.to_string();
        let url = self.endpoint(&["pipeline-status", project, run.as_str()])?;
        let response = self.http.get(url).send().await?;
        let mut state = read_run_state(response).await?;
        if state.run_id == 0 {
            state.run_id = run_id;
        }
        Ok(state)
    }
}

async fn read_run_state(response: reqwest::Response) -> Result<RunState> {
    let status = response.status();
    let body = response.text().await?;
    if !status.is_success() {
        return Err(ClientError::from_status(status, &body));
    }
    parse_run_state(&body)
}
