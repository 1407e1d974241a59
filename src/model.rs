//! Core records: the tracked pipeline execution and normalized step results.

use serde::{Deserialize, Deserializer, Serialize};

/// Stage label written while the trigger request is in flight.
pub const STAGE_INITIATING: &str = "Initiating pipeline...";
/// Stage label written once the provider reports a terminal state.
pub const STAGE_COMPLETED: &str = "Completed";
/// Stage label written when polling gives up on a run.
pub const STAGE_TIMED_OUT: &str = "Timed out";

/// Progress of a tracked execution as last reported.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionStatus {
    pub is_running: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_stage: Option<String>,
}

impl ExecutionStatus {
    pub fn initiating() -> Self {
        Self {
            is_running: true,
            progress: Some(0),
            current_stage: Some(STAGE_INITIATING.to_string()),
        }
    }

    pub fn running(stage: impl Into<String>) -> Self {
        Self {
            is_running: true,
            progress: Some(50),
            current_stage: Some(stage.into()),
        }
    }

    pub fn completed() -> Self {
        Self {
            is_running: false,
            progress: Some(100),
            current_stage: Some(STAGE_COMPLETED.to_string()),
        }
    }

    /// Status after a failed request: not running, progress reset.
    pub fn stopped() -> Self {
        Self {
            is_running: false,
            progress: None,
            current_stage: None,
        }
    }

    pub fn timed_out() -> Self {
        Self {
            is_running: false,
            progress: None,
            current_stage: Some(STAGE_TIMED_OUT.to_string()),
        }
    }
}

/// The single pipeline run currently being tracked.
///
/// `run_id == 0` means the provider has not assigned a run yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineExecution {
    pub project_name: String,
    pub pipeline_id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pipeline_name: Option<String>,
    #[serde(default)]
    pub run_id: i64,
    #[serde(default)]
    pub status: ExecutionStatus,
}

impl PipelineExecution {
    /// A freshly triggered execution, before the provider answers.
    pub fn new(project_name: impl Into<String>, pipeline_id: i64) -> Self {
        Self {
            project_name: project_name.into(),
            pipeline_id,
            pipeline_name: None,
            run_id: 0,
            status: ExecutionStatus::initiating(),
        }
    }

    pub fn with_pipeline_name(mut self, name: impl Into<String>) -> Self {
        self.pipeline_name = Some(name.into());
        self
    }

    pub fn has_run(&self) -> bool {
        self.run_id > 0
    }

    pub fn display_name(&self) -> String {
        match &self.pipeline_name {
            Some(name) if !name.is_empty() => name.clone(),
            _ => format!("Pipeline #{}", self.pipeline_id),
        }
    }
}

/// Outcome of a single test step, normalized to one casing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum StepStatus {
    Passed,
    Failed,
    Skipped,
}

impl StepStatus {
    /// Map any provider spelling onto the canonical status.
    ///
    /// Anything that is neither a pass nor a failure (`skipped`, `pending`,
    /// `running`, `undefined`, ...) counts as skipped.
    pub fn normalize(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "passed" | "pass" | "success" | "succeeded" => StepStatus::Passed,
            "failed" | "fail" | "failure" | "error" | "broken" => StepStatus::Failed,
            _ => StepStatus::Skipped,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StepStatus::Passed => "PASSED",
            StepStatus::Failed => "FAILED",
            StepStatus::Skipped => "SKIPPED",
        }
    }
}

impl std::fmt::Display for StepStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for StepStatus {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Option::<String>::deserialize(deserializer)?;
        Ok(raw.as_deref().map(StepStatus::normalize).unwrap_or(StepStatus::Skipped))
    }
}

/// One step outcome within a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestStepResult {
    pub feature: String,
    pub scenario: String,
    pub step_name: String,
    pub status: StepStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exception_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exception_message: Option<String>,
}

impl TestStepResult {
    pub fn new(
        feature: impl Into<String>,
        scenario: impl Into<String>,
        step_name: impl Into<String>,
        status: StepStatus,
    ) -> Self {
        Self {
            feature: feature.into(),
            scenario: scenario.into(),
            step_name: step_name.into(),
            status,
            exception_type: None,
            exception_message: None,
        }
    }

    pub fn with_exception(mut self, kind: impl Into<String>, message: impl Into<String>) -> Self {
        self.exception_type = Some(kind.into());
        self.exception_message = Some(message.into());
        self
    }
}
