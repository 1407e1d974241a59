//! Execution tracking: trigger a run, follow its state, load its results.
//!
//! The tracker owns the state machine
//! `Idle -> Triggering -> Running -> (Succeeded | Failed | Error)` and is the
//! only writer of the execution record. Results always use the run id held
//! by the stored record, never the id the caller started with.

pub mod poller;

use std::fmt::Write as _;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::client::{links, ClientError, DownloadedArtifact, PipelineApi, RunPhase, RunState};
use crate::config::ProviderConfig;
use crate::model::{ExecutionStatus, PipelineExecution};
use crate::results::{ResultBroadcaster, SharedSummary, TestHistory};
use crate::storage::ExecutionStore;

pub use self::poller::{PollHandle, StatusPoller};

/// Where the tracked execution is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionPhase {
    Idle,
    Triggering,
    Running,
    Succeeded,
    Failed,
    Error,
}

impl ExecutionPhase {
    /// No further polling happens from a terminal phase.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ExecutionPhase::Succeeded | ExecutionPhase::Failed | ExecutionPhase::Error
        )
    }

    /// Phase of a record loaded from storage by a fresh process.
    ///
    /// A running record speaks for itself. A stopped one takes the saved
    /// terminal phase, or `Error` when none was saved. `Idle` means there
    /// is no record at all.
    fn from_record(
        execution: Option<&PipelineExecution>,
        saved: Option<ExecutionPhase>,
    ) -> Self {
        match execution {
            None => ExecutionPhase::Idle,
            Some(e) if e.status.is_running && e.has_run() => ExecutionPhase::Running,
            Some(e) if e.status.is_running => ExecutionPhase::Triggering,
            Some(_) => match saved {
                Some(phase) if phase.is_terminal() => phase,
                _ => ExecutionPhase::Error,
            },
        }
    }
}

impl std::str::FromStr for ExecutionPhase {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "idle" => Ok(ExecutionPhase::Idle),
            "triggering" => Ok(ExecutionPhase::Triggering),
            "running" => Ok(ExecutionPhase::Running),
            "succeeded" => Ok(ExecutionPhase::Succeeded),
            "failed" => Ok(ExecutionPhase::Failed),
            "error" => Ok(ExecutionPhase::Error),
            other => Err(format!("unknown execution phase '{}'", other)),
        }
    }
}

impl std::fmt::Display for ExecutionPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ExecutionPhase::Idle => "idle",
            ExecutionPhase::Triggering => "triggering",
            ExecutionPhase::Running => "running",
            ExecutionPhase::Succeeded => "succeeded",
            ExecutionPhase::Failed => "failed",
            ExecutionPhase::Error => "error",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Error)]
pub enum TrackerError {
    #[error("no pipeline execution available")]
    NoExecution,

    #[error(transparent)]
    Client(#[from] ClientError),

    #[error("storage error: {0}")]
    Storage(#[from] anyhow::Error),
}

impl TrackerError {
    /// Login URL when the failure needs an interactive login.
    pub fn login_url(&self) -> Option<&str> {
        match self {
            TrackerError::Client(e) => e.login_url(),
            _ => None,
        }
    }
}

/// Result of one step of the state machine, ready to show to a user.
#[derive(Debug, Clone)]
pub struct TrackOutcome {
    pub phase: ExecutionPhase,
    pub message: String,
    /// Provider pipeline page, set for failed runs.
    pub pipeline_url: Option<String>,
    pub execution: PipelineExecution,
    pub summary: Option<SharedSummary>,
}

/// What a results load produced.
#[derive(Debug, Clone)]
pub enum ResultsOutcome {
    Loaded(SharedSummary),
    /// The run exists but reported no steps.
    Empty,
    /// The provider has nothing yet; the message says what we wait for.
    Pending(String),
}

impl ResultsOutcome {
    pub fn message(&self) -> String {
        match self {
            ResultsOutcome::Loaded(summary) => results_message(summary),
            ResultsOutcome::Empty => "No test results available yet.".to_string(),
            ResultsOutcome::Pending(message) => message.clone(),
        }
    }
}

/// Orchestrates the clients, the record store, and the result broadcaster.
#[derive(Clone)]
pub struct ExecutionTracker {
    api: Arc<dyn PipelineApi>,
    store: ExecutionStore,
    results: ResultBroadcaster,
    history: TestHistory,
    provider: ProviderConfig,
    phase: Arc<watch::Sender<ExecutionPhase>>,
}

impl ExecutionTracker {
    pub fn new(
        api: Arc<dyn PipelineApi>,
        store: ExecutionStore,
        results: ResultBroadcaster,
        history: TestHistory,
        provider: ProviderConfig,
    ) -> Self {
        let saved = store.phase().and_then(|raw| raw.parse().ok());
        let initial = ExecutionPhase::from_record(store.get().as_ref(), saved);
        let (tx, _) = watch::channel(initial);
        Self {
            api,
            store,
            results,
            history,
            provider,
            phase: Arc::new(tx),
        }
    }

    pub fn phase(&self) -> ExecutionPhase {
        *self.phase.borrow()
    }

    /// Watch phase changes; the current phase is readable immediately.
    pub fn subscribe_phase(&self) -> watch::Receiver<ExecutionPhase> {
        self.phase.subscribe()
    }

    pub fn current(&self) -> Option<PipelineExecution> {
        self.store.get()
    }

    /// Name of the last pipeline triggered with a display name.
    pub fn current_pipeline_name(&self) -> String {
        self.store.current_pipeline_name()
    }

    pub fn results(&self) -> &ResultBroadcaster {
        &self.results
    }

    pub fn history(&self) -> &TestHistory {
        &self.history
    }

    fn set_phase(&self, phase: ExecutionPhase) {
        let previous = self.phase.send_replace(phase);
        if previous != phase {
            debug!(from = %previous, to = %phase, "Execution phase changed");
        }
        if phase != ExecutionPhase::Idle {
            if let Err(e) = self.store.save_phase(&phase.to_string()) {
                warn!("Failed to save execution phase: {}", e);
            }
        }
    }

    /// Start `pipeline_id` in `project` and apply the provider's answer.
    ///
    /// The record is saved with `run_id = 0` before the request goes out, so
    /// a crash mid-request still leaves a trace of what was started.
    pub async fn trigger(
        &self,
        project: &str,
        pipeline_id: i64,
        pipeline_name: Option<&str>,
        scheduled_time: Option<DateTime<Utc>>,
    ) -> Result<TrackOutcome, TrackerError> {
        let mut execution = PipelineExecution::new(project, pipeline_id);
        if let Some(name) = pipeline_name {
            execution = execution.with_pipeline_name(name);
            self.store.set_current_pipeline_name(name)?;
        }

        self.store.save(&execution)?;
        self.set_phase(ExecutionPhase::Triggering);
        info!(project, pipeline_id, scheduled = ?scheduled_time, "Triggering pipeline");

        let state = match self.api.trigger(project, pipeline_id, scheduled_time).await {
            Ok(state) => state,
            Err(e) => {
                error!(project, pipeline_id, "Failed to trigger pipeline: {}", e);
                self.stop(execution)?;
                return Err(e.into());
            }
        };

        let mut outcome = self.apply_state(execution, state).await?;
        let started = match scheduled_time {
            Some(at) => format!("Pipeline scheduled for {}", at.to_rfc3339()),
            None => format!(
                "Pipeline triggered successfully! Run ID: {}",
                outcome.execution.run_id
            ),
        };
        outcome.message = format!("{}\n{}", started, outcome.message);
        Ok(outcome)
    }

    /// Query the provider for the stored run and apply the answer.
    pub async fn refresh_status(&self) -> Result<TrackOutcome, TrackerError> {
        let execution = self.store.get().ok_or(TrackerError::NoExecution)?;
        if !execution.has_run() {
            return Ok(TrackOutcome {
                phase: self.phase(),
                message: "Waiting for pipeline execution to start...".to_string(),
                pipeline_url: None,
                execution,
                summary: None,
            });
        }

        let status = self
            .api
            .pipeline_status(&execution.project_name, execution.run_id)
            .await;
        match status {
            Ok(state) => self.apply_state(execution, state).await,
            Err(e) => {
                warn!(run_id = execution.run_id, "Failed to refresh pipeline status: {}", e);
                self.stop(execution)?;
                Err(e.into())
            }
        }
    }

    /// Fetch results for the stored run and publish them.
    pub async fn load_results(&self) -> Result<ResultsOutcome, TrackerError> {
        let execution = self.store.get().ok_or(TrackerError::NoExecution)?;
        self.load_results_for(&execution).await
    }

    /// Resolve and fetch the report artifact of the stored run.
    pub async fn download_report(&self) -> Result<DownloadedArtifact, TrackerError> {
        let execution = self.store.get().ok_or(TrackerError::NoExecution)?;
        if !execution.has_run() {
            return Err(TrackerError::NoExecution);
        }
        let artifact = self
            .api
            .download_report(
                &execution.project_name,
                execution.pipeline_id,
                execution.run_id,
            )
            .await?;
        Ok(artifact)
    }

    /// Forget the tracked execution and its results.
    pub fn clear(&self) -> Result<(), TrackerError> {
        self.store.clear()?;
        self.results.clear()?;
        self.set_phase(ExecutionPhase::Idle);
        info!("Cleared pipeline execution");
        Ok(())
    }

    /// Give up on a run that never reached a terminal state.
    pub fn mark_timed_out(&self) -> Result<(), TrackerError> {
        if let Some(mut execution) = self.store.get() {
            warn!(run_id = execution.run_id, "Pipeline run timed out");
            execution.status = ExecutionStatus::timed_out();
            self.store.save(&execution)?;
        }
        self.set_phase(ExecutionPhase::Error);
        Ok(())
    }

    /// Error transition: the record stays, but is no longer running.
    fn stop(&self, mut execution: PipelineExecution) -> Result<(), TrackerError> {
        execution.status = ExecutionStatus::stopped();
        self.store.save(&execution)?;
        self.set_phase(ExecutionPhase::Error);
        Ok(())
    }

    async fn apply_state(
        &self,
        mut execution: PipelineExecution,
        state: RunState,
    ) -> Result<TrackOutcome, TrackerError> {
        if state.run_id != 0 {
            execution.run_id = state.run_id;
        }

        if let RunPhase::Active(label) = &state.phase {
            execution.status = ExecutionStatus::running(label.as_str());
            self.store.save(&execution)?;
            self.set_phase(ExecutionPhase::Running);
            return Ok(TrackOutcome {
                phase: ExecutionPhase::Running,
                message: format!("Pipeline run {} is {}", execution.run_id, label),
                pipeline_url: None,
                execution,
                summary: None,
            });
        }

        execution.status = ExecutionStatus::completed();
        self.store.save(&execution)?;

        if !state.is_success() {
            let result = state
                .result
                .as_ref()
                .map(|r| r.to_string())
                .unwrap_or_else(|| "unknown".to_string());
            let pipeline_url = links::pipeline_url(
                &self.provider.base_url,
                &execution.project_name,
                execution.pipeline_id,
            )
            .map_err(|e| warn!("Could not build pipeline URL: {}", e))
            .ok();
            self.set_phase(ExecutionPhase::Failed);
            info!(run_id = execution.run_id, %result, "Pipeline execution failed");
            return Ok(TrackOutcome {
                phase: ExecutionPhase::Failed,
                message: format!("Pipeline execution failed with status: {}", result),
                pipeline_url,
                execution,
                summary: None,
            });
        }

        self.set_phase(ExecutionPhase::Succeeded);
        info!(run_id = execution.run_id, "Pipeline execution completed successfully");
        let mut message = "Pipeline execution completed successfully!".to_string();
        let mut summary = None;

        match self.load_results_for(&execution).await {
            Ok(outcome) => {
                if let ResultsOutcome::Loaded(loaded) = &outcome {
                    if let Err(e) = self.history.record_once(loaded) {
                        warn!(run_id = execution.run_id, "Failed to record test history: {}", e);
                    }
                    summary = Some(loaded.clone());
                }
                let _ = write!(message, "\n{}", outcome.message());
            }
            Err(e) => {
                let _ = write!(message, "\nError loading test results: {}", e);
            }
        }

        Ok(TrackOutcome {
            phase: ExecutionPhase::Succeeded,
            message,
            pipeline_url: None,
            execution,
            summary,
        })
    }

    async fn load_results_for(
        &self,
        execution: &PipelineExecution,
    ) -> Result<ResultsOutcome, TrackerError> {
        let fetched = self
            .api
            .fetch_results(execution.run_id, &execution.project_name)
            .await;

        let results = match fetched {
            Ok(results) => results,
            Err(ClientError::NoExecution) => {
                return Ok(ResultsOutcome::Pending(
                    "Waiting for pipeline execution to start...".to_string(),
                ))
            }
            Err(ClientError::ExecutionPending(reason)) => {
                debug!(run_id = execution.run_id, %reason, "Results not available yet");
                return Ok(ResultsOutcome::Pending(
                    "Waiting for pipeline execution to complete...".to_string(),
                ));
            }
            Err(e) => {
                warn!(run_id = execution.run_id, "Error loading test results: {}", e);
                return Err(e.into());
            }
        };

        match self
            .results
            .update(results, execution.run_id, &execution.project_name)
        {
            Some(summary) => Ok(ResultsOutcome::Loaded(summary)),
            None => Ok(ResultsOutcome::Empty),
        }
    }
}

/// "Test results loaded: 2 passed, 1 failed." followed by the failures.
pub fn results_message(summary: &SharedSummary) -> String {
    let mut message = format!(
        "Test results loaded: {} passed, {} failed.",
        summary.passed_steps(),
        summary.failed_steps()
    );
    let mut failures = summary.failures().filter(|s| !s.scenario.is_empty()).peekable();
    if failures.peek().is_some() {
        message.push_str("\nFailed tests:");
        for step in failures {
            let _ = write!(message, "\n- {}: {}", step.feature, step.scenario);
            if let Some(err) = &step.exception_message {
                let _ = write!(message, "\n  Error: {}", err);
            }
        }
    }
    message
}
