//! HTTP clients for the QA automation backend and the DevOps provider.

pub mod catalog;
pub mod download;
pub mod error;
pub mod links;
pub mod results;
pub mod trigger;

use std::sync::Arc;

use anyhow::Context;
use chrono::{DateTime, Utc};
use reqwest::{Client, Url};

use crate::config::{ApiConfig, ResultsRoute};
use crate::model::TestStepResult;

pub use self::catalog::{PipelineInfo, ProjectInfo};
pub use self::download::DownloadedArtifact;
pub use self::error::{ClientError, ErrorKind, Result};
pub use self::trigger::{RunPhase, RunResult, RunState};

/// Remote operations the execution tracker depends on.
#[async_trait::async_trait]
pub trait PipelineApi: Send + Sync {
    /// Start a pipeline run. `scheduled_time` is forwarded, not waited on.
    async fn trigger(
        &self,
        project: &str,
        pipeline_id: i64,
        scheduled_time: Option<DateTime<Utc>>,
    ) -> Result<RunState>;

    /// Current state of a run.
    async fn pipeline_status(&self, project: &str, run_id: i64) -> Result<RunState>;

    /// Step-level results of a run, statuses normalized.
    async fn fetch_results(&self, run_id: i64, project: &str) -> Result<Vec<TestStepResult>>;

    /// Resolve and download the run's report artifact.
    async fn download_report(
        &self,
        project: &str,
        pipeline_id: i64,
        run_id: i64,
    ) -> Result<DownloadedArtifact>;
}

/// Client for the backend routes under `/api/{user_segment}`.
#[derive(Clone)]
pub struct ApiClient {
    http: Client,
    base_url: Url,
    user_segment: String,
    admin_segment: String,
    user_id: String,
    results_route: ResultsRoute,
}

impl ApiClient {
    pub fn new(config: &ApiConfig) -> anyhow::Result<Self> {
        let http = Client::builder()
            .timeout(config.timeout())
            .user_agent(format!("pipetrack/{}", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to build HTTP client")?;

        let base_url = Url::parse(&config.base_url)
            .with_context(|| format!("Invalid API base URL '{}'", config.base_url))?;
        if base_url.cannot_be_a_base() {
            anyhow::bail!("API base URL '{}' cannot carry a path", config.base_url);
        }

        Ok(Self {
            http,
            base_url,
            user_segment: config.user_segment.clone(),
            admin_segment: config.admin_segment.clone(),
            user_id: config.user_id.clone(),
            results_route: config.results_route,
        })
    }

    pub fn into_shared(self) -> Arc<dyn PipelineApi> {
        Arc::new(self)
    }

    /// `{base}/api/{user_segment}/{segments...}`, each segment percent-encoded.
    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        self.endpoint_in(&self.user_segment, segments)
    }

    /// Same as [`endpoint`](Self::endpoint) under the catalog segment.
    fn admin_endpoint(&self, segments: &[&str]) -> Result<Url> {
        self.endpoint_in(&self.admin_segment, segments)
    }

    fn endpoint_in(&self, area: &str, segments: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        {
            let mut path = url
                .path_segments_mut()
                .map_err(|_| ClientError::InvalidUrl(self.base_url.to_string()))?;
            path.pop_if_empty().push("api").push(area);
            path.extend(segments);
        }
        Ok(url)
    }
}

#[async_trait::async_trait]
impl PipelineApi for ApiClient {
    async fn trigger(
        &self,
        project: &str,
        pipeline_id: i64,
        scheduled_time: Option<DateTime<Utc>>,
    ) -> Result<RunState> {
        self.trigger_pipeline(project, pipeline_id, scheduled_time).await
    }

    async fn pipeline_status(&self, project: &str, run_id: i64) -> Result<RunState> {
        self.run_status(project, run_id).await
    }

    async fn fetch_results(&self, run_id: i64, project: &str) -> Result<Vec<TestStepResult>> {
        self.step_results(run_id, project).await
    }

    async fn download_report(
        &self,
        project: &str,
        pipeline_id: i64,
        run_id: i64,
    ) -> Result<DownloadedArtifact> {
        let url = self.resolve_artifact_url(project, pipeline_id, run_id).await?;
        self.fetch_artifact(&url).await
    }
}
