//! Project and pipeline catalog, used to find the ids `trigger` needs.

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::error::{ClientError, Result};
use super::ApiClient;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectInfo {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineInfo {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Deserialize)]
struct RawProject {
    #[serde(default, alias = "Id")]
    id: Option<String>,
    #[serde(default, alias = "Name")]
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawPipeline {
    #[serde(default, alias = "Id")]
    id: Option<i64>,
    #[serde(default, alias = "Name")]
    name: Option<String>,
}

/// A bare list, or the provider's `{ "value": [...] }` envelope.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Listing<T> {
    Bare(Vec<T>),
    Wrapped {
        #[serde(alias = "Value")]
        value: Vec<T>,
    },
}

impl<T> Listing<T> {
    fn into_vec(self) -> Vec<T> {
        match self {
            Listing::Bare(items) | Listing::Wrapped { value: items } => items,
        }
    }
}

fn parse_listing<T: serde::de::DeserializeOwned>(body: &str) -> Result<Vec<T>> {
    let listing: Option<Listing<T>> =
        serde_json::from_str(body).map_err(|e| ClientError::Malformed(e.to_string()))?;
    Ok(listing.map(Listing::into_vec).unwrap_or_default())
}

pub fn parse_projects(body: &str) -> Result<Vec<ProjectInfo>> {
    let raw: Vec<RawProject> = parse_listing(body)?;
    Ok(raw
        .into_iter()
        .filter_map(|p| {
            let name = p.name.filter(|n| !n.is_empty())?;
            Some(ProjectInfo {
                id: p.id.unwrap_or_default(),
                name,
            })
        })
        .collect())
}

/// Entries without an id cannot be triggered and are dropped.
pub fn parse_pipelines(body: &str) -> Result<Vec<PipelineInfo>> {
    let raw: Vec<RawPipeline> = parse_listing(body)?;
    Ok(raw
        .into_iter()
        .filter_map(|p| {
            let id = p.id.filter(|id| *id > 0)?;
            Some(PipelineInfo {
                id,
                name: p.name.unwrap_or_default(),
            })
        })
        .collect())
}

impl ApiClient {
    /// `GET .../projects`.
    pub async fn projects(&self) -> Result<Vec<ProjectInfo>> {
        let url = self.admin_endpoint(&["projects"])?;
        debug!(%url, "Listing projects");
        let body = read_body(self.http.get(url).send().await?).await?;
        parse_projects(&body)
    }

    /// `GET .../projects/{project}/pipelines/sync`.
    pub async fn pipelines(&self, project: &str) -> Result<Vec<PipelineInfo>> {
        let url = self.admin_endpoint(&["projects", project, "pipelines", "sync"])?;
        debug!(%url, project, "Listing pipelines");
        let body = read_body(self.http.get(url).send().await?).await?;
        parse_pipelines(&body)
    }
}

async fn read_body(response: reqwest::Response) -> Result<String> {
    let status = response.status();
    let body = response.text().await?;
    if !status.is_success() {
        return Err(ClientError::from_status(status, &body));
    }
    Ok(body)
}
