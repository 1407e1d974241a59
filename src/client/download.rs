//! Report artifact download.
//!
//! Two hops: the backend hands out a provider `DownloadUrl`, which is then
//! fetched directly. An unauthenticated provider session answers the second
//! hop with `200 OK` and an HTML login page, so success is decided by
//! [`classify_download`], not by the status code alone.

use bytes::Bytes;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::{StatusCode, Url};
use serde::Deserialize;
use tracing::{debug, info, warn};

use super::error::{server_message, ClientError, Result};
use super::ApiClient;

/// Marker substrings of a provider login page.
const LOGIN_MARKERS: &[&str] = &["login", "sign in"];

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ArtifactResponse {
    #[serde(default, alias = "artifacts")]
    artifacts: Option<Vec<ArtifactEntry>>,
    #[serde(default, alias = "message")]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ArtifactEntry {
    #[serde(default, alias = "artifactName", alias = "name")]
    artifact_name: Option<String>,
    #[serde(default, alias = "size")]
    size: Option<u64>,
    #[serde(default, alias = "downloadUrl")]
    download_url: Option<String>,
}

/// A fetched artifact body.
#[derive(Debug, Clone)]
pub struct DownloadedArtifact {
    pub bytes: Bytes,
    pub content_type: String,
    /// Provider URL the bytes came from.
    pub url: String,
}

impl DownloadedArtifact {
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Pick the first usable `DownloadUrl` from a metadata body.
pub fn parse_artifact_url(body: &str) -> Result<String> {
    let response: ArtifactResponse =
        serde_json::from_str(body).map_err(|e| ClientError::Malformed(e.to_string()))?;

    let entry = response
        .artifacts
        .unwrap_or_default()
        .into_iter()
        .find(|a| a.download_url.as_deref().is_some_and(|u| !u.is_empty()));

    match entry {
        Some(entry) => {
            debug!(
                name = entry.artifact_name.as_deref().unwrap_or("-"),
                size = entry.size,
                "Resolved artifact"
            );
            entry.download_url.ok_or(ClientError::NoArtifacts)
        }
        None => {
            if let Some(message) = response.message {
                debug!("No artifacts: {}", message);
            }
            Err(ClientError::NoArtifacts)
        }
    }
}

/// Ask the provider for a zip of the artifact, replacing any `$format`.
pub fn with_zip_format(raw: &str) -> Result<String> {
    let mut url = Url::parse(raw).map_err(|_| ClientError::InvalidUrl(raw.to_string()))?;
    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(k, _)| k != "$format")
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    url.query_pairs_mut()
        .clear()
        .extend_pairs(kept)
        .append_pair("$format", "zip");
    Ok(url.to_string())
}

/// Decide what a provider response really is.
pub fn classify_download(
    url: &str,
    status: StatusCode,
    content_type: &str,
    body: Bytes,
) -> Result<DownloadedArtifact> {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            return Err(ClientError::AuthRequired {
                url: url.to_string(),
            })
        }
        StatusCode::NOT_FOUND => return Err(ClientError::ArtifactNotFound),
        s if !s.is_success() => {
            return Err(ClientError::from_status(s, &String::from_utf8_lossy(&body)))
        }
        _ => {}
    }

    if content_type.to_ascii_lowercase().contains("text/html") {
        let text = String::from_utf8_lossy(&body).to_lowercase();
        if LOGIN_MARKERS.iter().any(|m| text.contains(m)) {
            return Err(ClientError::AuthRequired {
                url: url.to_string(),
            });
        }
    }

    if body.is_empty() {
        return Err(ClientError::EmptyFile);
    }

    Ok(DownloadedArtifact {
        bytes: body,
        content_type: content_type.to_string(),
        url: url.to_string(),
    })
}

impl ApiClient {
    /// `GET .../download-artifact/{userId}/{project}/{pipelineId}/{runId}`,
    /// returning the provider URL with `$format=zip`.
    pub async fn resolve_artifact_url(
        &self,
        project: &str,
        pipeline_id: i64,
        run_id: i64,
    ) -> Result<String> {
        if run_id == 0 {
            return Err(ClientError::NoExecution);
        }

        let pipeline = pipeline_id.to_string();
        let run = run_id.to_string();
        let url = self.endpoint(&[
            "download-artifact",
            self.user_id.as_str(),
            project,
            pipeline.as_str(),
            run.as_str(),
        ])?;

        let response = self.http.get(url).send().await?;
        let status = response.status();
        let body = response.text().await?;
        if status == StatusCode::NOT_FOUND {
            debug!(run_id, "Artifact metadata not found: {:?}", server_message(&body));
            return Err(ClientError::NoArtifacts);
        }
        if !status.is_success() {
            return Err(ClientError::from_status(status, &body));
        }

        with_zip_format(&parse_artifact_url(&body)?)
    }

    /// Fetch `url` from the provider as raw bytes.
    pub async fn fetch_artifact(&self, url: &str) -> Result<DownloadedArtifact> {
        let response = self
            .http
            .get(url)
            .header(ACCEPT, "*/*")
            .send()
            .await
            .map_err(|e| {
                warn!(url, "Artifact request failed: {}", e);
                ClientError::Network(e.to_string())
            })?;

        let status = response.status();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("application/octet-stream")
            .to_string();
        let body = response
            .bytes()
            .await
            .map_err(|e| ClientError::Network(e.to_string()))?;

        let artifact = classify_download(url, status, &content_type, body)?;
        info!(url, bytes = artifact.len(), "Downloaded artifact");
        Ok(artifact)
    }
}
