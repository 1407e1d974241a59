//! Provider page URLs shown next to failed or finished runs.

use reqwest::Url;

use super::error::{ClientError, Result};

fn project_url(base: &str, project: &str, tail: &[&str]) -> Result<Url> {
    let mut url = Url::parse(base).map_err(|_| ClientError::InvalidUrl(base.to_string()))?;
    url.path_segments_mut()
        .map_err(|_| ClientError::InvalidUrl(base.to_string()))?
        .pop_if_empty()
        .push(project)
        .extend(tail);
    Ok(url)
}

/// `{base}/{project}/_build?definitionId={pipelineId}`
pub fn pipeline_url(base: &str, project: &str, pipeline_id: i64) -> Result<String> {
    let mut url = project_url(base, project, &["_build"])?;
    url.query_pairs_mut()
        .append_pair("definitionId", &pipeline_id.to_string());
    Ok(url.to_string())
}

/// `{base}/{project}/_build/results?buildId={runId}`
pub fn build_url(base: &str, project: &str, run_id: i64) -> Result<String> {
    let mut url = project_url(base, project, &["_build", "results"])?;
    url.query_pairs_mut()
        .append_pair("buildId", &run_id.to_string());
    Ok(url.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pipeline_url() {
        assert_eq!(
            pipeline_url("https://dev.azure.com/contoso", "Sample", 42).unwrap(),
            "https://dev.azure.com/contoso/Sample/_build?definitionId=42"
        );
    }

    #[test]
    fn test_build_url_encodes_project() {
        assert_eq!(
            build_url("https://dev.azure.com/", "My Project", 777).unwrap(),
            "https://dev.azure.com/My%20Project/_build/results?buildId=777"
        );
    }

    #[test]
    fn test_bad_base() {
        assert!(pipeline_url("nope", "p", 1).is_err());
    }
}
