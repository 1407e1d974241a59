//! Normalized client errors.
//!
//! Every client method converts provider-specific failures into one
//! [`ClientError`] at its own boundary; callers never look at raw HTTP
//! details.

use reqwest::StatusCode;
use thiserror::Error;

/// Result type alias for client operations.
pub type Result<T> = std::result::Result<T, ClientError>;

#[derive(Debug, Error)]
pub enum ClientError {
    /// The tracked execution has no provider run id yet.
    #[error("no pipeline execution yet: waiting for the provider to assign a run")]
    NoExecution,

    /// The provider does not know the run yet; try again later.
    #[error("execution not yet available: {0}")]
    ExecutionPending(String),

    /// The provider wants an interactive login; `url` should be opened.
    #[error("authentication required: log in at {url} and try again")]
    AuthRequired { url: String },

    #[error("empty file received")]
    EmptyFile,

    #[error("no artifacts found for this run")]
    NoArtifacts,

    #[error("artifact not found or no longer available")]
    ArtifactNotFound,

    #[error("Error Code: {status}: {message}")]
    Http { status: u16, message: String },

    #[error("network error occurred, please check your connection ({0})")]
    Network(String),

    #[error("malformed response: {0}")]
    Malformed(String),

    #[error("invalid url: {0}")]
    InvalidUrl(String),
}

/// Coarse classification used to pick a user-facing treatment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Show a waiting message; a later retry may succeed.
    Transient,
    /// Offer a login link instead of a failure.
    AuthRequired,
    /// 4xx/5xx or a payload we could not use.
    Client,
    Network,
}

impl ClientError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ClientError::NoExecution | ClientError::ExecutionPending(_) => ErrorKind::Transient,
            ClientError::AuthRequired { .. } => ErrorKind::AuthRequired,
            ClientError::Network(_) => ErrorKind::Network,
            ClientError::EmptyFile
            | ClientError::NoArtifacts
            | ClientError::ArtifactNotFound
            | ClientError::Http { .. }
            | ClientError::Malformed(_)
            | ClientError::InvalidUrl(_) => ErrorKind::Client,
        }
    }

    pub fn is_transient(&self) -> bool {
        self.kind() == ErrorKind::Transient
    }

    /// URL to open for login, when authentication is required.
    pub fn login_url(&self) -> Option<&str> {
        match self {
            ClientError::AuthRequired { url } => Some(url),
            _ => None,
        }
    }

    /// Build an error from a non-success status and the response body.
    pub fn from_status(status: StatusCode, body: &str) -> Self {
        ClientError::Http {
            status: status.as_u16(),
            message: server_message(body)
                .unwrap_or_else(|| status.canonical_reason().unwrap_or("unknown error").to_string()),
        }
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            ClientError::Malformed(e.to_string())
        } else if let Some(status) = e.status() {
            ClientError::Http {
                status: status.as_u16(),
                message: e.to_string(),
            }
        } else {
            ClientError::Network(e.to_string())
        }
    }
}

/// Pull a human-readable message out of an error body.
///
/// Accepts a bare string, or JSON with an `error`, `message` or `Message`
/// field.
pub(crate) fn server_message(body: &str) -> Option<String> {
    let body = body.trim();
    if body.is_empty() {
        return None;
    }

    if let Ok(value) = serde_json::from_str::<serde_json::Value>(body) {
        if let Some(s) = value.as_str() {
            return Some(s.to_string());
        }
        for key in ["error", "message", "Message", "title"] {
            if let Some(s) = value.get(key).and_then(|v| v.as_str()) {
                return Some(s.to_string());
            }
        }
    }

    Some(body.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_classification() {
        assert_eq!(ClientError::NoExecution.kind(), ErrorKind::Transient);
        assert_eq!(
            ClientError::ExecutionPending("x".into()).kind(),
            ErrorKind::Transient
        );
        assert_eq!(
            ClientError::AuthRequired { url: "u".into() }.kind(),
            ErrorKind::AuthRequired
        );
        assert_eq!(ClientError::EmptyFile.kind(), ErrorKind::Client);
        assert_eq!(ClientError::Network("down".into()).kind(), ErrorKind::Network);
    }

    #[test]
    fn test_server_message_shapes() {
        assert_eq!(server_message(""), None);
        assert_eq!(server_message("boom").as_deref(), Some("boom"));
        assert_eq!(server_message("\"quoted\"").as_deref(), Some("quoted"));
        assert_eq!(
            server_message(r#"{"error":"bad pipeline"}"#).as_deref(),
            Some("bad pipeline")
        );
        assert_eq!(
            server_message(r#"{"Message":"nope"}"#).as_deref(),
            Some("nope")
        );
    }

    #[test]
    fn test_from_status_falls_back_to_reason() {
        let err = ClientError::from_status(StatusCode::BAD_GATEWAY, "");
        assert_eq!(err.to_string(), "Error Code: 502: Bad Gateway");
        assert_eq!(err.login_url(), None);
    }
}
