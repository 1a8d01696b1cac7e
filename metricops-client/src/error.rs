use metricops_common::MetricOpsError;
use thiserror::Error;

/// Failure of a single API call
#[derive(Error, Debug)]
pub enum ApiError {
    /// The server answered with a non-success status
    #[error("{status} {status_text} - {body}")]
    Http {
        status: u16,
        status_text: String,
        body: String,
    },

    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("failed to decode response from {path}: {source}")]
    Decode {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("unexpected payload from {path}: {source}")]
    Payload {
        path: String,
        #[source]
        source: MetricOpsError,
    },

    #[error("invalid API base URL '{url}': {reason}")]
    InvalidBaseUrl { url: String, reason: String },
}

impl ApiError {
    /// HTTP status of the failed call, when the server answered at all
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Http { status, .. } => Some(*status),
            ApiError::Transport { source, .. } => source.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
