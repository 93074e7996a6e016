use thiserror::Error;

/// Failures talking to a remote HTTP endpoint.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("configuration error: {0}")]
    Config(String),
    #[error("request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("{url} returned HTTP {status}: {body}")]
    Http {
        status: u16,
        url: String,
        body: String,
    },
    #[error("failed to decode response from {url}: {message}")]
    Decode { url: String, message: String },
    #[error("{0}")]
    Remote(String),
}

impl ApiError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, ApiError::Request { source, .. } if source.is_timeout())
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Http { status, .. } => Some(*status),
            _ => None,
        }
    }
}
