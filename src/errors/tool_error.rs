use crate::errors::{ApiError, QueryError};
use serde::Serialize;
use serde_json::Value;
use std::error::Error;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolErrorKind {
    InvalidParams,
    Denied,
    NotFound,
    Unavailable,
    Timeout,
    Upstream,
    Internal,
}

#[derive(Debug, Clone, Serialize)]
pub struct ToolError {
    pub kind: ToolErrorKind,
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
    pub retryable: bool,
}

impl ToolError {
    pub fn new(kind: ToolErrorKind, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind,
            code: code.into(),
            message: message.into(),
            hint: None,
            details: None,
            retryable: matches!(kind, ToolErrorKind::Timeout | ToolErrorKind::Upstream),
        }
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::new(ToolErrorKind::InvalidParams, "INVALID_PARAMS", message)
    }

    pub fn denied(message: impl Into<String>) -> Self {
        Self::new(ToolErrorKind::Denied, "DENIED", message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ToolErrorKind::NotFound, "NOT_FOUND", message)
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(ToolErrorKind::Unavailable, "TOOL_UNAVAILABLE", message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ToolErrorKind::Timeout, "TIMEOUT", message)
    }

    pub fn upstream(message: impl Into<String>) -> Self {
        Self::new(ToolErrorKind::Upstream, "UPSTREAM", message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ToolErrorKind::Internal, "INTERNAL", message)
    }
}

impl fmt::Display for ToolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl Error for ToolError {}

impl From<std::io::Error> for ToolError {
    fn from(err: std::io::Error) -> Self {
        ToolError::internal(err.to_string())
    }
}

impl From<ApiError> for ToolError {
    fn from(err: ApiError) -> Self {
        let message = err.to_string();
        match &err {
            ApiError::Config(_) => ToolError::new(ToolErrorKind::Denied, "NOT_CONFIGURED", message)
                .with_hint("Set connection.uri and connection.pat in the config file"),
            _ if err.is_timeout() => ToolError::timeout(message),
            ApiError::Http { status, .. } if *status == 401 || *status == 403 => {
                ToolError::denied(message)
            }
            ApiError::Http { status: 404, .. } => ToolError::not_found(message),
            ApiError::Http { status, .. } if *status < 500 && *status != 429 => {
                ToolError::invalid_params(message)
            }
            _ => ToolError::upstream(message),
        }
    }
}

impl From<QueryError> for ToolError {
    fn from(err: QueryError) -> Self {
        let details = err.job_id().map(|id| serde_json::json!({ "job_id": id }));
        let mapped = match err {
            QueryError::UnsafeQueryRejected { ref reason } => {
                let denied = ToolError::new(ToolErrorKind::Denied, "UNSAFE_QUERY", err.to_string());
                match reason {
                    Some(reason) => denied.with_hint(reason.clone()),
                    None => denied,
                }
            }
            QueryError::Submission(source) => {
                let mut mapped = ToolError::from(source);
                mapped.code = "SUBMISSION_FAILED".to_string();
                mapped
            }
            QueryError::JobFailed { .. } => {
                ToolError::new(ToolErrorKind::Upstream, "JOB_FAILED", err.to_string())
            }
            QueryError::JobCanceled { .. } => {
                ToolError::new(ToolErrorKind::Upstream, "JOB_CANCELED", err.to_string())
            }
            QueryError::PollLimitExceeded { .. } => {
                ToolError::new(ToolErrorKind::Timeout, "POLL_LIMIT_EXCEEDED", err.to_string())
            }
            QueryError::Status { .. } | QueryError::Fetch { .. } => {
                ToolError::upstream(err.to_string())
            }
            QueryError::SchemaMismatch { .. } | QueryError::IncompleteResult { .. } => {
                ToolError::new(ToolErrorKind::Upstream, "INCONSISTENT_RESULT", err.to_string())
            }
        };
        match details {
            Some(details) => mapped.with_details(details),
            None => mapped,
        }
    }
}
