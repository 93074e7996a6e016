use crate::errors::ApiError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum QueryError {
    #[error("query submission failed: {0}")]
    Submission(#[source] ApiError),
    #[error("failed to read status of job {job_id}: {source}")]
    Status {
        job_id: String,
        #[source]
        source: ApiError,
    },
    #[error("Job {job_id} failed: {message}")]
    JobFailed { job_id: String, message: String },
    #[error("Job {job_id} was canceled: {message}")]
    JobCanceled { job_id: String, message: String },
    #[error("job {job_id} did not finish after {attempts} status checks")]
    PollLimitExceeded { job_id: String, attempts: u64 },
    #[error("failed to fetch results of job {job_id} at offset {offset}: {source}")]
    Fetch {
        job_id: String,
        offset: u64,
        #[source]
        source: ApiError,
    },
    #[error("page at offset {offset} of job {job_id} has columns {actual:?}, expected {expected:?}")]
    SchemaMismatch {
        job_id: String,
        offset: u64,
        expected: Vec<String>,
        actual: Vec<String>,
    },
    #[error("job {job_id} declared {expected} rows but {actual} were fetched")]
    IncompleteResult {
        job_id: String,
        expected: u64,
        actual: u64,
    },
    #[error("The query contains a DML statement. Only select queries are allowed")]
    UnsafeQueryRejected { reason: Option<String> },
}

impl QueryError {
    pub fn job_id(&self) -> Option<&str> {
        match self {
            QueryError::Status { job_id, .. }
            | QueryError::JobFailed { job_id, .. }
            | QueryError::JobCanceled { job_id, .. }
            | QueryError::PollLimitExceeded { job_id, .. }
            | QueryError::Fetch { job_id, .. }
            | QueryError::SchemaMismatch { job_id, .. }
            | QueryError::IncompleteResult { job_id, .. } => Some(job_id),
            QueryError::Submission(_) | QueryError::UnsafeQueryRejected { .. } => None,
        }
    }

    /// True when the remote job itself ended unsuccessfully.
    pub fn is_job_outcome(&self) -> bool {
        matches!(
            self,
            QueryError::JobFailed { .. } | QueryError::JobCanceled { .. }
        )
    }
}
