use crate::errors::QueryError;
use crate::services::jobs::{Job, JobApi, JobHandle, JobState, Query};
use crate::services::logger::Logger;
use crate::services::settings::EngineSettings;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    pub max_attempts: Option<u64>,
    pub timeout: Option<Duration>,
}

impl PollPolicy {
    pub fn unbounded(interval: Duration) -> Self {
        Self {
            interval,
            max_attempts: None,
            timeout: None,
        }
    }

    pub fn from_settings(settings: &EngineSettings) -> Self {
        Self {
            interval: settings.poll_interval(),
            max_attempts: settings.max_poll_attempts,
            timeout: settings.poll_timeout(),
        }
    }

    fn exhausted(&self, attempts: u64, started: Instant) -> bool {
        if self.max_attempts.map(|max| attempts >= max).unwrap_or(false) {
            return true;
        }
        self.timeout
            .map(|timeout| started.elapsed() >= timeout)
            .unwrap_or(false)
    }
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self::unbounded(Duration::from_millis(crate::constants::engine::POLL_INTERVAL_MS))
    }
}

/// Submits queries and follows a job until it reaches a terminal state.
#[derive(Clone)]
pub struct JobPoller {
    api: Arc<dyn JobApi>,
    policy: PollPolicy,
    logger: Logger,
}

impl JobPoller {
    pub fn new(api: Arc<dyn JobApi>, policy: PollPolicy, logger: Logger) -> Self {
        Self {
            api,
            policy,
            logger: logger.child("poller"),
        }
    }

    pub fn policy(&self) -> PollPolicy {
        self.policy
    }

    pub async fn submit(&self, query: &Query) -> Result<JobHandle, QueryError> {
        let id = self
            .api
            .submit_query(query)
            .await
            .map_err(QueryError::Submission)?;
        self.logger
            .debug("submitted", Some(&serde_json::json!({ "job_id": id })));
        Ok(JobHandle::new(id))
    }

    pub async fn poll(&self, handle: &JobHandle) -> Result<Job, QueryError> {
        self.api
            .get_job_status(handle.id())
            .await
            .map_err(|source| QueryError::Status {
                job_id: handle.id().to_string(),
                source,
            })
    }

    /// Polls until COMPLETED, CANCELED or FAILED. Unbounded unless the policy
    /// sets an attempt or time limit.
    pub async fn await_completion(&self, handle: &JobHandle) -> Result<Job, QueryError> {
        let started = Instant::now();
        let mut attempts: u64 = 0;
        let mut pinned_row_count: Option<u64> = None;
        let mut last_state: Option<JobState> = None;
        loop {
            let mut job = self.poll(handle).await?;
            attempts += 1;

            match (pinned_row_count, job.row_count) {
                (None, Some(count)) => pinned_row_count = Some(count),
                (Some(pinned), Some(count)) if pinned != count => {
                    self.logger.warn(
                        "row count changed after it was reported",
                        Some(&serde_json::json!({
                            "job_id": handle.id(),
                            "first": pinned,
                            "latest": count,
                        })),
                    );
                    job.row_count = Some(pinned);
                }
                (Some(pinned), None) => job.row_count = Some(pinned),
                _ => {}
            }

            if last_state != Some(job.job_state) {
                self.logger.debug(
                    "job state",
                    Some(&serde_json::json!({
                        "job_id": handle.id(),
                        "state": job.job_state,
                        "attempt": attempts,
                    })),
                );
                last_state = Some(job.job_state);
            }

            if job.is_done() {
                return Ok(job);
            }
            if self.policy.exhausted(attempts, started) {
                return Err(QueryError::PollLimitExceeded {
                    job_id: handle.id().to_string(),
                    attempts,
                });
            }
            tokio::time::sleep(self.policy.interval).await;
        }
    }
}

/// Turns a terminal job into success or the matching typed failure.
pub fn ensure_succeeded(handle: &JobHandle, job: Job) -> Result<Job, QueryError> {
    match job.job_state {
        JobState::Completed => Ok(job),
        JobState::Canceled => Err(QueryError::JobCanceled {
            job_id: handle.id().to_string(),
            message: job.failure_message(),
        }),
        _ => Err(QueryError::JobFailed {
            job_id: handle.id().to_string(),
            message: job.failure_message(),
        }),
    }
}
