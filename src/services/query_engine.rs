use crate::errors::QueryError;
use crate::services::job_poller::{ensure_succeeded, JobPoller, PollPolicy};
use crate::services::jobs::{JobApi, Query};
use crate::services::logger::Logger;
use crate::services::parallel::BoundedExecutor;
use crate::services::result_fetcher::{AssembledResult, ResultFetcher};
use crate::services::settings::EngineSettings;
use crate::services::sql_gate;
use std::sync::Arc;

/// Submit, poll to completion, then fetch and assemble every page.
#[derive(Clone)]
pub struct QueryEngine {
    poller: JobPoller,
    fetcher: ResultFetcher,
    logger: Logger,
}

impl QueryEngine {
    pub fn new(api: Arc<dyn JobApi>, settings: &EngineSettings, logger: Logger) -> Self {
        let logger = logger.child("engine");
        Self {
            poller: JobPoller::new(
                api.clone(),
                PollPolicy::from_settings(settings),
                logger.clone(),
            ),
            fetcher: ResultFetcher::new(
                api,
                BoundedExecutor::new(settings.max_concurrency),
                settings.page_size,
                settings.validate_page_schema,
                logger.clone(),
            ),
            logger,
        }
    }

    pub fn poller(&self) -> &JobPoller {
        &self.poller
    }

    pub async fn run_query(
        &self,
        query: &Query,
        typed: bool,
    ) -> Result<AssembledResult, QueryError> {
        let handle = self.poller.submit(query).await?;
        let job = self.poller.await_completion(&handle).await?;
        let job = ensure_succeeded(&handle, job).map_err(|err| {
            self.logger.warn(
                "job did not complete",
                Some(&serde_json::json!({ "job_id": handle.id(), "error": err.to_string() })),
            );
            err
        })?;

        let row_count = job.row_count.unwrap_or(0);
        if row_count == 0 {
            return Ok(AssembledResult::empty(handle.id()));
        }
        let result = self.fetcher.fetch_all(&handle, row_count, typed).await?;
        self.logger.debug(
            "query finished",
            Some(&serde_json::json!({ "job_id": handle.id(), "rows": result.len() })),
        );
        Ok(result)
    }

    /// Gate the statement, tag it with the submitting tool, then run it.
    pub async fn run_sql(
        &self,
        sql: &str,
        submitter: &str,
        allow_mutations: bool,
        typed: bool,
    ) -> Result<AssembledResult, QueryError> {
        sql_gate::ensure_allowed(sql, allow_mutations)?;
        let query = Query::new(sql).tagged(submitter);
        self.run_query(&query, typed).await
    }
}
