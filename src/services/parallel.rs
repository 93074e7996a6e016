use futures::future::try_join_all;
use std::future::Future;
use tokio::sync::Semaphore;

/// Runs independent futures with at most `limit` of them in flight at once.
/// Results come back in input order; the first error aborts the batch and
/// drops the operations that have not finished.
#[derive(Debug, Clone, Copy)]
pub struct BoundedExecutor {
    limit: usize,
}

impl BoundedExecutor {
    pub fn new(limit: usize) -> Self {
        Self {
            limit: limit.max(1),
        }
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub async fn run<I, Fut, T, E>(&self, operations: I) -> Result<Vec<T>, E>
    where
        I: IntoIterator<Item = Fut>,
        Fut: Future<Output = Result<T, E>>,
    {
        let semaphore = Semaphore::new(self.limit);
        let semaphore = &semaphore;
        let gated = operations.into_iter().map(|operation| async move {
            // never closed
            let _permit = semaphore.acquire().await.ok();
            operation.await
        });
        try_join_all(gated).await
    }
}

impl Default for BoundedExecutor {
    fn default() -> Self {
        Self::new(crate::constants::engine::MAX_CONCURRENCY)
    }
}
