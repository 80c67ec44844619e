use std::{future::Future, time::Duration};

use tokio::time::timeout;

use super::StoreError;

pub struct QueryTimeout;

impl QueryTimeout {
    /// Default bound for writes and aggregations.
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

    /// Bound for single-row lookups.
    pub const LOOKUP_TIMEOUT: Duration = Duration::from_secs(2);

    /// Await a store call, giving up after `limit`. The underlying query is
    /// not aborted on the server; the caller just stops waiting.
    pub async fn run<F, T>(query: F, limit: Duration) -> Result<T, StoreError>
    where
        F: Future<Output = Result<T, StoreError>>,
    {
        match timeout(limit, query).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!("Store call timed out after {:?}", limit);
                Err(StoreError::Timeout(limit))
            }
        }
    }
}
