use std::future::Future;
use std::time::Duration;

use storage::repository::StorageError;

/// Run a store call, failing with `StorageError::Timeout` once `limit` elapses.
pub(crate) async fn bounded<T, F>(limit: Duration, call: F) -> Result<T, StorageError>
where
    F: Future<Output = Result<T, StorageError>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => {
            tracing::warn!(timeout = ?limit, "store call timed out");
            Err(StorageError::Timeout(limit))
        }
    }
}
