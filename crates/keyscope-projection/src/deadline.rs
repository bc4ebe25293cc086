use std::future::Future;
use std::time::Duration;

use keyscope_store::{StoreError, StoreResult};

/// Run a store call, failing with [`StoreError::Timeout`] once `limit` elapses.
pub(crate) async fn within<T>(
    limit: Duration,
    call: impl Future<Output = StoreResult<T>>,
) -> StoreResult<T> {
    tokio::time::timeout(limit, call)
        .await
        .unwrap_or_else(|_| Err(StoreError::Timeout(format!("no response within {limit:?}"))))
}
