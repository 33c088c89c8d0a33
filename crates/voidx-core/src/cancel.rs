//! Cancellation plumbing shared by the manager, indexer and retriever.

use std::future::Future;
use std::time::Duration;

pub use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};

/// Races `fut` against `token`. Cancellation wins ties, so an operation that
/// starts after the token fired never runs.
pub async fn cancellable<F, T>(token: &CancellationToken, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    tokio::select! {
        biased;
        _ = token.cancelled() => Err(Error::Cancelled),
        res = fut => res,
    }
}

pub fn check(token: &CancellationToken) -> Result<()> {
    if token.is_cancelled() {
        Err(Error::Cancelled)
    } else {
        Ok(())
    }
}

/// Sleep that wakes early (with `Cancelled`) when the token fires.
pub async fn sleep(token: &CancellationToken, period: Duration) -> Result<()> {
    cancellable(token, async {
        tokio::time::sleep(period).await;
        Ok(())
    })
    .await
}
