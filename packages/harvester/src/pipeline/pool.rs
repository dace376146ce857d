//! Bounded fan-out over independent requests.
//!
//! Probing, fetching and backfill all run through [`WorkerPool::run`]: at most
//! `size` units in flight, results yielded in completion order.

use futures::{future, stream, Stream, StreamExt};
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::TransportResult;

/// A fixed-width pool of concurrent requests.
///
/// Create one per stage. Cancelling a pool stops units that have not started
/// yet; units already in flight run to completion and are still yielded.
#[derive(Debug, Clone)]
pub struct WorkerPool {
    size: usize,
    cancel: CancellationToken,
}

impl WorkerPool {
    /// Create a pool with `size` workers (at least one).
    pub fn new(size: usize) -> Self {
        Self {
            size: size.max(1),
            cancel: CancellationToken::new(),
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Stop starting new units.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Run `work` over every unit with bounded concurrency.
    ///
    /// No ordering is guaranteed between units. Units skipped because of
    /// cancellation produce no item.
    pub fn run<'a, I, F, Fut, T>(&self, units: I, mut work: F) -> impl Stream<Item = T> + 'a
    where
        I: IntoIterator,
        I::IntoIter: 'a,
        I::Item: 'a,
        F: FnMut(I::Item) -> Fut + 'a,
        Fut: Future<Output = T> + 'a,
        T: 'a,
    {
        let cancel = self.cancel.clone();
        stream::iter(units)
            .map(move |unit| {
                let cancel = cancel.clone();
                let task = work(unit);
                async move {
                    if cancel.is_cancelled() {
                        return None;
                    }
                    Some(task.await)
                }
            })
            .buffer_unordered(self.size)
            .filter_map(future::ready)
    }
}

/// Retry `attempt` while it fails transiently, up to `retries` extra times.
///
/// API errors and decode failures are returned immediately.
pub async fn with_retries<T, F, Fut>(
    retries: u32,
    backoff: Duration,
    context: &str,
    mut attempt: F,
) -> TransportResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = TransportResult<T>>,
{
    let mut tries = 0;
    loop {
        match attempt().await {
            Err(e) if e.is_transient() && tries < retries => {
                tries += 1;
                debug!(context = %context, attempt = tries, error = %e, "Retrying after transient failure");
                if !backoff.is_zero() {
                    tokio::time::sleep(backoff * tries).await;
                }
            }
            other => return other,
        }
    }
}
