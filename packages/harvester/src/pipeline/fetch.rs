//! Fetch scheduler: executes every window of every fetchable partition.

use async_stream::stream;
use chrono::NaiveDate;
use futures::{Stream, StreamExt};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::error::{HarvestError, HarvestResult, TransportResult};
use crate::pipeline::pool::{with_retries, WorkerPool};
use crate::traits::transport::QueryTransport;
use crate::types::{
    config::HarvestConfig,
    partition::Partition,
    record::{Record, SearchPage},
    window::{windows_for, FetchWindow},
};

/// Turns fetchable partitions into a stream of observed records.
///
/// A transient failure that survives its retries costs one window and is
/// counted in [`Fetcher::windows_skipped`]. Any other failure is fatal: the
/// pool is cancelled, in-flight windows drain (their records are still
/// yielded) and the stream ends with the error.
pub struct Fetcher<'a, T: ?Sized> {
    transport: &'a T,
    config: &'a HarvestConfig,
    pool: WorkerPool,
    observed_on: NaiveDate,
    windows_skipped: Arc<AtomicUsize>,
}

impl<'a, T> Fetcher<'a, T>
where
    T: QueryTransport + ?Sized + 'a,
{
    /// Records produced by this fetcher are stamped as seen on `observed_on`.
    pub fn new(transport: &'a T, config: &'a HarvestConfig, observed_on: NaiveDate) -> Self {
        Self {
            transport,
            config,
            pool: WorkerPool::new(config.pool_size),
            observed_on,
            windows_skipped: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Windows dropped after exhausting their retries.
    pub fn windows_skipped(&self) -> usize {
        self.windows_skipped.load(Ordering::SeqCst)
    }

    /// Fetch every window of `partitions`.
    pub fn fetch_all(&self, partitions: &[Partition]) -> impl Stream<Item = HarvestResult<Record>> + 'a {
        let windows: Vec<FetchWindow> = partitions
            .iter()
            .flat_map(|p| windows_for(p, self.config))
            .collect();

        let transport = self.transport;
        let config = self.config;
        let pool = self.pool.clone();
        let observed_on = self.observed_on;
        let windows_skipped = self.windows_skipped.clone();

        stream! {
            info!(windows = windows.len(), pool_size = pool.size(), "Fetching");

            let mut pages = Box::pin(pool.run(windows, move |window| async move {
                let outcome = fetch_window(transport, &window, config).await;
                (window, outcome)
            }));
            let mut fatal: Option<HarvestError> = None;

            while let Some((window, outcome)) = pages.next().await {
                match outcome {
                    Ok(page) => {
                        for item in page.items {
                            yield Ok(Record::observed(item, observed_on));
                        }
                    }
                    Err(e) if e.is_transient() => {
                        warn!(
                            partition = %window.key,
                            page = window.page_index,
                            direction = %window.direction,
                            error = %e,
                            "Window skipped after retries"
                        );
                        windows_skipped.fetch_add(1, Ordering::SeqCst);
                    }
                    Err(e) => {
                        if fatal.is_none() {
                            error!(
                                partition = %window.key,
                                page = window.page_index,
                                direction = %window.direction,
                                error = %e,
                                "Fatal error while fetching, cancelling remaining windows"
                            );
                            pool.cancel();
                            fatal = Some(e.into());
                        }
                    }
                }
            }

            if let Some(err) = fatal {
                yield Err(err);
            }
        }
    }
}

/// Fetch a single window with the configured retry bound.
pub async fn fetch_window<T>(
    transport: &T,
    window: &FetchWindow,
    config: &HarvestConfig,
) -> TransportResult<SearchPage>
where
    T: QueryTransport + ?Sized,
{
    let context = format!("fetch {} page {} {}", window.key, window.page_index, window.direction);
    let page = with_retries(config.timeout_retries, config.retry_backoff(), &context, || {
        transport.search(&window.key, window.page_index, config.page_size, window.direction)
    })
    .await?;

    debug!(
        partition = %window.key,
        page = window.page_index,
        direction = %window.direction,
        items = page.items.len(),
        "Fetched window"
    );
    Ok(page)
}
