//! Size probes: one minimal request per partition to learn its total.

use futures::Stream;
use tracing::debug;

use crate::error::TransportResult;
use crate::pipeline::pool::{with_retries, WorkerPool};
use crate::traits::transport::QueryTransport;
use crate::types::{config::HarvestConfig, partition::Partition, window::SortDirection};

/// Probe every partition through `pool`.
///
/// Yields `(partition, size_or_error)` in completion order. The partition is
/// returned untouched; classifying it is the caller's job.
pub fn probe_all<'a, T>(
    transport: &'a T,
    pool: &WorkerPool,
    partitions: Vec<Partition>,
    config: &'a HarvestConfig,
) -> impl Stream<Item = (Partition, TransportResult<u64>)> + 'a
where
    T: QueryTransport + ?Sized,
{
    pool.run(partitions, move |partition| async move {
        let outcome = probe(transport, &partition, config).await;
        (partition, outcome)
    })
}

/// Declared total result count for one partition.
pub async fn probe<T>(
    transport: &T,
    partition: &Partition,
    config: &HarvestConfig,
) -> TransportResult<u64>
where
    T: QueryTransport + ?Sized,
{
    let context = format!("probe {}", partition.key);
    let page = with_retries(
        config.timeout_retries,
        config.retry_backoff(),
        &context,
        || {
            transport.search(
                &partition.key,
                0,
                config.probe_page_size,
                SortDirection::Ascending,
            )
        },
    )
    .await?;

    debug!(partition = %partition.key, size = page.total_count, "Probed");
    Ok(page.total_count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TransportError;
    use crate::testing::{MockFailure, MockTransport, MockTransportCall};
    use futures::StreamExt;

    fn config() -> HarvestConfig {
        HarvestConfig::new().with_retry_backoff_ms(0)
    }

    #[tokio::test]
    async fn test_probe_uses_single_item_page() {
        let transport = MockTransport::new().with_size(Partition::root(1).key, 1_234);

        let size = probe(&transport, &Partition::root(1), &config()).await.unwrap();

        assert_eq!(size, 1_234);
        let calls = transport.calls();
        assert!(matches!(
            &calls[0],
            MockTransportCall::Search {
                page_index: 0,
                page_size: 1,
                direction: SortDirection::Ascending,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_probe_all_returns_each_partition() {
        let transport = MockTransport::new()
            .with_size(Partition::root(1).key, 10)
            .with_size(Partition::root(2).key, 20);
        let pool = WorkerPool::new(4);
        let config = config();

        let mut results: Vec<_> = probe_all(
            &transport,
            &pool,
            vec![Partition::root(1), Partition::root(2), Partition::root(3)],
            &config,
        )
        .map(|(partition, outcome)| (partition.key.region_id(), outcome.unwrap()))
        .collect()
        .await;
        results.sort();

        assert_eq!(results, vec![(Some(1), 10), (Some(2), 20), (Some(3), 0)]);
    }

    #[tokio::test]
    async fn test_probe_surfaces_api_error() {
        let key = Partition::root(1).key;
        let transport = MockTransport::new().fail_search(key, MockFailure::Api { status: 500 });

        let result = probe(&transport, &Partition::root(1), &config()).await;

        assert!(matches!(result, Err(TransportError::Api { status: Some(500), .. })));
        // Not retried
        assert_eq!(transport.calls().len(), 1);
    }
}
