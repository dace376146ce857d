//! Partition planner: staged drill-down until every partition is fetchable.
//!
//! One worklist per hierarchy level. A stage probes its whole worklist, then
//! enumerates children for every oversized partition; only then does the next
//! level start. Child keys depend on the complete oversized set, so the
//! barrier between stages is required.

use futures::StreamExt;
use tracing::{debug, error, info, warn};

use crate::error::{HarvestError, HarvestResult, TransportError};
use crate::pipeline::pool::{with_retries, WorkerPool};
use crate::pipeline::probe::probe_all;
use crate::traits::{enumerator::Enumerator, transport::QueryTransport};
use crate::types::{
    config::HarvestConfig,
    partition::{Level, Partition, PartitionStatus},
    summary::{SkippedPartition, TruncatedPartition},
    window::{unreachable, windows_for},
};

/// Result of planning: what to fetch and what could not be resolved.
#[derive(Debug, Clone, Default)]
pub struct Plan {
    /// Partitions ready for the fetch stage
    pub fetchable: Vec<Partition>,

    /// Oversized at the last level
    pub max_depth_oversized: Vec<Partition>,

    /// Partitions dropped because a probe or enumeration failed
    pub skipped: Vec<SkippedPartition>,

    /// Probes that returned a size
    pub probed: usize,

    /// Partitions that probed empty
    pub empty: usize,
}

impl Plan {
    fn skip(&mut self, partition: Partition, reason: String) {
        self.skipped.push(SkippedPartition {
            key: partition.key,
            level: partition.level,
            reason,
        });
    }

    /// Number of fetch windows the plan produces.
    pub fn window_count(&self, config: &HarvestConfig) -> usize {
        self.fetchable
            .iter()
            .map(|p| windows_for(p, config).len())
            .sum()
    }

    /// Fetchable partitions the page cap keeps us from fully reaching.
    pub fn truncated(&self, config: &HarvestConfig) -> Vec<TruncatedPartition> {
        self.fetchable
            .iter()
            .filter_map(|p| {
                let size = p.size?;
                let missing = unreachable(size, config);
                (missing > 0).then(|| TruncatedPartition {
                    key: p.key.clone(),
                    size,
                    unreachable: missing,
                })
            })
            .collect()
    }
}

/// Drives probing and enumeration stage by stage.
pub struct Planner<'a, T: ?Sized> {
    transport: &'a T,
    config: &'a HarvestConfig,
}

impl<'a, T> Planner<'a, T>
where
    T: QueryTransport + Enumerator + ?Sized,
{
    pub fn new(transport: &'a T, config: &'a HarvestConfig) -> Self {
        Self { transport, config }
    }

    /// Expand one top-level region.
    pub async fn expand_region(&self, region: i64) -> HarvestResult<Plan> {
        self.expand(vec![Partition::root(region)]).await
    }

    /// Expand `roots` (all at the region level) into a plan.
    ///
    /// Every partition in the returned plan is fetchable or max-depth
    /// oversized; empty ones are only counted. An authentication failure
    /// aborts planning.
    pub async fn expand(&self, roots: Vec<Partition>) -> HarvestResult<Plan> {
        let mut plan = Plan::default();
        let mut worklist = roots;

        for level in Level::ALL {
            if worklist.is_empty() {
                break;
            }

            info!(level = %level, partitions = worklist.len(), "Probing stage");
            let oversized = self.probe_stage(worklist, &mut plan).await?;
            worklist = self.split_stage(oversized, &mut plan).await?;
        }

        info!(
            probed = plan.probed,
            empty = plan.empty,
            fetchable = plan.fetchable.len(),
            max_depth_oversized = plan.max_depth_oversized.len(),
            skipped = plan.skipped.len(),
            "Planning complete"
        );

        Ok(plan)
    }

    /// Probe one level's worklist and sort the results. Returns the
    /// partitions that still need splitting.
    async fn probe_stage(
        &self,
        worklist: Vec<Partition>,
        plan: &mut Plan,
    ) -> HarvestResult<Vec<Partition>> {
        let pool = WorkerPool::new(self.config.pool_size);
        let mut results = Box::pin(probe_all(self.transport, &pool, worklist, self.config));
        let mut oversized = Vec::new();
        let mut fatal: Option<HarvestError> = None;

        while let Some((mut partition, outcome)) = results.next().await {
            let size = match outcome {
                Ok(size) => size,
                Err(e) => {
                    if let Some(err) = self.probe_failure(&pool, partition, e, plan) {
                        fatal.get_or_insert(err);
                    }
                    continue;
                }
            };

            plan.probed += 1;
            match partition.record_probe(size, self.config.hard_cap) {
                PartitionStatus::Empty => {
                    plan.empty += 1;
                }
                PartitionStatus::Fetchable => plan.fetchable.push(partition),
                PartitionStatus::Oversized if partition.level.is_last() => {
                    partition.mark_exhausted();
                    warn!(
                        partition = %partition.key,
                        size = size,
                        cap = self.config.hard_cap,
                        "Oversized at maximum depth, results beyond the cap are unreachable"
                    );
                    plan.max_depth_oversized.push(partition);
                }
                PartitionStatus::Oversized => oversized.push(partition),
                // A fresh partition never classifies as these
                PartitionStatus::Unprobed | PartitionStatus::MaxDepthOversized => {}
            }
        }

        match fatal {
            Some(err) => Err(err),
            None => Ok(oversized),
        }
    }

    /// Enumerate children for every oversized partition of a stage.
    async fn split_stage(
        &self,
        oversized: Vec<Partition>,
        plan: &mut Plan,
    ) -> HarvestResult<Vec<Partition>> {
        if oversized.is_empty() {
            return Ok(Vec::new());
        }

        let pool = WorkerPool::new(self.config.pool_size);
        let transport = self.transport;
        let config = self.config;
        let mut results = Box::pin(pool.run(oversized, move |parent| async move {
            let outcome = match parent.level.next() {
                Some(level) => {
                    let context = format!("enumerate {} under {}", level, parent.key);
                    with_retries(config.timeout_retries, config.retry_backoff(), &context, || {
                        transport.list_children(level, &parent.key)
                    })
                    .await
                }
                None => Ok(Vec::new()),
            };
            (parent, outcome)
        }));

        let mut children = Vec::new();
        let mut fatal: Option<HarvestError> = None;

        while let Some((parent, outcome)) = results.next().await {
            match outcome {
                Ok(values) if values.is_empty() => {
                    warn!(partition = %parent.key, size = ?parent.size, "Oversized partition has no children to split into");
                    plan.skip(parent, "oversized with no child values".to_string());
                }
                Ok(values) => {
                    debug!(partition = %parent.key, size = ?parent.size, children = values.len(), "Splitting oversized partition");
                    children.extend(values.into_iter().filter_map(|value| parent.child(value)));
                }
                Err(e) => {
                    if let Some(err) = self.enumeration_failure(&pool, parent, e, plan) {
                        fatal.get_or_insert(err);
                    }
                }
            }
        }

        match fatal {
            Some(err) => Err(err),
            None => Ok(children),
        }
    }

    /// Auth failures stop the stage; anything else only loses this branch.
    fn probe_failure(
        &self,
        pool: &WorkerPool,
        partition: Partition,
        err: TransportError,
        plan: &mut Plan,
    ) -> Option<HarvestError> {
        if err.is_auth() {
            error!(partition = %partition.key, error = %err, "Authentication failed while probing, aborting");
            pool.cancel();
            return Some(err.into());
        }

        warn!(partition = %partition.key, error = %err, "Probe failed, partition skipped");
        plan.skip(partition, format!("probe failed: {}", err));
        None
    }

    fn enumeration_failure(
        &self,
        pool: &WorkerPool,
        partition: Partition,
        err: TransportError,
        plan: &mut Plan,
    ) -> Option<HarvestError> {
        if err.is_auth() {
            error!(partition = %partition.key, error = %err, "Authentication failed while enumerating, aborting");
            pool.cancel();
            return Some(err.into());
        }

        warn!(partition = %partition.key, error = %err, "Enumeration failed, partition skipped");
        plan.skip(partition, format!("enumeration failed: {}", err));
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MockFailure, MockTransport, MockTransportCall};
    use crate::types::partition::{FilterValue, PartitionKey};

    fn config(cap: u64) -> HarvestConfig {
        HarvestConfig::new()
            .with_hard_cap(cap)
            .with_single_pass_threshold(cap.min(10_000))
            .with_retry_backoff_ms(0)
    }

    fn region(id: i64) -> PartitionKey {
        PartitionKey::region(id)
    }

    #[tokio::test]
    async fn test_oversized_region_splits_into_children() {
        let a = region(1);
        let a1 = a.child(Level::SubRegion, 11);
        let a2 = a.child(Level::SubRegion, 12);
        let transport = MockTransport::new()
            .with_size(a.clone(), 12_000)
            .with_children(a.clone(), vec![FilterValue::Id(11), FilterValue::Id(12)])
            .with_size(a1.clone(), 7_000)
            .with_size(a2.clone(), 5_000);
        let config = config(10_000);

        let plan = Planner::new(&transport, &config).expand_region(1).await.unwrap();

        let keys: Vec<_> = plan.fetchable.iter().map(|p| p.key.clone()).collect();
        assert_eq!(plan.fetchable.len(), 2);
        assert!(keys.contains(&a1));
        assert!(keys.contains(&a2));
        assert!(!keys.contains(&a));
        assert!(plan.fetchable.iter().all(|p| p.level == Level::SubRegion));

        let enumerations: Vec<_> = transport
            .calls()
            .into_iter()
            .filter_map(|call| match call {
                MockTransportCall::ListChildren { level, parent } => Some((level, parent)),
                _ => None,
            })
            .collect();
        assert_eq!(enumerations, vec![(Level::SubRegion, a)]);
    }

    #[tokio::test]
    async fn test_empty_partitions_are_never_split_or_fetched() {
        let transport = MockTransport::new().with_size(region(1), 0);
        let config = config(10_000);

        let plan = Planner::new(&transport, &config).expand_region(1).await.unwrap();

        assert_eq!(plan.empty, 1);
        assert!(plan.fetchable.is_empty());
        assert!(!transport
            .calls()
            .iter()
            .any(|call| matches!(call, MockTransportCall::ListChildren { .. })));
    }

    #[tokio::test]
    async fn test_size_equal_to_cap_is_fetchable() {
        let transport = MockTransport::new().with_size(region(1), 10_000);
        let config = config(10_000);

        let plan = Planner::new(&transport, &config).expand_region(1).await.unwrap();

        assert_eq!(plan.fetchable.len(), 1);
        assert_eq!(plan.fetchable[0].size, Some(10_000));
    }

    #[tokio::test]
    async fn test_last_level_oversized_is_reported_not_split() {
        let r = region(1);
        let s = r.child(Level::SubRegion, 2);
        let a = s.child(Level::Agency, 3);
        let t = a.child(Level::RecordType, 4);
        let n = t.child(Level::NameInitial, 'A');
        let transport = MockTransport::new()
            .with_size(r.clone(), 50_000)
            .with_children(r, vec![FilterValue::Id(2)])
            .with_size(s.clone(), 50_000)
            .with_children(s, vec![FilterValue::Id(3)])
            .with_size(a.clone(), 50_000)
            .with_children(a, vec![FilterValue::Id(4)])
            .with_size(t.clone(), 50_000)
            .with_children(t, vec![FilterValue::Initial('A')])
            .with_size(n.clone(), 30_000);
        let config = config(20_000);

        let plan = Planner::new(&transport, &config).expand_region(1).await.unwrap();

        assert!(plan.fetchable.is_empty());
        assert_eq!(plan.max_depth_oversized.len(), 1);
        assert_eq!(plan.max_depth_oversized[0].key, n);
        assert_eq!(
            plan.max_depth_oversized[0].status,
            PartitionStatus::MaxDepthOversized
        );
        let last_level_enumerations = transport
            .calls()
            .iter()
            .filter(|call| matches!(call, MockTransportCall::ListChildren { parent, .. } if *parent == n))
            .count();
        assert_eq!(last_level_enumerations, 0);
    }

    #[tokio::test]
    async fn test_probe_api_error_skips_partition() {
        let transport = MockTransport::new()
            .with_size(region(1), 100)
            .fail_search(region(2), MockFailure::Api { status: 500 });
        let config = config(10_000);

        let plan = Planner::new(&transport, &config)
            .expand(vec![Partition::root(1), Partition::root(2)])
            .await
            .unwrap();

        assert_eq!(plan.fetchable.len(), 1);
        assert_eq!(plan.skipped.len(), 1);
        assert_eq!(plan.skipped[0].key, region(2));
    }

    #[tokio::test]
    async fn test_probe_timeout_drops_partition_after_retries() {
        let transport = MockTransport::new().fail_search(region(1), MockFailure::Timeout);
        let config = config(10_000).with_timeout_retries(1);

        let plan = Planner::new(&transport, &config).expand_region(1).await.unwrap();

        assert!(plan.fetchable.is_empty());
        assert_eq!(plan.skipped.len(), 1);
        assert_eq!(transport.calls().len(), 2);
    }

    #[tokio::test]
    async fn test_probe_401_aborts_planning() {
        let transport = MockTransport::new()
            .fail_search(region(1), MockFailure::Api { status: 401 })
            .with_size(region(2), 50_000)
            .with_children(region(2), vec![FilterValue::Id(20)]);
        let config = config(10_000).with_pool_size(1);

        let result = Planner::new(&transport, &config)
            .expand(vec![Partition::root(1), Partition::root(2)])
            .await;

        assert!(matches!(result, Err(HarvestError::Authentication { status: 401, .. })));
        // Pool of one: nothing after the failing probe starts
        assert_eq!(transport.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_enumeration_failure_skips_branch() {
        let transport = MockTransport::new()
            .with_size(region(1), 50_000)
            .fail_children(region(1), MockFailure::Api { status: 503 });
        let config = config(10_000);

        let plan = Planner::new(&transport, &config).expand_region(1).await.unwrap();

        assert!(plan.fetchable.is_empty());
        assert_eq!(plan.skipped.len(), 1);
        assert!(plan.skipped[0].reason.contains("enumeration failed"));
    }

    #[tokio::test]
    async fn test_truncated_partitions_reported() {
        let transport = MockTransport::new().with_size(region(1), 9_000);
        let config = config(20_000).with_page_size(2_000).with_max_pages(4);

        let plan = Planner::new(&transport, &config).expand_region(1).await.unwrap();

        let truncated = plan.truncated(&config);
        assert_eq!(truncated.len(), 1);
        assert_eq!(truncated[0].unreachable, 1_000);
        assert_eq!(plan.window_count(&config), 4);
    }
}
