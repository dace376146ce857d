//! Harvester: plan, fetch and ingest in one run.

use chrono::{Local, NaiveDate, Utc};
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::HarvestResult;
use crate::pipeline::{
    backfill::{backfill, BackfillReport},
    fetch::Fetcher,
    planner::Planner,
    sink::ingest,
};
use crate::traits::{
    detail::DetailSource, enumerator::Enumerator, store::RecordStore, transport::QueryTransport,
};
use crate::types::{config::HarvestConfig, partition::Partition, summary::HarvestSummary};

/// Runs harvesting passes against one transport and one store.
///
/// # Example
///
/// ```rust,ignore
/// use harvester::{Harvester, HarvestConfig, MemoryStore};
///
/// let harvester = Harvester::new(transport, MemoryStore::new(), HarvestConfig::default())?;
/// let summary = harvester.harvest().await?;
/// println!("{} new records", summary.records_inserted);
/// ```
pub struct Harvester<T, S> {
    transport: T,
    store: S,
    config: HarvestConfig,
}

impl<T, S> Harvester<T, S>
where
    T: QueryTransport + Enumerator,
    S: RecordStore,
{
    pub fn new(transport: T, store: S, config: HarvestConfig) -> HarvestResult<Self> {
        config.validate()?;
        Ok(Self {
            transport,
            store,
            config,
        })
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &HarvestConfig {
        &self.config
    }

    /// Harvest every configured region, stamping records with today's date.
    pub async fn harvest(&self) -> HarvestResult<HarvestSummary> {
        self.harvest_on(Local::now().date_naive()).await
    }

    /// Harvest every configured region as observed on `observed_on`.
    ///
    /// Planning finishes before the first fetch. Fails on authentication
    /// errors and on any non-transient error while fetching; everything
    /// else is reported in the summary.
    pub async fn harvest_on(&self, observed_on: NaiveDate) -> HarvestResult<HarvestSummary> {
        let run_id = Uuid::now_v7();
        let started_at = Utc::now();
        info!(
            run_id = %run_id,
            regions = self.config.regions.len(),
            observed_on = %observed_on,
            "Starting harvest"
        );

        let roots = self.config.regions.iter().copied().map(Partition::root).collect();
        let plan = Planner::new(&self.transport, &self.config).expand(roots).await?;

        for partition in &plan.max_depth_oversized {
            warn!(
                run_id = %run_id,
                partition = %partition.key,
                size = ?partition.size,
                "Coverage gap: partition exceeds the cap at maximum depth"
            );
        }
        let truncated = plan.truncated(&self.config);
        for gap in &truncated {
            warn!(
                run_id = %run_id,
                partition = %gap.key,
                size = gap.size,
                unreachable = gap.unreachable,
                "Coverage gap: page cap leaves results unreachable"
            );
        }

        let fetcher = Fetcher::new(&self.transport, &self.config, observed_on);
        let report = ingest(&self.store, fetcher.fetch_all(&plan.fetchable)).await?;

        let summary = HarvestSummary {
            run_id,
            started_at,
            finished_at: Utc::now(),
            partitions_probed: plan.probed,
            empty: plan.empty,
            fetchable: plan.fetchable.len(),
            windows_planned: plan.window_count(&self.config),
            windows_skipped: fetcher.windows_skipped(),
            skipped: plan.skipped,
            max_depth_oversized: plan.max_depth_oversized,
            truncated,
            records_observed: report.observed,
            records_inserted: report.inserted,
            records_touched: report.touched,
            duplicates: report.duplicates,
        };

        info!(
            run_id = %run_id,
            fetchable = summary.fetchable,
            inserted = summary.records_inserted,
            touched = summary.records_touched,
            duplicates = summary.duplicates,
            coverage_gaps = summary.has_coverage_gaps(),
            "Harvest complete"
        );
        Ok(summary)
    }
}

impl<T, S> Harvester<T, S>
where
    T: DetailSource,
    S: RecordStore,
{
    /// Fetch detail documents for every stored record still missing one.
    pub async fn backfill(&self) -> HarvestResult<BackfillReport> {
        backfill(&self.transport, &self.store, &self.config).await
    }
}
