//! Integration tests for full harvesting runs.
//!
//! These tests drive the whole pipeline against the mock transport:
//! 1. Plan (probe and split, level by level)
//! 2. Fetch every window
//! 3. Merge into the store
//! 4. Backfill details

use chrono::NaiveDate;
use harvester::{
    testing::{sample_item, MockFailure, MockTransport, MockTransportCall},
    DetailOutcome, FilterValue, HarvestConfig, HarvestError, Harvester, Level, MemoryStore,
    PartitionKey, PartitionStatus, RecordStore,
};
use serde_json::json;
use std::time::Duration;

fn config() -> HarvestConfig {
    HarvestConfig::new()
        .with_hard_cap(50)
        .with_single_pass_threshold(25)
        .with_page_size(10)
        .with_max_pages(4)
        .with_pool_size(4)
        .with_retry_backoff_ms(0)
        .with_regions([1, 2])
}

fn day(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2022, 3, d).unwrap()
}

fn items(ids: std::ops::RangeInclusive<i64>) -> Vec<harvester::SearchItem> {
    ids.map(sample_item).collect()
}

/// Region 1 fits; region 2 must be split into two sub-regions.
fn two_region_transport() -> MockTransport {
    let r1 = PartitionKey::region(1);
    let r2 = PartitionKey::region(2);
    MockTransport::new()
        .with_items(r1, items(1..=30))
        .with_size(r2.clone(), 80)
        .with_children(r2.clone(), vec![FilterValue::Id(21), FilterValue::Id(22)])
        .with_items(r2.child(Level::SubRegion, 21), items(101..=140))
        .with_items(r2.child(Level::SubRegion, 22), items(201..=240))
}

/// Single-child chain from `region` down to the record-type level.
fn record_type_key(region: i64) -> PartitionKey {
    PartitionKey::region(region)
        .child(Level::SubRegion, 10)
        .child(Level::Agency, 100)
        .child(Level::RecordType, 1)
}

fn deep_transport(region: i64, size: u64) -> MockTransport {
    let r = PartitionKey::region(region);
    let s = r.child(Level::SubRegion, 10);
    let a = s.child(Level::Agency, 100);
    let t = a.child(Level::RecordType, 1);
    MockTransport::new()
        .with_size(r.clone(), size)
        .with_children(r, vec![FilterValue::Id(10)])
        .with_size(s.clone(), size)
        .with_children(s, vec![FilterValue::Id(100)])
        .with_size(a.clone(), size)
        .with_children(a, vec![FilterValue::Id(1)])
        .with_size(t, size)
}

#[tokio::test]
async fn test_full_run_covers_split_regions() {
    let harvester = Harvester::new(two_region_transport(), MemoryStore::new(), config()).unwrap();

    let summary = harvester.harvest_on(day(3)).await.unwrap();

    assert_eq!(harvester.store().record_count(), 110);
    assert_eq!(summary.partitions_probed, 4);
    assert_eq!(summary.fetchable, 3);
    assert_eq!(summary.records_inserted, 110);
    // Every partition is above the single-pass threshold, so both passes
    // revisit every record once
    assert_eq!(summary.duplicates, 110);
    assert!(!summary.has_coverage_gaps());

    // The oversized parent is never fetched
    let fetched_region_2 = harvester.transport().calls().into_iter().any(|call| {
        matches!(
            call,
            MockTransportCall::Search { filter, page_size: 10, .. } if filter == PartitionKey::region(2)
        )
    });
    assert!(!fetched_region_2);
}

#[tokio::test]
async fn test_overlapping_initials_store_one_row_per_id() {
    let t = record_type_key(1);
    let transport = deep_transport(1, 100)
        .with_children(t.clone(), vec![FilterValue::Initial('A'), FilterValue::Initial('B')])
        .with_items(t.child(Level::NameInitial, 'A'), items(1..=10))
        .with_items(t.child(Level::NameInitial, 'B'), items(5..=15));
    let harvester =
        Harvester::new(transport, MemoryStore::new(), config().with_regions([1])).unwrap();

    let summary = harvester.harvest_on(day(3)).await.unwrap();

    assert_eq!(harvester.store().count_records().await.unwrap(), 15);
    assert_eq!(summary.records_observed, 21);
    assert_eq!(summary.records_inserted, 15);
    assert_eq!(summary.duplicates, 6);
}

#[tokio::test]
async fn test_max_depth_oversized_reported_as_gap() {
    let t = record_type_key(1);
    let transport = deep_transport(1, 100)
        .with_children(t.clone(), vec![FilterValue::Initial('A'), FilterValue::Initial('B')])
        .with_size(t.child(Level::NameInitial, 'A'), 70)
        .with_items(t.child(Level::NameInitial, 'B'), items(1..=5));
    let harvester =
        Harvester::new(transport, MemoryStore::new(), config().with_regions([1])).unwrap();

    let summary = harvester.harvest_on(day(3)).await.unwrap();

    assert!(summary.has_coverage_gaps());
    assert_eq!(summary.max_depth_oversized.len(), 1);
    assert_eq!(
        summary.max_depth_oversized[0].key,
        t.child(Level::NameInitial, 'A')
    );
    assert_eq!(
        summary.max_depth_oversized[0].status,
        PartitionStatus::MaxDepthOversized
    );
    assert_eq!(summary.records_inserted, 5);
}

#[tokio::test]
async fn test_probe_unauthorized_aborts_before_fetching() {
    let transport = two_region_transport()
        .fail_search(PartitionKey::region(1), MockFailure::Api { status: 401 });
    let harvester = Harvester::new(transport, MemoryStore::new(), config()).unwrap();

    let result = harvester.harvest_on(day(3)).await;

    assert!(matches!(
        result,
        Err(HarvestError::Authentication { status: 401, .. })
    ));
    assert_eq!(harvester.store().record_count(), 0);
    let fetches = harvester
        .transport()
        .calls()
        .into_iter()
        .filter(|call| matches!(call, MockTransportCall::Search { page_size: 10, .. }))
        .count();
    assert_eq!(fetches, 0);
}

#[tokio::test]
async fn test_fetch_api_error_aborts_run() {
    let transport =
        two_region_transport().fail_fetch(PartitionKey::region(1), MockFailure::Api { status: 503 });
    let harvester = Harvester::new(transport, MemoryStore::new(), config()).unwrap();

    let result = harvester.harvest_on(day(3)).await;

    assert!(matches!(
        result,
        Err(HarvestError::Api {
            status: Some(503),
            ..
        })
    ));
}

#[tokio::test]
async fn test_fetch_timeouts_are_counted_not_fatal() {
    let r1 = PartitionKey::region(1);
    let transport = MockTransport::new()
        .with_items(r1.clone(), items(1..=5))
        .fail_fetch(r1, MockFailure::Timeout);
    let harvester = Harvester::new(
        transport,
        MemoryStore::new(),
        config().with_regions([1]).with_timeout_retries(1),
    )
    .unwrap();

    let summary = harvester.harvest_on(day(3)).await.unwrap();

    assert_eq!(summary.windows_planned, 1);
    assert_eq!(summary.windows_skipped, 1);
    assert!(summary.has_coverage_gaps());
}

#[tokio::test]
async fn test_rerun_only_touches_last_seen() {
    let harvester = Harvester::new(two_region_transport(), MemoryStore::new(), config()).unwrap();

    harvester.harvest_on(day(1)).await.unwrap();
    let before = harvester.store().get_record(101).await.unwrap().unwrap();
    let second = harvester.harvest_on(day(9)).await.unwrap();
    let after = harvester.store().get_record(101).await.unwrap().unwrap();

    assert_eq!(second.records_inserted, 0);
    assert_eq!(second.records_touched, 110);
    assert_eq!(harvester.store().record_count(), 110);
    assert_eq!(after.process_number, before.process_number);
    assert_eq!(after.first_seen_date, day(1));
    assert_eq!(after.last_seen_date, day(9));
}

#[tokio::test]
async fn test_truncated_partitions_in_summary() {
    // 45 results: two passes of 2 pages of 10 reach only 40
    let transport = MockTransport::new().with_items(PartitionKey::region(1), items(1..=45));
    let harvester = Harvester::new(
        transport,
        MemoryStore::new(),
        config().with_regions([1]).with_max_pages(2),
    )
    .unwrap();

    let summary = harvester.harvest_on(day(3)).await.unwrap();

    assert_eq!(summary.truncated.len(), 1);
    assert_eq!(summary.truncated[0].unreachable, 5);
    assert_eq!(summary.records_inserted, 40);
}

#[tokio::test]
async fn test_pool_bounds_concurrency() {
    let mut transport = MockTransport::new().with_latency(Duration::from_millis(5));
    for region in 1..=12 {
        transport = transport.with_items(PartitionKey::region(region), items(region * 100..=region * 100 + 4));
    }
    let harvester = Harvester::new(
        transport,
        MemoryStore::new(),
        config().with_regions(1..=12).with_pool_size(3),
    )
    .unwrap();

    let summary = harvester.harvest_on(day(3)).await.unwrap();

    assert_eq!(summary.records_inserted, 60);
    assert!(harvester.transport().max_in_flight() <= 3);
}

#[tokio::test]
async fn test_backfill_after_harvest() {
    let transport = MockTransport::new()
        .with_items(PartitionKey::region(1), items(1..=3))
        .with_detail(1, DetailOutcome::Found(json!({"id": 1, "mandado": {"tipo": "prisao"}})))
        .with_detail(2, DetailOutcome::NotFound)
        .with_detail(3, DetailOutcome::Found(json!({"id": 3})));
    let harvester =
        Harvester::new(transport, MemoryStore::new(), config().with_regions([1])).unwrap();

    harvester.harvest_on(day(3)).await.unwrap();
    let first = harvester.backfill().await.unwrap();
    let second = harvester.backfill().await.unwrap();

    assert_eq!(first.pending, 3);
    assert_eq!(first.updated, 1);
    assert_eq!(harvester.store().detail_write_count(), 1);
    // Records 2 and 3 stay pending for a later run
    assert_eq!(second.pending, 2);
    assert_eq!(second.updated, 0);
}

#[test]
fn test_invalid_config_rejected() {
    let result = Harvester::new(
        MockTransport::new(),
        MemoryStore::new(),
        HarvestConfig::new().with_page_size(0),
    );
    assert!(matches!(result, Err(HarvestError::Config(_))));
}
