//! Merge & sink: the single writer of harvested records.

use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::{debug, info};

use crate::error::HarvestResult;
use crate::traits::store::RecordStore;
use crate::types::record::{Record, UpsertOutcome};

/// Counts from one ingestion.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestReport {
    /// Records received from the fetch stream
    pub observed: usize,
    /// New ids written
    pub inserted: usize,
    /// Ids already stored by an earlier run; `last_seen_date` updated
    pub touched: usize,
    /// Repeats within this run (overlapping windows or initials)
    pub duplicates: usize,
}

/// Upserts records as they arrive.
///
/// Ids already written during this run are counted as duplicates and not
/// sent to the store again.
pub struct Sink<'a, S: ?Sized> {
    store: &'a S,
    seen: HashSet<i64>,
    report: IngestReport,
}

impl<'a, S> Sink<'a, S>
where
    S: RecordStore + ?Sized,
{
    pub fn new(store: &'a S) -> Self {
        Self {
            store,
            seen: HashSet::new(),
            report: IngestReport::default(),
        }
    }

    /// Write one record.
    pub async fn accept(&mut self, record: Record) -> HarvestResult<()> {
        self.report.observed += 1;

        if !self.seen.insert(record.id) {
            self.report.duplicates += 1;
            return Ok(());
        }

        match self.store.upsert(&record).await? {
            UpsertOutcome::Inserted => self.report.inserted += 1,
            UpsertOutcome::Touched => self.report.touched += 1,
        }
        Ok(())
    }

    /// Drain `records`, stopping at the first error.
    pub async fn ingest<St>(&mut self, records: St) -> HarvestResult<()>
    where
        St: Stream<Item = HarvestResult<Record>>,
    {
        let mut records = std::pin::pin!(records);
        while let Some(record) = records.next().await {
            self.accept(record?).await?;
        }
        Ok(())
    }

    pub fn report(&self) -> IngestReport {
        self.report
    }
}

/// Ingest a whole record stream into `store`.
pub async fn ingest<S, St>(store: &S, records: St) -> HarvestResult<IngestReport>
where
    S: RecordStore + ?Sized,
    St: Stream<Item = HarvestResult<Record>>,
{
    let mut sink = Sink::new(store);
    let outcome = sink.ingest(records).await;
    let report = sink.report();

    debug!(
        observed = report.observed,
        inserted = report.inserted,
        touched = report.touched,
        duplicates = report.duplicates,
        "Sink drained"
    );
    outcome?;

    info!(
        inserted = report.inserted,
        touched = report.touched,
        duplicates = report.duplicates,
        "Ingestion complete"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::HarvestError;
    use crate::stores::MemoryStore;
    use crate::testing::sample_item;
    use chrono::NaiveDate;
    use futures::stream;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2022, 3, d).unwrap()
    }

    #[tokio::test]
    async fn test_reingestion_only_touches_last_seen() {
        let store = MemoryStore::new();
        let first = Record::observed(sample_item(7), day(1));
        ingest(&store, stream::iter(vec![Ok(first.clone())])).await.unwrap();

        let mut again = Record::observed(sample_item(7), day(9));
        again.process_number = "changed upstream".into();
        let report = ingest(&store, stream::iter(vec![Ok(again)])).await.unwrap();

        assert_eq!(report.touched, 1);
        assert_eq!(report.inserted, 0);
        let stored = store.get_record(7).await.unwrap().unwrap();
        assert_eq!(stored.process_number, first.process_number);
        assert_eq!(stored.first_seen_date, day(1));
        assert_eq!(stored.last_seen_date, day(9));
    }

    #[tokio::test]
    async fn test_duplicates_within_run_write_once() {
        let store = MemoryStore::new();
        let records = vec![
            Ok(Record::observed(sample_item(1), day(3))),
            Ok(Record::observed(sample_item(2), day(3))),
            Ok(Record::observed(sample_item(1), day(3))),
        ];

        let report = ingest(&store, stream::iter(records)).await.unwrap();

        assert_eq!(report.observed, 3);
        assert_eq!(report.inserted, 2);
        assert_eq!(report.duplicates, 1);
        assert_eq!(store.count_records().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_error_stops_ingestion_after_earlier_records() {
        let store = MemoryStore::new();
        let records = vec![
            Ok(Record::observed(sample_item(1), day(3))),
            Err(HarvestError::UnexpectedResponse("bad page".into())),
            Ok(Record::observed(sample_item(2), day(3))),
        ];

        let result = ingest(&store, stream::iter(records)).await;

        assert!(matches!(result, Err(HarvestError::UnexpectedResponse(_))));
        assert_eq!(store.count_records().await.unwrap(), 1);
    }
}
