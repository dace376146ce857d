//! Backfill: fetch detail documents for stored records that lack one.
//!
//! Independent of partitions. Each pending record costs one detail request.
//! Anything short of a well-formed document leaves the record untouched so a
//! later run can try again.

use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::error::{HarvestError, HarvestResult, TransportError};
use crate::pipeline::pool::{with_retries, WorkerPool};
use crate::traits::{detail::DetailSource, store::RecordStore};
use crate::types::{
    config::HarvestConfig,
    record::{has_marker, DetailOutcome, MissingDetail},
};

/// Counts from one backfill pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackfillReport {
    /// Records that had no detail when the pass started
    pub pending: usize,
    pub updated: usize,
    pub not_found: usize,
    /// Documents without the marker, or bodies that failed to decode
    pub malformed: usize,
    /// Requests that failed after retries
    pub failed: usize,
}

/// Run one backfill pass.
///
/// Detail requests run through the worker pool; writes happen here, one at
/// a time, as responses arrive. Authentication failures abort the pass.
pub async fn backfill<D, S>(
    details: &D,
    store: &S,
    config: &HarvestConfig,
) -> HarvestResult<BackfillReport>
where
    D: DetailSource + ?Sized,
    S: RecordStore + ?Sized,
{
    let pending = store.select_missing_detail().await?;
    let mut report = BackfillReport {
        pending: pending.len(),
        ..Default::default()
    };
    info!(pending = report.pending, "Backfilling details");

    if pending.is_empty() {
        return Ok(report);
    }

    let pool = WorkerPool::new(config.pool_size);
    let mut responses = Box::pin(pool.run(pending, |missing: MissingDetail| async move {
        let context = format!("detail {}/{}", missing.id, missing.type_code);
        let outcome = with_retries(config.timeout_retries, config.retry_backoff(), &context, || {
            details.get_detail(missing.id, missing.type_code)
        })
        .await;
        (missing, outcome)
    }));
    let mut fatal: Option<HarvestError> = None;

    while let Some((missing, outcome)) = responses.next().await {
        match outcome {
            Ok(DetailOutcome::Found(document)) if has_marker(&document, &config.detail_marker) => {
                store.update_detail(missing.id, &document).await?;
                report.updated += 1;
            }
            Ok(DetailOutcome::Found(_)) => {
                warn!(id = missing.id, marker = %config.detail_marker, "Detail document missing marker, left for a later run");
                report.malformed += 1;
            }
            Ok(DetailOutcome::NotFound) => {
                report.not_found += 1;
            }
            Err(TransportError::Decode(reason)) => {
                warn!(id = missing.id, reason = %reason, "Detail document could not be decoded");
                report.malformed += 1;
            }
            Err(e) if e.is_auth() => {
                if fatal.is_none() {
                    error!(id = missing.id, error = %e, "Authentication failed during backfill, aborting");
                    pool.cancel();
                    fatal = Some(e.into());
                }
            }
            Err(e) => {
                warn!(id = missing.id, error = %e, "Detail request failed");
                report.failed += 1;
            }
        }
    }

    if let Some(err) = fatal {
        return Err(err);
    }

    info!(
        updated = report.updated,
        not_found = report.not_found,
        malformed = report.malformed,
        failed = report.failed,
        "Backfill complete"
    );
    Ok(report)
}
