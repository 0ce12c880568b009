pub mod summary;

use std::{future, sync::Arc};

use anyhow::Result;
use chrono::NaiveDate;
use futures::{stream, Stream, StreamExt};
use tracing::error;

use crate::daemon::storage::{entities::UsageRecordEntity, record_storage::RecordStorage};

use summary::FilterSpec;

/// Extracts the records a filter window can see. Day files outside the
/// window are never opened; records inside are double-checked against the
/// filter in case an older version misfiled them.
pub fn extract_for(
    storage: impl RecordStorage,
    spec: FilterSpec,
) -> impl Stream<Item = Result<UsageRecordEntity>> {
    let (start, end) = spec.date_range();
    extract_days(storage, date_range(start, end))
        .filter_map(move |v| future::ready(v.map(|r| spec.matches(&r).then_some(r)).transpose()))
}

/// Streams all records of the given days, in day order. A failed day file
/// is logged and surfaced as one Err item; the remaining days still come
/// through.
pub fn extract_days(
    storage: impl RecordStorage,
    days: impl Stream<Item = NaiveDate>,
) -> impl Stream<Item = Result<UsageRecordEntity>> {
    let storage = Arc::new(storage);

    let files = days
        .map(move |day| {
            let storage = storage.clone();
            async move { (day, storage.get_data_for(day).await) }
        })
        .buffered(4);

    files.flat_map(|(day, data)| match data {
        Ok(data) => stream::iter(data).map(Ok).boxed(),
        Err(e) => {
            error!("Failed to process file {day} {e}");
            stream::once(future::ready(Err(e))).boxed()
        }
    })
}

/// Returns a stream of dates between start (inclusive) and end (inclusive).
fn date_range(start: NaiveDate, end: NaiveDate) -> impl Stream<Item = NaiveDate> {
    stream::unfold((start, end), |(mut current, end)| {
        future::ready({
            if current <= end {
                let last_current = current;
                current = current.succ_opt().expect("End of time should never happen");
                Some(((last_current), (current, end)))
            } else {
                None
            }
        })
    })
}

/// Collects the window's records, skipping days that failed to read. Read
/// failures are already logged by the stream; a report over the remaining
/// data beats no report.
pub async fn collect_for(storage: impl RecordStorage, spec: FilterSpec) -> Vec<UsageRecordEntity> {
    extract_for(storage, spec)
        .filter_map(|v| future::ready(v.ok()))
        .collect()
        .await
}
