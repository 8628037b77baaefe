//! Pagination aggregator.
//!
//! Drives the resilient client across successive pages to retrieve the
//! complete remote task set. The loop defends against backends that honor
//! pagination correctly, backends that ignore the offset and keep returning
//! the first page, and backends that return short pages mid-sequence: the
//! result never contains duplicate ids and the loop always terminates.

use std::collections::HashSet;

use crate::client::ApiClient;
use crate::error::SyncError;
use crate::task::ApiTask;

/// Hard ceiling on page fetches, the final defense against infinite loops.
const MAX_PAGES: usize = 1000;

/// Fetch every remote task, deduplicated by id.
///
/// Fails the whole operation on any non-2xx page; never partially returns.
pub async fn fetch_all_tasks(
    client: &ApiClient,
    page_size: usize,
) -> Result<Vec<ApiTask>, SyncError> {
    let mut aggregate = Vec::new();
    let mut seen_ids: HashSet<i64> = HashSet::new();
    let mut offset = 0;

    for _ in 0..MAX_PAGES {
        let page = client.list_tasks(page_size, offset).await?;
        let raw_len = page.len();

        let mut fresh = 0;
        for task in page {
            if seen_ids.insert(task.id) {
                fresh += 1;
                aggregate.push(task);
            }
        }

        if raw_len == 0 {
            break;
        }
        if raw_len < page_size {
            // Natural last page.
            break;
        }
        if fresh == 0 {
            tracing::warn!(offset, "backend is not honoring the pagination offset, stopping");
            break;
        }

        offset += page_size;
    }

    tracing::debug!(count = aggregate.len(), "aggregated remote tasks");
    Ok(aggregate)
}
