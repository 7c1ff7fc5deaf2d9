//! Bulk loader: streams documents to the index with bounded per-item retry.
//!
//! A rejected document is retried on its own small backoff schedule; once
//! retries are exhausted (or the rejection is permanent, e.g. a strict-
//! mapping violation) it is logged and dropped. Per-item failures never
//! fail the cycle; only connection-level errors propagate.

use std::collections::HashSet;
use std::time::Duration;

use moviesync_types::MovieDoc;

use crate::backoff::BackoffPolicy;
use crate::errors::Result;
use crate::sink::{ItemFailure, SearchClient};

/// Upper bound on per-item retry rounds within one batch.
const MAX_ITEM_RETRIES: u32 = 100;

/// At-least-once bulk writer over a [`SearchClient`].
pub struct BulkLoader<'a> {
    sink: &'a SearchClient,
    max_retries: u32,
    retry_backoff: BackoffPolicy,
}

impl<'a> BulkLoader<'a> {
    pub fn new(sink: &'a SearchClient) -> Self {
        Self {
            sink,
            max_retries: MAX_ITEM_RETRIES,
            retry_backoff: BackoffPolicy {
                start: Duration::from_millis(100),
                factor: 2,
                ceiling: Duration::from_secs(10),
                stop_at_ceiling: false,
            },
        }
    }

    /// Write one batch, retrying rejected items, and return the number of
    /// attempted documents.
    ///
    /// # Errors
    ///
    /// Only connection-level failures
    /// ([`EtlError::IndexUnavailable`](crate::EtlError::IndexUnavailable))
    /// propagate; document-level rejections are logged and dropped.
    pub async fn load_batch(&self, docs: Vec<MovieDoc>) -> Result<u64> {
        let attempted = docs.len() as u64;
        if docs.is_empty() {
            return Ok(0);
        }

        let mut pending = docs;
        let mut round = 0u32;
        loop {
            let failures = self.sink.bulk(&pending).await?;
            if failures.is_empty() {
                return Ok(attempted);
            }

            let retryable_ids = log_and_partition(&failures);
            pending.retain(|doc| retryable_ids.contains(doc.id.as_str()));
            if pending.is_empty() {
                return Ok(attempted);
            }

            if round >= self.max_retries {
                tracing::error!(
                    dropped = pending.len(),
                    rounds = round,
                    "Dropping documents after exhausting bulk-write retries"
                );
                return Ok(attempted);
            }

            tokio::time::sleep(self.retry_backoff.delay_for_attempt(round)).await;
            round += 1;
        }
    }
}

/// Log every failure and return the ids worth retrying. Permanent
/// rejections (schema violations and other 4xx) are dropped here.
fn log_and_partition(failures: &[ItemFailure]) -> HashSet<&str> {
    let mut retryable = HashSet::new();
    for failure in failures {
        if failure.is_retryable() {
            tracing::warn!(
                id = %failure.id,
                status = failure.status,
                reason = %failure.reason,
                "Index rejected document, will retry"
            );
            retryable.insert(failure.id.as_str());
        } else {
            tracing::error!(
                id = %failure.id,
                status = failure.status,
                reason = %failure.reason,
                "Index rejected document permanently, dropping"
            );
        }
    }
    retryable
}
