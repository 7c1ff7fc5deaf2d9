//! Checkpoint store trait definition.

use chrono::{DateTime, Utc};

use crate::error;

/// Storage contract for the pipeline checkpoint ledger.
///
/// Implementations must be `Send + Sync` for use behind `&dyn CheckpointStore`.
pub trait CheckpointStore: Send + Sync {
    /// Read the effective checkpoint: the `load_time` of the most recent
    /// successful row, or the Unix epoch when none exists.
    ///
    /// Also purges ledger rows older than the retention window as a side
    /// effect, so the ledger stays bounded without a separate maintenance
    /// path.
    ///
    /// # Errors
    ///
    /// Returns [`StateError`](crate::StateError) on storage failure. Callers
    /// must treat this as fatal, not retryable: the store has no backoff of
    /// its own and a silently skipped read would break the cycle's
    /// start/finish ordering.
    fn read_checkpoint(&self) -> error::Result<DateTime<Utc>>;

    /// Record a checkpoint row. Insert-or-replace keyed by `load_time`, so
    /// writing the same `load_time` twice (start marker, then finish marker)
    /// replaces the row rather than erroring.
    ///
    /// # Errors
    ///
    /// Returns [`StateError`](crate::StateError) on storage failure.
    fn write_checkpoint(&self, load_time: DateTime<Utc>, successful: bool) -> error::Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Verify the trait is object-safe (can be used as `dyn CheckpointStore`).
    #[test]
    fn trait_is_object_safe() {
        fn _assert_object_safe(_: &dyn CheckpointStore) {}
    }
}
