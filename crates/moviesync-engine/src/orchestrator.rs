//! The poll loop: checkpoint gating, one extract-transform-load pass per
//! cycle, and the session/reconnect wrapper around it.

use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::watch;

use moviesync_state::CheckpointStore;
use moviesync_types::MovieDoc;

use crate::backoff::{retry_transient, BackoffPolicy, Progress};
use crate::config::EtlConfig;
use crate::errors::Result;
use crate::loader::BulkLoader;
use crate::sink::SearchClient;
use crate::source::SourceClient;
use crate::transform::to_document;

/// Cooperative shutdown flag, flipped once by the signal listener.
#[derive(Clone)]
pub struct ShutdownSignal {
    rx: watch::Receiver<bool>,
}

impl ShutdownSignal {
    pub fn new() -> (watch::Sender<bool>, Self) {
        let (tx, rx) = watch::channel(false);
        (tx, Self { rx })
    }

    pub fn is_triggered(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once shutdown is requested; never resolves if the sender is
    /// dropped without signaling.
    pub async fn triggered(&self) {
        let mut rx = self.rx.clone();
        if rx.wait_for(|stop| *stop).await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

/// Run the pipeline until shutdown or a non-transient failure.
///
/// Each session opens the source and index connections once and reuses them
/// across cycles; transient failures tear the session down and this wrapper
/// reconnects under the default backoff policy.
///
/// # Errors
///
/// Returns the first non-transient error; transient ones are retried
/// indefinitely.
pub async fn run(
    config: &EtlConfig,
    store: &dyn CheckpointStore,
    shutdown: &ShutdownSignal,
) -> Result<()> {
    retry_transient(&BackoffPolicy::default(), |progress| {
        run_session(config, store, shutdown, progress)
    })
    .await
}

/// The extract-transform-load half of a cycle, behind a seam so the cycle's
/// checkpoint ordering can be exercised without live connections.
trait ChangePipeline {
    async fn has_any_filmworks(&self) -> Result<bool>;

    /// Stream every filmwork changed after `since` into the index, returning
    /// the number of documents written.
    async fn sync_changes(&self, since: DateTime<Utc>) -> Result<u64>;
}

/// Live pipeline over the session's source and index connections.
struct LiveCycle<'a> {
    source: &'a SourceClient,
    loader: &'a BulkLoader<'a>,
}

impl ChangePipeline for LiveCycle<'_> {
    async fn has_any_filmworks(&self) -> Result<bool> {
        self.source.has_any_filmworks().await
    }

    async fn sync_changes(&self, since: DateTime<Utc>) -> Result<u64> {
        let mut stream = self.source.changes_since(since).await?;
        let mut attempted: u64 = 0;
        while let Some(rows) = stream.next_batch().await? {
            let docs: Vec<MovieDoc> = rows.into_iter().map(to_document).collect();
            attempted += self.loader.load_batch(docs).await?;
        }
        Ok(attempted)
    }
}

/// One connection session: connect, ensure the index exists, then cycle
/// until shutdown or failure. Each completed cycle marks `progress` so the
/// reconnect backoff restarts from its shortest delay after a healthy run.
async fn run_session(
    config: &EtlConfig,
    store: &dyn CheckpointStore,
    shutdown: &ShutdownSignal,
    progress: Progress,
) -> Result<()> {
    let source = SourceClient::connect(&config.source).await?;
    let sink = SearchClient::new(&config.index.url);
    sink.ensure_index().await?;
    let loader = BulkLoader::new(&sink);
    let cycle = LiveCycle {
        source: &source,
        loader: &loader,
    };

    let result = loop {
        if shutdown.is_triggered() {
            tracing::info!("Shutdown requested, stopping poll loop");
            break Ok(());
        }
        match run_cycle(&cycle, store, config.frequency, shutdown).await {
            Ok(()) => progress.mark(),
            Err(err) => break Err(err),
        }
    };

    // Dropping the clients closes both connections, on the shutdown path
    // and before a failure propagates alike.
    tracing::info!("Closing source and index connections");
    drop(source);
    result
}

/// One pass of the cycle state machine: gate on the poll interval, write the
/// pessimistic start marker, probe, stream extract-transform-load, then
/// write the success marker carrying the cycle's start time.
async fn run_cycle<P: ChangePipeline>(
    pipeline: &P,
    store: &dyn CheckpointStore,
    frequency: Duration,
    shutdown: &ShutdownSignal,
) -> Result<()> {
    tracing::info!("New cycle, loading last successful load time");
    let checkpoint = store.read_checkpoint()?;
    tracing::info!(checkpoint = %checkpoint.to_rfc3339(), "Last successful load");

    if let Some(wait) = time_until_due(checkpoint, Utc::now(), frequency) {
        tracing::info!(
            wait_secs = wait.as_secs_f64(),
            "Last poll was recent, waiting until the next cycle is due"
        );
        tokio::select! {
            () = tokio::time::sleep(wait) => {}
            () = shutdown.triggered() => return Ok(()),
        }
    }
    if shutdown.is_triggered() {
        return Ok(());
    }

    // Pessimistic start marker: a crash mid-run leaves successful = false
    // as the newest row and the effective checkpoint does not advance.
    let started_at = Utc::now();
    tracing::info!("Starting new extraction");
    store.write_checkpoint(started_at, false)?;

    if !pipeline.has_any_filmworks().await? {
        tracing::info!("No filmworks in source database, skipping cycle");
        return Err(crate::errors::EtlError::EmptySource);
    }

    let attempted = pipeline.sync_changes(checkpoint).await?;

    // The success marker records the cycle's *start* time, so rows changed
    // while the stream was draining are picked up on the next pass.
    store.write_checkpoint(started_at, true)?;
    tracing::info!(documents = attempted, "Cycle finished, index updated");
    Ok(())
}

/// Time left until the next cycle is due, or `None` when it is due now.
/// A checkpoint in the future (clock skew) waits out one full interval.
fn time_until_due(
    checkpoint: DateTime<Utc>,
    now: DateTime<Utc>,
    frequency: Duration,
) -> Option<Duration> {
    let elapsed = now
        .signed_duration_since(checkpoint)
        .to_std()
        .unwrap_or(Duration::ZERO);
    (elapsed < frequency).then(|| frequency - elapsed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use moviesync_state::StateError;

    use crate::errors::EtlError;

    fn ts(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    struct RecordingStore {
        checkpoint: DateTime<Utc>,
        writes: Mutex<Vec<(DateTime<Utc>, bool)>>,
    }

    impl RecordingStore {
        fn new(checkpoint: DateTime<Utc>) -> Self {
            Self {
                checkpoint,
                writes: Mutex::new(Vec::new()),
            }
        }

        fn writes(&self) -> Vec<(DateTime<Utc>, bool)> {
            self.writes.lock().unwrap().clone()
        }
    }

    impl CheckpointStore for RecordingStore {
        fn read_checkpoint(&self) -> std::result::Result<DateTime<Utc>, StateError> {
            Ok(self.checkpoint)
        }

        fn write_checkpoint(
            &self,
            load_time: DateTime<Utc>,
            successful: bool,
        ) -> std::result::Result<(), StateError> {
            self.writes.lock().unwrap().push((load_time, successful));
            Ok(())
        }
    }

    struct FakePipeline {
        has_rows: bool,
        failure: Mutex<Option<EtlError>>,
    }

    impl FakePipeline {
        fn healthy() -> Self {
            Self {
                has_rows: true,
                failure: Mutex::new(None),
            }
        }

        fn empty() -> Self {
            Self {
                has_rows: false,
                failure: Mutex::new(None),
            }
        }

        fn failing(err: EtlError) -> Self {
            Self {
                has_rows: true,
                failure: Mutex::new(Some(err)),
            }
        }
    }

    impl ChangePipeline for FakePipeline {
        async fn has_any_filmworks(&self) -> Result<bool> {
            Ok(self.has_rows)
        }

        async fn sync_changes(&self, _since: DateTime<Utc>) -> Result<u64> {
            match self.failure.lock().unwrap().take() {
                Some(err) => Err(err),
                None => Ok(7),
            }
        }
    }

    #[tokio::test]
    async fn cycle_writes_start_marker_then_success_marker_with_start_time() {
        let store = RecordingStore::new(DateTime::UNIX_EPOCH);
        let pipeline = FakePipeline::healthy();
        let (_tx, shutdown) = ShutdownSignal::new();

        run_cycle(&pipeline, &store, Duration::from_secs(60), &shutdown)
            .await
            .unwrap();

        let writes = store.writes();
        assert_eq!(writes.len(), 2);
        assert!(!writes[0].1, "first write must be the pessimistic marker");
        assert!(writes[1].1, "second write must be the success marker");
        // Both markers carry the cycle's start time, so the finish write
        // replaces the start row instead of adding one.
        assert_eq!(writes[0].0, writes[1].0);
        assert!(writes[0].0 > store.checkpoint);
    }

    #[tokio::test]
    async fn empty_source_keeps_the_pessimistic_marker() {
        let store = RecordingStore::new(DateTime::UNIX_EPOCH);
        let pipeline = FakePipeline::empty();
        let (_tx, shutdown) = ShutdownSignal::new();

        let err = run_cycle(&pipeline, &store, Duration::from_secs(60), &shutdown)
            .await
            .unwrap_err();

        assert!(matches!(err, EtlError::EmptySource));
        assert!(err.is_transient());
        let writes = store.writes();
        assert_eq!(writes.len(), 1);
        assert!(!writes[0].1, "no success marker without an extraction");
    }

    #[tokio::test]
    async fn extraction_failure_leaves_no_success_marker() {
        let store = RecordingStore::new(DateTime::UNIX_EPOCH);
        let pipeline = FakePipeline::failing(EtlError::SourceUnavailable("reset".into()));
        let (_tx, shutdown) = ShutdownSignal::new();

        let err = run_cycle(&pipeline, &store, Duration::from_secs(60), &shutdown)
            .await
            .unwrap_err();

        assert!(matches!(err, EtlError::SourceUnavailable(_)));
        let writes = store.writes();
        assert_eq!(writes.len(), 1);
        assert!(!writes[0].1);
    }

    #[test]
    fn cycle_is_due_once_the_interval_has_elapsed() {
        let checkpoint = ts("2024-06-01T10:00:00Z");
        let now = ts("2024-06-01T10:01:30Z");
        assert_eq!(time_until_due(checkpoint, now, Duration::from_secs(60)), None);
    }

    #[test]
    fn recent_checkpoint_waits_out_the_remainder() {
        let checkpoint = ts("2024-06-01T10:00:00Z");
        let now = ts("2024-06-01T10:00:45Z");
        assert_eq!(
            time_until_due(checkpoint, now, Duration::from_secs(60)),
            Some(Duration::from_secs(15))
        );
    }

    #[test]
    fn future_checkpoint_waits_a_full_interval() {
        let checkpoint = ts("2024-06-01T11:00:00Z");
        let now = ts("2024-06-01T10:00:00Z");
        assert_eq!(
            time_until_due(checkpoint, now, Duration::from_secs(60)),
            Some(Duration::from_secs(60))
        );
    }

    #[tokio::test]
    async fn shutdown_signal_flips_once() {
        let (tx, signal) = ShutdownSignal::new();
        assert!(!signal.is_triggered());
        tx.send(true).unwrap();
        assert!(signal.is_triggered());
        signal.triggered().await;
    }
}
