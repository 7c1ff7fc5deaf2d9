//! Pipeline error taxonomy and retry classification.

use moviesync_state::StateError;

/// Categorized pipeline error.
///
/// Transient errors (connection loss on either side, empty source) are
/// retried by the backoff wrapper; everything else propagates and terminates
/// the process.
#[derive(Debug, thiserror::Error)]
pub enum EtlError {
    /// Connection-level failure talking to the relational source.
    #[error("source connection error: {0}")]
    SourceUnavailable(String),

    /// Connection-level failure talking to the search index.
    #[error("search index unavailable: {0}")]
    IndexUnavailable(String),

    /// The source holds no filmworks at all. Treated as transient so a
    /// brand-new, not-yet-populated source is retried instead of failing.
    #[error("no filmworks in source database")]
    EmptySource,

    /// Another pipeline instance already holds the single-instance lock.
    #[error("another pipeline instance is already running")]
    AlreadyRunning,

    /// Checkpoint store failure. Fatal: the store has no backoff of its own
    /// and skipping a checkpoint write breaks the cycle ordering invariant.
    #[error("checkpoint store failure: {0}")]
    State(#[from] StateError),

    /// Anything else: programming errors, malformed data, bad configuration.
    #[error(transparent)]
    Fatal(#[from] anyhow::Error),
}

impl EtlError {
    /// `true` for the failure classes the backoff wrapper retries.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::SourceUnavailable(_) | Self::IndexUnavailable(_) | Self::EmptySource
        )
    }

    /// Classify a Postgres error: a server-reported `DbError` means the
    /// query itself is wrong (fatal); anything without one is a
    /// connection-level failure worth retrying. Mirrors the interface/
    /// operational split of the original source driver.
    pub(crate) fn from_pg(err: tokio_postgres::Error) -> Self {
        if err.as_db_error().is_some() {
            Self::Fatal(anyhow::Error::new(err).context("source query rejected"))
        } else {
            Self::SourceUnavailable(err.to_string())
        }
    }

    /// Classify an HTTP client error against the index as transient.
    pub(crate) fn from_http(err: reqwest::Error) -> Self {
        Self::IndexUnavailable(err.to_string())
    }
}

/// Convenience alias used throughout this crate.
pub type Result<T> = std::result::Result<T, EtlError>;
