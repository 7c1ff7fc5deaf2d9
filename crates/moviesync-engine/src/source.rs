//! Relational source access: connection lifecycle, emptiness probe, and the
//! streaming change extractor.
//!
//! Changed rows are read through a server-side `DECLARE ... NO SCROLL
//! CURSOR` inside a repeatable-read transaction and fetched in fixed-size
//! chunks, so the full result set is never materialized client-side.

use chrono::{DateTime, Utc};
use tokio_postgres::{Client, Config as PgConfig, NoTls, Row};

use moviesync_types::{FilmworkRow, PersonEdge};

use crate::config::SourceConfig;
use crate::errors::{EtlError, Result};
use crate::query::{CURSOR_NAME, FETCH_CHUNK, SELECT_ANY_FILMWORK, SELECT_CHANGED_FILMWORKS};

/// Connected source handle, reused across cycles for the session lifetime.
pub struct SourceClient {
    client: Client,
}

impl SourceClient {
    /// Connect to the source database, spawning the connection driver task.
    ///
    /// # Errors
    ///
    /// Returns [`EtlError::SourceUnavailable`] when the server can't be
    /// reached; the caller's backoff path reconnects.
    pub async fn connect(config: &SourceConfig) -> Result<Self> {
        let mut pg = PgConfig::new();
        pg.host(&config.host);
        pg.port(config.port);
        pg.user(&config.user);
        if !config.password.is_empty() {
            pg.password(&config.password);
        }
        pg.dbname(&config.database);

        let (client, connection) = pg
            .connect(NoTls)
            .await
            .map_err(|e| EtlError::SourceUnavailable(format!("connection failed: {e}")))?;

        tokio::spawn(async move {
            if let Err(e) = connection.await {
                tracing::error!("Source connection error: {e}");
            }
        });

        Ok(Self { client })
    }

    /// Probe whether the source holds any filmworks at all.
    pub async fn has_any_filmworks(&self) -> Result<bool> {
        let row = self
            .client
            .query_opt(SELECT_ANY_FILMWORK, &[])
            .await
            .map_err(EtlError::from_pg)?;
        Ok(row.is_some())
    }

    /// Open a single-pass stream over filmworks changed strictly after
    /// `since`. The stream borrows this client; each element is consumed
    /// exactly once.
    pub async fn changes_since(&self, since: DateTime<Utc>) -> Result<ChangeStream<'_>> {
        self.client
            .batch_execute("BEGIN TRANSACTION ISOLATION LEVEL REPEATABLE READ")
            .await
            .map_err(EtlError::from_pg)?;

        let declare = format!("DECLARE {CURSOR_NAME} NO SCROLL CURSOR FOR {SELECT_CHANGED_FILMWORKS}");
        if let Err(e) = self.client.execute(&declare, &[&since]).await {
            let _ = self.client.batch_execute("ROLLBACK").await;
            return Err(EtlError::from_pg(e));
        }

        Ok(ChangeStream {
            client: &self.client,
            done: false,
        })
    }
}

/// Lazy, finite, single-pass sequence of changed source rows.
pub struct ChangeStream<'a> {
    client: &'a Client,
    done: bool,
}

impl ChangeStream<'_> {
    /// Fetch the next chunk of rows, or `None` once the cursor is drained
    /// (at which point the cursor is closed and the transaction committed).
    pub async fn next_batch(&mut self) -> Result<Option<Vec<FilmworkRow>>> {
        if self.done {
            return Ok(None);
        }

        let fetch = format!("FETCH {FETCH_CHUNK} FROM {CURSOR_NAME}");
        let rows = match self.client.query(&fetch, &[]).await {
            Ok(rows) => rows,
            Err(e) => {
                self.abort().await;
                return Err(EtlError::from_pg(e));
            }
        };

        if rows.is_empty() {
            self.done = true;
            self.client
                .batch_execute(&format!("CLOSE {CURSOR_NAME}; COMMIT"))
                .await
                .map_err(EtlError::from_pg)?;
            return Ok(None);
        }

        let mut batch = Vec::with_capacity(rows.len());
        for row in &rows {
            match decode_row(row) {
                Ok(filmwork) => batch.push(filmwork),
                Err(e) => {
                    self.abort().await;
                    return Err(e);
                }
            }
        }
        Ok(Some(batch))
    }

    /// Best-effort rollback after a mid-stream failure so the connection is
    /// usable again if the session survives.
    async fn abort(&mut self) {
        self.done = true;
        let _ = self.client.batch_execute("ROLLBACK").await;
    }
}

fn decode_row(row: &Row) -> Result<FilmworkRow> {
    // Shape mismatches here mean the query and the row model disagree,
    // which no amount of retrying fixes.
    fn decode_err(e: impl std::fmt::Display) -> EtlError {
        EtlError::Fatal(anyhow::anyhow!("malformed source row: {e}"))
    }

    let persons_raw: serde_json::Value = row.try_get("persons").map_err(decode_err)?;
    let persons: Vec<PersonEdge> = serde_json::from_value(persons_raw).map_err(decode_err)?;

    Ok(FilmworkRow {
        id: row.try_get("id").map_err(decode_err)?,
        title: row.try_get("title").map_err(decode_err)?,
        description: row.try_get("description").map_err(decode_err)?,
        imdb_rating: row.try_get("imdb_rating").map_err(decode_err)?,
        genres: row.try_get("genre").map_err(decode_err)?,
        persons,
    })
}
