mod logging;

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use moviesync_engine::config::{EtlConfig, IndexConfig, SourceConfig};
use moviesync_engine::lock::ProcessLock;
use moviesync_engine::orchestrator::{self, ShutdownSignal};
use moviesync_engine::EtlError;
use moviesync_state::SqliteCheckpointStore;

#[derive(Parser)]
#[command(
    name = "moviesync",
    version,
    about = "Incremental filmwork sync from Postgres to a search index"
)]
struct Cli {
    /// Source database host
    #[arg(long, env = "PG_HOST", default_value = "127.0.0.1")]
    pg_host: String,

    /// Source database port
    #[arg(long, env = "PG_PORT", default_value_t = 5432)]
    pg_port: u16,

    /// Source database user
    #[arg(long, env = "PG_USER", default_value = "postgres")]
    pg_user: String,

    /// Source database password
    #[arg(long, env = "PG_PASSWORD", default_value = "", hide_env_values = true)]
    pg_password: String,

    /// Source database name
    #[arg(long, env = "PG_DATABASE", default_value = "movies")]
    pg_database: String,

    /// Search index base URL
    #[arg(long, env = "ES_HOST", default_value = "http://127.0.0.1:9200")]
    es_host: String,

    /// Checkpoint database path
    #[arg(long, env = "SQLITE_DB_PATH", default_value = "etl_state/db.sqlite")]
    state_path: PathBuf,

    /// Poll frequency in seconds
    #[arg(long, env = "ETL_CYCLE_SEC", default_value_t = 60)]
    frequency: u64,

    /// Single-instance lock name
    #[arg(long, env = "ETL_LOCK_NAME", default_value = "moviesync-etl")]
    lock_name: String,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    logging::init(&cli.log_level);

    let _lock = match ProcessLock::acquire(&cli.lock_name) {
        Ok(lock) => lock,
        Err(EtlError::AlreadyRunning) => {
            tracing::error!(
                lock = cli.lock_name,
                "Pipeline instance is already running, exiting"
            );
            std::process::exit(1);
        }
        Err(err) => return Err(err.into()),
    };
    tracing::info!("Acquired single-instance lock, launching polling cycle");

    let store = SqliteCheckpointStore::open(&cli.state_path)?;
    let config = EtlConfig {
        source: SourceConfig {
            host: cli.pg_host,
            port: cli.pg_port,
            user: cli.pg_user,
            password: cli.pg_password,
            database: cli.pg_database,
        },
        index: IndexConfig { url: cli.es_host },
        frequency: Duration::from_secs(cli.frequency),
    };

    let (shutdown_tx, shutdown) = ShutdownSignal::new();
    tokio::spawn(async move {
        wait_for_termination().await;
        tracing::info!("Termination signal received, finishing in-flight cycle");
        let _ = shutdown_tx.send(true);
    });

    orchestrator::run(&config, &store, &shutdown).await?;
    tracing::info!("Pipeline stopped");
    Ok(())
}

/// Wait for SIGINT or, on Unix, SIGTERM.
async fn wait_for_termination() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = term.recv() => {}
                }
            }
            Err(e) => {
                tracing::warn!("Cannot listen for SIGTERM ({e}), falling back to ctrl-c only");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
