//! ChainIngest CLI — runs the version scheduler and ingestion workers and
//! inspects queue state.
//!
//! # Commands
//! ```text
//! chainingest run           [--workers N] [--no-ticker]
//! chainingest tick
//! chainingest ingest        <version> [--dry-run]
//! chainingest status        [--failed N] [--json]
//! chainingest init-table
//! chainingest reset-cursor
//! chainingest view          <address::module::function> [--type-arg T]... [--arg JSON]...
//! chainingest export-parquet --from V --to V --out FILE
//! chainingest info
//! ```

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chainingest_aptos::AptosRestClient;
use chainingest_clickhouse::ClickHouseLoader;
use chainingest_core::{
    ChainClient, ColumnarStore, CursorStore, IngestConfig, JobDispatcher, JobQueue,
    MemoryColumnarStore, Ticker, VersionScheduler, WorkerPool,
};
use chainingest_parquet::{export_range, ParquetSink};
use chainingest_storage::SqliteStore;

mod logging;

#[derive(Parser)]
#[command(
    name = "chainingest",
    about = "Version-by-version chain event ingestion into ClickHouse",
    long_about = "
ChainIngest: schedules one job per ledger version, fetches each transaction
from a node REST API, and loads its events into a ClickHouse table.

ENVIRONMENT VARIABLES:
  RUST_LOG    Overrides the configured log filter
",
    version
)]
struct Cli {
    /// YAML configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Node REST API URL (overrides chain.node_url)
    #[arg(long, global = true)]
    node_url: Option<String>,

    /// ClickHouse HTTP URL (overrides store.url)
    #[arg(long, global = true)]
    store_url: Option<String>,

    /// Queue database path (overrides queue.database_url)
    #[arg(long, global = true)]
    queue_db: Option<String>,

    /// Debug-level logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the ticker and the worker pool until Ctrl-C
    Run {
        /// Number of workers (overrides worker.concurrency)
        #[arg(long)]
        workers: Option<usize>,
        /// Only process queued jobs; do not enqueue fetchLatestVersion
        #[arg(long)]
        no_ticker: bool,
    },

    /// Run one scheduler pass now
    Tick,

    /// Fetch and ingest a single version, bypassing the queue
    Ingest {
        version: u64,
        /// Print encoded rows instead of loading them
        #[arg(long)]
        dry_run: bool,
    },

    /// Show job counts per status
    Status {
        /// Number of recent failures to list
        #[arg(long, default_value_t = 10)]
        failed: u32,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Create the event table if it does not exist
    #[command(name = "init-table")]
    InitTable,

    /// Delete the submit cursor; the next tick rescans from version 0
    #[command(name = "reset-cursor")]
    ResetCursor,

    /// Call a read-only view function on the node
    View {
        /// Fully qualified function, e.g. 0x1::stake::get_current_epoch_proposal_counts
        function: String,
        /// Type argument (repeatable)
        #[arg(long = "type-arg")]
        type_args: Vec<String>,
        /// JSON argument (repeatable), e.g. '"0x1"'
        #[arg(long = "arg")]
        args: Vec<String>,
    },

    /// Export the events of a version range to a Parquet file, bypassing
    /// the queue and the store
    #[command(name = "export-parquet")]
    ExportParquet {
        /// First version (inclusive)
        #[arg(long)]
        from: u64,
        /// Last version (inclusive)
        #[arg(long)]
        to: u64,
        /// Output file
        #[arg(long)]
        out: PathBuf,
    },

    /// Show node, store and queue information
    Info,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut config = load_config(cli.config.as_deref())?;
    apply_overrides(&mut config, &cli);
    if cli.verbose {
        config.log.level = "debug".into();
    }
    logging::init_tracing(&config.log);
    config.validate()?;

    match cli.command {
        Commands::Run { workers, no_ticker } => {
            if let Some(n) = workers {
                config.worker.concurrency = n;
            }
            cmd_run(config, no_ticker).await
        }
        Commands::Tick => cmd_tick(&config).await,
        Commands::Ingest { version, dry_run } => cmd_ingest(&config, version, dry_run).await,
        Commands::Status { failed, json } => cmd_status(&config, failed, json).await,
        Commands::InitTable => cmd_init_table(&config).await,
        Commands::ResetCursor => cmd_reset_cursor(&config).await,
        Commands::View {
            function,
            type_args,
            args,
        } => cmd_view(&config, &function, type_args, &args).await,
        Commands::ExportParquet { from, to, out } => cmd_export_parquet(&config, from, to, &out).await,
        Commands::Info => cmd_info(&config).await,
    }
}

// ─── Configuration ───────────────────────────────────────────────────────────

fn load_config(path: Option<&Path>) -> Result<IngestConfig> {
    let Some(path) = path else {
        return Ok(IngestConfig::default());
    };
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("cannot read config file '{}'", path.display()))?;
    serde_yaml::from_str(&text).with_context(|| format!("invalid config file '{}'", path.display()))
}

fn apply_overrides(config: &mut IngestConfig, cli: &Cli) {
    if let Some(url) = &cli.node_url {
        config.chain.node_url = url.clone();
    }
    if let Some(url) = &cli.store_url {
        config.store.url = url.clone();
    }
    if let Some(path) = &cli.queue_db {
        config.queue.database_url = path.clone();
    }
}

// ─── Wiring ──────────────────────────────────────────────────────────────────

struct Components {
    chain: Arc<dyn ChainClient>,
    queue: Arc<SqliteStore>,
    scheduler: Arc<VersionScheduler>,
}

async fn components(config: &IngestConfig) -> Result<Components> {
    let chain: Arc<dyn ChainClient> = Arc::new(AptosRestClient::from_config(&config.chain)?);
    let queue = Arc::new(SqliteStore::open(&config.queue.database_url, config.queue.name.clone()).await?);
    let scheduler = Arc::new(VersionScheduler::new(
        chain.clone(),
        queue.clone(),
        queue.clone(),
        config.scheduler.clone(),
    ));
    Ok(Components {
        chain,
        queue,
        scheduler,
    })
}

fn dispatcher(config: &IngestConfig, c: &Components, store: Arc<dyn ColumnarStore>) -> Arc<JobDispatcher> {
    Arc::new(JobDispatcher::new(
        c.chain.clone(),
        store,
        c.scheduler.clone(),
        config.policy.clone(),
    ))
}

// ─── Command implementations ─────────────────────────────────────────────────

async fn cmd_run(config: IngestConfig, no_ticker: bool) -> Result<()> {
    let c = components(&config).await?;
    let loader: Arc<dyn ColumnarStore> = Arc::new(ClickHouseLoader::new(&config.store)?);
    let dispatcher = dispatcher(&config, &c, loader);
    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);

    let ticker = (!no_ticker).then(|| {
        let ticker = Ticker::new(
            c.queue.clone(),
            Duration::from_millis(config.scheduler.tick_interval_ms),
        );
        tokio::spawn(ticker.run(shutdown_rx.clone()))
    });

    let pool = WorkerPool::new(c.queue.clone(), dispatcher, config.worker.clone());
    let workers = tokio::spawn(async move { pool.run(shutdown_rx).await });

    tracing::info!(
        node = %config.chain.node_url,
        store = %config.store.url,
        table = %config.store.table,
        queue = %config.queue.name,
        workers = config.worker.concurrency,
        "ChainIngest running; Ctrl-C to stop"
    );

    tokio::signal::ctrl_c().await.context("failed to listen for Ctrl-C")?;
    tracing::info!("Shutting down; finishing in-flight jobs");
    shutdown_tx.send(true).ok();

    if let Some(ticker) = ticker {
        ticker.await.context("ticker task panicked")?;
    }
    workers.await.context("worker pool task panicked")??;
    Ok(())
}

async fn cmd_tick(config: &IngestConfig) -> Result<()> {
    let c = components(config).await?;
    let report = c.scheduler.tick().await?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

async fn cmd_ingest(config: &IngestConfig, version: u64, dry_run: bool) -> Result<()> {
    let c = components(config).await?;

    if dry_run {
        let memory = Arc::new(MemoryColumnarStore::new());
        let result = dispatcher(config, &c, memory.clone()).ingest_version(version).await;
        for row in memory.rows() {
            println!("{}", serde_json::to_string(&row)?);
        }
        return match result {
            Ok(_) => Ok(()),
            Err(e) => {
                println!("disposition: {e}");
                Ok(())
            }
        };
    }

    let loader: Arc<dyn ColumnarStore> = Arc::new(ClickHouseLoader::new(&config.store)?);
    let rows = dispatcher(config, &c, loader).ingest_version(version).await?;
    println!("version {version}: {rows} rows loaded");
    Ok(())
}

async fn cmd_status(config: &IngestConfig, failed: u32, as_json: bool) -> Result<()> {
    let queue = SqliteStore::open(&config.queue.database_url, config.queue.name.clone()).await?;
    let counts = queue.counts().await?;
    let cursor = queue
        .load(&config.queue.name, &config.scheduler.id)
        .await?;
    let failures = queue.failed_jobs(failed).await?;

    if as_json {
        let out = serde_json::json!({
            "queue": config.queue.name,
            "counts": counts,
            "cursor": cursor,
            "recent_failures": failures
                .iter()
                .map(|f| serde_json::json!({
                    "key": f.key,
                    "name": f.name,
                    "attempts": f.attempts,
                    "last_error": f.last_error,
                }))
                .collect::<Vec<_>>(),
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    println!("Queue:      {}", config.queue.name);
    println!("  pending   {}", counts.pending);
    println!("  running   {}", counts.running);
    println!("  completed {}", counts.completed);
    println!("  failed    {}", counts.failed);
    match cursor {
        Some(c) => println!("Cursor:     {} (last submitted version)", c.last_submitted),
        None => println!("Cursor:     none (next tick rescans from 0)"),
    }
    if !failures.is_empty() {
        println!();
        println!("Recent failures:");
        for f in failures {
            println!(
                "  {:<24} attempts={} {}",
                f.key,
                f.attempts,
                f.last_error.as_deref().unwrap_or("-")
            );
        }
    }
    Ok(())
}

async fn cmd_init_table(config: &IngestConfig) -> Result<()> {
    let loader = ClickHouseLoader::new(&config.store)?;
    loader.ensure_table().await?;
    println!("table '{}' ready", loader.table());
    Ok(())
}

async fn cmd_reset_cursor(config: &IngestConfig) -> Result<()> {
    let queue = SqliteStore::open(&config.queue.database_url, config.queue.name.clone()).await?;
    queue
        .delete(&config.queue.name, &config.scheduler.id)
        .await?;
    println!(
        "cursor '{}' on queue '{}' deleted",
        config.scheduler.id, config.queue.name
    );
    Ok(())
}

async fn cmd_export_parquet(config: &IngestConfig, from: u64, to: u64, out: &Path) -> Result<()> {
    let c = components(config).await?;
    let sink = Arc::new(ParquetSink::new());
    let dispatcher = dispatcher(config, &c, sink.clone());

    let summary = export_range(&dispatcher, &sink, from, to).await?;
    let written = sink.write_to(out)?;
    println!("{}", serde_json::to_string_pretty(&summary)?);
    if written == 0 {
        println!("no events in range; '{}' not written", out.display());
    } else {
        println!("{written} rows written to '{}'", out.display());
    }
    Ok(())
}

async fn cmd_view(
    config: &IngestConfig,
    function: &str,
    type_args: Vec<String>,
    args: &[String],
) -> Result<()> {
    let (module, name) = function
        .rsplit_once("::")
        .ok_or_else(|| anyhow!("function must be address::module::function, got '{function}'"))?;
    let arguments = args
        .iter()
        .map(|a| serde_json::from_str(a).with_context(|| format!("argument is not JSON: {a}")))
        .collect::<Result<Vec<serde_json::Value>>>()?;

    let client = AptosRestClient::from_config(&config.chain)?;
    let out = client.view(module, name, type_args, arguments).await?;
    println!("{}", serde_json::to_string_pretty(&out)?);
    Ok(())
}

async fn cmd_info(config: &IngestConfig) -> Result<()> {
    println!("ChainIngest v{}", env!("CARGO_PKG_VERSION"));
    println!();

    let client = AptosRestClient::from_config(&config.chain)?;
    match client.ledger_info().await {
        Ok(info) => {
            println!("Node:   {}", client.base_url());
            println!("  chain_id         {}", info.chain_id);
            println!("  epoch            {}", info.epoch);
            println!("  ledger_version   {}", info.ledger_version);
            println!("  oldest_version   {}", info.oldest_ledger_version);
        }
        Err(e) => println!("Node:   {} (unreachable: {e})", client.base_url()),
    }

    let loader = ClickHouseLoader::new(&config.store)?;
    match loader.ping().await {
        Ok(()) => println!("Store:  {} table={} (ok)", config.store.url, loader.table()),
        Err(e) => println!("Store:  {} (unreachable: {e})", config.store.url),
    }

    let queue = SqliteStore::open(&config.queue.database_url, config.queue.name.clone()).await?;
    let counts = queue.counts().await?;
    println!(
        "Queue:  {} @ {} ({} jobs, {} pending)",
        config.queue.name,
        config.queue.database_url,
        counts.total(),
        counts.pending
    );
    Ok(())
}
