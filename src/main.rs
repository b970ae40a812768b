use clap::{Parser, ValueEnum};
use miette::{IntoDiagnostic, Result};
use order_reconciler::application::config::{EngineConfig, LedgerWrite, WorkerConfig};
use order_reconciler::application::engine::ReconciliationEngine;
use order_reconciler::application::ingest::{Ack, Ingestor};
use order_reconciler::application::worker::RetryWorker;
use order_reconciler::domain::money::Currency;
use order_reconciler::domain::payment::DEFAULT_PAYMENT_METHOD;
use order_reconciler::domain::ports::{OrderStoreRef, RetryQueueRef};
use order_reconciler::infrastructure::in_memory::{InMemoryOrderStore, InMemoryRetryQueue};
use order_reconciler::interfaces::csv::report_writer::ReportWriter;
use order_reconciler::interfaces::seed::SeedSnapshot;
use order_reconciler::interfaces::stripe::event_reader::EventReader;
use order_reconciler::interfaces::stripe::normalizer::ProviderEnvelope;
use order_reconciler::telemetry;
use std::fs::File;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;

#[derive(Clone, Copy, ValueEnum)]
enum Report {
    Orders,
    Inventory,
    Payments,
}

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Webhook deliveries, one JSON envelope per line
    events: PathBuf,

    /// JSON snapshot of orders and stock to seed the store with
    #[arg(long, env = "RECONCILER_SEED")]
    seed: Option<PathBuf>,

    /// Path to persistent database (optional). If provided, uses RocksDB.
    #[arg(long, env = "RECONCILER_DB_PATH")]
    db_path: Option<PathBuf>,

    /// Table printed to stdout once all events are processed
    #[arg(long, value_enum, default_value_t = Report::Orders)]
    report: Report,

    /// Currency for seeded orders that do not name one
    #[arg(long, env = "RECONCILER_CURRENCY", default_value = "ZAR")]
    currency: String,

    /// Method recorded on ledger rows
    #[arg(long, env = "RECONCILER_PAYMENT_METHOD", default_value = DEFAULT_PAYMENT_METHOD)]
    payment_method: String,

    /// Write the ledger row atomically with the PAID transition, or after it
    #[arg(long, value_enum, env = "RECONCILER_LEDGER_WRITE", default_value_t = LedgerWrite::Atomic)]
    ledger_write: LedgerWrite,

    /// Attempts before a failed secondary effect is given up on
    #[arg(long, env = "RECONCILER_MAX_ATTEMPTS", default_value_t = 5)]
    max_attempts: u32,

    /// Seconds a claimed retry job stays leased to the worker
    #[arg(long, env = "RECONCILER_LEASE_SECS", default_value_t = 30)]
    lease_secs: u64,

    #[arg(long, env = "RECONCILER_LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Emit logs as JSON lines
    #[arg(long, env = "RECONCILER_LOG_JSON")]
    log_json: bool,
}

fn open_stores(db_path: Option<PathBuf>) -> Result<(OrderStoreRef, RetryQueueRef)> {
    #[cfg(feature = "storage-rocksdb")]
    if let Some(db_path) = db_path {
        let store = order_reconciler::infrastructure::rocksdb::RocksDBStore::open(db_path)
            .into_diagnostic()?;
        let orders: OrderStoreRef = Arc::new(store.clone());
        let retries: RetryQueueRef = Arc::new(store);
        return Ok((orders, retries));
    }

    #[cfg(not(feature = "storage-rocksdb"))]
    if db_path.is_some() {
        tracing::warn!(
            "WARNING: Persistent storage requested via --db-path, but 'storage-rocksdb' feature is not enabled. Falling back to In-Memory storage."
        );
    }

    let orders: OrderStoreRef = Arc::new(InMemoryOrderStore::new());
    let retries: RetryQueueRef = Arc::new(InMemoryRetryQueue::new());
    Ok((orders, retries))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    telemetry::init_logging(&cli.log_level, cli.log_json).into_diagnostic()?;

    let default_currency = Currency::new(&cli.currency).into_diagnostic()?;
    let (store, retries) = open_stores(cli.db_path)?;

    if let Some(seed_path) = cli.seed {
        let file = File::open(seed_path).into_diagnostic()?;
        SeedSnapshot::from_reader(file)
            .into_diagnostic()?
            .apply(store.as_ref(), &default_currency)
            .await
            .into_diagnostic()?;
    }

    let engine = Arc::new(ReconciliationEngine::new(
        store.clone(),
        retries.clone(),
        EngineConfig {
            payment_method: cli.payment_method,
            ledger_write: cli.ledger_write,
        },
    ));
    let ingestor = Ingestor::new(engine.clone());

    // One task per delivery, as a webhook endpoint would run them.
    let file = File::open(cli.events).into_diagnostic()?;
    let mut tasks = JoinSet::new();
    for (line, envelope) in EventReader::new(file).envelopes() {
        let normalized = envelope.and_then(ProviderEnvelope::normalize);
        let ingestor = ingestor.clone();
        tasks.spawn(async move { (line, ingestor.handle(normalized).await) });
    }

    let mut accepted = 0usize;
    let mut rejected = 0usize;
    while let Some(joined) = tasks.join_next().await {
        let (line, ack) = joined.into_diagnostic()?;
        match &ack {
            Ack::Processed { .. } | Ack::Ignored { .. } => accepted += 1,
            Ack::Rejected { reason } => {
                rejected += 1;
                eprintln!("Error processing event on line {line}: {reason} (rejected)");
            }
            Ack::Retry { reason } => {
                rejected += 1;
                eprintln!("Error processing event on line {line}: {reason} (retryable)");
            }
        }
    }
    tracing::info!(accepted, rejected, "Events processed");

    let worker = RetryWorker::new(
        engine,
        retries,
        WorkerConfig {
            lease: Duration::from_secs(cli.lease_secs),
            max_attempts: cli.max_attempts,
            ..WorkerConfig::default()
        },
    );
    let stats = worker.drain_until_idle().await.into_diagnostic()?;
    if stats.claimed > 0 {
        tracing::info!(
            completed = stats.completed,
            failed = stats.failed,
            "Retry outbox drained"
        );
    }

    let stdout = io::stdout();
    let mut writer = ReportWriter::new(stdout.lock());
    match cli.report {
        Report::Orders => writer
            .write_orders(&store.all_orders().await.into_diagnostic()?)
            .into_diagnostic()?,
        Report::Inventory => writer
            .write_inventory(&store.all_inventory().await.into_diagnostic()?)
            .into_diagnostic()?,
        Report::Payments => writer
            .write_payments(&store.all_payments().await.into_diagnostic()?)
            .into_diagnostic()?,
    }

    Ok(())
}
