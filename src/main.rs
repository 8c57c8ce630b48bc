//! CLI entry point for the trip event pipeline.
//!
//! Provides jobs for simulating event ingestion into the stream, running
//! the full local pipeline (ingest, merge, aggregate), and inspecting the
//! source data files.

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::ffi::OsStr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

use trip_pipeline::batch::BatchPolicy;
use trip_pipeline::kpi;
use trip_pipeline::merge::Consumer;
use trip_pipeline::publish::{DedupContext, Publisher};
use trip_pipeline::runlog::SessionLog;
use trip_pipeline::schema::EventSchema;
use trip_pipeline::source::{describe_csv, load_events};
use trip_pipeline::store::{
    BlobStore, DirBlobStore, LogNotifier, MemoryStream, MemoryTripStore, S3BlobStore,
};

#[derive(Parser)]
#[command(name = "trip_pipeline")]
#[command(about = "Simulated trip event ingestion, merging, and KPI aggregation", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Publish source events to the stream and flush the session log
    Ingest {
        #[command(flatten)]
        ingest: IngestArgs,
    },
    /// Run the full local pipeline: ingest, merge, and aggregate KPIs
    Simulate {
        #[command(flatten)]
        ingest: IngestArgs,

        /// Records delivered to the merger per chunk
        #[arg(long, default_value_t = 100)]
        chunk_size: usize,
    },
    /// Print schema summaries of the source CSV files
    InspectData {
        /// Directory containing trip_start.csv and trip_end.csv
        #[arg(short, long, default_value = "data")]
        data_dir: String,
    },
}

#[derive(clap::Args)]
struct IngestArgs {
    /// Directory containing trip_start.csv and trip_end.csv
    #[arg(short, long, default_value = "data")]
    data_dir: String,

    /// Path to a schema document (built-in trip event schema by default)
    #[arg(long)]
    schema: Option<String>,

    /// Events per batch when using the fixed policy
    #[arg(short, long, default_value_t = 100)]
    batch_size: usize,

    /// Lower bound for the randomized batch-size policy
    #[arg(long, requires = "batch_max")]
    batch_min: Option<usize>,

    /// Upper bound for the randomized batch-size policy
    #[arg(long, requires = "batch_min")]
    batch_max: Option<usize>,

    /// Pacing delay between batches, in milliseconds
    #[arg(long, default_value_t = 1500)]
    delay_ms: u64,

    /// Optional: S3 bucket for KPI and session-log objects (local
    /// --output-dir is used when omitted)
    #[arg(long)]
    s3_bucket: Option<String>,

    /// Local blob output directory used when no S3 bucket is given
    #[arg(short, long, default_value = "out")]
    output_dir: String,

    /// Directory for the session log staging file
    #[arg(long, default_value = "logs")]
    log_dir: String,
}

impl IngestArgs {
    fn policy(&self) -> BatchPolicy {
        match (self.batch_min, self.batch_max) {
            (Some(min), Some(max)) => BatchPolicy::Range { min, max },
            _ => BatchPolicy::Fixed(self.batch_size),
        }
    }

    fn schema(&self) -> Result<EventSchema> {
        match &self.schema {
            Some(path) => EventSchema::load(path),
            None => EventSchema::builtin(),
        }
    }

    async fn blob_store(&self) -> Arc<dyn BlobStore> {
        match &self.s3_bucket {
            Some(bucket) => {
                info!(bucket = %bucket, "using S3 blob store");
                Arc::new(S3BlobStore::from_env(bucket).await)
            }
            None => {
                info!(output_dir = %self.output_dir, "using local blob store");
                Arc::new(DirBlobStore::new(&self.output_dir))
            }
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok(); // Load .env file

    // Logging setup: colored stderr + JSON rolling log file
    let log_file_path =
        std::env::var("LOG_FILE_PATH").unwrap_or_else(|_| "logs/trip_pipeline.log".to_string());
    let log_dir = Path::new(&log_file_path)
        .parent()
        .unwrap_or(Path::new("logs"));
    let log_file_name = Path::new(&log_file_path)
        .file_name()
        .unwrap_or(OsStr::new("trip_pipeline.log"));

    let file_appender = tracing_appender::rolling::daily(log_dir, log_file_name);
    let (non_blocking_file, _file_guard) = tracing_appender::non_blocking(file_appender);

    let stderr_layer = fmt::layer()
        .with_target(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_ansi(true)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::from_env("RUST_LOG").add_directive("info".parse()?));

    let json_layer = fmt::layer()
        .json()
        .with_current_span(true)
        .with_span_list(true)
        .with_writer(non_blocking_file)
        .with_filter(EnvFilter::from_env("RUST_LOG_JSON").add_directive("debug".parse()?));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Ingest { ingest } => {
            let stream = Arc::new(MemoryStream::new());
            run_ingest(&ingest, stream).await?;
        }
        Commands::Simulate { ingest, chunk_size } => {
            simulate(&ingest, chunk_size).await?;
        }
        Commands::InspectData { data_dir } => {
            inspect_data(&data_dir)?;
        }
    }

    Ok(())
}

/// Publishes all source events through the batcher and publisher, then
/// flushes the session log to the blob store.
#[tracing::instrument(skip_all, fields(data_dir = %args.data_dir))]
async fn run_ingest(args: &IngestArgs, stream: Arc<MemoryStream>) -> Result<()> {
    let schema = args.schema()?;
    let events = load_events(&args.data_dir)?;
    let blob = args.blob_store().await;

    let publisher = Publisher::new(stream, schema);
    let mut dedup = DedupContext::new();
    let mut log = SessionLog::create(&args.log_dir)?;

    let outcome = publisher
        .run(
            &events,
            args.policy(),
            Duration::from_millis(args.delay_ms),
            &mut dedup,
            &mut log,
        )
        .await;

    log.flush_to_blob(blob.as_ref()).await?;

    info!(
        batches = outcome.batches,
        sent = outcome.sent,
        failed = outcome.failed,
        duplicates = outcome.skipped_duplicate,
        invalid = outcome.skipped_invalid,
        "ingest job finished"
    );
    Ok(())
}

/// Full local pipeline: publish to the in-memory stream, drain it in
/// chunks through the merger, then aggregate daily KPIs to the blob store.
#[tracing::instrument(skip_all, fields(data_dir = %args.data_dir, chunk_size))]
async fn simulate(args: &IngestArgs, chunk_size: usize) -> Result<()> {
    let stream = Arc::new(MemoryStream::new());
    run_ingest(args, stream.clone()).await?;

    let store = Arc::new(MemoryTripStore::new());
    let consumer = Consumer::new(store.clone(), Arc::new(LogNotifier));

    let chunk_size = chunk_size.max(1);
    let mut upserted = 0;
    let mut failed = 0;
    loop {
        let chunk = stream.take_chunk(chunk_size);
        if chunk.is_empty() {
            break;
        }
        let outcome = consumer.handle_chunk(&chunk).await;
        upserted += outcome.upserted;
        failed += outcome.failed;
    }
    info!(upserted, failed, trips = store.len(), "merge stage finished");

    let blob = args.blob_store().await;
    let kpis = kpi::aggregate(store.as_ref(), blob.as_ref()).await?;
    info!(days = kpis.len(), "simulation finished");

    Ok(())
}

fn inspect_data(data_dir: &str) -> Result<()> {
    for name in ["trip_start.csv", "trip_end.csv"] {
        let path = Path::new(data_dir).join(name);
        let description = describe_csv(&path)?;

        info!(file = %name, rows = description.rows, "source file");
        for (column, inferred_type) in &description.columns {
            info!(file = %name, column = %column, inferred_type, "column");
        }
    }
    Ok(())
}
