use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use clap::{Args, Parser, Subcommand};
use serde::Deserialize;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use tsbridge_adapters_http::{HttpConfig, HttpMetadataProvider, HttpTransport};
use tsbridge_core::{
    BatchResult, ChunkDescriptor, Destination, MetadataProvider, Point, RangeChunkPlanner,
    SeriesMetadata, Tags,
};
use tsbridge_sender::{BatchSender, MetricsSnapshot, SenderConfig};

#[derive(Parser)]
#[command(name = "tsbridge")]
#[command(version)]
#[command(about = "tsbridge - chunked reads and batched writes for remote time-series stores", long_about = None)]
struct Cli {
    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Split the date span of a series into read chunks
    Plan {
        /// Number of points of the series
        #[arg(long, requires_all = ["start", "end"], conflicts_with = "series")]
        points: Option<i64>,

        /// First timestamp of the series (ms)
        #[arg(long, allow_hyphen_values = true)]
        start: Option<i64>,

        /// Last timestamp of the series (ms)
        #[arg(long, allow_hyphen_values = true)]
        end: Option<i64>,

        /// Series identifier, resolved through the metadata API
        #[arg(long, required_unless_present = "points")]
        series: Option<String>,

        /// Target number of points per chunk
        #[arg(short, long, allow_hyphen_values = true)]
        chunk_size: i64,

        /// Print the chunks as JSON
        #[arg(long)]
        json: bool,

        #[command(flatten)]
        http: HttpArgs,
    },

    /// Write points from a JSON file to the store
    Ingest {
        /// Metric name
        #[arg(short, long)]
        metric: String,

        /// Tag in key=value form, repeatable
        #[arg(short, long = "tag", value_parser = parse_tag)]
        tags: Vec<(String, String)>,

        /// JSON file holding `[[timestamp, value], ...]` or `[{"timestamp", "value"}, ...]`
        #[arg(short, long)]
        input: PathBuf,

        /// Write the result as JSON to this file
        #[arg(short, long)]
        output: Option<PathBuf>,

        #[command(flatten)]
        sender: SenderArgs,

        #[command(flatten)]
        http: HttpArgs,
    },

    /// Show the planning metadata of a series
    Metadata {
        /// Series identifier
        #[arg(long)]
        series: String,

        #[command(flatten)]
        http: HttpArgs,
    },
}

/// Sender flags, each overriding its TSBRIDGE_* environment value
#[derive(Args)]
struct SenderArgs {
    /// Store host
    #[arg(long)]
    host: Option<String>,

    /// Store port
    #[arg(long)]
    port: Option<u16>,

    /// Number of workers (1 sends batch by batch)
    #[arg(short, long)]
    workers: Option<usize>,

    /// Maximum number of batches waiting for a worker
    #[arg(long)]
    queue_capacity: Option<usize>,

    /// Maximum number of points per write request
    #[arg(short, long)]
    batch_size: Option<usize>,

    /// Timeout of one write request, in milliseconds
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// Give up waiting for the workers after this many milliseconds
    #[arg(long)]
    join_timeout_ms: Option<u64>,
}

impl SenderArgs {
    fn apply(self, config: &mut SenderConfig) {
        if let Some(host) = self.host {
            config.host = host;
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(workers) = self.workers {
            config.worker_count = workers;
        }
        if let Some(capacity) = self.queue_capacity {
            config.queue_capacity = capacity;
        }
        if let Some(size) = self.batch_size {
            config.max_points_per_batch = size;
        }
        if let Some(ms) = self.timeout_ms {
            config.timeout = Duration::from_millis(ms);
        }
        if let Some(ms) = self.join_timeout_ms {
            config.join_timeout = Some(Duration::from_millis(ms));
        }
    }
}

/// HTTP flags, each overriding its TSBRIDGE_* environment value
#[derive(Args)]
struct HttpArgs {
    /// Base URL of the metadata API
    #[arg(long)]
    metadata_url: Option<String>,

    /// Upper bound on any HTTP request, in seconds
    #[arg(long)]
    http_timeout_secs: Option<u64>,
}

impl HttpArgs {
    fn config(self) -> HttpConfig {
        let mut config = HttpConfig::from_env();
        config.merge(&HttpConfig {
            metadata_url: self.metadata_url,
            request_timeout_secs: self.http_timeout_secs,
            connect_timeout_secs: None,
        });
        config
    }
}

/// One point of an input file
#[derive(Deserialize)]
#[serde(untagged)]
enum InputPoint {
    Pair(i64, f64),
    Object(Point),
}

impl From<InputPoint> for Point {
    fn from(input: InputPoint) -> Self {
        match input {
            InputPoint::Pair(timestamp, value) => Point::new(timestamp, value),
            InputPoint::Object(point) => point,
        }
    }
}

fn parse_tag(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() && !value.trim().is_empty() => {
            Ok((key.trim().to_string(), value.trim().to_string()))
        }
        _ => Err(format!("expected key=value, got '{}'", raw)),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "tsbridge={0},tsbridge_core={0},tsbridge_sender={0},tsbridge_adapters_http={0}",
            default_level
        ))
    });

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(filter)
        .init();

    match cli.command {
        Commands::Plan {
            points,
            start,
            end,
            series,
            chunk_size,
            json,
            http,
        } => {
            let metadata = match (points, start, end, series) {
                (Some(points), Some(start), Some(end), _) => SeriesMetadata::new(points, start, end)
                    .context("Invalid series description")?,
                (_, _, _, Some(series)) => fetch_metadata(&series, http.config()).await?,
                _ => bail!("either --points/--start/--end or --series is required"),
            };

            let planner = RangeChunkPlanner::new(chunk_size).context("Invalid chunk size")?;
            let chunks = planner.all_chunks(&metadata);

            if json {
                println!("{}", serde_json::to_string_pretty(&chunks)?);
            } else {
                print_plan(&metadata, &planner, &chunks);
            }
        }

        Commands::Ingest {
            metric,
            tags,
            input,
            output,
            sender,
            http,
        } => {
            let mut config = SenderConfig::from_env();
            sender.apply(&mut config);

            let points = read_points(&input)?;
            let destination = Destination::new(metric, tags.into_iter().collect::<Tags>());
            let (result, metrics) = ingest(config, http.config(), &destination, points).await?;

            print_result(&result);
            if cli.verbose {
                print_metrics(&metrics);
            }
            if let Some(path) = output {
                let json = serde_json::to_string_pretty(&result)?;
                std::fs::write(&path, json)
                    .with_context(|| format!("Failed to write {}", path.display()))?;
                println!("Result saved to: {}", path.display());
            }
            if !result.is_success() {
                bail!("{} of {} points were not written", result.failed, result.total_points());
            }
        }

        Commands::Metadata { series, http } => {
            let metadata = fetch_metadata(&series, http.config()).await?;

            println!("=== Series {} ===", series);
            println!("Points: {}", metadata.point_count());
            println!("Start: {} ms", metadata.start_timestamp());
            println!("End: {} ms", metadata.end_timestamp());
            println!("Span: {} ms", metadata.span());
            println!();
            println!("=== JSON Output ===");
            println!("{}", serde_json::to_string_pretty(&metadata)?);
        }
    }

    Ok(())
}

async fn fetch_metadata(series: &str, config: HttpConfig) -> anyhow::Result<SeriesMetadata> {
    let provider = HttpMetadataProvider::new(config)
        .context("A metadata URL is required (--metadata-url or TSBRIDGE_METADATA_URL)")?;
    let metadata = provider
        .metadata(series)
        .await
        .with_context(|| format!("Failed to fetch metadata of series '{}'", series))?;
    Ok(metadata)
}

fn read_points(path: &PathBuf) -> anyhow::Result<Vec<Point>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let points: Vec<InputPoint> = serde_json::from_str(&raw)
        .with_context(|| format!("Invalid points file {}", path.display()))?;
    Ok(points.into_iter().map(Point::from).collect())
}

async fn ingest(
    config: SenderConfig,
    http: HttpConfig,
    destination: &Destination,
    points: Vec<Point>,
) -> anyhow::Result<(BatchResult, MetricsSnapshot)> {
    info!(
        metric = %destination.metric,
        points = points.len(),
        host = %config.host,
        port = config.port,
        workers = config.worker_count,
        "Starting ingestion"
    );

    let transport = HttpTransport::new(http).context("Failed to create HTTP client")?;
    let sender = Arc::new(BatchSender::new(config, transport).context("Invalid sender configuration")?);

    // Ctrl-C stops new batches; in-flight ones still finish
    let killer = sender.clone();
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() && killer.kill() {
            warn!("Interrupted, abandoning queued batches");
        }
    });

    let result = sender.write(destination, points).await;
    let joined = sender.wait().await;
    interrupt.abort();

    let result = result.context("Ingestion failed")?;
    if let Err(e) = joined {
        warn!(error = %e, "Workers did not shut down cleanly");
    }
    Ok((result, sender.metrics().snapshot()))
}

fn print_plan(metadata: &SeriesMetadata, planner: &RangeChunkPlanner, chunks: &[ChunkDescriptor]) {
    println!("=== Series ===");
    println!("Points: {}", metadata.point_count());
    println!("Range: {} -> {} ms", metadata.start_timestamp(), metadata.end_timestamp());
    println!();
    println!("=== Plan ===");
    println!("Chunk size: {} points", planner.chunk_size());
    println!("Chunk span: {} ms", planner.delta(metadata));
    println!("Chunks: {}", chunks.len());
    println!();
    for chunk in chunks {
        println!(
            "  #{:<4} {} -> {} ({} ms)",
            chunk.index,
            chunk.start_timestamp,
            chunk.end_timestamp,
            chunk.span()
        );
    }
}

fn print_result(result: &BatchResult) {
    println!("=== Ingestion Summary ===");
    println!("Success: {}", result.success);
    println!("Failed: {}", result.failed);
    println!("Timeouts: {}", result.timeouts);
    println!("Duration: {:.3}s", result.duration.as_secs_f64());
    match result.throughput() {
        Some(rate) => println!("Throughput: {:.1} points/s", rate),
        None => println!("Throughput: n/a"),
    }

    if !result.errors.is_empty() {
        println!();
        println!("Errors ({}):", result.errors.len());
        for error in result.errors.iter().take(10) {
            println!("  - {}", error);
        }
        if result.errors.len() > 10 {
            println!("  ... and {} more", result.errors.len() - 10);
        }
    }
}

fn print_metrics(metrics: &MetricsSnapshot) {
    println!();
    println!("=== Sender Metrics ===");
    println!("Batches: {}", metrics.batches_created);
    println!("  Succeeded: {}", metrics.batches_succeeded);
    println!("  Failed: {}", metrics.batches_failed);
    println!("  Abandoned: {}", metrics.batches_abandoned);
    println!("Attempts: {} ({} retries)", metrics.attempts, metrics.retries);
    println!("Max queue depth: {}", metrics.max_queue_depth);
    println!("Avg send time: {:.1} ms", metrics.avg_send_ms);
}
