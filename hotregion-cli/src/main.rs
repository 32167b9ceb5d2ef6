use anyhow::{Context, Result};
use clap::Parser;
use hotregion::telemetry::{channel, ScorerWorker};
use hotregion::{create_scheduler, ClusterFixture, MemoryCluster, OperatorCounter, SchedulerConfig};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "hotregion")]
#[command(about = "Run the hot-region balance scheduler against a cluster fixture")]
#[command(version)]
struct Args {
    /// Scheduler configuration file (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Cluster fixture file (JSON)
    #[arg(short, long)]
    fixture: PathBuf,

    /// Scheduler type: hot-region, hot-read-region or hot-write-region
    #[arg(short = 't', long = "type", default_value = "hot-region")]
    scheduler_type: String,

    /// Number of scheduling cycles to run
    #[arg(short = 'n', long, default_value_t = 10)]
    cycles: usize,

    /// Seed for the scheduler's random choices
    #[arg(long, env = "HOTREGION_SEED")]
    seed: Option<u64>,

    /// Serve Prometheus metrics on this address
    #[arg(long)]
    metrics_addr: Option<SocketAddr>,

    /// Pause between cycles in milliseconds
    #[arg(long, default_value_t = 0)]
    interval_ms: u64,

    /// Keep operators in flight instead of applying them to the fixture
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,hotregion=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => SchedulerConfig::load(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => SchedulerConfig::default(),
    };
    if args.seed.is_some() {
        config.seed = args.seed;
    }

    if let Some(addr) = args.metrics_addr {
        metrics_exporter_prometheus::PrometheusBuilder::new()
            .with_http_listener(addr)
            .install()
            .context("Failed to install Prometheus exporter")?;
        tracing::info!("Serving metrics on http://{}/metrics", addr);
    }

    let fixture = ClusterFixture::load(&args.fixture)
        .with_context(|| format!("Failed to load fixture {}", args.fixture.display()))?;
    let cluster = Arc::new(MemoryCluster::from_fixture(fixture));
    tracing::info!(
        "Loaded fixture {} with {} regions",
        args.fixture.display(),
        cluster.region_count()
    );

    let operators: Arc<dyn OperatorCounter> = cluster.clone();
    let mut scheduler = create_scheduler(&args.scheduler_type, config.clone(), operators)?;

    let mut scorer = None;
    if config.telemetry.enabled {
        let (sink, rx) = channel(config.telemetry.queue_capacity);
        let worker = ScorerWorker::new(&config.telemetry)?;
        scorer = Some(worker.spawn(rx));
        scheduler = scheduler.with_sink(Arc::new(sink));
    }

    tracing::info!(
        "Running {} ({}) for {} cycles",
        scheduler.name(),
        args.scheduler_type,
        args.cycles
    );

    for cycle in 0..args.cycles {
        if let Some(op) = scheduler.schedule(cluster.as_ref()) {
            println!("{}", serde_json::to_string(&op)?);
            cluster.add_operator(&op);
            if !args.dry_run {
                if let Err(e) = cluster.apply_operator(&op) {
                    tracing::warn!("Failed to apply {}: {}", op, e);
                }
                cluster.finish_operator(&op);
            }
        } else {
            tracing::debug!("Cycle {} produced no operator", cycle);
        }

        if args.interval_ms > 0 {
            tokio::time::sleep(Duration::from_millis(args.interval_ms)).await;
        }
    }

    let summary = serde_json::json!({
        "balance_limit": scheduler.balance_limit(),
        "events": scheduler.event_counts(),
        "hot_read": scheduler.hot_read_status(),
        "hot_write": scheduler.hot_write_status(),
    });
    println!("{}", serde_json::to_string_pretty(&summary)?);

    // Closing the sink lets the scorer drain and exit
    drop(scheduler);
    if let Some(handle) = scorer {
        handle.await?;
    }

    Ok(())
}
