//! ObjectIO Usage - usage accounting tool
//!
//! Runs the usage accounting operations against a local cluster directory
//! (`<data-dir>/cluster`, `<data-dir>/pool-<i>/shard-<j>`).

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use objectio_common::{BucketName, Config};
use objectio_usage::path::encode_dir_object;
use objectio_usage::{
    ClusterUsageReport, CrossShardAggregator, IngestionPipeline, LocalObjectLayer, ReportStore,
    StaticReplicationConfigs, UsageEntry, UsageTree, UsageTreeBuilder, usage_metrics,
};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "objectio-usage")]
#[command(about = "ObjectIO usage accounting tool")]
#[command(version)]
struct Args {
    /// Configuration file path
    #[arg(short, long, default_value = "/etc/objectio/usage.toml")]
    config: String,

    /// Local cluster directory
    #[arg(short, long, default_value = "./objectio-data")]
    data_dir: PathBuf,

    /// Bucket replication configuration (JSON object of bucket -> {"roleArn": ...})
    #[arg(long)]
    replication_config: Option<PathBuf>,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Print usage counters (Prometheus text) after the command
    #[arg(long)]
    metrics: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create a local cluster directory
    Init {
        /// Shards per pool, comma separated
        #[arg(long, value_delimiter = ',', default_value = "4")]
        pools: Vec<usize>,
    },
    /// Write a shard's usage snapshot for a bucket from a JSON map of prefix -> size
    Seed {
        /// Bucket name
        bucket: String,
        /// JSON file with per-prefix sizes
        sizes: PathBuf,
        /// Pool index
        #[arg(long, default_value_t = 0)]
        pool: usize,
        /// Shard index within the pool
        #[arg(long, default_value_t = 0)]
        shard: usize,
    },
    /// Show per-prefix usage of a bucket summed over every shard
    Prefix {
        /// Bucket name
        bucket: String,
        /// Include per-shard bookkeeping
        #[arg(long)]
        detailed: bool,
    },
    /// Show the stored cluster usage report
    Report,
    /// Store usage reports, in order, through the ingestion pipeline
    Ingest {
        /// JSON report files
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let args = Args::parse();

    // Load config file if it exists
    let config = if Path::new(&args.config).exists() {
        Config::load(&args.config).with_context(|| format!("loading {}", args.config))?
    } else {
        Config::default()
    };

    // CLI takes precedence over the config file
    let log_level = if args.log_level != "info" {
        args.log_level.clone()
    } else {
        config.logging.level.clone()
    };

    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| log_level.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling");
            on_signal.cancel();
        }
    });

    run(&args, &config, &cancel).await?;

    if args.metrics {
        print!("{}", usage_metrics().export_prometheus());
    }
    Ok(())
}

async fn run(args: &Args, config: &Config, cancel: &CancellationToken) -> Result<()> {
    let usage = &config.usage;

    match &args.command {
        Commands::Init { pools } => {
            let layer = LocalObjectLayer::create(&args.data_dir, pools)
                .with_context(|| format!("creating cluster at {}", args.data_dir.display()))?;
            layer.make_bucket(&usage.meta_bucket).await?;
            info!(
                "Created cluster at {} with pools {:?}",
                args.data_dir.display(),
                pools
            );
        }
        Commands::Seed {
            bucket,
            sizes,
            pool,
            shard,
        } => {
            let bucket = BucketName::new(bucket.as_str())?;
            let text = std::fs::read_to_string(sizes)
                .with_context(|| format!("reading {}", sizes.display()))?;
            let sizes: BTreeMap<String, u64> = serde_json::from_str(&text)
                .with_context(|| format!("parsing {}", sizes.display()))?;
            let layer = open_layer(&args.data_dir)?;
            let store = layer
                .shard(*pool, *shard)
                .with_context(|| format!("no shard pool-{pool}/shard-{shard}"))?;

            let tree = seed_tree(bucket.as_str(), &sizes, now_millis());
            tree.save(
                store.as_ref(),
                usage,
                &usage.snapshot_path(bucket.as_str()),
                cancel,
            )
            .await?;
            info!(
                "Wrote {} usage entries for {} to pool-{}/shard-{}",
                tree.len(),
                bucket,
                pool,
                shard
            );
        }
        Commands::Prefix { bucket, detailed } => {
            let aggregator = CrossShardAggregator::new(open_layer(&args.data_dir)?, usage.clone());
            if *detailed {
                let result = aggregator.load_prefix_usage_detailed(bucket, cancel).await?;
                let skipped: Vec<_> = result
                    .skipped
                    .iter()
                    .map(|s| serde_json::json!({"shard": s.location.to_string(), "reason": s.reason}))
                    .collect();
                let prefixes: BTreeMap<&String, &u64> = result.prefixes.iter().collect();
                let out = serde_json::json!({
                    "prefixes": prefixes,
                    "shardsTotal": result.shards_total,
                    "shardsLoaded": result.shards_loaded,
                    "shardsMissing": result.shards_missing,
                    "skipped": skipped,
                });
                println!("{}", serde_json::to_string_pretty(&out)?);
            } else {
                let prefixes = aggregator.load_prefix_usage(bucket, cancel).await?;
                let sorted: BTreeMap<_, _> = prefixes.into_iter().collect();
                println!("{}", serde_json::to_string_pretty(&sorted)?);
            }
        }
        Commands::Report => {
            let store = report_store(args, open_layer(&args.data_dir)?, config)?;
            let report = store.load(cancel).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Commands::Ingest { files } => {
            let store = Arc::new(report_store(args, open_layer(&args.data_dir)?, config)?);
            let pipeline = IngestionPipeline::new(store, cancel.clone());
            let (sender, handle) = pipeline.spawn(usage.ingest_queue_depth);

            for file in files {
                let text = std::fs::read_to_string(file)
                    .with_context(|| format!("reading {}", file.display()))?;
                let report: ClusterUsageReport = serde_json::from_str(&text)
                    .with_context(|| format!("parsing {}", file.display()))?;
                sender.send(report).await?;
            }
            drop(sender);

            let stats = handle.await?;
            println!(
                "received {} stored {} failed {}",
                stats.received, stats.stored, stats.failed
            );
        }
    }
    Ok(())
}

fn open_layer(data_dir: &Path) -> Result<Arc<LocalObjectLayer>> {
    let layer = LocalObjectLayer::open(data_dir)
        .with_context(|| format!("opening cluster at {}", data_dir.display()))?;
    Ok(Arc::new(layer))
}

fn report_store(args: &Args, layer: Arc<LocalObjectLayer>, config: &Config) -> Result<ReportStore> {
    let replication = match &args.replication_config {
        Some(path) => StaticReplicationConfigs::load(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => StaticReplicationConfigs::new(),
    };
    Ok(ReportStore::new(
        layer,
        Arc::new(replication),
        config.usage.clone(),
    ))
}

/// Build a bucket's usage tree from leaf prefix sizes
///
/// Every ancestor of a prefix, up to the bucket root, carries the sum of
/// its descendants. A prefix ending in `/` is stored as a directory object.
fn seed_tree(bucket: &str, sizes: &BTreeMap<String, u64>, last_update: u64) -> UsageTree {
    let mut totals: BTreeMap<String, u64> = BTreeMap::new();
    for (prefix, &size) in sizes {
        let mut id = bucket.to_string();
        *totals.entry(id.clone()).or_default() += size;
        for segment in encode_dir_object(prefix).split('/').filter(|s| !s.is_empty()) {
            id = format!("{id}/{segment}");
            *totals.entry(id.clone()).or_default() += size;
        }
    }

    let mut builder = UsageTreeBuilder::new(bucket).with_last_update(last_update);
    for (id, &size) in &totals {
        let parent = if id == bucket {
            None
        } else {
            id.rsplit_once('/').map(|(parent, _)| parent)
        };
        builder.insert(id.as_str(), UsageEntry::with_size(size), parent);
    }
    builder.build()
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or(0)
}
