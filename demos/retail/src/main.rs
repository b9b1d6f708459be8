//! Retail fact-table demo for `HybridJoin`.
//!
//! Streams point-of-sale transactions, joins each one with its customer's
//! master record through a bounded window, enriches the pair with product
//! and date attributes, and writes sales fact rows as JSON lines.
//!
//! # Running
//!
//! ```bash
//! cargo run -p hybridjoin-retail-demo
//! RUST_LOG=debug HYBRIDJOIN_WINDOW=64 HYBRIDJOIN_PROBE_BATCH=8 \
//!     cargo run -p hybridjoin-retail-demo
//! ```
//!
//! # Environment
//!
//! | Variable                          | Default              |
//! |-----------------------------------|----------------------|
//! | `HYBRIDJOIN_DATA_DIR`             | `demos/retail/data`  |
//! | `HYBRIDJOIN_OUTPUT`               | `fact_sales.jsonl`   |
//! | `HYBRIDJOIN_WINDOW`               | `10000`              |
//! | `HYBRIDJOIN_HASH_SLOTS`           | `10000`              |
//! | `HYBRIDJOIN_PROBE_BATCH`          | `1`                  |
//! | `HYBRIDJOIN_MAX_RESIDENCY`        | `64` (`off`/`0` off) |
//! | `HYBRIDJOIN_PARTITION_LATENCY_US` | `0`                  |

mod enrich;
mod sink;
mod types;

use std::path::PathBuf;
use std::str::FromStr;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant};

use hybridjoin_connectors::{CsvStreamSource, MasterDataProbe, MasterDataProbeConfig};
use hybridjoin_core::{JoinConfig, JoinKey};
use hybridjoin_pipeline::JoinPipeline;

use crate::enrich::ProductCatalogue;
use crate::sink::{FactSaleSink, FactStats};
use crate::types::{Customer, Transaction};

const TRANSACTIONS_CSV: &str = "transactional_data.csv";
const CUSTOMERS_CSV: &str = "customer_master_data.csv";
const PRODUCTS_CSV: &str = "product_master_data.csv";

/// Settings read from `HYBRIDJOIN_*` variables.
struct DemoSettings {
    data_dir: PathBuf,
    output: PathBuf,
    join: JoinConfig,
    partition_latency: Duration,
}

impl DemoSettings {
    fn from_env() -> Result<Self, Box<dyn std::error::Error>> {
        let defaults = JoinConfig::default();
        let max_residency_rounds = match std::env::var("HYBRIDJOIN_MAX_RESIDENCY") {
            Ok(v) if v.eq_ignore_ascii_case("off") || v.trim() == "0" => None,
            Ok(v) => Some(v.trim().parse()?),
            Err(_) => defaults.max_residency_rounds,
        };

        Ok(Self {
            data_dir: env_or("HYBRIDJOIN_DATA_DIR", PathBuf::from("demos/retail/data"))?,
            output: env_or("HYBRIDJOIN_OUTPUT", PathBuf::from("fact_sales.jsonl"))?,
            join: JoinConfig {
                window_capacity: env_or("HYBRIDJOIN_WINDOW", defaults.window_capacity)?,
                hash_slots: env_or("HYBRIDJOIN_HASH_SLOTS", defaults.hash_slots)?,
                probe_batch_size: env_or("HYBRIDJOIN_PROBE_BATCH", defaults.probe_batch_size)?,
                max_residency_rounds,
                ..defaults
            },
            partition_latency: Duration::from_micros(env_or(
                "HYBRIDJOIN_PARTITION_LATENCY_US",
                0u64,
            )?),
        })
    }
}

fn env_or<T>(name: &str, default: T) -> Result<T, Box<dyn std::error::Error>>
where
    T: FromStr,
    T::Err: std::error::Error + 'static,
{
    match std::env::var(name) {
        Ok(v) => Ok(v.trim().parse()?),
        Err(_) => Ok(default),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    println!("{}", "=".repeat(60));
    println!("HYBRIDJOIN - Retail Data Warehouse");
    println!("{}", "=".repeat(60));

    let settings = DemoSettings::from_env()?;

    // ── Step 1: Load master data ─────────────────────────────────
    let catalogue = Arc::new(ProductCatalogue::load_csv(
        settings.data_dir.join(PRODUCTS_CSV),
    )?);
    let probe = MasterDataProbe::load_csv(
        settings.data_dir.join(CUSTOMERS_CSV),
        MasterDataProbeConfig {
            partition_latency: settings.partition_latency,
            ..MasterDataProbeConfig::default()
        },
        |c: &Customer| JoinKey::from(c.customer_id.as_str()),
    )?;
    println!(
        "Loaded {} customers and {} products",
        probe.key_count(),
        catalogue.len()
    );

    // ── Step 2: Open stream and output ───────────────────────────
    let source = CsvStreamSource::open(
        settings.data_dir.join(TRANSACTIONS_CSV),
        |t: &Transaction| JoinKey::from(t.customer_id.as_str()),
    )?;
    let stats = Arc::new(FactStats::default());
    let output = tokio::fs::File::create(&settings.output).await?;
    let sink = FactSaleSink::new(Arc::clone(&catalogue), output, Arc::clone(&stats));

    // ── Step 3: Start the join ───────────────────────────────────
    let started = Instant::now();
    let pipeline = JoinPipeline::builder()
        .join_config(settings.join)
        .start(source, probe, sink)?;

    let token = pipeline.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Ctrl-C received");
            token.cancel();
        }
    });

    // ── Step 4: Wait for the window to drain ─────────────────────
    let report = pipeline.await_drained().await?;
    let elapsed = started.elapsed();

    println!();
    println!("HYBRIDJOIN {}!", if report.drained { "complete" } else { "stopped" });
    println!("Total tuples processed: {}", report.admitted);
    println!("Total tuples joined:    {}", report.matched);
    println!("Fact rows written:      {}", stats.written.load(Ordering::Relaxed));
    println!("Rows dropped:           {}", stats.dropped.load(Ordering::Relaxed));
    println!("Expired unmatched:      {}", report.expired);
    if report.abandoned > 0 {
        println!("Abandoned on stop:      {}", report.abandoned);
    }
    println!("Rounds:                 {}", report.rounds);
    println!("Elapsed:                {elapsed:.2?}");
    println!("Output:                 {}", settings.output.display());

    Ok(())
}
