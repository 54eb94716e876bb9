//! blindset CLI
//!
//! Provisions an in-process deployment, queries the requested probes under one
//! client session and optionally writes the hand-off artifacts as JSON.
//!
//! Usage:
//!   blindset --dataset-size 49 --buckets 13 --probe 3 --probe 17 --out ./artifacts
//!   blindset --config deployment.json --seed 7

use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use anyhow::Context;
use blindset::{Deployment, QueryReport};
use blindset_core::{BucketDigests, ProtocolConfig};
use clap::Parser;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "blindset")]
#[command(about = "Blinded bucket membership queries over an elliptic curve")]
struct Args {
    /// JSON deployment config; flags below override its values
    #[arg(long)]
    config: Option<PathBuf>,

    /// Universe size N
    #[arg(long)]
    dataset_size: Option<usize>,

    /// Bucket count B
    #[arg(long)]
    buckets: Option<usize>,

    /// Worker pool size
    #[arg(long)]
    workers: Option<usize>,

    /// Universe index to query (repeatable)
    #[arg(long = "probe", default_value = "1")]
    probes: Vec<u64>,

    /// Seed for a reproducible run
    #[arg(long)]
    seed: Option<u64>,

    /// Directory for JSON artifacts
    #[arg(long)]
    out: Option<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => ProtocolConfig::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => ProtocolConfig::default(),
    };
    if let Some(n) = args.dataset_size {
        config.dataset_size = n;
    }
    if let Some(b) = args.buckets {
        config.bucket_count = b;
    }
    if let Some(w) = args.workers {
        config.workers = w;
    }
    config.validate()?;

    let mut rng = match args.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };

    tracing::info!(
        dataset_size = config.dataset_size,
        buckets = config.bucket_count,
        workers = config.workers,
        probes = args.probes.len(),
        "Provisioning deployment"
    );

    let deployment = Deployment::provision(&config, &mut rng)?;
    let report = deployment.query_many(&args.probes, &mut rng)?;

    for outcome in &report.outcomes {
        let bit = outcome
            .verdict
            .bit()
            .map(|b| b.to_string())
            .unwrap_or_else(|e| e.to_string());
        println!(
            "probe {:>4}: {:?} (bucket {:?}) -> {}",
            outcome.probe, outcome.verdict.decision, outcome.verdict.matched_bucket, bit
        );
    }
    for skipped in &report.skipped {
        println!(
            "probe {:>4}: skipped in {:?}: {}",
            skipped.probe, skipped.phase, skipped.reason
        );
    }

    let setup = deployment.setup_stats();
    let stats = &report.stats;
    println!(
        "setup: {:.2} ms, published {} bytes (universe {}, digests {})",
        setup.setup_time_ms,
        setup.universe_bytes + setup.digest_bytes,
        setup.universe_bytes,
        setup.digest_bytes
    );
    println!(
        "query: {:.2} ms (blind {:.2}, intermediary {:.2}, server {:.2}, verify {:.2}), {} bytes exchanged",
        stats.total_time_ms(),
        stats.blind_time_ms,
        stats.intermediary_time_ms,
        stats.server_time_ms,
        stats.verify_time_ms,
        stats.total_bytes()
    );

    if let Some(dir) = &args.out {
        write_artifacts(dir, &deployment.digests(), &report)?;
        tracing::info!(out = %dir.display(), "Wrote artifacts");
    }

    Ok(())
}

fn write_artifacts(dir: &Path, digests: &BucketDigests, report: &QueryReport) -> anyhow::Result<()> {
    std::fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;

    write_json(&dir.join("digests.json"), digests)?;
    write_json(&dir.join("report.json"), report)?;
    for outcome in &report.outcomes {
        let probe_dir = dir.join(format!("probe-{}", outcome.probe));
        std::fs::create_dir_all(&probe_dir)?;
        write_json(&probe_dir.join("responses.json"), &outcome.responses)?;
        write_json(&probe_dir.join("reveal.json"), &outcome.reveal)?;
        write_json(&probe_dir.join("aggregate.json"), &outcome.aggregate)?;
    }
    Ok(())
}

fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> anyhow::Result<()> {
    let file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
    serde_json::to_writer_pretty(BufWriter::new(file), value)?;
    Ok(())
}
