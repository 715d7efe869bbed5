use anyhow::Result;
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::time::{Duration, Instant, SystemTime};
use tracing::info;
use tracing_subscriber::EnvFilter;

use wire_synth::{
    load_clusters, process_clusters_with_progress, training_rows, write_results, write_stats,
    write_training_rows, ClusterStatus, CombinerConfig, ProcessConfig, RunStats,
};

#[derive(Parser, Debug)]
#[command(name = "wire-synth")]
#[command(about = "Reconstructs wire articles from clusters of noisy OCR copies")]
#[command(version)]
struct Args {
    /// Cluster JSON file, or a directory scanned for **/*.json
    input: PathBuf,

    /// Results output file path
    #[arg(long, default_value = "merged_clusters.json")]
    output: PathBuf,

    /// Only process these cluster ids (repeatable)
    #[arg(long = "cluster")]
    clusters: Vec<String>,

    /// Bridge source-adjacent blocks after merging
    #[arg(long)]
    fuzzy_merge: bool,

    /// Shortest shared run recorded as an overlap
    #[arg(long, default_value_t = wire_synth::block::MIN_GRAM_LEN)]
    min_gram_len: usize,

    /// Clusters combined at once (defaults to the CPU count)
    #[arg(long)]
    jobs: Option<usize>,

    /// Abort on first failed cluster
    #[arg(long)]
    fail_fast: bool,

    /// Suppress console progress bar
    #[arg(long)]
    no_progress: bool,

    /// Stats output file path
    #[arg(long)]
    stats_out: Option<PathBuf>,

    /// Training rows output file path (JSON lines)
    #[arg(long)]
    training_out: Option<PathBuf>,
}

fn progress_bar(total: u64) -> Result<ProgressBar> {
    let pb = ProgressBar::new(total);
    pb.set_style(
        ProgressStyle::with_template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} clusters {msg}")?
            .progress_chars("##-"),
    );
    pb.enable_steady_tick(Duration::from_millis(100));
    Ok(pb)
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .with_writer(std::io::stderr)
        .json()
        .init();

    let args = Args::parse();
    info!("Starting wire-synth");
    info!(?args, "Parsed CLI arguments");

    if !args.input.exists() {
        anyhow::bail!("Input path does not exist: {}", args.input.display());
    }
    if args.min_gram_len == 0 {
        anyhow::bail!("--min-gram-len must be at least 1");
    }

    let run_start = SystemTime::now();
    let start_time = Instant::now();

    let mut clusters = load_clusters(&args.input).await?;
    clusters.retain_ids(&args.clusters);
    info!("Loaded {} clusters", clusters.len());

    if let Some(path) = &args.training_out {
        let rows = training_rows(&clusters);
        write_training_rows(path, &rows).await?;
    }

    let combiner_config = CombinerConfig {
        min_gram_len: args.min_gram_len,
        fuzzy_merge: args.fuzzy_merge,
        ..CombinerConfig::default()
    };
    let mut process_config = ProcessConfig {
        fail_fast: args.fail_fast,
        ..ProcessConfig::default()
    };
    if let Some(jobs) = args.jobs {
        process_config.concurrency = jobs.max(1);
    }

    let pb = if args.no_progress {
        None
    } else {
        Some(progress_bar(clusters.len() as u64)?)
    };
    let outcomes = process_clusters_with_progress(clusters, combiner_config, process_config, |outcome| {
        if let Some(pb) = &pb {
            pb.set_message(outcome.cluster_id.clone());
            pb.inc(1);
        }
    })
    .await;
    if let Some(pb) = &pb {
        pb.finish_and_clear();
    }
    let outcomes = outcomes?;

    write_results(&args.output, &outcomes).await?;

    let stats = RunStats::from_outcomes(run_start, start_time.elapsed().as_millis() as u64, &outcomes);
    if let Some(path) = &args.stats_out {
        write_stats(path, &stats).await?;
    }

    let best_coverages: Vec<f64> = outcomes
        .iter()
        .filter(|o| o.stats.status == ClusterStatus::Success)
        .map(|o| o.stats.top_coverage)
        .collect();
    let mean_coverage = if best_coverages.is_empty() {
        0.0
    } else {
        best_coverages.iter().sum::<f64>() / best_coverages.len() as f64
    };

    println!("wire-synth v{} - run complete", env!("CARGO_PKG_VERSION"));
    println!("  Clusters combined: {}", stats.clusters_processed);
    if stats.clusters_skipped > 0 {
        println!("  Clusters skipped: {}", stats.clusters_skipped);
    }
    if stats.clusters_failed > 0 {
        println!("  Clusters failed: {}", stats.clusters_failed);
    }
    println!("  Mean best-block coverage: {mean_coverage:.3}");
    println!("  Results written to {}", args.output.display());

    info!(
        "Run completed in {:.2}s: {} combined, {} skipped, {} failed",
        start_time.elapsed().as_secs_f64(),
        stats.clusters_processed,
        stats.clusters_skipped,
        stats.clusters_failed
    );
    Ok(())
}
