// Cluster-level fan-out: one independent combiner per cluster on the blocking pool,
// bounded by `ProcessConfig::concurrency`, plus the JSON/JSONL writers for the results.

use anyhow::{bail, Context, Result};
use futures::stream::{self, Stream, StreamExt};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use std::time::{Instant, SystemTime, UNIX_EPOCH};
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{debug, info, warn};

use crate::cluster::{Cluster, ClusterSet};
use crate::combiner::{Combiner, CombinerConfig, CombinerReport};
use crate::training::TrainingRow;

/// Run-level processing options
#[derive(Debug, Clone)]
pub struct ProcessConfig {
    /// Abort the whole run on the first failed cluster
    pub fail_fast: bool,
    /// Clusters combined at once
    pub concurrency: usize,
}

impl Default for ProcessConfig {
    fn default() -> Self {
        Self {
            fail_fast: false,
            concurrency: num_cpus::get().max(1),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ClusterStatus {
    Success,
    Skipped,
    Failed,
}

/// Per-cluster processing statistics
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ClusterStats {
    pub cluster_id: String,
    pub article_count: usize,
    /// Alignment tokens across all articles
    pub token_count: usize,
    pub block_count: usize,
    /// Tokens in the best block
    pub merged_len: usize,
    /// Coverage of the best block
    pub top_coverage: f64,
    pub processing_time_ms: u64,
    pub status: ClusterStatus,
    /// Why the cluster was skipped or failed
    pub error: Option<String>,
}

/// Everything produced for one cluster
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ClusterOutcome {
    pub cluster_id: String,
    /// Article ids in source-id order
    pub article_ids: Vec<String>,
    pub report: Option<CombinerReport>,
    pub stats: ClusterStats,
}

impl ClusterOutcome {
    fn failed(cluster_id: String, article_ids: Vec<String>, error: String) -> Self {
        let stats = ClusterStats {
            cluster_id: cluster_id.clone(),
            article_count: article_ids.len(),
            token_count: 0,
            block_count: 0,
            merged_len: 0,
            top_coverage: 0.0,
            processing_time_ms: 0,
            status: ClusterStatus::Failed,
            error: Some(error),
        };
        Self {
            cluster_id,
            article_ids,
            report: None,
            stats,
        }
    }
}

/// Aggregate statistics for one run, written by `--stats-out`
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct RunStats {
    /// Seconds since the Unix epoch
    pub run_start: u64,
    pub total_processing_time_ms: u64,
    pub total_tokens_processed: usize,
    pub clusters_processed: usize,
    pub clusters_skipped: usize,
    pub clusters_failed: usize,
    pub cluster_stats: Vec<ClusterStats>,
}

impl RunStats {
    pub fn from_outcomes(run_start: SystemTime, elapsed_ms: u64, outcomes: &[ClusterOutcome]) -> Self {
        let count = |status| outcomes.iter().filter(|o| o.stats.status == status).count();
        Self {
            run_start: run_start
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or_default(),
            total_processing_time_ms: elapsed_ms,
            total_tokens_processed: outcomes.iter().map(|o| o.stats.token_count).sum(),
            clusters_processed: count(ClusterStatus::Success),
            clusters_skipped: count(ClusterStatus::Skipped),
            clusters_failed: count(ClusterStatus::Failed),
            cluster_stats: outcomes.iter().map(|o| o.stats.clone()).collect(),
        }
    }
}

/// Combine one cluster on the current thread.
///
/// Clusters with fewer than two articles, or with no tokens left after
/// sanitizing, are skipped rather than combined.
pub fn process_cluster(cluster_id: &str, cluster: &Cluster, config: &CombinerConfig) -> ClusterOutcome {
    let start_time = Instant::now();
    let article_ids: Vec<String> = cluster.article_ids().into_iter().map(String::from).collect();
    let sources = cluster.sources();
    let token_count = sources.iter().map(Vec::len).sum();

    let mut stats = ClusterStats {
        cluster_id: cluster_id.to_string(),
        article_count: cluster.len(),
        token_count,
        block_count: 0,
        merged_len: 0,
        top_coverage: 0.0,
        processing_time_ms: 0,
        status: ClusterStatus::Success,
        error: None,
    };

    let skip_reason = if cluster.len() < 2 {
        Some("fewer than two articles")
    } else if token_count == 0 {
        Some("no tokens after sanitizing")
    } else {
        None
    };

    let report = match skip_reason {
        Some(reason) => {
            warn!("Skipping cluster {}: {}", cluster_id, reason);
            stats.status = ClusterStatus::Skipped;
            stats.error = Some(reason.to_string());
            None
        }
        None => match Combiner::with_config(sources, config.clone()).run() {
            Ok(run) => {
                let report = run.report();
                stats.block_count = report.blocks.len();
                if let Some(best) = report.blocks.first() {
                    stats.merged_len = best.merged_text.len();
                    stats.top_coverage = best.coverage;
                }
                Some(report)
            }
            Err(e) => {
                warn!("Combiner failed for cluster {}: {}", cluster_id, e);
                stats.status = ClusterStatus::Failed;
                stats.error = Some(e.to_string());
                None
            }
        },
    };

    stats.processing_time_ms = start_time.elapsed().as_millis() as u64;
    debug!(
        cluster = cluster_id,
        blocks = stats.block_count,
        ms = stats.processing_time_ms,
        "Cluster done"
    );

    ClusterOutcome {
        cluster_id: cluster_id.to_string(),
        article_ids,
        report,
        stats,
    }
}

/// Combine every cluster, returning outcomes sorted by cluster id
pub async fn process_clusters(
    clusters: ClusterSet,
    combiner_config: CombinerConfig,
    process_config: ProcessConfig,
) -> Result<Vec<ClusterOutcome>> {
    process_clusters_with_progress(clusters, combiner_config, process_config, |_| {}).await
}

/// `process_clusters`, calling `on_complete` as each cluster finishes
pub async fn process_clusters_with_progress<F>(
    clusters: ClusterSet,
    combiner_config: CombinerConfig,
    process_config: ProcessConfig,
    on_complete: F,
) -> Result<Vec<ClusterOutcome>>
where
    F: FnMut(&ClusterOutcome),
{
    let start_time = Instant::now();
    let concurrency = process_config.concurrency.max(1);
    let total = clusters.len();
    info!("Processing {} clusters with concurrency {}", total, concurrency);

    let combiner_config = Arc::new(combiner_config);
    let tasks = stream::iter(clusters.clusters).map(move |(cluster_id, cluster)| {
        let config = Arc::clone(&combiner_config);
        async move {
            let article_ids: Vec<String> = cluster.articles.keys().cloned().collect();
            let task_id = cluster_id.clone();
            match tokio::task::spawn_blocking(move || process_cluster(&task_id, &cluster, &config)).await {
                Ok(outcome) => outcome,
                Err(e) => ClusterOutcome::failed(cluster_id, article_ids, format!("worker task failed: {e}")),
            }
        }
    });

    let mut outcomes =
        collect_outcomes(tasks.buffer_unordered(concurrency), process_config.fail_fast, on_complete).await?;
    outcomes.sort_by(|a, b| a.cluster_id.cmp(&b.cluster_id));

    info!(
        "Processed {} clusters in {:.2}s",
        outcomes.len(),
        start_time.elapsed().as_secs_f64()
    );
    Ok(outcomes)
}

async fn collect_outcomes<S, F>(mut outcomes: S, fail_fast: bool, mut on_complete: F) -> Result<Vec<ClusterOutcome>>
where
    S: Stream<Item = ClusterOutcome> + Unpin,
    F: FnMut(&ClusterOutcome),
{
    let mut collected = Vec::new();
    while let Some(outcome) = outcomes.next().await {
        on_complete(&outcome);
        if outcome.stats.status == ClusterStatus::Failed {
            let error = outcome.stats.error.as_deref().unwrap_or("unknown error");
            if fail_fast {
                bail!("Cluster {} failed: {}", outcome.cluster_id, error);
            }
            warn!("Cluster {} failed (continuing): {}", outcome.cluster_id, error);
        }
        collected.push(outcome);
    }
    Ok(collected)
}

/// One entry of the results file
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ClusterResult {
    pub cluster_id: String,
    pub article_ids: Vec<String>,
    /// Space-joined text of the best block
    pub best_text: Option<String>,
    pub report: CombinerReport,
}

/// Results of every cluster that produced a report
pub fn collect_results(outcomes: &[ClusterOutcome]) -> Vec<ClusterResult> {
    outcomes
        .iter()
        .filter_map(|o| {
            o.report.as_ref().map(|report| ClusterResult {
                cluster_id: o.cluster_id.clone(),
                article_ids: o.article_ids.clone(),
                best_text: report.best_text(),
                report: report.clone(),
            })
        })
        .collect()
}

async fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_vec_pretty(value)?;
    let file = tokio::fs::File::create(path)
        .await
        .with_context(|| format!("Failed to create {}", path.display()))?;
    let mut writer = BufWriter::new(file);
    writer.write_all(&json).await?;
    writer.write_all(b"\n").await?;
    writer.flush().await?;
    Ok(())
}

/// Write the results JSON array
pub async fn write_results(path: &Path, outcomes: &[ClusterOutcome]) -> Result<()> {
    let results = collect_results(outcomes);
    write_json(path, &results).await?;
    info!("Wrote {} cluster results to {}", results.len(), path.display());
    Ok(())
}

/// Write run statistics JSON
pub async fn write_stats(path: &Path, stats: &RunStats) -> Result<()> {
    write_json(path, stats).await?;
    info!("Wrote run statistics to {}", path.display());
    Ok(())
}

/// Write training rows as JSON lines
pub async fn write_training_rows(path: &Path, rows: &[TrainingRow]) -> Result<()> {
    let file = tokio::fs::File::create(path)
        .await
        .with_context(|| format!("Failed to create {}", path.display()))?;
    let mut writer = BufWriter::new(file);
    for row in rows {
        let line = serde_json::to_string(row)?;
        writer.write_all(line.as_bytes()).await?;
        writer.write_all(b"\n").await?;
    }
    writer.flush().await?;
    info!("Wrote {} training rows to {}", rows.len(), path.display());
    Ok(())
}
