// Cluster files: groups of OCR copies of the same wire article.
// On disk a cluster file is a JSON object `{cluster_id: {article_id: text}}`.

use anyhow::{Context, Result};
use glob::glob;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::sanitize::{sanitize_tokens, SanitizeMode};

/// One cluster: raw article texts keyed by article id
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Cluster {
    pub articles: BTreeMap<String, String>,
}

impl Cluster {
    pub fn len(&self) -> usize {
        self.articles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.articles.is_empty()
    }

    /// Article ids in source-id order
    pub fn article_ids(&self) -> Vec<&str> {
        self.articles.keys().map(String::as_str).collect()
    }

    /// Alignment tokens per article; index is the source id
    pub fn sources(&self) -> Vec<Vec<String>> {
        self.articles
            .values()
            .map(|text| sanitize_tokens(text, SanitizeMode::Alignment))
            .collect()
    }
}

/// Clusters keyed by cluster id
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClusterSet {
    pub clusters: BTreeMap<String, Cluster>,
}

impl ClusterSet {
    pub fn len(&self) -> usize {
        self.clusters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clusters.is_empty()
    }

    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).context("Malformed cluster JSON")
    }

    /// Fold `other` in. A cluster id seen twice keeps the later file's copy.
    pub fn extend(&mut self, other: ClusterSet) {
        for (id, cluster) in other.clusters {
            if self.clusters.insert(id.clone(), cluster).is_some() {
                warn!("Cluster {} defined in more than one file, keeping the last", id);
            }
        }
    }

    /// Keep only the listed cluster ids. An empty list keeps everything.
    pub fn retain_ids(&mut self, ids: &[String]) {
        if ids.is_empty() {
            return;
        }
        self.clusters.retain(|id, _| ids.iter().any(|wanted| wanted == id));
    }
}

/// Read and parse one cluster file
pub async fn load_cluster_file(path: impl AsRef<Path>) -> Result<ClusterSet> {
    let path = path.as_ref();
    let json = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read cluster file {}", path.display()))?;
    let set = ClusterSet::from_json(&json)
        .with_context(|| format!("Failed to parse cluster file {}", path.display()))?;
    debug!("Loaded {} clusters from {}", set.len(), path.display());
    Ok(set)
}

/// Cluster files under `root`: `root` itself when it is a file, otherwise
/// every `**/*.json` beneath it, sorted.
pub fn discover_cluster_files(root: impl AsRef<Path>) -> Result<Vec<PathBuf>> {
    let root = root.as_ref();
    if root.is_file() {
        return Ok(vec![root.to_path_buf()]);
    }
    if !root.is_dir() {
        anyhow::bail!("Input path does not exist: {}", root.display());
    }

    let pattern = root.join("**").join("*.json");
    let pattern = pattern.to_string_lossy();
    let mut files = Vec::new();
    for entry in glob(&pattern).with_context(|| format!("Failed to create glob pattern: {pattern}"))? {
        match entry {
            Ok(path) if path.is_file() => files.push(path),
            Ok(_) => {}
            Err(e) => warn!("Skipping unreadable path during discovery: {}", e),
        }
    }
    files.sort();
    info!("Discovered {} cluster files under {}", files.len(), root.display());
    Ok(files)
}

/// Load and combine every cluster file under `root`
pub async fn load_clusters(root: impl AsRef<Path>) -> Result<ClusterSet> {
    let mut set = ClusterSet::default();
    for path in discover_cluster_files(root)? {
        set.extend(load_cluster_file(&path).await?);
    }
    Ok(set)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const SAMPLE: &str = r#"{
        "c2": {"b": "second copy", "a": "first copy"},
        "c1": {"x": "only one"}
    }"#;

    #[test]
    fn test_parse_orders_by_id() {
        let set = ClusterSet::from_json(SAMPLE).unwrap();
        let ids: Vec<&String> = set.clusters.keys().collect();
        assert_eq!(ids, vec!["c1", "c2"]);

        let c2 = &set.clusters["c2"];
        assert_eq!(c2.article_ids(), vec!["a", "b"]);
        assert_eq!(c2.sources(), vec![vec!["first", "copy"], vec!["second", "copy"]]);
    }

    #[test]
    fn test_parse_rejects_wrong_shape() {
        assert!(ClusterSet::from_json(r#"{"c1": ["not", "a", "map"]}"#).is_err());
        assert!(ClusterSet::from_json("not json").is_err());
    }

    #[test]
    fn test_retain_ids() {
        let mut set = ClusterSet::from_json(SAMPLE).unwrap();
        set.retain_ids(&[]);
        assert_eq!(set.len(), 2);
        set.retain_ids(&["c2".to_string(), "missing".to_string()]);
        assert_eq!(set.clusters.keys().collect::<Vec<_>>(), vec!["c2"]);
    }

    #[tokio::test]
    async fn test_discover_and_load() {
        let temp_dir = TempDir::new().unwrap();
        let nested = temp_dir.path().join("day1");
        tokio::fs::create_dir_all(&nested).await.unwrap();
        tokio::fs::write(nested.join("a.json"), r#"{"c1": {"x": "one"}}"#).await.unwrap();
        tokio::fs::write(temp_dir.path().join("b.json"), r#"{"c2": {"y": "two"}}"#).await.unwrap();
        tokio::fs::write(temp_dir.path().join("notes.txt"), "ignored").await.unwrap();

        let files = discover_cluster_files(temp_dir.path()).unwrap();
        assert_eq!(files.len(), 2);

        let set = load_clusters(temp_dir.path()).await.unwrap();
        assert_eq!(set.clusters.keys().collect::<Vec<_>>(), vec!["c1", "c2"]);
    }

    #[tokio::test]
    async fn test_discover_single_file() {
        let temp_dir = TempDir::new().unwrap();
        let file = temp_dir.path().join("one.json");
        tokio::fs::write(&file, SAMPLE).await.unwrap();
        assert_eq!(discover_cluster_files(&file).unwrap(), vec![file]);
    }

    #[test]
    fn test_discover_missing_path() {
        assert!(discover_cluster_files("/definitely/not/here").is_err());
    }

    #[tokio::test]
    async fn test_load_missing_file_errors() {
        let err = load_cluster_file("/definitely/not/here.json").await.unwrap_err();
        assert!(err.to_string().contains("Failed to read cluster file"));
    }
}
