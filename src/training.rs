//! Per-article training material for the downstream polishing stage
//!
//! Rows carry readable text (`SanitizeMode::Training`) capped at
//! `MAX_TRAINING_TOKENS` tokens. Nothing in the combiner reads them back.

use serde::{Deserialize, Serialize};

use crate::cluster::ClusterSet;
use crate::sanitize::{sanitize_tokens, SanitizeMode};

/// Token cap per training row
pub const MAX_TRAINING_TOKENS: usize = 1024;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrainingRow {
    pub cluster_id: String,
    pub article_id: String,
    pub text: String,
}

/// One row per non-empty article, in cluster then article id order
pub fn training_rows(clusters: &ClusterSet) -> Vec<TrainingRow> {
    let mut rows = Vec::new();
    for (cluster_id, cluster) in &clusters.clusters {
        for (article_id, raw) in &cluster.articles {
            let mut tokens = sanitize_tokens(raw, SanitizeMode::Training);
            if tokens.is_empty() {
                continue;
            }
            tokens.truncate(MAX_TRAINING_TOKENS);
            rows.push(TrainingRow {
                cluster_id: cluster_id.clone(),
                article_id: article_id.clone(),
                text: tokens.join(" "),
            });
        }
    }
    rows
}
