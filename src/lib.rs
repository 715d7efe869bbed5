pub mod block;
pub mod chunk;
pub mod cluster;
pub mod combiner;
pub mod error;
pub mod matcher;
pub mod parallel_processing;
pub mod sanitize;
pub mod training;

// Re-export the alignment core
pub use block::{Block, MergeAnchor, OverlapOutcome, OverlapTrim, OverlapVerdict, SourceSpan};
pub use chunk::{Chunk, SourceId};
pub use combiner::{
    BlockReport, Combiner, CombinerConfig, CombinerReport, CombinerRun, OverlapRecord, RunDiagnostics,
};
pub use error::{Result, SynthError};

// Re-export pipeline types and functions for the binary and benchmarks
pub use cluster::{discover_cluster_files, load_cluster_file, load_clusters, Cluster, ClusterSet};
pub use parallel_processing::{
    process_cluster, process_clusters, process_clusters_with_progress, write_results, write_stats,
    write_training_rows, ClusterOutcome, ClusterStats, ClusterStatus, ProcessConfig, RunStats,
};
pub use sanitize::{sanitize, sanitize_tokens, tokenize, SanitizeMode};
pub use training::{training_rows, TrainingRow, MAX_TRAINING_TOKENS};
