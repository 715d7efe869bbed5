// Integration test utilities and common code
#![allow(dead_code)]

use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Test fixture helper for creating temporary directories with cluster files
pub struct TestFixture {
    pub temp_dir: TempDir,
    pub root_path: PathBuf,
}

impl TestFixture {
    /// Create a new test fixture with temporary directory
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let root_path = temp_dir.path().to_path_buf();

        Self { temp_dir, root_path }
    }

    /// Write a cluster file; `clusters` is `{cluster_id: {article_id: text}}`
    pub fn create_cluster_file<P: AsRef<Path>>(&self, relative_path: P, clusters: &Value) -> PathBuf {
        assert!(clusters.is_object(), "cluster file root must be an object");
        self.create_raw_file(relative_path, &clusters.to_string())
    }

    /// Write arbitrary file content, creating parent directories
    pub fn create_raw_file<P: AsRef<Path>>(&self, relative_path: P, content: &str) -> PathBuf {
        let file_path = self.root_path.join(relative_path);

        if let Some(parent) = file_path.parent() {
            fs::create_dir_all(parent).expect("Failed to create parent directories");
        }

        fs::write(&file_path, content).expect("Failed to write test file");
        file_path
    }

    pub fn path<P: AsRef<Path>>(&self, relative_path: P) -> PathBuf {
        self.root_path.join(relative_path)
    }
}

/// Space-joined tokens `{prefix}{i}` for `i` in `range`
pub fn tokens(prefix: &str, range: std::ops::Range<usize>) -> String {
    range.map(|i| format!("{prefix}{i}")).collect::<Vec<_>>().join(" ")
}

/// Token vector form of `tokens`
pub fn token_vec(prefix: &str, range: std::ops::Range<usize>) -> Vec<String> {
    range.map(|i| format!("{prefix}{i}")).collect()
}
