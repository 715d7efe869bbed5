use serde_json::{json, Value};
use std::fs;
use std::process::Command;

#[path = "integration/mod.rs"]
mod test_utils;
use test_utils::{tokens, TestFixture};

fn wire_synth() -> Command {
    Command::new(env!("CARGO_BIN_EXE_wire-synth"))
}

/// Test that the binary writes results, stats and training rows
#[test]
fn test_cli_writes_all_outputs() {
    let fixture = TestFixture::new();
    fixture.create_cluster_file(
        "input/clusters.json",
        &json!({
            "c1": { "a": tokens("w", 0..20), "b": tokens("w", 10..30) },
            "c2": { "a": tokens("v", 0..10) },
        }),
    );

    let output_file = fixture.path("merged.json");
    let stats_file = fixture.path("stats.json");
    let training_file = fixture.path("training.jsonl");
    let output = wire_synth()
        .arg(fixture.path("input"))
        .arg("--output")
        .arg(&output_file)
        .arg("--stats-out")
        .arg(&stats_file)
        .arg("--training-out")
        .arg(&training_file)
        .arg("--no-progress")
        .arg("--jobs")
        .arg("2")
        .output()
        .expect("Failed to run wire-synth");

    assert!(
        output.status.success(),
        "wire-synth failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    let results: Value = serde_json::from_str(&fs::read_to_string(&output_file).unwrap()).unwrap();
    let results = results.as_array().expect("results should be an array");
    assert_eq!(results.len(), 1);
    assert_eq!(results[0]["cluster_id"], "c1");
    assert_eq!(results[0]["best_text"], tokens("w", 10..20));

    let stats: Value = serde_json::from_str(&fs::read_to_string(&stats_file).unwrap()).unwrap();
    let obj = stats.as_object().expect("stats should be an object");
    for key in [
        "run_start",
        "total_processing_time_ms",
        "total_tokens_processed",
        "clusters_processed",
        "clusters_skipped",
        "clusters_failed",
        "cluster_stats",
    ] {
        assert!(obj.contains_key(key), "Missing {key} field");
    }
    assert_eq!(obj["clusters_processed"], 1);
    assert_eq!(obj["clusters_skipped"], 1);
    let cluster_stats = obj["cluster_stats"].as_array().unwrap();
    assert_eq!(cluster_stats.len(), 2);
    assert_eq!(cluster_stats[0]["status"], "success");
    assert_eq!(cluster_stats[1]["status"], "skipped");

    let training = fs::read_to_string(&training_file).unwrap();
    assert_eq!(training.lines().count(), 3);
}

/// Test that --cluster restricts processing
#[test]
fn test_cli_cluster_filter() {
    let fixture = TestFixture::new();
    let input = fixture.create_cluster_file(
        "clusters.json",
        &json!({
            "keep": { "a": tokens("k", 0..12), "b": tokens("k", 0..12) },
            "drop": { "a": tokens("d", 0..12), "b": tokens("d", 0..12) },
        }),
    );

    let output_file = fixture.path("out.json");
    let output = wire_synth()
        .arg(&input)
        .arg("--output")
        .arg(&output_file)
        .args(["--cluster", "keep", "--no-progress"])
        .output()
        .expect("Failed to run wire-synth");
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let results: Value = serde_json::from_str(&fs::read_to_string(&output_file).unwrap()).unwrap();
    let ids: Vec<&str> = results
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["cluster_id"].as_str().unwrap())
        .collect();
    assert_eq!(ids, vec!["keep"]);
}

/// Test that a missing input path fails with a clear error
#[test]
fn test_cli_missing_input() {
    let fixture = TestFixture::new();
    let output = wire_synth()
        .arg(fixture.path("does-not-exist"))
        .arg("--no-progress")
        .output()
        .expect("Failed to run wire-synth");

    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("Input path does not exist"));
}
