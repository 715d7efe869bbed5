use serde_json::json;
use wire_synth::{load_cluster_file, load_clusters, Block, Chunk, SynthError};

#[path = "integration/mod.rs"]
mod test_utils;
use test_utils::{token_vec, TestFixture};

/// Malformed JSON is reported with the offending path
#[tokio::test]
async fn test_load_malformed_cluster_file() {
    let fixture = TestFixture::new();
    let path = fixture.create_raw_file("broken.json", "{\"c1\": {\"a\": ");

    let err = load_cluster_file(&path).await.expect_err("Malformed JSON should fail");
    assert!(
        format!("{err:#}").contains("broken.json"),
        "Error should name the file: {err:#}"
    );
}

/// A cluster whose articles are not strings is rejected
#[tokio::test]
async fn test_load_wrong_shape() {
    let fixture = TestFixture::new();
    fixture.create_raw_file("shape.json", &json!({ "c1": { "a": 42 } }).to_string());

    assert!(load_clusters(&fixture.root_path).await.is_err());
}

/// A directory with no cluster files loads as an empty set
#[tokio::test]
async fn test_load_empty_directory() {
    let fixture = TestFixture::new();
    fixture.create_raw_file("readme.txt", "not a cluster file");

    let clusters = load_clusters(&fixture.root_path).await.expect("Empty input should load");
    assert!(clusters.is_empty());
}

/// Unreadable files surface as errors (Unix only)
#[tokio::test]
async fn test_load_permission_denied() {
    let fixture = TestFixture::new();
    let path = fixture.create_cluster_file("restricted.json", &json!({ "c1": { "a": "text" } }));

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mut perms = std::fs::metadata(&path).unwrap().permissions();
        perms.set_mode(0o000);
        std::fs::set_permissions(&path, perms).unwrap();

        // Root ignores permission bits, so only check when the read really fails.
        if std::fs::read(&path).is_err() {
            assert!(load_cluster_file(&path).await.is_err());
        }

        let mut perms = std::fs::metadata(&path).unwrap().permissions();
        perms.set_mode(0o644);
        std::fs::set_permissions(&path, perms).unwrap();
    }
}

#[test]
fn test_core_argument_errors() {
    let text = token_vec("t", 0..10);

    let err = Chunk::new(0, 0, 0, 3, text[..2].to_vec()).unwrap_err();
    assert!(matches!(err, SynthError::InvalidArgument { .. }));

    let err = Block::from_overlap(0, 0, 1, 0, 5, text.clone()).unwrap_err();
    assert!(matches!(err, SynthError::InvalidArgument { .. }));

    let block = Block::from_overlap(0, 0, 1, 0, 10, text.clone()).unwrap();
    assert!(matches!(block.slice(4, 4), Err(SynthError::InvalidArgument { .. })));
    assert!(matches!(block.slice(0, 11), Err(SynthError::InvalidArgument { .. })));
    assert_eq!(block.source_chunks(7).unwrap_err(), SynthError::NotFound { source_id: 7 });
    assert!(block.locate_block_offset(7, 0).is_err());

    let mut block = block;
    let err = block.add_overlap(5, 0, 3, 6, 0, text[..3].to_vec()).unwrap_err();
    assert!(matches!(err, SynthError::InvalidArgument { .. }));
}
