use super::*;
use crate::test_support::{FAKE_EMBED_MODEL, FakeEmbedder};
use std::time::Duration;
use tempfile::TempDir;

const LECTURE: &str = "Gradient descent minimizes a loss by stepping against the gradient. \
                       The learning rate controls the step size. Too large a rate diverges.";

fn create_test_cache(chunk_size: usize) -> (StoreCache, TempDir) {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let cache =
        StoreCache::new(temp_dir.path().join("vector_store"), chunk_size).expect("cache created");
    (cache, temp_dir)
}

#[test]
fn storage_key_is_stable_hex_sha256() {
    let key = storage_key("lectures/week1.pdf").expect("key derived");
    assert_eq!(key.len(), 64);
    assert!(key.chars().all(|c| c.is_ascii_hexdigit()));
    assert_eq!(key, storage_key("lectures/week1.pdf").expect("key derived"));
    assert_ne!(key, storage_key("lectures/week2.pdf").expect("key derived"));
    assert_eq!(
        storage_key("abc").expect("key derived"),
        "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
    );
}

#[test]
fn blank_identity_is_rejected() {
    assert!(matches!(
        storage_key(""),
        Err(StudyError::InvalidArgument(_))
    ));
    assert!(matches!(
        storage_key("   "),
        Err(StudyError::InvalidArgument(_))
    ));
}

#[test]
fn zero_chunk_size_is_rejected() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    assert!(matches!(
        StoreCache::new(temp_dir.path(), 0),
        Err(StudyError::InvalidArgument(_))
    ));
}

#[test]
fn vector_store_rejects_unpaired_sequences() {
    let result = VectorStore::new(
        "doc",
        FAKE_EMBED_MODEL,
        vec!["a".to_string(), "b".to_string()],
        vec![vec![1.0]],
    );
    assert!(matches!(result, Err(StudyError::Storage(_))));

    let result = VectorStore::new(
        "doc",
        FAKE_EMBED_MODEL,
        vec!["a".to_string(), "b".to_string()],
        vec![vec![1.0, 0.0], vec![1.0]],
    );
    assert!(matches!(result, Err(StudyError::Storage(_))));
}

#[test]
fn build_persists_paired_chunks() {
    let (cache, _temp_dir) = create_test_cache(5);
    let embedder = FakeEmbedder::new();

    let store = cache
        .load_or_build("week1.pdf", LECTURE, &embedder)
        .expect("store built");

    let expected_chunks = chunk_text(LECTURE, 5).expect("chunking");
    assert_eq!(store.chunks(), expected_chunks.as_slice());
    assert_eq!(store.embeddings().len(), store.chunks().len());
    assert_eq!(store.identity(), "week1.pdf");
    assert_eq!(store.model(), FAKE_EMBED_MODEL);
    assert_eq!(embedder.texts_embedded(), expected_chunks.len());

    let path = cache.record_path("week1.pdf").expect("path derived");
    assert!(path.is_file());
    assert_eq!(
        path.file_name().and_then(|n| n.to_str()),
        Some(format!("{}.json", storage_key("week1.pdf").expect("key")).as_str())
    );
    assert!(cache.contains("week1.pdf").expect("contains"));
}

#[test]
fn second_request_is_a_cache_hit() {
    let (cache, _temp_dir) = create_test_cache(5);
    let embedder = FakeEmbedder::new();

    let first = cache
        .load_or_build("week1.pdf", LECTURE, &embedder)
        .expect("store built");
    let calls_after_build = embedder.calls();

    let second = cache
        .load_or_build("week1.pdf", LECTURE, &embedder)
        .expect("store loaded");

    assert_eq!(first, second);
    assert_eq!(embedder.calls(), calls_after_build);
}

#[test]
fn cache_survives_restart() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let embedder = FakeEmbedder::new();

    let first = StoreCache::new(temp_dir.path(), 4)
        .expect("cache created")
        .load_or_build("week1.pdf", LECTURE, &embedder)
        .expect("store built");

    let restarted_embedder = FakeEmbedder::new();
    let reloaded = StoreCache::new(temp_dir.path(), 4)
        .expect("cache created")
        .load_or_build("week1.pdf", LECTURE, &restarted_embedder)
        .expect("store loaded");

    assert_eq!(first, reloaded);
    assert_eq!(restarted_embedder.calls(), 0);
}

#[test]
fn changed_text_under_same_identity_reuses_stale_store() {
    let (cache, _temp_dir) = create_test_cache(5);
    let embedder = FakeEmbedder::new();

    let original = cache
        .load_or_build("week1.pdf", LECTURE, &embedder)
        .expect("store built");
    let stale = cache
        .load_or_build("week1.pdf", "completely different lecture text", &embedder)
        .expect("store loaded");

    assert_eq!(original, stale);
}

#[test]
fn load_distinguishes_missing_from_corrupt() {
    let (cache, _temp_dir) = create_test_cache(5);
    assert!(cache.load("never-built.pdf").expect("load").is_none());

    let path = cache.record_path("broken.pdf").expect("path derived");
    fs::write(&path, b"{ not json").expect("write corrupt record");

    assert!(matches!(
        cache.load("broken.pdf"),
        Err(StudyError::Storage(_))
    ));
}

#[test]
fn corrupt_record_is_surfaced_not_rebuilt() {
    let (cache, _temp_dir) = create_test_cache(5);
    let embedder = FakeEmbedder::new();

    let path = cache.record_path("broken.pdf").expect("path derived");
    fs::write(&path, b"garbage").expect("write corrupt record");

    let result = cache.load_or_build("broken.pdf", LECTURE, &embedder);

    assert!(matches!(result, Err(StudyError::Storage(_))));
    assert_eq!(embedder.calls(), 0);
}

#[test]
fn desynchronized_record_is_a_storage_error() {
    let (cache, _temp_dir) = create_test_cache(5);
    let path = cache.record_path("desync.pdf").expect("path derived");
    let record = serde_json::json!({
        "identity": "desync.pdf",
        "model": FAKE_EMBED_MODEL,
        "created_at": "2024-01-01T00:00:00Z",
        "chunks": ["one", "two"],
        "embeddings": [[1.0, 0.0]]
    });
    fs::write(&path, record.to_string()).expect("write record");

    assert!(matches!(
        cache.load("desync.pdf"),
        Err(StudyError::Storage(_))
    ));
}

#[test]
fn empty_text_builds_empty_store() {
    let (cache, _temp_dir) = create_test_cache(5);
    let embedder = FakeEmbedder::new();

    let store = cache
        .load_or_build("blank.pdf", "  \n ", &embedder)
        .expect("store built");

    assert!(store.is_empty());
    assert_eq!(embedder.calls(), 0);
    assert!(cache.contains("blank.pdf").expect("contains"));
}

#[test]
fn embedding_failure_persists_nothing() {
    let (cache, _temp_dir) = create_test_cache(5);
    let embedder = FakeEmbedder::failing();

    let result = cache.load_or_build("week1.pdf", LECTURE, &embedder);

    assert!(matches!(result, Err(StudyError::Service(_))));
    assert!(!cache.contains("week1.pdf").expect("contains"));
}

#[test]
fn record_from_other_model_is_still_returned() {
    let (cache, _temp_dir) = create_test_cache(5);
    let store = VectorStore::new(
        "old.pdf",
        "older-embed-model",
        vec!["legacy chunk".to_string()],
        vec![vec![0.5, 0.5]],
    )
    .expect("store assembled");
    let path = cache.record_path("old.pdf").expect("path derived");
    cache.persist(&path, &store).expect("persisted");

    let embedder = FakeEmbedder::new();
    let loaded = cache
        .load_or_build("old.pdf", LECTURE, &embedder)
        .expect("store loaded");

    assert_eq!(loaded, store);
    assert_eq!(embedder.calls(), 0);
}

#[test]
fn concurrent_builders_embed_once() {
    let (cache, _temp_dir) = create_test_cache(3);
    let embedder = FakeEmbedder::new().with_delay(Duration::from_millis(50));

    let stores: Vec<VectorStore> = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..4)
            .map(|_| scope.spawn(|| cache.load_or_build("shared.pdf", LECTURE, &embedder)))
            .collect();
        handles
            .into_iter()
            .map(|handle| {
                handle
                    .join()
                    .expect("builder thread finished")
                    .expect("store available")
            })
            .collect()
    });

    assert_eq!(embedder.calls(), 1);
    assert!(stores.windows(2).all(|pair| pair[0] == pair[1]));

    let leftovers = fs::read_dir(cache.store_dir())
        .expect("read store dir")
        .count();
    assert_eq!(leftovers, 1);
}

#[test]
fn records_lists_good_and_broken_stores() {
    let (cache, _temp_dir) = create_test_cache(5);
    let embedder = FakeEmbedder::new();
    cache
        .load_or_build("week1.pdf", LECTURE, &embedder)
        .expect("store built");
    cache
        .load_or_build("week2.pdf", "Another short lecture", &embedder)
        .expect("store built");
    let broken = cache.record_path("week3.pdf").expect("path derived");
    fs::write(&broken, "{").expect("write corrupt record");

    let records = cache.records().expect("records listed");

    assert_eq!(records.len(), 3);
    let mut identities: Vec<&str> = records
        .iter()
        .filter_map(|(_, store)| store.as_ref().ok().map(VectorStore::identity))
        .collect();
    identities.sort_unstable();
    assert_eq!(identities, vec!["week1.pdf", "week2.pdf"]);
    assert!(
        records
            .iter()
            .any(|(path, store)| path == &broken && store.is_err())
    );
}
