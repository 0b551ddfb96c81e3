//! Integration tests for the retrieval pipeline: load, retrieve, filtering,
//! thresholds, and cache behavior.

mod common;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use carelens::{
    EmbeddingProvider, IndexCache, RagConfig, RagError, RagPipeline, RetrieveOptions,
};
use common::{PNEUMONIA_NOTE, StubEmbedder, write_summaries};

fn pipeline(config: RagConfig, embedder: Arc<dyn EmbeddingProvider>) -> RagPipeline {
    RagPipeline::builder().config(config).embedding_provider(embedder).build().unwrap()
}

fn small_chunk_config() -> RagConfig {
    RagConfig::builder().chunk_size(40).chunk_overlap(10).build().unwrap()
}

#[tokio::test]
async fn retrieve_before_load_is_not_ready() {
    let pipeline = pipeline(RagConfig::default(), Arc::new(StubEmbedder::new()));
    let err = pipeline.retrieve("any question", &RetrieveOptions::default()).await.unwrap_err();
    assert!(matches!(err, RagError::IndexNotReady));
}

#[tokio::test]
async fn blank_query_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_summaries(dir.path(), &[(100001, PNEUMONIA_NOTE)]);
    let pipeline = pipeline(RagConfig::default(), Arc::new(StubEmbedder::new()));
    pipeline.load_data(&path, None, false).await.unwrap();

    let err = pipeline.retrieve("   \n ", &RetrieveOptions::default()).await.unwrap_err();
    assert!(matches!(err, RagError::EmptyQuery));
}

#[tokio::test]
async fn missing_admission_is_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_summaries(dir.path(), &[(100001, PNEUMONIA_NOTE)]);
    let pipeline = pipeline(RagConfig::default(), Arc::new(StubEmbedder::new()));

    let err = pipeline.load_data(&path, Some(999999), false).await.unwrap_err();
    assert!(matches!(err, RagError::RecordNotFound { hadm_id: 999999 }));
    assert!(!pipeline.is_ready().await);
}

#[tokio::test]
async fn empty_dataset_with_filter_is_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_summaries(dir.path(), &[]);
    let pipeline = pipeline(RagConfig::default(), Arc::new(StubEmbedder::new()));

    let err = pipeline.load_data(&path, Some(999999), false).await.unwrap_err();
    assert!(matches!(err, RagError::RecordNotFound { .. }));
}

#[tokio::test]
async fn empty_dataset_without_filter_yields_empty_results() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_summaries(dir.path(), &[]);
    let pipeline = pipeline(RagConfig::default(), Arc::new(StubEmbedder::new()));

    pipeline.load_data(&path, None, false).await.unwrap();
    assert_eq!(pipeline.chunk_count().await, Some(0));
    let results = pipeline.retrieve("medication", &RetrieveOptions::default()).await.unwrap();
    assert!(results.is_empty());
}

#[tokio::test]
async fn medication_scenario_returns_amoxicillin_chunk() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_summaries(dir.path(), &[(100001, PNEUMONIA_NOTE)]);
    let pipeline = pipeline(small_chunk_config(), Arc::new(StubEmbedder::new()));
    pipeline.load_data(&path, None, false).await.unwrap();

    assert!(pipeline.chunk_count().await.unwrap() >= 3);

    let options = RetrieveOptions { k: 1, ..RetrieveOptions::default() };
    let results = pipeline.retrieve("What medication?", &options).await.unwrap();
    assert_eq!(results.len(), 1);
    assert!(results[0].chunk.text.contains("amoxicillin"));
    assert!(results[0].score > 0.0);
}

#[tokio::test]
async fn scores_are_non_increasing_and_bounded_by_k() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_summaries(
        dir.path(),
        &[
            (100001, PNEUMONIA_NOTE),
            (100002, "Medication list includes warfarin daily. Cardiology follow-up arranged."),
        ],
    );
    let pipeline = pipeline(small_chunk_config(), Arc::new(StubEmbedder::new()));
    pipeline.load_data(&path, None, false).await.unwrap();

    let options = RetrieveOptions { k: 3, ..RetrieveOptions::default() };
    let results = pipeline.retrieve("medication daily weeks", &options).await.unwrap();
    assert!(results.len() <= 3);
    assert!(!results.is_empty());
    for pair in results.windows(2) {
        assert!(pair[0].score >= pair[1].score);
    }
}

#[tokio::test]
async fn unreachable_min_score_returns_empty_not_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_summaries(dir.path(), &[(100001, PNEUMONIA_NOTE)]);
    let pipeline = pipeline(small_chunk_config(), Arc::new(StubEmbedder::new()));
    pipeline.load_data(&path, None, false).await.unwrap();

    let options = RetrieveOptions { min_score: 0.9, ..RetrieveOptions::default() };
    let results = pipeline.retrieve("What medication?", &options).await.unwrap();
    assert!(results.is_empty());
}

#[tokio::test]
async fn raising_min_score_never_increases_result_count() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_summaries(
        dir.path(),
        &[
            (100001, PNEUMONIA_NOTE),
            (100002, "Medication list includes warfarin daily."),
        ],
    );
    let pipeline = pipeline(small_chunk_config(), Arc::new(StubEmbedder::new()));
    pipeline.load_data(&path, None, false).await.unwrap();

    let loose = RetrieveOptions { k: 10, min_score: 0.0, ..RetrieveOptions::default() };
    let strict = RetrieveOptions { k: 10, min_score: 0.5, ..RetrieveOptions::default() };
    let all = pipeline.retrieve("medication", &loose).await.unwrap();
    let filtered = pipeline.retrieve("medication", &strict).await.unwrap();

    assert!(filtered.len() <= all.len());
    assert!(filtered.iter().all(|r| r.score >= 0.5));
    assert!(all.iter().all(|r| r.score >= 0.0));
}

#[tokio::test]
async fn admission_filter_isolates_patients() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_summaries(
        dir.path(),
        &[
            (100001, PNEUMONIA_NOTE),
            (100002, "Medication list includes warfarin daily."),
        ],
    );
    let pipeline = pipeline(small_chunk_config(), Arc::new(StubEmbedder::new()));
    pipeline.load_data(&path, None, false).await.unwrap();

    let options =
        RetrieveOptions { k: 10, hadm_id: Some(100002), ..RetrieveOptions::default() };
    let results = pipeline.retrieve("medication", &options).await.unwrap();
    assert!(!results.is_empty());
    assert!(results.iter().all(|r| r.chunk.hadm_id == 100002));
}

#[tokio::test]
async fn single_patient_mode_indexes_one_record() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_summaries(
        dir.path(),
        &[
            (100001, PNEUMONIA_NOTE),
            (100002, "Medication list includes warfarin daily."),
        ],
    );
    let pipeline = pipeline(small_chunk_config(), Arc::new(StubEmbedder::new()));
    pipeline.load_data(&path, Some(100001), false).await.unwrap();

    let results = pipeline
        .retrieve("medication", &RetrieveOptions { k: 10, ..RetrieveOptions::default() })
        .await
        .unwrap();
    assert!(results.iter().all(|r| r.chunk.hadm_id == 100001));
    assert!(pipeline.record(100001).await.is_some());
    assert!(pipeline.record(100002).await.is_none());
}

#[tokio::test]
async fn retrieval_is_deterministic() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_summaries(dir.path(), &[(100001, PNEUMONIA_NOTE)]);
    let pipeline = pipeline(small_chunk_config(), Arc::new(StubEmbedder::new()));
    pipeline.load_data(&path, None, false).await.unwrap();

    let options = RetrieveOptions { k: 5, ..RetrieveOptions::default() };
    let first = pipeline.retrieve("What medication?", &options).await.unwrap();
    let second = pipeline.retrieve("What medication?", &options).await.unwrap();

    assert_eq!(first.len(), second.len());
    for (a, b) in first.iter().zip(&second) {
        assert_eq!(a.chunk.id, b.chunk.id);
        assert_eq!(a.score, b.score);
    }
}

#[tokio::test]
async fn embed_batch_size_bounds_provider_calls_without_changing_results() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_summaries(dir.path(), &[(100001, PNEUMONIA_NOTE)]);
    let options = RetrieveOptions { k: 3, ..RetrieveOptions::default() };

    let whole = pipeline(small_chunk_config(), Arc::new(StubEmbedder::new()));
    whole.load_data(&path, None, false).await.unwrap();
    let baseline = whole.retrieve("What medication?", &options).await.unwrap();

    let calls = Arc::new(AtomicUsize::new(0));
    let batched_config = RagConfig::builder()
        .chunk_size(40)
        .chunk_overlap(10)
        .embed_batch_size(2)
        .build()
        .unwrap();
    let batched = pipeline(
        batched_config,
        Arc::new(StubEmbedder::with_counter(Arc::clone(&calls))),
    );
    batched.load_data(&path, None, false).await.unwrap();

    // 4 chunks at 2 per call.
    assert_eq!(batched.chunk_count().await, Some(4));
    assert_eq!(calls.load(Ordering::SeqCst), 2);

    let split = batched.retrieve("What medication?", &options).await.unwrap();
    assert_eq!(baseline.len(), split.len());
    for (a, b) in baseline.iter().zip(&split) {
        assert_eq!(a.chunk.id, b.chunk.id);
        assert_eq!(a.score, b.score);
    }
}

fn cached_config(cache_dir: &std::path::Path) -> RagConfig {
    RagConfig::builder()
        .chunk_size(40)
        .chunk_overlap(10)
        .cache_dir(cache_dir)
        .build()
        .unwrap()
}

#[tokio::test]
async fn cache_hit_skips_re_embedding_and_reproduces_results() {
    let dir = tempfile::tempdir().unwrap();
    let cache_dir = dir.path().join("cache");
    let path = write_summaries(dir.path(), &[(100001, PNEUMONIA_NOTE)]);
    let calls = Arc::new(AtomicUsize::new(0));

    let first = pipeline(
        cached_config(&cache_dir),
        Arc::new(StubEmbedder::with_counter(Arc::clone(&calls))),
    );
    first.load_data(&path, None, false).await.unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    let options = RetrieveOptions { k: 3, ..RetrieveOptions::default() };
    let before = first.retrieve("What medication?", &options).await.unwrap();

    let second = pipeline(
        cached_config(&cache_dir),
        Arc::new(StubEmbedder::with_counter(Arc::clone(&calls))),
    );
    second.load_data(&path, None, false).await.unwrap();
    // The snapshot was restored; no further batch embedding happened.
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    let after = second.retrieve("What medication?", &options).await.unwrap();
    assert_eq!(before.len(), after.len());
    for (a, b) in before.iter().zip(&after) {
        assert_eq!(a.chunk.id, b.chunk.id);
        assert_eq!(a.score, b.score);
    }
}

#[tokio::test]
async fn force_rebuild_picks_up_changed_source() {
    let dir = tempfile::tempdir().unwrap();
    let cache_dir = dir.path().join("cache");
    let path = write_summaries(dir.path(), &[(100001, PNEUMONIA_NOTE)]);

    let pipeline = pipeline(cached_config(&cache_dir), Arc::new(StubEmbedder::new()));
    pipeline.load_data(&path, None, false).await.unwrap();

    // Same file name, new content.
    write_summaries(dir.path(), &[(100001, "Discharge medication: warfarin once daily.")]);
    pipeline.load_data(&path, None, true).await.unwrap();

    let options = RetrieveOptions { k: 10, ..RetrieveOptions::default() };
    let results = pipeline.retrieve("medication", &options).await.unwrap();
    assert!(results.iter().any(|r| r.chunk.text.contains("warfarin")));
    assert!(results.iter().all(|r| !r.chunk.text.contains("amoxicillin")));
}

#[tokio::test]
async fn changed_chunk_config_invalidates_cache() {
    let dir = tempfile::tempdir().unwrap();
    let cache_dir = dir.path().join("cache");
    let path = write_summaries(dir.path(), &[(100001, PNEUMONIA_NOTE)]);
    let calls = Arc::new(AtomicUsize::new(0));

    let first = pipeline(
        cached_config(&cache_dir),
        Arc::new(StubEmbedder::with_counter(Arc::clone(&calls))),
    );
    first.load_data(&path, None, false).await.unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    let other_config = RagConfig::builder()
        .chunk_size(64)
        .chunk_overlap(10)
        .cache_dir(&cache_dir)
        .build()
        .unwrap();
    let second =
        pipeline(other_config, Arc::new(StubEmbedder::with_counter(Arc::clone(&calls))));
    second.load_data(&path, None, false).await.unwrap();
    // Signature mismatch forced a rebuild.
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn corrupt_cache_blob_triggers_rebuild() {
    let dir = tempfile::tempdir().unwrap();
    let cache_dir = dir.path().join("cache");
    std::fs::create_dir_all(&cache_dir).unwrap();
    let path = write_summaries(dir.path(), &[(100001, PNEUMONIA_NOTE)]);

    let key = IndexCache::key(&path, None);
    std::fs::write(cache_dir.join(format!("{key}.idx")), b"garbage").unwrap();

    let calls = Arc::new(AtomicUsize::new(0));
    let pipeline = pipeline(
        cached_config(&cache_dir),
        Arc::new(StubEmbedder::with_counter(Arc::clone(&calls))),
    );
    pipeline.load_data(&path, None, false).await.unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    let results = pipeline
        .retrieve("What medication?", &RetrieveOptions::default())
        .await
        .unwrap();
    assert!(!results.is_empty());
}
