// tests/record_upsert.rs
//
// Record engine over real storage: natural-key identity, fingerprint
// change detection, and per-record failure isolation inside a batch.

use std::sync::Arc;

use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::{TimeZone, Utc};

use claimwatch::classify::HeuristicClassifier;
use claimwatch::collect::NormalizedItem;
use claimwatch::extract::ToolVocabulary;
use claimwatch::fingerprint::BODY_PREFIX_CHARS;
use claimwatch::store::{
    NewRecord, RecordPatch, RecordStore, SqliteStore, StoredRecord,
};
use claimwatch::upsert::{RecordEngine, UpsertOutcome};

fn item(url: &str, title: &str, body: &str) -> NormalizedItem {
    NormalizedItem {
        source_id: "makers".to_string(),
        title: title.to_string(),
        url: url.to_string(),
        body_text: body.to_string(),
        body_rich: None,
        published_at: Utc.with_ymd_and_hms(2024, 5, 10, 9, 0, 0).unwrap(),
        external_id: None,
        subject_name: None,
        subject_url: None,
    }
}

fn engine(records: Arc<dyn RecordStore>) -> RecordEngine {
    RecordEngine::new(
        records,
        Arc::new(HeuristicClassifier),
        ToolVocabulary::load_default(),
    )
}

/// RecordStore wrapper that fails every call touching a marked url.
/// Stands in for a row-level storage fault (constraint, disk, etc.).
struct FailOnUrl {
    inner: Arc<dyn RecordStore>,
    needle: &'static str,
}

#[async_trait]
impl RecordStore for FailOnUrl {
    async fn find_by_natural_key(
        &self,
        source_id: &str,
        url: &str,
    ) -> Result<Option<StoredRecord>> {
        if url.contains(self.needle) {
            bail!("injected storage failure");
        }
        self.inner.find_by_natural_key(source_id, url).await
    }

    async fn insert(&self, rec: NewRecord) -> Result<i64> {
        if rec.url.contains(self.needle) {
            bail!("injected storage failure");
        }
        self.inner.insert(rec).await
    }

    async fn update_content(&self, id: i64, patch: RecordPatch) -> Result<()> {
        self.inner.update_content(id, patch).await
    }

    async fn recent(&self, limit: u32) -> Result<Vec<StoredRecord>> {
        self.inner.recent(limit).await
    }
}

#[tokio::test]
async fn full_upsert_lifecycle_against_sqlite() {
    let store = Arc::new(SqliteStore::in_memory().await.expect("store"));
    let engine = engine(store.clone());

    let inserted = engine
        .upsert(&item("https://m.test/p1", "Launch week", "We shipped."))
        .await
        .expect("insert");
    let UpsertOutcome::Inserted(id) = inserted else {
        panic!("expected insert, got {inserted:?}");
    };

    let skipped = engine
        .upsert(&item("https://m.test/p1", "Launch week", "We shipped."))
        .await
        .expect("skip");
    assert_eq!(skipped, UpsertOutcome::Skipped(id));

    let updated = engine
        .upsert(&item("https://m.test/p1", "Launch week", "We shipped, then fixed it."))
        .await
        .expect("update");
    assert_eq!(updated, UpsertOutcome::Updated(id));

    let rows = RecordStore::recent(&*store, 10).await.expect("recent records");
    assert_eq!(rows.len(), 1, "three sightings of one url stay one record");
    assert_eq!(rows[0].body_text, "We shipped, then fixed it.");
}

#[tokio::test]
async fn edits_past_the_hashed_prefix_read_as_unchanged() {
    let store = Arc::new(SqliteStore::in_memory().await.expect("store"));
    let engine = engine(store.clone());

    let mut body = "x".repeat(BODY_PREFIX_CHARS);
    body.push_str("tail one");
    let first = engine
        .upsert(&item("https://m.test/long", "Post", &body))
        .await
        .expect("insert");
    assert!(matches!(first, UpsertOutcome::Inserted(_)));

    // Only the text past the fingerprint prefix differs.
    let mut edited = "x".repeat(BODY_PREFIX_CHARS);
    edited.push_str("tail two");
    let second = engine
        .upsert(&item("https://m.test/long", "Post", &edited))
        .await
        .expect("re-upsert");
    assert!(matches!(second, UpsertOutcome::Skipped(_)));
}

#[tokio::test]
async fn batch_isolates_the_failing_record() {
    let sqlite: Arc<dyn RecordStore> =
        Arc::new(SqliteStore::in_memory().await.expect("store"));
    let flaky = Arc::new(FailOnUrl {
        inner: sqlite.clone(),
        needle: "poison",
    });
    let engine = engine(flaky);

    let batch = vec![
        item("https://m.test/ok-1", "First", "Body one."),
        item("https://m.test/poison", "Broken", "Body two."),
        item("https://m.test/ok-2", "Third", "Body three."),
    ];
    let stats = engine.run_batch(&batch).await;

    assert_eq!(stats.inserted, 2, "healthy records must land");
    assert_eq!(stats.failures.len(), 1);
    assert_eq!(stats.failures[0].url, "https://m.test/poison");
    assert!(stats.failures[0].error.contains("injected storage failure"));

    // Outcome slots stay aligned with the input batch.
    assert!(stats.outcomes[0].is_some());
    assert!(stats.outcomes[1].is_none());
    assert!(stats.outcomes[2].is_some());

    let rows = sqlite.recent(10).await.expect("recent records");
    assert_eq!(rows.len(), 2);
}

#[tokio::test]
async fn reopening_the_database_reruns_schema_init_without_data_loss() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("records.db");
    let path = path.to_str().expect("utf8 temp path");

    {
        let store = Arc::new(SqliteStore::connect(path).await.expect("first open"));
        engine(store)
            .upsert(&item("https://m.test/p1", "Post", "Body."))
            .await
            .expect("insert");
    }

    // Second connect reruns the CREATE TABLE IF NOT EXISTS pass.
    let store = Arc::new(SqliteStore::connect(path).await.expect("second open"));
    let rows = RecordStore::recent(&*store, 10).await.expect("recent");
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].title, "Post");
}

#[tokio::test]
async fn skip_writes_nothing_update_bumps_last_seen() {
    let store = Arc::new(SqliteStore::in_memory().await.expect("store"));
    let engine = engine(store.clone());

    engine
        .upsert(&item("https://m.test/p1", "Post", "Same body."))
        .await
        .expect("insert");
    let rows = RecordStore::recent(&*store, 1).await.expect("recent");
    let (first_seen, last_seen) = (rows[0].first_seen_at, rows[0].last_seen_at);

    tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    engine
        .upsert(&item("https://m.test/p1", "Post", "Same body."))
        .await
        .expect("skip");

    let rows = RecordStore::recent(&*store, 1).await.expect("recent");
    assert_eq!(
        rows[0].last_seen_at, last_seen,
        "re-ingesting unchanged content must not write"
    );

    engine
        .upsert(&item("https://m.test/p1", "Post", "Different body."))
        .await
        .expect("update");
    let rows = RecordStore::recent(&*store, 1).await.expect("recent");
    assert_eq!(rows[0].first_seen_at, first_seen, "first_seen_at is immutable");
    assert!(rows[0].last_seen_at > last_seen, "a content change bumps last_seen_at");
}
