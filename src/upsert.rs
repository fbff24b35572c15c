//! Change-detection upsert engine.
//!
//! Identity is the natural key `(source_id, url)`; the fingerprint only
//! decides whether an already-known record's content drifted. Derived
//! analysis (tool tags, AI percent) is recomputed whenever content
//! changes, but classification happens on first insert only.

use std::sync::Arc;

use anyhow::Result;
use metrics::counter;
use serde::Serialize;

use crate::classify::Classifier;
use crate::collect::NormalizedItem;
use crate::extract::percent::extract_ai_percent;
use crate::extract::tags::ToolVocabulary;
use crate::fingerprint::fingerprint;
use crate::store::{NewRecord, RecordPatch, RecordStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted(i64),
    Updated(i64),
    Skipped(i64),
}

#[derive(Debug, Clone, Serialize)]
pub struct RecordFailure {
    pub source_id: String,
    pub url: String,
    pub error: String,
}

/// Per-batch tally. `outcomes` is index-aligned with the input batch,
/// `None` marking items whose upsert failed.
#[derive(Debug, Default)]
pub struct IngestStats {
    pub inserted: usize,
    pub updated: usize,
    pub skipped: usize,
    pub failures: Vec<RecordFailure>,
    pub outcomes: Vec<Option<UpsertOutcome>>,
}

pub struct RecordEngine {
    records: Arc<dyn RecordStore>,
    classifier: Arc<dyn Classifier>,
    vocab: ToolVocabulary,
}

impl RecordEngine {
    pub fn new(
        records: Arc<dyn RecordStore>,
        classifier: Arc<dyn Classifier>,
        vocab: ToolVocabulary,
    ) -> Self {
        Self {
            records,
            classifier,
            vocab,
        }
    }

    /// Inserts, updates, or skips one normalized item against the store.
    pub async fn upsert(&self, item: &NormalizedItem) -> Result<UpsertOutcome> {
        let fp = fingerprint(&item.title, &item.url, item.published_at, &item.body_text);

        let existing = self
            .records
            .find_by_natural_key(&item.source_id, &item.url)
            .await?;

        match existing {
            // Unchanged content is a pure no-op: re-ingesting the same item
            // must not generate writes.
            Some(rec) if rec.fingerprint == fp => Ok(UpsertOutcome::Skipped(rec.id)),
            Some(rec) => {
                let analysis_text = format!("{} {}", item.title, item.body_text);
                self.records
                    .update_content(
                        rec.id,
                        RecordPatch {
                            title: item.title.clone(),
                            body_text: item.body_text.clone(),
                            body_rich: item.body_rich.clone(),
                            fingerprint: fp,
                            tool_tags: self.vocab.extract(&analysis_text).into_iter().collect(),
                            ai_percent: extract_ai_percent(&analysis_text),
                            published_at: item.published_at,
                        },
                    )
                    .await?;
                Ok(UpsertOutcome::Updated(rec.id))
            }
            None => {
                // A classifier failure downgrades to "unclassified", it
                // never blocks persisting the record itself.
                let classification = match self
                    .classifier
                    .classify(&item.title, &item.body_text)
                    .await
                {
                    Ok(kind) => kind,
                    Err(err) => {
                        tracing::warn!(
                            target: "ingest",
                            source = %item.source_id,
                            url = %item.url,
                            "classifier failed, record stored unclassified: {err:#}"
                        );
                        None
                    }
                };

                let analysis_text = format!("{} {}", item.title, item.body_text);
                let id = self
                    .records
                    .insert(NewRecord {
                        source_id: item.source_id.clone(),
                        url: item.url.clone(),
                        title: item.title.clone(),
                        body_text: item.body_text.clone(),
                        body_rich: item.body_rich.clone(),
                        fingerprint: fp,
                        classification,
                        tool_tags: self.vocab.extract(&analysis_text).into_iter().collect(),
                        ai_percent: extract_ai_percent(&analysis_text),
                        published_at: item.published_at,
                    })
                    .await?;
                Ok(UpsertOutcome::Inserted(id))
            }
        }
    }

    /// Runs a whole batch, isolating per-record failures. Never fails as
    /// a whole: a broken record is tallied and the rest proceed.
    pub async fn run_batch(&self, items: &[NormalizedItem]) -> IngestStats {
        let mut stats = IngestStats::default();

        for item in items {
            match self.upsert(item).await {
                Ok(outcome) => {
                    match outcome {
                        UpsertOutcome::Inserted(_) => stats.inserted += 1,
                        UpsertOutcome::Updated(_) => stats.updated += 1,
                        UpsertOutcome::Skipped(_) => stats.skipped += 1,
                    }
                    stats.outcomes.push(Some(outcome));
                }
                Err(err) => {
                    tracing::warn!(
                        target: "ingest",
                        source = %item.source_id,
                        url = %item.url,
                        "record upsert failed: {err:#}"
                    );
                    counter!("ingest_record_failures_total").increment(1);
                    stats.failures.push(RecordFailure {
                        source_id: item.source_id.clone(),
                        url: item.url.clone(),
                        error: format!("{err:#}"),
                    });
                    stats.outcomes.push(None);
                }
            }
        }

        counter!("ingest_records_total", "outcome" => "inserted").increment(stats.inserted as u64);
        counter!("ingest_records_total", "outcome" => "updated").increment(stats.updated as u64);
        counter!("ingest_records_total", "outcome" => "skipped").increment(stats.skipped as u64);
        stats
    }
}
