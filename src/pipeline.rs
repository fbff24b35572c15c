//! Run orchestration: lock, collect, upsert, extract, release.
//!
//! One run is one lock window. Between acquire and release nothing
//! fallible escapes; every failure below the lock is folded into the
//! run report instead of propagating. A crash mid-run leaves the lock
//! to expire on its own TTL.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use metrics::counter;
use serde::Serialize;
use tokio::task::JoinHandle;

use crate::claims::{ClaimIngestor, ClaimSubmission};
use crate::collect::{collect, NormalizedItem, SourceAdapter, SourceFailure};
use crate::confidence::{EvidenceType, VerificationFlags};
use crate::extract::parse_revenue_claim;
use crate::lock::LockManager;
use crate::upsert::{RecordEngine, RecordFailure, UpsertOutcome};

pub const INGEST_LOCK_NAME: &str = "ingest";

/// Default lock TTL. Must exceed the longest plausible run by a margin;
/// a crashed run blocks the next one for exactly this long.
pub const DEFAULT_LOCK_TTL: Duration = Duration::from_secs(900);

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct SourceReport {
    pub inserted: usize,
    pub updated: usize,
    pub skipped: usize,
    pub failed: usize,
}

#[derive(Debug, Serialize)]
pub struct RunReport {
    pub sources: BTreeMap<String, SourceReport>,
    pub source_errors: Vec<SourceFailure>,
    pub record_failures: Vec<RecordFailure>,
    pub claims_extracted: usize,
    pub duration_ms: u64,
}

#[derive(Debug)]
pub enum RunOutcome {
    Completed(RunReport),
    /// Another holder has the ingest lock; nothing ran.
    Skipped,
}

pub struct Pipeline {
    lock: LockManager,
    adapters: Vec<Arc<dyn SourceAdapter>>,
    engine: RecordEngine,
    claims: Arc<ClaimIngestor>,
    lock_ttl: Duration,
}

impl Pipeline {
    pub fn new(
        lock: LockManager,
        adapters: Vec<Arc<dyn SourceAdapter>>,
        engine: RecordEngine,
        claims: Arc<ClaimIngestor>,
        lock_ttl: Duration,
    ) -> Self {
        Self {
            lock,
            adapters,
            engine,
            claims,
            lock_ttl,
        }
    }

    /// Executes one full ingest run under the advisory lock.
    ///
    /// `Ok(Skipped)` is live contention. `Err` only ever means the lock
    /// store itself failed; with no lock there is no run.
    pub async fn run(&self) -> Result<RunOutcome> {
        if !self.lock.acquire(INGEST_LOCK_NAME, self.lock_ttl).await? {
            counter!("ingest_runs_total", "outcome" => "skipped").increment(1);
            return Ok(RunOutcome::Skipped);
        }

        let report = self.run_locked().await;
        self.lock.release(INGEST_LOCK_NAME).await;

        counter!("ingest_runs_total", "outcome" => "completed").increment(1);
        tracing::info!(
            target: "ingest",
            duration_ms = report.duration_ms,
            source_errors = report.source_errors.len(),
            record_failures = report.record_failures.len(),
            claims = report.claims_extracted,
            "ingest run completed"
        );
        Ok(RunOutcome::Completed(report))
    }

    /// The infallible body of a run; all failures end up in the report.
    async fn run_locked(&self) -> RunReport {
        let t0 = Instant::now();

        let collected = collect(&self.adapters).await;

        let mut by_source: BTreeMap<String, Vec<NormalizedItem>> = BTreeMap::new();
        for item in collected.items {
            by_source.entry(item.source_id.clone()).or_default().push(item);
        }

        // Every configured adapter appears in the report, including the
        // ones that yielded nothing this run.
        let mut sources: BTreeMap<String, SourceReport> = self
            .adapters
            .iter()
            .map(|a| (a.source_id().to_string(), SourceReport::default()))
            .collect();
        let mut record_failures = Vec::new();
        let mut claims_extracted = 0usize;

        for (source_id, items) in by_source {
            let stats = self.engine.run_batch(&items).await;

            let evidence_type = self
                .adapters
                .iter()
                .find(|a| a.source_id() == source_id)
                .and_then(|a| a.evidence_type());

            // Claims come from newly inserted records only. Updates and
            // re-sightings were already mined on first sight.
            if let Some(evidence_type) = evidence_type {
                for (item, outcome) in items.iter().zip(&stats.outcomes) {
                    if matches!(outcome, Some(UpsertOutcome::Inserted(_))) {
                        claims_extracted += self.try_extract_claim(item, evidence_type).await;
                    }
                }
            }

            sources.insert(
                source_id,
                SourceReport {
                    inserted: stats.inserted,
                    updated: stats.updated,
                    skipped: stats.skipped,
                    failed: stats.failures.len(),
                },
            );
            record_failures.extend(stats.failures);
        }

        RunReport {
            sources,
            source_errors: collected.failures,
            record_failures,
            claims_extracted,
            duration_ms: t0.elapsed().as_millis() as u64,
        }
    }

    async fn try_extract_claim(
        &self,
        item: &NormalizedItem,
        evidence_type: EvidenceType,
    ) -> usize {
        let text = format!("{} {}", item.title, item.body_text);
        let Some(claim) = parse_revenue_claim(&text) else {
            return 0;
        };

        let flags = VerificationFlags {
            processor_verified: false,
            public_dashboard: evidence_type == EvidenceType::PublicDashboard,
        };

        let submission = ClaimSubmission {
            subject_name: item.subject_name.as_deref(),
            subject_url: item.subject_url.as_deref(),
            claim,
            evidence_type,
            flags,
            source_url: &item.url,
            source_date: Some(item.published_at),
            raw_text: &text,
        };

        match self.claims.ingest(submission).await {
            Ok(_) => 1,
            Err(err) => {
                tracing::warn!(
                    target: "claims",
                    source = %item.source_id,
                    url = %item.url,
                    "claim ingestion failed: {err:#}"
                );
                counter!("claims_failed_total").increment(1);
                0
            }
        }
    }
}

/// Background ticker driving periodic runs. Contention with an external
/// trigger simply shows up as a skipped tick.
pub fn spawn_scheduler(pipeline: Arc<Pipeline>, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        loop {
            ticker.tick().await;
            match pipeline.run().await {
                Ok(RunOutcome::Completed(report)) => {
                    tracing::info!(
                        target: "ingest",
                        claims = report.claims_extracted,
                        duration_ms = report.duration_ms,
                        "scheduled ingest tick"
                    );
                }
                Ok(RunOutcome::Skipped) => {
                    tracing::info!(target: "ingest", "scheduled ingest tick skipped, lock held");
                }
                Err(err) => {
                    tracing::error!(target: "ingest", "scheduled ingest tick failed: {err:#}");
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use async_trait::async_trait;

    use crate::classify::HeuristicClassifier;
    use crate::extract::tags::ToolVocabulary;
    use crate::store::{LockRow, LockStore, SqliteStore};

    struct ExplodingLockStore;

    #[async_trait]
    impl LockStore for ExplodingLockStore {
        async fn try_acquire(&self, _: &str, _: i64, _: i64) -> Result<bool> {
            Err(anyhow!("lock table unreachable"))
        }
        async fn release(&self, _: &str) -> Result<()> {
            Ok(())
        }
        async fn get(&self, _: &str) -> Result<Option<LockRow>> {
            Ok(None)
        }
    }

    fn pipeline_over(store: Arc<SqliteStore>, lock: LockManager) -> Pipeline {
        let engine = RecordEngine::new(
            store.clone(),
            Arc::new(HeuristicClassifier),
            ToolVocabulary::load_default(),
        );
        let claims = Arc::new(ClaimIngestor::new(store.clone(), store.clone(), store));
        Pipeline::new(lock, Vec::new(), engine, claims, Duration::from_secs(60))
    }

    #[tokio::test]
    async fn contention_reports_skipped_not_error() {
        let store = Arc::new(SqliteStore::in_memory().await.unwrap());
        let holder = LockManager::new(store.clone());
        assert!(holder.acquire(INGEST_LOCK_NAME, Duration::from_secs(60)).await.unwrap());

        let pipeline = pipeline_over(store.clone(), LockManager::new(store.clone()));
        assert!(matches!(pipeline.run().await.unwrap(), RunOutcome::Skipped));

        // The loser must not have released the winner's lock.
        assert!(store.get(INGEST_LOCK_NAME).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn lock_store_failure_fails_the_run_closed() {
        let store = Arc::new(SqliteStore::in_memory().await.unwrap());
        let pipeline = pipeline_over(store, LockManager::new(Arc::new(ExplodingLockStore)));
        assert!(pipeline.run().await.is_err());
    }

    #[tokio::test]
    async fn completed_run_releases_the_lock() {
        let store = Arc::new(SqliteStore::in_memory().await.unwrap());
        let pipeline = pipeline_over(store.clone(), LockManager::new(store.clone()));

        let outcome = pipeline.run().await.unwrap();
        assert!(matches!(outcome, RunOutcome::Completed(_)));
        assert!(store.get(INGEST_LOCK_NAME).await.unwrap().is_none());
    }
}
