//! Persistence traits and row types.
//!
//! Each pipeline stage talks to a narrow trait rather than the pool, so
//! tests can swap in wrappers (failure injection, counting) without a
//! database double. [`sqlite::SqliteStore`] implements all of them.

pub mod sqlite;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::classify::UpdateKind;
use crate::confidence::{ConfidenceLevel, ConfidenceReport, EvidenceType, VerificationFlags};

pub use sqlite::SqliteStore;

/// One named advisory lock. `acquired_at` / `expires_at` are unix
/// milliseconds so the conditional-upsert predicate compares plain
/// integers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockRow {
    pub name: String,
    pub acquired_at: i64,
    pub expires_at: i64,
}

/// A normalized content record as persisted. Identity is
/// `(source_id, url)`; `fingerprint` only decides whether content
/// changed between sightings.
#[derive(Debug, Clone, Serialize)]
pub struct StoredRecord {
    pub id: i64,
    pub source_id: String,
    pub url: String,
    pub title: String,
    pub body_text: String,
    pub body_rich: Option<String>,
    pub fingerprint: String,
    pub classification: Option<UpdateKind>,
    pub tool_tags: Vec<String>,
    pub ai_percent: Option<u8>,
    pub published_at: DateTime<Utc>,
    pub first_seen_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewRecord {
    pub source_id: String,
    pub url: String,
    pub title: String,
    pub body_text: String,
    pub body_rich: Option<String>,
    pub fingerprint: String,
    pub classification: Option<UpdateKind>,
    pub tool_tags: Vec<String>,
    pub ai_percent: Option<u8>,
    pub published_at: DateTime<Utc>,
}

/// Content fields rewritten in place when a record's fingerprint
/// changes. Identity and first_seen_at are untouchable.
#[derive(Debug, Clone)]
pub struct RecordPatch {
    pub title: String,
    pub body_text: String,
    pub body_rich: Option<String>,
    pub fingerprint: String,
    pub tool_tags: Vec<String>,
    pub ai_percent: Option<u8>,
    pub published_at: DateTime<Utc>,
}

/// The product or maker a revenue claim is about.
#[derive(Debug, Clone, Serialize)]
pub struct Subject {
    pub id: i64,
    pub product_name: String,
    /// Lowercased, whitespace-collapsed form of `product_name` used for
    /// fuzzy matching when no canonical URL exists.
    pub name_key: String,
    pub product_url: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ClaimRow {
    pub id: i64,
    pub subject_id: i64,
    pub monthly_cents: i64,
    pub annual_cents: Option<i64>,
    pub claim_date: Option<DateTime<Utc>>,
    pub derived_from_annual: bool,
    pub aspirational: bool,
    pub matched_by_name: bool,
    pub flags: VerificationFlags,
    pub extractor_confidence: f64,
    pub confidence_level: ConfidenceLevel,
    pub confidence_score: u8,
    pub confidence_reason: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewClaim {
    pub subject_id: i64,
    pub monthly_cents: i64,
    pub annual_cents: Option<i64>,
    pub claim_date: Option<DateTime<Utc>>,
    pub derived_from_annual: bool,
    pub aspirational: bool,
    pub matched_by_name: bool,
    pub flags: VerificationFlags,
    pub extractor_confidence: f64,
    pub confidence_level: ConfidenceLevel,
    pub confidence_score: u8,
    pub confidence_reason: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct EvidenceRow {
    pub id: i64,
    pub claim_id: i64,
    pub evidence_type: EvidenceType,
    pub source_url: String,
    pub source_date: Option<DateTime<Utc>>,
    pub raw_text: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewEvidence {
    pub claim_id: i64,
    pub evidence_type: EvidenceType,
    pub source_url: String,
    pub source_date: Option<DateTime<Utc>>,
    pub raw_text: String,
}

/// Storage for named advisory locks. `try_acquire` must be a single
/// atomic statement so two concurrent callers can never both win.
#[async_trait]
pub trait LockStore: Send + Sync {
    /// Returns `Ok(true)` iff the lock was free or expired at `now_ms`
    /// and is now held until `expires_ms`. `Ok(false)` means another
    /// holder has it; `Err` means the store itself failed.
    async fn try_acquire(&self, name: &str, now_ms: i64, expires_ms: i64) -> Result<bool>;
    async fn release(&self, name: &str) -> Result<()>;
    async fn get(&self, name: &str) -> Result<Option<LockRow>>;
}

#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn find_by_natural_key(&self, source_id: &str, url: &str)
        -> Result<Option<StoredRecord>>;
    async fn insert(&self, rec: NewRecord) -> Result<i64>;
    /// Rewrites content fields and bumps `last_seen_at`. Re-observing an
    /// unchanged record writes nothing, so `last_seen_at` marks the last
    /// time content appeared or changed, not the last fetch.
    async fn update_content(&self, id: i64, patch: RecordPatch) -> Result<()>;
    /// Newest first.
    async fn recent(&self, limit: u32) -> Result<Vec<StoredRecord>>;
}

#[async_trait]
pub trait SubjectStore: Send + Sync {
    async fn find_by_url(&self, product_url: &str) -> Result<Option<Subject>>;
    async fn all(&self) -> Result<Vec<Subject>>;
    async fn insert(
        &self,
        product_name: &str,
        name_key: &str,
        product_url: Option<&str>,
    ) -> Result<Subject>;
}

#[async_trait]
pub trait ClaimStore: Send + Sync {
    async fn insert(&self, claim: NewClaim) -> Result<i64>;
    /// Finds an existing claim for the same subject stating the same
    /// monthly value, if any; new evidence corroborates it instead of
    /// opening a duplicate claim.
    async fn find_matching(&self, subject_id: i64, monthly_cents: i64)
        -> Result<Option<ClaimRow>>;
    async fn update_assessment(
        &self,
        id: i64,
        flags: VerificationFlags,
        report: &ConfidenceReport,
    ) -> Result<()>;
    /// Newest first.
    async fn recent(&self, limit: u32) -> Result<Vec<ClaimRow>>;
}

#[async_trait]
pub trait EvidenceStore: Send + Sync {
    async fn append(&self, ev: NewEvidence) -> Result<i64>;
    async fn for_claim(&self, claim_id: i64) -> Result<Vec<EvidenceRow>>;
}
