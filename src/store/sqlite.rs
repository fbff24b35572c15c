//! SQLite-backed storage.
//!
//! Schema creation is idempotent (`CREATE TABLE IF NOT EXISTS`) and runs
//! on every connect, so a fresh deployment needs no migration step.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::sqlite::{SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};

use crate::classify::UpdateKind;
use crate::confidence::{ConfidenceLevel, ConfidenceReport, EvidenceType, VerificationFlags};

use super::{
    ClaimRow, ClaimStore, EvidenceRow, EvidenceStore, LockRow, LockStore, NewClaim, NewEvidence,
    NewRecord, RecordPatch, RecordStore, StoredRecord, Subject, SubjectStore,
};

#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Opens (creating if missing) the database file and initializes the
    /// schema.
    pub async fn connect(db_path: &str) -> Result<Self> {
        if let Some(parent) = Path::new(db_path).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("creating database directory {}", parent.display()))?;
            }
        }

        let db_url = format!("sqlite://{db_path}?mode=rwc");
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .acquire_timeout(Duration::from_secs(5))
            .connect(&db_url)
            .await
            .with_context(|| format!("opening sqlite database at {db_path}"))?;

        sqlx::query("PRAGMA foreign_keys = ON").execute(&pool).await?;
        sqlx::query("PRAGMA journal_mode = WAL").execute(&pool).await?;
        sqlx::query("PRAGMA busy_timeout = 5000").execute(&pool).await?;

        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    /// In-memory database for tests. The pool is pinned to one
    /// connection that is never recycled; a second connection would see
    /// an unrelated empty database.
    pub async fn in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await
            .context("opening in-memory sqlite database")?;

        sqlx::query("PRAGMA foreign_keys = ON").execute(&pool).await?;

        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    async fn init_schema(&self) -> Result<()> {
        create_locks_table(&self.pool).await?;
        create_records_table(&self.pool).await?;
        create_subjects_table(&self.pool).await?;
        create_claims_table(&self.pool).await?;
        create_evidence_table(&self.pool).await?;
        Ok(())
    }
}

async fn create_locks_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS ingest_locks (
            name        TEXT PRIMARY KEY,
            acquired_at INTEGER NOT NULL,
            expires_at  INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_records_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS records (
            id             INTEGER PRIMARY KEY AUTOINCREMENT,
            source_id      TEXT NOT NULL,
            url            TEXT NOT NULL,
            title          TEXT NOT NULL,
            body_text      TEXT NOT NULL,
            body_rich      TEXT,
            fingerprint    TEXT NOT NULL,
            classification TEXT,
            tool_tags      TEXT NOT NULL DEFAULT '[]',
            ai_percent     INTEGER,
            published_at   TEXT NOT NULL,
            first_seen_at  TEXT NOT NULL,
            last_seen_at   TEXT NOT NULL,
            UNIQUE(source_id, url)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_subjects_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS subjects (
            id           INTEGER PRIMARY KEY AUTOINCREMENT,
            product_name TEXT NOT NULL,
            name_key     TEXT NOT NULL,
            product_url  TEXT UNIQUE
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_subjects_name_key ON subjects(name_key)")
        .execute(pool)
        .await?;

    Ok(())
}

async fn create_claims_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS claims (
            id                   INTEGER PRIMARY KEY AUTOINCREMENT,
            subject_id           INTEGER NOT NULL REFERENCES subjects(id),
            monthly_cents        INTEGER NOT NULL,
            annual_cents         INTEGER,
            claim_date           TEXT,
            derived_from_annual  INTEGER NOT NULL DEFAULT 0,
            aspirational         INTEGER NOT NULL DEFAULT 0,
            matched_by_name      INTEGER NOT NULL DEFAULT 0,
            processor_verified   INTEGER NOT NULL DEFAULT 0,
            public_dashboard     INTEGER NOT NULL DEFAULT 0,
            extractor_confidence REAL NOT NULL,
            confidence_level     TEXT NOT NULL,
            confidence_score     INTEGER NOT NULL,
            confidence_reason    TEXT NOT NULL,
            created_at           TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_claims_subject ON claims(subject_id)")
        .execute(pool)
        .await?;

    Ok(())
}

async fn create_evidence_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS evidence (
            id            INTEGER PRIMARY KEY AUTOINCREMENT,
            claim_id      INTEGER NOT NULL REFERENCES claims(id),
            evidence_type TEXT NOT NULL,
            source_url    TEXT NOT NULL,
            source_date   TEXT,
            raw_text      TEXT NOT NULL,
            created_at    TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_evidence_claim ON evidence(claim_id)")
        .execute(pool)
        .await?;

    Ok(())
}

#[async_trait]
impl LockStore for SqliteStore {
    async fn try_acquire(&self, name: &str, now_ms: i64, expires_ms: i64) -> Result<bool> {
        // Single conditional upsert: the insert wins when no row exists,
        // the update wins only when the existing row has expired. Zero
        // rows affected means a live holder.
        let result = sqlx::query(
            r#"
            INSERT INTO ingest_locks (name, acquired_at, expires_at)
            VALUES (?, ?, ?)
            ON CONFLICT(name) DO UPDATE SET
                acquired_at = excluded.acquired_at,
                expires_at  = excluded.expires_at
            WHERE ingest_locks.expires_at <= excluded.acquired_at
            "#,
        )
        .bind(name)
        .bind(now_ms)
        .bind(expires_ms)
        .execute(&self.pool)
        .await
        .context("acquiring ingest lock")?;

        Ok(result.rows_affected() == 1)
    }

    async fn release(&self, name: &str) -> Result<()> {
        sqlx::query("DELETE FROM ingest_locks WHERE name = ?")
            .bind(name)
            .execute(&self.pool)
            .await
            .context("releasing ingest lock")?;
        Ok(())
    }

    async fn get(&self, name: &str) -> Result<Option<LockRow>> {
        let row = sqlx::query("SELECT name, acquired_at, expires_at FROM ingest_locks WHERE name = ?")
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(|r| LockRow {
            name: r.get("name"),
            acquired_at: r.get("acquired_at"),
            expires_at: r.get("expires_at"),
        }))
    }
}

fn record_from_row(row: &SqliteRow) -> StoredRecord {
    let tags_json: String = row.get("tool_tags");
    let tool_tags: Vec<String> = serde_json::from_str(&tags_json).unwrap_or_default();

    let classification = row
        .get::<Option<String>, _>("classification")
        .and_then(|label| {
            let parsed = UpdateKind::parse(&label);
            if parsed.is_none() {
                tracing::warn!(target: "store", %label, "unknown classification label in records table");
            }
            parsed
        });

    StoredRecord {
        id: row.get("id"),
        source_id: row.get("source_id"),
        url: row.get("url"),
        title: row.get("title"),
        body_text: row.get("body_text"),
        body_rich: row.get("body_rich"),
        fingerprint: row.get("fingerprint"),
        classification,
        tool_tags,
        ai_percent: row.get::<Option<i64>, _>("ai_percent").map(|v| v as u8),
        published_at: row.get("published_at"),
        first_seen_at: row.get("first_seen_at"),
        last_seen_at: row.get("last_seen_at"),
    }
}

#[async_trait]
impl RecordStore for SqliteStore {
    async fn find_by_natural_key(
        &self,
        source_id: &str,
        url: &str,
    ) -> Result<Option<StoredRecord>> {
        let row = sqlx::query("SELECT * FROM records WHERE source_id = ? AND url = ?")
            .bind(source_id)
            .bind(url)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(|r| record_from_row(&r)))
    }

    async fn insert(&self, rec: NewRecord) -> Result<i64> {
        let now = Utc::now();
        let tags_json = serde_json::to_string(&rec.tool_tags)?;
        let result = sqlx::query(
            r#"
            INSERT INTO records
                (source_id, url, title, body_text, body_rich, fingerprint,
                 classification, tool_tags, ai_percent, published_at,
                 first_seen_at, last_seen_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&rec.source_id)
        .bind(&rec.url)
        .bind(&rec.title)
        .bind(&rec.body_text)
        .bind(&rec.body_rich)
        .bind(&rec.fingerprint)
        .bind(rec.classification.map(|k| k.as_str()))
        .bind(tags_json)
        .bind(rec.ai_percent.map(|v| v as i64))
        .bind(rec.published_at)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .with_context(|| format!("inserting record {}:{}", rec.source_id, rec.url))?;

        Ok(result.last_insert_rowid())
    }

    async fn update_content(&self, id: i64, patch: RecordPatch) -> Result<()> {
        let tags_json = serde_json::to_string(&patch.tool_tags)?;
        sqlx::query(
            r#"
            UPDATE records SET
                title        = ?,
                body_text    = ?,
                body_rich    = ?,
                fingerprint  = ?,
                tool_tags    = ?,
                ai_percent   = ?,
                published_at = ?,
                last_seen_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&patch.title)
        .bind(&patch.body_text)
        .bind(&patch.body_rich)
        .bind(&patch.fingerprint)
        .bind(tags_json)
        .bind(patch.ai_percent.map(|v| v as i64))
        .bind(patch.published_at)
        .bind(Utc::now())
        .bind(id)
        .execute(&self.pool)
        .await
        .with_context(|| format!("updating record {id}"))?;

        Ok(())
    }

    async fn recent(&self, limit: u32) -> Result<Vec<StoredRecord>> {
        let rows = sqlx::query("SELECT * FROM records ORDER BY id DESC LIMIT ?")
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.iter().map(record_from_row).collect())
    }
}

fn subject_from_row(row: &SqliteRow) -> Subject {
    Subject {
        id: row.get("id"),
        product_name: row.get("product_name"),
        name_key: row.get("name_key"),
        product_url: row.get("product_url"),
    }
}

#[async_trait]
impl SubjectStore for SqliteStore {
    async fn find_by_url(&self, product_url: &str) -> Result<Option<Subject>> {
        let row = sqlx::query("SELECT * FROM subjects WHERE product_url = ?")
            .bind(product_url)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(|r| subject_from_row(&r)))
    }

    async fn all(&self) -> Result<Vec<Subject>> {
        let rows = sqlx::query("SELECT * FROM subjects ORDER BY id")
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.iter().map(subject_from_row).collect())
    }

    async fn insert(
        &self,
        product_name: &str,
        name_key: &str,
        product_url: Option<&str>,
    ) -> Result<Subject> {
        let result = sqlx::query(
            "INSERT INTO subjects (product_name, name_key, product_url) VALUES (?, ?, ?)",
        )
        .bind(product_name)
        .bind(name_key)
        .bind(product_url)
        .execute(&self.pool)
        .await
        .with_context(|| format!("inserting subject {product_name}"))?;

        Ok(Subject {
            id: result.last_insert_rowid(),
            product_name: product_name.to_string(),
            name_key: name_key.to_string(),
            product_url: product_url.map(str::to_string),
        })
    }
}

fn claim_from_row(row: &SqliteRow) -> ClaimRow {
    let level_label: String = row.get("confidence_level");
    let confidence_level = ConfidenceLevel::parse(&level_label).unwrap_or_else(|| {
        tracing::warn!(target: "store", label = %level_label, "unknown confidence level in claims table");
        ConfidenceLevel::Low
    });

    ClaimRow {
        id: row.get("id"),
        subject_id: row.get("subject_id"),
        monthly_cents: row.get("monthly_cents"),
        annual_cents: row.get("annual_cents"),
        claim_date: row.get("claim_date"),
        derived_from_annual: row.get("derived_from_annual"),
        aspirational: row.get("aspirational"),
        matched_by_name: row.get("matched_by_name"),
        flags: VerificationFlags {
            processor_verified: row.get("processor_verified"),
            public_dashboard: row.get("public_dashboard"),
        },
        extractor_confidence: row.get("extractor_confidence"),
        confidence_level,
        confidence_score: row.get::<i64, _>("confidence_score") as u8,
        confidence_reason: row.get("confidence_reason"),
        created_at: row.get("created_at"),
    }
}

#[async_trait]
impl ClaimStore for SqliteStore {
    async fn insert(&self, claim: NewClaim) -> Result<i64> {
        let result = sqlx::query(
            r#"
            INSERT INTO claims
                (subject_id, monthly_cents, annual_cents, claim_date,
                 derived_from_annual, aspirational, matched_by_name,
                 processor_verified, public_dashboard, extractor_confidence,
                 confidence_level, confidence_score, confidence_reason,
                 created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(claim.subject_id)
        .bind(claim.monthly_cents)
        .bind(claim.annual_cents)
        .bind(claim.claim_date)
        .bind(claim.derived_from_annual)
        .bind(claim.aspirational)
        .bind(claim.matched_by_name)
        .bind(claim.flags.processor_verified)
        .bind(claim.flags.public_dashboard)
        .bind(claim.extractor_confidence)
        .bind(claim.confidence_level.as_str())
        .bind(claim.confidence_score as i64)
        .bind(&claim.confidence_reason)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .context("inserting claim")?;

        Ok(result.last_insert_rowid())
    }

    async fn find_matching(
        &self,
        subject_id: i64,
        monthly_cents: i64,
    ) -> Result<Option<ClaimRow>> {
        let row = sqlx::query(
            "SELECT * FROM claims WHERE subject_id = ? AND monthly_cents = ? ORDER BY id DESC LIMIT 1",
        )
        .bind(subject_id)
        .bind(monthly_cents)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| claim_from_row(&r)))
    }

    async fn update_assessment(
        &self,
        id: i64,
        flags: VerificationFlags,
        report: &ConfidenceReport,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE claims SET
                processor_verified = ?,
                public_dashboard   = ?,
                confidence_level   = ?,
                confidence_score   = ?,
                confidence_reason  = ?
            WHERE id = ?
            "#,
        )
        .bind(flags.processor_verified)
        .bind(flags.public_dashboard)
        .bind(report.level.as_str())
        .bind(report.score as i64)
        .bind(&report.reason)
        .bind(id)
        .execute(&self.pool)
        .await
        .with_context(|| format!("updating assessment for claim {id}"))?;

        Ok(())
    }

    async fn recent(&self, limit: u32) -> Result<Vec<ClaimRow>> {
        let rows = sqlx::query("SELECT * FROM claims ORDER BY id DESC LIMIT ?")
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.iter().map(claim_from_row).collect())
    }
}

#[async_trait]
impl EvidenceStore for SqliteStore {
    async fn append(&self, ev: NewEvidence) -> Result<i64> {
        let result = sqlx::query(
            r#"
            INSERT INTO evidence
                (claim_id, evidence_type, source_url, source_date, raw_text, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(ev.claim_id)
        .bind(ev.evidence_type.as_str())
        .bind(&ev.source_url)
        .bind(ev.source_date)
        .bind(&ev.raw_text)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .with_context(|| format!("appending evidence for claim {}", ev.claim_id))?;

        Ok(result.last_insert_rowid())
    }

    async fn for_claim(&self, claim_id: i64) -> Result<Vec<EvidenceRow>> {
        let rows = sqlx::query("SELECT * FROM evidence WHERE claim_id = ? ORDER BY id")
            .bind(claim_id)
            .fetch_all(&self.pool)
            .await?;

        // Rows with a type label this build does not know are skipped
        // rather than failing the whole scoring pass.
        let mut out = Vec::with_capacity(rows.len());
        for r in &rows {
            let type_label: String = r.get("evidence_type");
            let Some(evidence_type) = EvidenceType::parse(&type_label) else {
                tracing::warn!(target: "store", label = %type_label, claim_id, "unknown evidence type, row skipped");
                continue;
            };
            out.push(EvidenceRow {
                id: r.get("id"),
                claim_id: r.get("claim_id"),
                evidence_type,
                source_url: r.get("source_url"),
                source_date: r.get("source_date"),
                raw_text: r.get("raw_text"),
                created_at: r.get("created_at"),
            });
        }
        Ok(out)
    }
}
