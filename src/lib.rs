// src/lib.rs
// Public library surface for integration tests (and potential reuse).

pub mod api;
pub mod claims;
pub mod classify;
pub mod collect;
pub mod config;
pub mod confidence;
pub mod fingerprint;
pub mod lock;
pub mod metrics;
pub mod pipeline;
pub mod store;
pub mod upsert;

// Text extractors (revenue claims, tool tags, AI percent)
pub mod extract;

// Shipped source adapters (changelog RSS, maker JSON feeds)
pub mod sources;

// ---- Re-exports for stable public API ----
pub use crate::api::{router, AppState};
pub use crate::claims::{ClaimIngestor, ClaimSubmission};
pub use crate::collect::{collect, NormalizedItem, SourceAdapter};
pub use crate::confidence::{ConfidenceLevel, EvidenceType, VerificationFlags};
pub use crate::extract::parse_revenue_claim;
pub use crate::lock::LockManager;
pub use crate::pipeline::{Pipeline, RunOutcome, INGEST_LOCK_NAME};
pub use crate::store::SqliteStore;
pub use crate::upsert::{RecordEngine, UpsertOutcome};
