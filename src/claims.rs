//! Claim ingestion: subject resolution, corroboration, re-scoring.
//!
//! Claims are append-only history per subject. A submission stating the
//! same monthly value as an existing claim of the same subject
//! corroborates it (new evidence row, flags merged upward, score
//! recomputed); anything else opens a new claim.

use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Utc};
use metrics::counter;

use crate::confidence::{
    initial_confidence, score, ConfidenceLevel, EvidenceType, VerificationFlags,
};
use crate::extract::RevenueClaim;
use crate::store::{ClaimStore, EvidenceStore, NewClaim, NewEvidence, Subject, SubjectStore};

/// Minimum similarity between name keys before two names are considered
/// the same subject.
const NAME_MATCH_THRESHOLD: f64 = 0.90;

/// The submission named no subject the ingestor could resolve or
/// register. A client-input problem, not a storage failure.
#[derive(Debug)]
pub struct SubjectRequired;

impl std::fmt::Display for SubjectRequired {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("claim subject needs a product name or a known product url")
    }
}

impl std::error::Error for SubjectRequired {}

pub struct ClaimSubmission<'a> {
    pub subject_name: Option<&'a str>,
    pub subject_url: Option<&'a str>,
    pub claim: RevenueClaim,
    pub evidence_type: EvidenceType,
    pub flags: VerificationFlags,
    pub source_url: &'a str,
    pub source_date: Option<DateTime<Utc>>,
    pub raw_text: &'a str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClaimIngest {
    pub claim_id: i64,
    pub corroborated: bool,
    pub level: ConfidenceLevel,
    pub score: u8,
}

pub struct ClaimIngestor {
    subjects: Arc<dyn SubjectStore>,
    claims: Arc<dyn ClaimStore>,
    evidence: Arc<dyn EvidenceStore>,
}

impl ClaimIngestor {
    pub fn new(
        subjects: Arc<dyn SubjectStore>,
        claims: Arc<dyn ClaimStore>,
        evidence: Arc<dyn EvidenceStore>,
    ) -> Self {
        Self {
            subjects,
            claims,
            evidence,
        }
    }

    pub async fn ingest(&self, sub: ClaimSubmission<'_>) -> Result<ClaimIngest> {
        let (subject, matched_by_name) = self
            .resolve_subject(sub.subject_name, sub.subject_url)
            .await?;

        let existing = self
            .claims
            .find_matching(subject.id, sub.claim.monthly_cents)
            .await?;

        let (claim_id, corroborated, merged_flags) = match existing {
            Some(row) => {
                // Corroboration can only strengthen: flags merge upward,
                // never clear.
                (row.id, true, row.flags.merge(sub.flags))
            }
            None => {
                let level = initial_confidence(sub.evidence_type, sub.flags, 1);
                let id = self
                    .claims
                    .insert(NewClaim {
                        subject_id: subject.id,
                        monthly_cents: sub.claim.monthly_cents,
                        annual_cents: sub.claim.annual_cents,
                        claim_date: sub.source_date,
                        derived_from_annual: sub.claim.derived_from_annual,
                        aspirational: sub.claim.aspirational,
                        matched_by_name,
                        flags: sub.flags,
                        extractor_confidence: sub.claim.extractor_confidence,
                        confidence_level: level,
                        confidence_score: 0,
                        confidence_reason: "initial assessment".to_string(),
                    })
                    .await?;
                (id, false, sub.flags)
            }
        };

        self.evidence
            .append(NewEvidence {
                claim_id,
                evidence_type: sub.evidence_type,
                source_url: sub.source_url.to_string(),
                source_date: sub.source_date,
                raw_text: sub.raw_text.to_string(),
            })
            .await?;

        // Full re-score from the complete evidence list; this replaces
        // the insertion-time estimate.
        let rows = self.evidence.for_claim(claim_id).await?;
        let types: Vec<EvidenceType> = rows.iter().map(|r| r.evidence_type).collect();
        let report = score(merged_flags, &types);
        self.claims
            .update_assessment(claim_id, merged_flags, &report)
            .await?;

        if corroborated {
            counter!("claims_corroborated_total").increment(1);
            tracing::info!(
                target: "claims",
                claim_id,
                subject = %subject.product_name,
                evidence_rows = rows.len(),
                level = report.level.as_str(),
                "claim corroborated"
            );
        } else {
            counter!("claims_recorded_total").increment(1);
            tracing::info!(
                target: "claims",
                claim_id,
                subject = %subject.product_name,
                monthly_cents = sub.claim.monthly_cents,
                level = report.level.as_str(),
                "claim recorded"
            );
        }

        Ok(ClaimIngest {
            claim_id,
            corroborated,
            level: report.level,
            score: report.score,
        })
    }

    /// Resolves the subject a claim is about.
    ///
    /// Exact `product_url` match wins. Without one, the name is matched
    /// fuzzily against known subjects; that path is flagged so the claim
    /// records its weaker provenance. An unknown subject is registered,
    /// which requires at least a name.
    async fn resolve_subject(
        &self,
        name: Option<&str>,
        url: Option<&str>,
    ) -> Result<(Subject, bool)> {
        let name = name.map(str::trim).filter(|n| !n.is_empty());
        let url = url.map(str::trim).filter(|u| !u.is_empty());

        if let Some(url) = url {
            if let Some(subject) = self.subjects.find_by_url(url).await? {
                return Ok((subject, false));
            }
        }

        if let Some(name) = name {
            let key = name_key(name);
            let mut best: Option<(Subject, f64)> = None;
            for candidate in self.subjects.all().await? {
                let sim = strsim::normalized_levenshtein(&key, &candidate.name_key);
                if sim >= NAME_MATCH_THRESHOLD
                    && best.as_ref().map_or(true, |(_, b)| sim > *b)
                {
                    best = Some((candidate, sim));
                }
            }
            if let Some((subject, sim)) = best {
                tracing::debug!(
                    target: "claims",
                    submitted = name,
                    matched = %subject.product_name,
                    similarity = sim,
                    "subject matched by name"
                );
                return Ok((subject, true));
            }

            let subject = self.subjects.insert(name, &key, url).await?;
            tracing::info!(target: "claims", subject = %subject.product_name, "new claim subject registered");
            return Ok((subject, false));
        }

        Err(SubjectRequired.into())
    }
}

/// Lowercased, punctuation-free, whitespace-collapsed form of a product
/// name, used for fuzzy subject matching.
pub fn name_key(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for ch in name.to_lowercase().chars() {
        if ch.is_alphanumeric() {
            out.push(ch);
        } else if ch.is_whitespace() && !out.is_empty() && !out.ends_with(' ') {
            out.push(' ');
        }
    }
    out.trim_end().to_string()
}
