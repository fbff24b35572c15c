// tests/claim_flow.rs
//
// Claim lifecycle over real storage: first sighting, corroboration from
// other channels, flag upgrades, and the confidence trajectory that
// falls out of them.

use std::sync::Arc;

use claimwatch::claims::{ClaimIngestor, ClaimSubmission};
use claimwatch::confidence::{ConfidenceLevel, EvidenceType, VerificationFlags};
use claimwatch::extract::parse_revenue_claim;
use claimwatch::store::{ClaimStore, EvidenceStore, SqliteStore, SubjectStore};

async fn ingestor() -> (ClaimIngestor, Arc<SqliteStore>) {
    let store = Arc::new(SqliteStore::in_memory().await.expect("store"));
    let ingestor = ClaimIngestor::new(store.clone(), store.clone(), store.clone());
    (ingestor, store)
}

fn submission<'a>(
    text: &'a str,
    evidence_type: EvidenceType,
    flags: VerificationFlags,
    source_url: &'a str,
) -> ClaimSubmission<'a> {
    ClaimSubmission {
        subject_name: Some("SnapLedger"),
        subject_url: Some("https://snapledger.app"),
        claim: parse_revenue_claim(text).expect("test text must parse"),
        evidence_type,
        flags,
        source_url,
        source_date: None,
        raw_text: text,
    }
}

#[tokio::test]
async fn confidence_climbs_as_evidence_accumulates() {
    let (ingestor, store) = ingestor().await;
    let text = "SnapLedger crossed $6,200 MRR";

    // 1. A lone social post: nothing corroborates it.
    let first = ingestor
        .ingest(submission(
            text,
            EvidenceType::SocialPost,
            VerificationFlags::default(),
            "https://makerlog.example/posts/1",
        ))
        .await
        .expect("first ingest");
    assert!(!first.corroborated);
    assert_eq!(first.level, ConfidenceLevel::Low);
    assert_eq!(first.score, 0);

    // 2. An interview stating the same number corroborates: two sources
    //    (10) + interview (15) + channel diversity (10) = 35, still Low.
    let second = ingestor
        .ingest(submission(
            text,
            EvidenceType::Interview,
            VerificationFlags::default(),
            "https://podcast.example/ep42",
        ))
        .await
        .expect("second ingest");
    assert!(second.corroborated);
    assert_eq!(second.claim_id, first.claim_id);
    assert_eq!(second.score, 35);
    assert_eq!(second.level, ConfidenceLevel::Low);

    // 3. Processor-verified confirmation: 40 + three sources (20) +
    //    interview (15) + diversity (10) = 85, High.
    let third = ingestor
        .ingest(submission(
            text,
            EvidenceType::SelfReported,
            VerificationFlags {
                processor_verified: true,
                public_dashboard: false,
            },
            "https://verify.example/snapledger",
        ))
        .await
        .expect("third ingest");
    assert!(third.corroborated);
    assert_eq!(third.score, 85);
    assert_eq!(third.level, ConfidenceLevel::High);

    // One claim row, three evidence rows, flags kept.
    let claims = ClaimStore::recent(&*store, 10).await.expect("recent claims");
    assert_eq!(claims.len(), 1);
    assert!(claims[0].flags.processor_verified);
    assert_eq!(claims[0].confidence_score, 85);

    let evidence = store.for_claim(first.claim_id).await.expect("evidence");
    assert_eq!(evidence.len(), 3);
}

#[tokio::test]
async fn a_different_amount_opens_a_new_claim() {
    let (ingestor, store) = ingestor().await;

    let first = ingestor
        .ingest(submission(
            "SnapLedger crossed $6,200 MRR",
            EvidenceType::SocialPost,
            VerificationFlags::default(),
            "https://makerlog.example/posts/1",
        ))
        .await
        .expect("first ingest");

    let second = ingestor
        .ingest(submission(
            "SnapLedger is at $8k MRR now",
            EvidenceType::SocialPost,
            VerificationFlags::default(),
            "https://makerlog.example/posts/2",
        ))
        .await
        .expect("second ingest");

    assert!(!second.corroborated, "a new number is a new claim, not corroboration");
    assert_ne!(second.claim_id, first.claim_id);

    let claims = ClaimStore::recent(&*store, 10).await.expect("recent claims");
    assert_eq!(claims.len(), 2, "claim history is append-only");
    assert_eq!(claims[0].subject_id, claims[1].subject_id);
}

#[tokio::test]
async fn near_identical_names_resolve_to_one_subject() {
    let (ingestor, store) = ingestor().await;
    let text = "crossed $6,200 MRR";

    let first = ingestor
        .ingest(ClaimSubmission {
            subject_name: Some("Snap Ledger"),
            subject_url: None,
            claim: parse_revenue_claim(text).expect("parse"),
            evidence_type: EvidenceType::SocialPost,
            flags: VerificationFlags::default(),
            source_url: "https://makerlog.example/posts/1",
            source_date: None,
            raw_text: text,
        })
        .await
        .expect("first ingest");

    // Same product, sloppier spelling, no url. Name similarity has to
    // carry the match.
    let second = ingestor
        .ingest(ClaimSubmission {
            subject_name: Some("SnapLedger"),
            subject_url: None,
            claim: parse_revenue_claim(text).expect("parse"),
            evidence_type: EvidenceType::AggregatorListing,
            flags: VerificationFlags::default(),
            source_url: "https://aggregator.example/snapledger",
            source_date: None,
            raw_text: text,
        })
        .await
        .expect("second ingest");

    assert!(second.corroborated, "fuzzy name match should corroborate");
    assert_eq!(second.claim_id, first.claim_id);

    let claims = ClaimStore::recent(&*store, 10).await.expect("recent claims");
    assert_eq!(claims.len(), 1);
    // The first sighting registered the subject outright, so the stored
    // claim does not carry the lower-trust name-match marker.
    assert!(!claims[0].matched_by_name);

    let subjects = store.all().await.expect("subjects");
    assert_eq!(subjects.len(), 1, "both spellings must share one subject row");
}

#[tokio::test]
async fn dashboard_flag_from_any_sighting_sticks() {
    let (ingestor, store) = ingestor().await;
    let text = "SnapLedger crossed $6,200 MRR";

    ingestor
        .ingest(submission(
            text,
            EvidenceType::SocialPost,
            VerificationFlags::default(),
            "https://makerlog.example/posts/1",
        ))
        .await
        .expect("first ingest");

    ingestor
        .ingest(submission(
            text,
            EvidenceType::PublicDashboard,
            VerificationFlags {
                processor_verified: false,
                public_dashboard: true,
            },
            "https://open.example/snapledger",
        ))
        .await
        .expect("second ingest");

    // A later weak sighting must not wash the flag back out.
    let third = ingestor
        .ingest(submission(
            text,
            EvidenceType::SocialPost,
            VerificationFlags::default(),
            "https://makerlog.example/posts/2",
        ))
        .await
        .expect("third ingest");

    let claims = ClaimStore::recent(&*store, 10).await.expect("recent claims");
    assert!(claims[0].flags.public_dashboard, "flags only merge upward");
    // Dashboard flag (35) + three sources (20) + diversity (10).
    assert_eq!(third.score, 65);
    assert_eq!(third.level, ConfidenceLevel::Medium);
}
