//! Evidence-aggregation confidence model for revenue claims.
//!
//! Scoring is additive over independent factors, then capped downward for
//! thin or low-trust evidence sets. The exact point values are policy and may
//! be recalibrated; the evaluation order, the downward-only caps, and the
//! monotonicity of adding stronger evidence are the contract.
//!
//! Every factor that contributes or caps pushes its label into the reason
//! string, in evaluation order, so a stored rating is auditable from the text
//! alone.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Provenance channel of one piece of evidence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvidenceType {
    /// Live, self-service revenue dashboard anyone can open.
    PublicDashboard,
    /// Long-form interview or podcast transcript.
    Interview,
    /// Listing on a third-party aggregator or marketplace.
    AggregatorListing,
    /// Short social post by the maker.
    SocialPost,
    /// Manually submitted, unverified.
    SelfReported,
}

impl EvidenceType {
    pub fn as_str(self) -> &'static str {
        match self {
            EvidenceType::PublicDashboard => "public_dashboard",
            EvidenceType::Interview => "interview",
            EvidenceType::AggregatorListing => "aggregator_listing",
            EvidenceType::SocialPost => "social_post",
            EvidenceType::SelfReported => "self_reported",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "public_dashboard" => Some(EvidenceType::PublicDashboard),
            "interview" => Some(EvidenceType::Interview),
            "aggregator_listing" => Some(EvidenceType::AggregatorListing),
            "social_post" => Some(EvidenceType::SocialPost),
            "self_reported" => Some(EvidenceType::SelfReported),
            _ => None,
        }
    }

    /// Channels that can be produced unilaterally by the claimant.
    pub fn is_low_trust(self) -> bool {
        matches!(self, EvidenceType::SocialPost | EvidenceType::SelfReported)
    }
}

/// Strong third-party verification signals attached to a claim. These merge
/// upward only: once set by any evidence, never cleared.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationFlags {
    /// Revenue numbers confirmed through a payment processor integration.
    pub processor_verified: bool,
    /// A public self-service dashboard backs the number.
    pub public_dashboard: bool,
}

impl VerificationFlags {
    pub fn any(self) -> bool {
        self.processor_verified || self.public_dashboard
    }

    pub fn merge(self, other: VerificationFlags) -> VerificationFlags {
        VerificationFlags {
            processor_verified: self.processor_verified || other.processor_verified,
            public_dashboard: self.public_dashboard || other.public_dashboard,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfidenceLevel {
    Low,
    Medium,
    High,
}

impl ConfidenceLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            ConfidenceLevel::Low => "low",
            ConfidenceLevel::Medium => "medium",
            ConfidenceLevel::High => "high",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "low" => Some(ConfidenceLevel::Low),
            "medium" => Some(ConfidenceLevel::Medium),
            "high" => Some(ConfidenceLevel::High),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConfidenceReport {
    pub score: u8,
    pub level: ConfidenceLevel,
    pub reason: String,
}

// Additive factors, in evaluation order.
const PROCESSOR_VERIFIED_PTS: u32 = 40;
const PUBLIC_DASHBOARD_PTS: u32 = 35;
const THREE_PLUS_SOURCES_PTS: u32 = 20;
const TWO_SOURCES_PTS: u32 = 10;
const INTERVIEW_PTS: u32 = 15;
const DIVERSE_CHANNELS_PTS: u32 = 10;

// Downward-only caps, in evaluation order.
const SINGLE_SOURCE_CAP: u32 = 35;
const SOCIAL_ONLY_CAP: u32 = 35;
const SELF_REPORTED_CAP: u32 = 20;

const HIGH_THRESHOLD: u32 = 70;
const MEDIUM_THRESHOLD: u32 = 40;

/// Full score over a claim's verification flags and accumulated evidence.
pub fn score(flags: VerificationFlags, evidence: &[EvidenceType]) -> ConfidenceReport {
    if evidence.is_empty() {
        return ConfidenceReport {
            score: 0,
            level: ConfidenceLevel::Low,
            reason: "no evidence recorded".to_string(),
        };
    }

    let mut pts: u32 = 0;
    let mut reasons: Vec<&'static str> = Vec::new();

    if flags.processor_verified {
        pts += PROCESSOR_VERIFIED_PTS;
        reasons.push("payment processor verified");
    }
    if flags.public_dashboard {
        pts += PUBLIC_DASHBOARD_PTS;
        reasons.push("public revenue dashboard");
    }

    let count = evidence.len();
    if count >= 3 {
        pts += THREE_PLUS_SOURCES_PTS;
        reasons.push("three or more corroborating sources");
    } else if count == 2 {
        pts += TWO_SOURCES_PTS;
        reasons.push("two corroborating sources");
    }

    if evidence.contains(&EvidenceType::Interview) {
        pts += INTERVIEW_PTS;
        reasons.push("detailed interview narrative");
    }

    let distinct: BTreeSet<EvidenceType> = evidence.iter().copied().collect();
    if distinct.len() >= 2 {
        pts += DIVERSE_CHANNELS_PTS;
        reasons.push("evidence from multiple channels");
    }

    let mut total = pts.min(100);

    if count == 1 && !flags.any() && total > SINGLE_SOURCE_CAP {
        total = SINGLE_SOURCE_CAP;
        reasons.push("capped: single unverified source");
    }
    if !flags.any()
        && count < 3
        && evidence.iter().all(|t| *t == EvidenceType::SocialPost)
        && total > SOCIAL_ONLY_CAP
    {
        total = SOCIAL_ONLY_CAP;
        reasons.push("capped: social posts only");
    }
    if !flags.any()
        && evidence.iter().all(|t| *t == EvidenceType::SelfReported)
        && total > SELF_REPORTED_CAP
    {
        total = SELF_REPORTED_CAP;
        reasons.push("capped: self-reported only");
    }

    let level = bucket(total);
    let reason = if reasons.is_empty() {
        "no corroborating factors".to_string()
    } else {
        reasons.join("; ")
    };

    ConfidenceReport {
        score: total as u8,
        level,
        reason,
    }
}

fn bucket(score: u32) -> ConfidenceLevel {
    if score >= HIGH_THRESHOLD {
        ConfidenceLevel::High
    } else if score >= MEDIUM_THRESHOLD {
        ConfidenceLevel::Medium
    } else {
        ConfidenceLevel::Low
    }
}

/// Insertion-time estimate used before a full evidence list exists.
/// A simplified decision table; the full [`score`] pass overwrites it
/// as soon as evidence is attached.
pub fn initial_confidence(
    evidence_type: EvidenceType,
    flags: VerificationFlags,
    evidence_count: usize,
) -> ConfidenceLevel {
    if flags.any() {
        return ConfidenceLevel::High;
    }
    if evidence_type == EvidenceType::PublicDashboard {
        return ConfidenceLevel::High;
    }
    if matches!(
        evidence_type,
        EvidenceType::Interview | EvidenceType::AggregatorListing
    ) && evidence_count >= 1
    {
        return ConfidenceLevel::Medium;
    }
    if evidence_type.is_low_trust() && evidence_count >= 3 {
        return ConfidenceLevel::Medium;
    }
    ConfidenceLevel::Low
}
