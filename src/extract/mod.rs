//! Free-text fact extraction.
//!
//! [`parse_revenue_claim`] turns maker prose ("crossed $10k MRR this week!")
//! into a structured monthly revenue figure in integer cents. It prefers a
//! stated monthly value, falls back to deriving one from an annual value, and
//! refuses ambiguous input (numeric ranges) outright. Auxiliary extractors
//! live in [`tags`] (tool vocabulary) and [`percent`] (AI-assistance share).

pub mod percent;
pub mod tags;

pub use percent::extract_ai_percent;
pub use tags::{extract_tool_tags, ToolVocabulary};

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

/// Extractor confidence for a directly stated monthly figure.
pub const STATED_CONFIDENCE: f64 = 0.9;
/// Extractor confidence for a monthly figure derived from an annual one:
/// calculated, not stated, so it starts lower.
pub const DERIVED_CONFIDENCE: f64 = 0.6;

/// A structured revenue claim parsed out of free text. Amounts are integer
/// cents; floats never leave this module.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RevenueClaim {
    pub monthly_cents: i64,
    /// Present only when the monthly value was derived from an annual figure.
    pub annual_cents: Option<i64>,
    pub derived_from_annual: bool,
    /// Forward-looking phrasing ("targeting", "aiming for") was present; the
    /// number may be a goal rather than an achieved fact.
    pub aspirational: bool,
    pub extractor_confidence: f64,
}

// Two numeric amounts joined by a dash where either side looks like money
// ($-prefixed, or bare with a scale suffix). Plain digit pairs like dates
// ("2024-03-01") deliberately do not qualify.
static RE_RANGE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?ix)
        (?: \$\s*\d[\d,]*(?:\.\d+)?\s*(?:thousand|million|k|m)?
          | \d[\d,]*(?:\.\d+)?\s*(?:thousand|million|k|m) )
        \s*[-\x{2013}\x{2014}]\s*
        (?: \$\s*\d[\d,]*(?:\.\d+)?\s*(?:thousand|million|k|m)?
          | \d[\d,]*(?:\.\d+)?\s*(?:thousand|million|k|m) )",
    )
    .unwrap()
});

static RE_ASPIRATIONAL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(?:targeting|aiming\s+for|projected|projecting|hope\s+to|hoping\s+to|goal\s+of|on\s+track\s+to)\b")
        .unwrap()
});

// Monthly family: an explicit MRR label before or after the amount, or a
// money-looking amount followed by a per-month cue. The label-before form
// only bridges over a short connector ("MRR is now $5k", "MRR: $1.2M") so it
// cannot wander into an unrelated amount later in the sentence.
static RE_MONTHLY_LABEL_BEFORE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?ix)
        \bmrr\b
        (?: \s*[:=~] | \s+(?:of|at|is|now|hit|just|reached|crossed|passed|around|about) ){0,3}
        \s*\$?\s*
        (?P<amt>\d[\d,]*(?:\.\d+)?)
        \s*(?P<scale>thousand|million|k|m)?",
    )
    .unwrap()
});

static RE_MONTHLY_LABEL_AFTER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\$?\s*(?P<amt>\d[\d,]*(?:\.\d+)?)\s*(?P<scale>thousand|million|k|m)?\s*(?:in\s+)?mrr\b",
    )
    .unwrap()
});

static RE_MONTHLY_UNIT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?ix)
        (?: \$\s*(?P<amt>\d[\d,]*(?:\.\d+)?)\s*(?P<scale>thousand|million|k|m)?
          | (?P<bamt>\d[\d,]*(?:\.\d+)?)\s*(?P<bscale>thousand|million|k|m) )
        \s*(?: /\s*(?:month|mo)\b | per\s+month\b | a\s+month\b | monthly\b )",
    )
    .unwrap()
});

// Annual family mirrors the monthly one.
static RE_ANNUAL_LABEL_BEFORE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?ix)
        \barr\b
        (?: \s*[:=~] | \s+(?:of|at|is|now|hit|just|reached|crossed|passed|around|about) ){0,3}
        \s*\$?\s*
        (?P<amt>\d[\d,]*(?:\.\d+)?)
        \s*(?P<scale>thousand|million|k|m)?",
    )
    .unwrap()
});

static RE_ANNUAL_LABEL_AFTER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\$?\s*(?P<amt>\d[\d,]*(?:\.\d+)?)\s*(?P<scale>thousand|million|k|m)?\s*(?:in\s+)?arr\b",
    )
    .unwrap()
});

static RE_ANNUAL_UNIT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?ix)
        (?: \$\s*(?P<amt>\d[\d,]*(?:\.\d+)?)\s*(?P<scale>thousand|million|k|m)?
          | (?P<bamt>\d[\d,]*(?:\.\d+)?)\s*(?P<bscale>thousand|million|k|m) )
        \s*(?: /\s*(?:year|yr)\b | per\s+year\b | a\s+year\b | annually\b )",
    )
    .unwrap()
});

/// Parse a revenue claim out of free text.
///
/// Monthly patterns win; annual patterns are attempted only when no monthly
/// match exists, and the derived monthly value is `round(annual / 12)`.
/// Returns `None` for numeric ranges and for text with no recognizable
/// pattern; unparseable text is not an error.
pub fn parse_revenue_claim(text: &str) -> Option<RevenueClaim> {
    // A range anywhere poisons the whole text: "between $5k-$10k" is never a
    // point claim, and guessing a midpoint would fabricate data.
    if RE_RANGE.is_match(text) {
        return None;
    }

    let aspirational = RE_ASPIRATIONAL.is_match(text);

    let monthly_res = [
        &*RE_MONTHLY_LABEL_BEFORE,
        &*RE_MONTHLY_LABEL_AFTER,
        &*RE_MONTHLY_UNIT,
    ];
    if let Some(cents) = first_amount(text, &monthly_res) {
        let mut confidence = STATED_CONFIDENCE;
        if aspirational {
            confidence /= 2.0;
        }
        return Some(RevenueClaim {
            monthly_cents: cents,
            annual_cents: None,
            derived_from_annual: false,
            aspirational,
            extractor_confidence: confidence,
        });
    }

    let annual_res = [
        &*RE_ANNUAL_LABEL_BEFORE,
        &*RE_ANNUAL_LABEL_AFTER,
        &*RE_ANNUAL_UNIT,
    ];
    if let Some(annual) = first_amount(text, &annual_res) {
        let monthly = ((annual as f64) / 12.0).round() as i64;
        let mut confidence = DERIVED_CONFIDENCE;
        if aspirational {
            confidence /= 2.0;
        }
        return Some(RevenueClaim {
            monthly_cents: monthly,
            annual_cents: Some(annual),
            derived_from_annual: true,
            aspirational,
            extractor_confidence: confidence,
        });
    }

    None
}

fn first_amount(text: &str, patterns: &[&Regex]) -> Option<i64> {
    for re in patterns {
        let Some(caps) = re.captures(text) else {
            continue;
        };
        let Some(amt) = caps.name("amt").or_else(|| caps.name("bamt")) else {
            continue;
        };
        let scale = caps
            .name("scale")
            .or_else(|| caps.name("bscale"))
            .map(|m| m.as_str());
        if let Some(cents) = to_cents(amt.as_str(), scale) {
            return Some(cents);
        }
    }
    None
}

/// Strip thousands separators, apply the scale multiplier, convert to cents.
fn to_cents(raw: &str, scale: Option<&str>) -> Option<i64> {
    let cleaned = raw.replace(',', "");
    let base: f64 = cleaned.parse().ok()?;
    let mult = match scale.map(|s| s.to_ascii_lowercase()).as_deref() {
        Some("k") | Some("thousand") => 1_000.0,
        Some("m") | Some("million") => 1_000_000.0,
        _ => 1.0,
    };
    let cents = (base * mult * 100.0).round();
    // Reject nonsense before it can wrap an i64.
    if !cents.is_finite() || cents < 0.0 || cents > 9.0e17 {
        return None;
    }
    Some(cents as i64)
}
