//! "How much of this was built by AI" percentage extraction.
//!
//! Posts often carry a figure like "80% of the code was written by Claude".
//! A bare percentage is not enough; it must sit near a build-related trigger
//! word, otherwise "grew 40% MoM" would read as an AI share.

use once_cell::sync::Lazy;
use regex::Regex;

// Trigger words on either side of the percentage, within a short window that
// does not cross sentence boundaries. The number pattern only admits 0-100 so
// an out-of-range figure ("400% more leads") cannot shadow a valid one later
// in the same clause.
static RE_TRIGGER_THEN_PCT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(?:built|using|written|generated|ai-assisted|coded)\b[^.\n]{0,40}?\b(100|\d{1,2})\s*%",
    )
    .unwrap()
});

static RE_PCT_THEN_TRIGGER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(100|\d{1,2})\s*%[^.\n]{0,40}?\b(?:built|using|written|generated|ai-assisted|coded)\b",
    )
    .unwrap()
});

/// First integer percentage in `0..=100` adjacent to a trigger word, else
/// `None`. "First" is by position in the text, whichever side the trigger
/// sits on.
pub fn extract_ai_percent(text: &str) -> Option<u8> {
    let mut best: Option<(usize, u8)> = None;
    for re in [&*RE_TRIGGER_THEN_PCT, &*RE_PCT_THEN_TRIGGER] {
        for caps in re.captures_iter(text) {
            let Some(group) = caps.get(1) else { continue };
            let Ok(value) = group.as_str().parse::<u8>() else {
                continue;
            };
            if best.map_or(true, |(at, _)| group.start() < at) {
                best = Some((group.start(), value));
            }
        }
    }
    best.map(|(_, v)| v)
}
