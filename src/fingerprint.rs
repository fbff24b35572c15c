//! Content fingerprint for change detection.
//!
//! The fingerprint is a content hash, distinct from the natural key used for
//! identity: lookups never go through it, it only answers "did this record's
//! meaningful content change since we last saw it?".

use chrono::{DateTime, SecondsFormat, Utc};
use sha2::{Digest, Sha256};

/// How many characters of the body participate in the hash. Bounding the
/// prefix keeps hashing cost constant and stops unstable trailing content
/// (comment counts, related-post footers) from churning the fingerprint.
pub const BODY_PREFIX_CHARS: usize = 2_000;

const SEP: &[u8] = &[0x1f];

/// Stable sha256 hex digest over title, url, published timestamp, and a
/// bounded prefix of the body text. Changing this function invalidates every
/// stored fingerprint: each record then reads as "changed" exactly once on
/// the next run.
pub fn fingerprint(title: &str, url: &str, published_at: DateTime<Utc>, body_text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(title.as_bytes());
    hasher.update(SEP);
    hasher.update(url.as_bytes());
    hasher.update(SEP);
    hasher.update(
        published_at
            .to_rfc3339_opts(SecondsFormat::Secs, true)
            .as_bytes(),
    );
    hasher.update(SEP);
    hasher.update(body_prefix(body_text).as_bytes());

    let digest = hasher.finalize();
    let mut out = String::with_capacity(64);
    for b in digest.iter() {
        use std::fmt::Write as _;
        let _ = write!(&mut out, "{b:02x}");
    }
    out
}

/// First `BODY_PREFIX_CHARS` characters of the body, never splitting a
/// UTF-8 code point.
pub fn body_prefix(body: &str) -> &str {
    match body.char_indices().nth(BODY_PREFIX_CHARS) {
        Some((idx, _)) => &body[..idx],
        None => body,
    }
}
