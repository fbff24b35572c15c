//! Concurrent source fan-out with per-source failure isolation.
//!
//! Every adapter runs as its own task; one source being down, slow, or
//! serving garbage never costs us the others' items. `collect` itself cannot
//! fail because a source is unreachable: adapter errors (and panics) become
//! [`SourceFailure`] entries in the outcome.

use crate::confidence::EvidenceType;
use anyhow::Result;
use chrono::{DateTime, Utc};
use metrics::counter;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// The normalized unit of external content, shared by every adapter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedItem {
    pub source_id: String,
    pub title: String,
    pub url: String,
    pub body_text: String,
    #[serde(default)]
    pub body_rich: Option<String>,
    /// Adapters without a usable date supply `Utc::now()` rather than omit
    /// the field.
    pub published_at: DateTime<Utc>,
    #[serde(default)]
    pub external_id: Option<String>,
    /// Maker/product attribution for the claim path, when the source has it.
    #[serde(default)]
    pub subject_name: Option<String>,
    #[serde(default)]
    pub subject_url: Option<String>,
}

/// One external source. `fetch_all` returns `Ok(vec![])` for "no results";
/// it errs only for a true adapter-level failure (network, parse).
#[async_trait::async_trait]
pub trait SourceAdapter: Send + Sync {
    async fn fetch_all(&self) -> Result<Vec<NormalizedItem>>;
    fn source_id(&self) -> &str;
    /// The evidence channel for revenue claims found in this source's items,
    /// or `None` when the source never carries claims (changelogs).
    fn evidence_type(&self) -> Option<EvidenceType> {
        None
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceFailure {
    pub source_id: String,
    pub error: String,
}

#[derive(Debug, Default)]
pub struct CollectOutcome {
    pub items: Vec<NormalizedItem>,
    pub failures: Vec<SourceFailure>,
}

/// Run all adapters concurrently and merge their output. Item order within
/// one adapter is preserved; cross-adapter order is unspecified.
pub async fn collect(adapters: &[Arc<dyn SourceAdapter>]) -> CollectOutcome {
    let mut handles = Vec::with_capacity(adapters.len());
    for adapter in adapters {
        let adapter = Arc::clone(adapter);
        let source_id = adapter.source_id().to_string();
        handles.push((
            source_id,
            tokio::spawn(async move { adapter.fetch_all().await }),
        ));
    }

    let mut outcome = CollectOutcome::default();
    for (source_id, handle) in handles {
        match handle.await {
            Ok(Ok(mut items)) => {
                tracing::debug!(source = %source_id, count = items.len(), "source fetched");
                outcome.items.append(&mut items);
            }
            Ok(Err(e)) => {
                tracing::warn!(source = %source_id, error = ?e, "source adapter failed");
                counter!("ingest_source_errors_total").increment(1);
                outcome.failures.push(SourceFailure {
                    source_id,
                    error: format!("{e:#}"),
                });
            }
            Err(join_err) => {
                tracing::warn!(source = %source_id, error = ?join_err, "source adapter panicked");
                counter!("ingest_source_errors_total").increment(1);
                outcome.failures.push(SourceFailure {
                    source_id,
                    error: join_err.to_string(),
                });
            }
        }
    }
    outcome
}

/// Normalize fetched text: decode HTML entities, strip tags, normalize
/// typographic quotes, collapse whitespace, cap length.
pub fn normalize_text(s: &str) -> String {
    let mut out = html_escape::decode_html_entities(s).to_string();

    static RE_TAGS: once_cell::sync::OnceCell<regex::Regex> = once_cell::sync::OnceCell::new();
    let re_tags = RE_TAGS.get_or_init(|| regex::Regex::new(r"(?is)</?[^>]+>").unwrap());
    out = re_tags.replace_all(&out, " ").to_string();

    out = out
        .replace(['\u{201C}', '\u{201D}', '\u{00AB}', '\u{00BB}'], "\"")
        .replace(['\u{2018}', '\u{2019}'], "'");

    static RE_WS: once_cell::sync::OnceCell<regex::Regex> = once_cell::sync::OnceCell::new();
    let re_ws = RE_WS.get_or_init(|| regex::Regex::new(r"\s+").unwrap());
    out = re_ws.replace_all(&out, " ").to_string();
    out = out.trim().to_string();

    // Cap well past the fingerprint prefix so trailing drift stays detectable
    // as "no change" rather than truncation artifacts.
    if out.chars().count() > 4_000 {
        out = out.chars().take(4_000).collect();
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;

    struct FixedAdapter {
        id: &'static str,
        titles: Vec<&'static str>,
    }

    #[async_trait::async_trait]
    impl SourceAdapter for FixedAdapter {
        async fn fetch_all(&self) -> Result<Vec<NormalizedItem>> {
            Ok(self
                .titles
                .iter()
                .map(|t| NormalizedItem {
                    source_id: self.id.to_string(),
                    title: t.to_string(),
                    url: format!("https://{}/{}", self.id, t),
                    body_text: String::new(),
                    body_rich: None,
                    published_at: Utc::now(),
                    external_id: None,
                    subject_name: None,
                    subject_url: None,
                })
                .collect())
        }

        fn source_id(&self) -> &str {
            self.id
        }
    }

    struct FailingAdapter;

    #[async_trait::async_trait]
    impl SourceAdapter for FailingAdapter {
        async fn fetch_all(&self) -> Result<Vec<NormalizedItem>> {
            Err(anyhow!("connect timeout"))
        }

        fn source_id(&self) -> &str {
            "broken"
        }
    }

    #[tokio::test]
    async fn failing_adapter_is_isolated() {
        let adapters: Vec<Arc<dyn SourceAdapter>> = vec![
            Arc::new(FixedAdapter {
                id: "a",
                titles: vec!["one", "two"],
            }),
            Arc::new(FailingAdapter),
            Arc::new(FixedAdapter {
                id: "b",
                titles: vec!["three"],
            }),
        ];
        let out = collect(&adapters).await;
        assert_eq!(out.items.len(), 3);
        assert_eq!(out.failures.len(), 1);
        assert_eq!(out.failures[0].source_id, "broken");
        assert!(out.failures[0].error.contains("connect timeout"));
    }

    #[tokio::test]
    async fn order_within_one_adapter_is_preserved() {
        let adapters: Vec<Arc<dyn SourceAdapter>> = vec![Arc::new(FixedAdapter {
            id: "a",
            titles: vec!["first", "second", "third"],
        })];
        let out = collect(&adapters).await;
        let titles: Vec<_> = out.items.iter().map(|i| i.title.as_str()).collect();
        assert_eq!(titles, vec!["first", "second", "third"]);
    }

    #[tokio::test]
    async fn empty_adapter_set_yields_empty_outcome() {
        let out = collect(&[]).await;
        assert!(out.items.is_empty());
        assert!(out.failures.is_empty());
    }

    #[test]
    fn normalize_strips_tags_and_entities() {
        let s = "<p>Hello&nbsp;&amp; <b>world</b></p>";
        assert_eq!(normalize_text(s), "Hello & world");
    }

    #[test]
    fn normalize_flattens_quotes_and_whitespace() {
        let s = "  \u{201C}Smart\u{201D}\n\n quotes\u{2019} here  ";
        assert_eq!(normalize_text(s), "\"Smart\" quotes' here");
    }

    #[test]
    fn normalize_caps_length() {
        let s = "x".repeat(10_000);
        assert_eq!(normalize_text(&s).chars().count(), 4_000);
    }
}
