//! JSON Feed adapter for indie-maker update streams.
//!
//! These feeds carry self-published progress posts, so anything a
//! [`MakerFeedAdapter`] emits is treated as social-post evidence when a
//! revenue claim is extracted from it.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use metrics::{counter, histogram};
use serde::Deserialize;

use crate::collect::{normalize_text, NormalizedItem, SourceAdapter};
use crate::confidence::EvidenceType;

#[derive(Debug, Deserialize)]
struct Feed {
    #[serde(default)]
    items: Vec<FeedItem>,
}

#[derive(Debug, Deserialize)]
struct FeedItem {
    id: Option<String>,
    title: Option<String>,
    content_text: Option<String>,
    content_html: Option<String>,
    url: Option<String>,
    date_published: Option<String>,
    #[serde(default)]
    authors: Vec<Author>,
    /// Link to the product the post is about, distinct from the post url.
    external_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Author {
    name: Option<String>,
    url: Option<String>,
}

pub struct MakerFeedAdapter {
    source_id: String,
    mode: Mode,
}

enum Mode {
    Fixture(String),
    Http { url: String, client: reqwest::Client },
}

impl MakerFeedAdapter {
    pub fn from_fixture(source_id: &str, json: &str) -> Self {
        Self {
            source_id: source_id.to_string(),
            mode: Mode::Fixture(json.to_string()),
        }
    }

    pub fn from_url(source_id: &str, url: &str) -> Self {
        let client = reqwest::Client::builder()
            .user_agent("claimwatch/0.1")
            .connect_timeout(std::time::Duration::from_secs(4))
            .timeout(std::time::Duration::from_secs(15))
            .build()
            .expect("reqwest client");
        Self {
            source_id: source_id.to_string(),
            mode: Mode::Http {
                url: url.to_string(),
                client,
            },
        }
    }

    fn parse_items(&self, json: &str) -> Result<Vec<NormalizedItem>> {
        let t0 = std::time::Instant::now();
        let feed: Feed = serde_json::from_str(json).context("parsing maker json feed")?;

        let mut out = Vec::with_capacity(feed.items.len());
        for it in feed.items {
            let Some(url) = it.url.filter(|u| !u.trim().is_empty()) else {
                tracing::debug!(
                    target: "ingest",
                    source = %self.source_id,
                    "maker feed item without url skipped"
                );
                continue;
            };

            let raw_body = it
                .content_text
                .as_deref()
                .or(it.content_html.as_deref())
                .unwrap_or_default();
            let title = normalize_text(it.title.as_deref().unwrap_or_default());
            let body_text = normalize_text(raw_body);
            if title.is_empty() && body_text.is_empty() {
                continue;
            }

            let author = it.authors.first();
            out.push(NormalizedItem {
                source_id: self.source_id.clone(),
                title,
                url: url.trim().to_string(),
                body_text,
                body_rich: it.content_html.clone(),
                published_at: it
                    .date_published
                    .as_deref()
                    .and_then(parse_rfc3339)
                    .unwrap_or_else(Utc::now),
                external_id: it.id.clone(),
                subject_name: author.and_then(|a| a.name.clone()),
                subject_url: it
                    .external_url
                    .clone()
                    .or_else(|| author.and_then(|a| a.url.clone())),
            });
        }

        let ms = t0.elapsed().as_secs_f64() * 1_000.0;
        histogram!("ingest_parse_ms").record(ms);
        counter!("ingest_items_total").increment(out.len() as u64);
        Ok(out)
    }
}

#[async_trait]
impl SourceAdapter for MakerFeedAdapter {
    async fn fetch_all(&self) -> Result<Vec<NormalizedItem>> {
        match &self.mode {
            Mode::Fixture(json) => self.parse_items(json),
            Mode::Http { url, client } => {
                let body = client
                    .get(url)
                    .send()
                    .await
                    .with_context(|| format!("fetching maker feed {url}"))?
                    .text()
                    .await
                    .context("reading maker feed body")?;
                self.parse_items(&body)
            }
        }
    }

    fn source_id(&self) -> &str {
        &self.source_id
    }

    fn evidence_type(&self) -> Option<EvidenceType> {
        Some(EvidenceType::SocialPost)
    }
}

fn parse_rfc3339(ts: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(ts)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}
