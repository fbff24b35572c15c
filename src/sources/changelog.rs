//! RSS changelog feed adapter (provider capability updates).

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use metrics::{counter, histogram};
use quick_xml::de::from_str;
use serde::Deserialize;
use time::{format_description::well_known::Rfc2822, OffsetDateTime, UtcOffset};

use crate::collect::{normalize_text, NormalizedItem, SourceAdapter};

#[derive(Debug, Deserialize)]
struct Rss {
    channel: Channel,
}

#[derive(Debug, Deserialize)]
struct Channel {
    #[serde(rename = "item", default)]
    item: Vec<Item>,
}

#[derive(Debug, Deserialize)]
struct Item {
    title: Option<String>,
    link: Option<String>,
    #[serde(rename = "pubDate")]
    pub_date: Option<String>,
    description: Option<String>,
}

fn parse_rfc2822(ts: &str) -> Option<DateTime<Utc>> {
    let dt = OffsetDateTime::parse(ts, &Rfc2822).ok()?;
    let secs = dt.to_offset(UtcOffset::UTC).unix_timestamp();
    Utc.timestamp_opt(secs, 0).single()
}

pub struct ChangelogFeedAdapter {
    source_id: String,
    mode: Mode,
}

enum Mode {
    Fixture(String),
    Http { url: String, client: reqwest::Client },
}

impl ChangelogFeedAdapter {
    pub fn from_fixture(source_id: &str, xml: &str) -> Self {
        Self {
            source_id: source_id.to_string(),
            mode: Mode::Fixture(xml.to_string()),
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

    fn parse_items(&self, xml: &str) -> Result<Vec<NormalizedItem>> {
        let t0 = std::time::Instant::now();
        let xml_clean = scrub_html_entities_for_xml(xml);
        let rss: Rss = from_str(&xml_clean).context("parsing changelog rss xml")?;

        let mut out = Vec::with_capacity(rss.channel.item.len());
        for it in rss.channel.item {
            let Some(link) = it.link.filter(|l| !l.trim().is_empty()) else {
                // No URL, no natural key; nothing to upsert against.
                continue;
            };
            let title = normalize_text(it.title.as_deref().unwrap_or_default());
            let body_rich = it.description.clone();
            let body_text = normalize_text(it.description.as_deref().unwrap_or_default());
            if title.is_empty() && body_text.is_empty() {
                continue;
            }

            out.push(NormalizedItem {
                source_id: self.source_id.clone(),
                title,
                url: link.trim().to_string(),
                body_text,
                body_rich,
                // Feeds without a parseable date get "now" rather than a
                // missing field.
                published_at: it
                    .pub_date
                    .as_deref()
                    .and_then(parse_rfc2822)
                    .unwrap_or_else(Utc::now),
                external_id: None,
                subject_name: None,
                subject_url: None,
            });
        }

        let ms = t0.elapsed().as_secs_f64() * 1_000.0;
        histogram!("ingest_parse_ms").record(ms);
        counter!("ingest_items_total").increment(out.len() as u64);
        Ok(out)
    }
}

#[async_trait]
impl SourceAdapter for ChangelogFeedAdapter {
    async fn fetch_all(&self) -> Result<Vec<NormalizedItem>> {
        match &self.mode {
            Mode::Fixture(xml) => self.parse_items(xml),
            Mode::Http { url, client } => {
                let body = client
                    .get(url)
                    .send()
                    .await
                    .with_context(|| format!("fetching changelog feed {url}"))?
                    .text()
                    .await
                    .context("reading changelog feed body")?;
                self.parse_items(&body)
            }
        }
    }

    fn source_id(&self) -> &str {
        &self.source_id
    }

    // Changelogs carry capability updates, never revenue claims, so the
    // default `evidence_type` of None stands.
}

fn scrub_html_entities_for_xml(s: &str) -> String {
    s.replace("&nbsp;", " ")
        .replace("&ndash;", "-")
        .replace("&mdash;", "-")
        .replace("&ldquo;", "\"")
        .replace("&rdquo;", "\"")
        .replace("&lsquo;", "'")
        .replace("&rsquo;", "'")
}

#[cfg(test)]
mod tests {
    use super::*;

    const FEED: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0">
  <channel>
    <title>Acme AI Changelog</title>
    <item>
      <title>Introducing the Horizon model</title>
      <link>https://acme.dev/changelog/horizon</link>
      <pubDate>Mon, 04 Mar 2024 09:30:00 GMT</pubDate>
      <description>&lt;p&gt;Horizon is our new flagship model.&lt;/p&gt;</description>
    </item>
    <item>
      <title>Pricing update</title>
      <link>https://acme.dev/changelog/pricing</link>
      <description>Per-seat pricing drops to $20.</description>
    </item>
    <item>
      <title>No link entry</title>
      <description>Should be skipped.</description>
    </item>
  </channel>
</rss>"#;

    #[tokio::test]
    async fn parses_items_and_normalizes_bodies() {
        let adapter = ChangelogFeedAdapter::from_fixture("acme", FEED);
        let items = adapter.fetch_all().await.unwrap();
        assert_eq!(items.len(), 2);

        assert_eq!(items[0].source_id, "acme");
        assert_eq!(items[0].title, "Introducing the Horizon model");
        assert_eq!(items[0].url, "https://acme.dev/changelog/horizon");
        assert_eq!(items[0].body_text, "Horizon is our new flagship model.");
        assert_eq!(
            items[0].published_at,
            Utc.with_ymd_and_hms(2024, 3, 4, 9, 30, 0).unwrap()
        );
    }

    #[tokio::test]
    async fn missing_pub_date_defaults_to_now() {
        let adapter = ChangelogFeedAdapter::from_fixture("acme", FEED);
        let before = Utc::now();
        let items = adapter.fetch_all().await.unwrap();
        let after = Utc::now();
        assert!(items[1].published_at >= before && items[1].published_at <= after);
    }

    #[tokio::test]
    async fn linkless_items_are_dropped() {
        let adapter = ChangelogFeedAdapter::from_fixture("acme", FEED);
        let items = adapter.fetch_all().await.unwrap();
        assert!(items.iter().all(|i| !i.url.is_empty()));
    }

    #[tokio::test]
    async fn garbage_xml_is_an_error_not_a_panic() {
        let adapter = ChangelogFeedAdapter::from_fixture("acme", "this is not xml at all <<<<");
        assert!(adapter.fetch_all().await.is_err());
    }

    #[test]
    fn rfc2822_parsing() {
        let dt = parse_rfc2822("Tue, 05 Mar 2024 18:00:00 +0200").unwrap();
        assert_eq!(dt, Utc.with_ymd_and_hms(2024, 3, 5, 16, 0, 0).unwrap());
        assert!(parse_rfc2822("not a date").is_none());
    }
}
