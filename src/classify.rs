//! Record classification: what kind of provider update a record is.
//!
//! Classification runs once, on first insert. A record whose classifier
//! errored or had no opinion stays unclassified; later content changes
//! never re-trigger it.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateKind {
    NewModel,
    NewFeature,
    PriceChange,
    Deprecation,
    Other,
}

impl UpdateKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            UpdateKind::NewModel => "new_model",
            UpdateKind::NewFeature => "new_feature",
            UpdateKind::PriceChange => "price_change",
            UpdateKind::Deprecation => "deprecation",
            UpdateKind::Other => "other",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "new_model" => Some(UpdateKind::NewModel),
            "new_feature" => Some(UpdateKind::NewFeature),
            "price_change" => Some(UpdateKind::PriceChange),
            "deprecation" => Some(UpdateKind::Deprecation),
            "other" => Some(UpdateKind::Other),
            _ => None,
        }
    }
}

#[async_trait]
pub trait Classifier: Send + Sync {
    /// `Ok(None)` means "no opinion" (disabled, or an unusable reply) and
    /// leaves the record unclassified. `Err` is a transport failure.
    async fn classify(&self, title: &str, body: &str) -> Result<Option<UpdateKind>>;
    fn name(&self) -> &'static str;
}

/// Keyword classifier; always has an opinion. Rule order matters:
/// deprecations and price changes use launch-like wording too, so they
/// are checked first.
pub struct HeuristicClassifier;

impl HeuristicClassifier {
    fn classify_text(text: &str) -> UpdateKind {
        let t = text.to_lowercase();

        if contains_any(
            &t,
            &["deprecat", "sunset", "end-of-life", "end of life", "shutting down", "discontinu", "retiring"],
        ) {
            return UpdateKind::Deprecation;
        }

        if contains_any(
            &t,
            &["price", "pricing", "per seat", "per-seat", "cheaper", "billing", "free tier"],
        ) {
            return UpdateKind::PriceChange;
        }

        let launch_like = contains_any(
            &t,
            &["introduc", "launch", "releas", "announc", "unveil", "now available", "available today", "rolling out"],
        );
        if launch_like && contains_any(&t, &["model", "weights", "llm"]) {
            return UpdateKind::NewModel;
        }
        if launch_like || contains_any(&t, &["new feature", "now supports", "support for", "adds "]) {
            return UpdateKind::NewFeature;
        }

        UpdateKind::Other
    }
}

#[async_trait]
impl Classifier for HeuristicClassifier {
    async fn classify(&self, title: &str, body: &str) -> Result<Option<UpdateKind>> {
        Ok(Some(Self::classify_text(&format!("{title} {body}"))))
    }

    fn name(&self) -> &'static str {
        "heuristic"
    }
}

fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    needles.iter().any(|n| haystack.contains(n))
}

/// Chat-completions classifier. Requires `OPENAI_API_KEY`; an empty key
/// makes every call a no-opinion rather than an error.
pub struct ModelBackedClassifier {
    http: reqwest::Client,
    api_key: String,
    model: String,
}

impl ModelBackedClassifier {
    pub fn new(model_override: Option<&str>) -> Self {
        let api_key = std::env::var("OPENAI_API_KEY").unwrap_or_default();
        let http = reqwest::Client::builder()
            .user_agent("claimwatch/0.1")
            .connect_timeout(Duration::from_secs(4))
            .timeout(Duration::from_secs(10))
            .build()
            .expect("reqwest client");
        Self {
            http,
            api_key,
            model: model_override.unwrap_or("gpt-4o-mini").to_string(),
        }
    }
}

#[async_trait]
impl Classifier for ModelBackedClassifier {
    async fn classify(&self, title: &str, body: &str) -> Result<Option<UpdateKind>> {
        if self.api_key.is_empty() {
            return Ok(None);
        }

        #[derive(Serialize)]
        struct Msg<'a> {
            role: &'a str,
            content: &'a str,
        }
        #[derive(Serialize)]
        struct Req<'a> {
            model: &'a str,
            messages: Vec<Msg<'a>>,
            temperature: f32,
            max_tokens: u32,
        }
        #[derive(Deserialize)]
        struct Resp {
            choices: Vec<Choice>,
        }
        #[derive(Deserialize)]
        struct Choice {
            message: ChoiceMsg,
        }
        #[derive(Deserialize)]
        struct ChoiceMsg {
            content: String,
        }

        let sys = "You label AI-provider update announcements. Reply with exactly one of: \
                   new_model, new_feature, price_change, deprecation, other. Output only the label.";
        let snippet: String = body.chars().take(1_200).collect();
        let user = format!("Title: {title}\n\n{snippet}");
        let req = Req {
            model: &self.model,
            messages: vec![
                Msg { role: "system", content: sys },
                Msg { role: "user", content: &user },
            ],
            temperature: 0.0,
            max_tokens: 8,
        };

        let resp = self
            .http
            .post("https://api.openai.com/v1/chat/completions")
            .bearer_auth(&self.api_key)
            .json(&req)
            .send()
            .await
            .context("classifier request")?;

        if !resp.status().is_success() {
            anyhow::bail!("classifier returned {}", resp.status());
        }

        let reply: Resp = resp.json().await.context("decoding classifier reply")?;
        let label = reply
            .choices
            .first()
            .map(|c| c.message.content.trim().to_lowercase())
            .unwrap_or_default();
        Ok(UpdateKind::parse(&label))
    }

    fn name(&self) -> &'static str {
        "model"
    }
}

/// Factory keyed on `CLAIMWATCH_CLASSIFIER`: `model` builds the remote
/// classifier, anything else (or unset) the keyword heuristic.
pub fn build_classifier() -> Arc<dyn Classifier> {
    match std::env::var("CLAIMWATCH_CLASSIFIER").as_deref() {
        Ok("model") => Arc::new(ModelBackedClassifier::new(None)),
        _ => Arc::new(HeuristicClassifier),
    }
}
