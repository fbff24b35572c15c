//! Tool/technology mention extraction against a fixed vocabulary.
//!
//! The vocabulary maps canonical tool names to lowercase alias substrings.
//! Matching is case-insensitive and substring-based, and the result is the
//! deduplicated set of canonical names. Loaded from `config/tools.toml` with
//! a built-in seed as fallback, so a missing or broken file never takes the
//! extractor down.

use once_cell::sync::Lazy;
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet};
use std::{fs, path::Path};

const ENV_TOOLS_PATH: &str = "CLAIMWATCH_TOOLS_PATH";
const DEFAULT_TOOLS_PATH: &str = "config/tools.toml";

#[derive(Debug, Clone, Deserialize)]
pub struct ToolVocabulary {
    /// Canonical name -> alias substrings (lowercase).
    #[serde(default)]
    tools: BTreeMap<String, Vec<String>>,
}

impl ToolVocabulary {
    /// Load the vocabulary from a TOML file, falling back to the built-in
    /// seed on read or parse errors.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Self {
        match fs::read_to_string(path) {
            Ok(s) => toml::from_str(&s).unwrap_or_else(|_| Self::default_seed()),
            Err(_) => Self::default_seed(),
        }
    }

    /// Load from `$CLAIMWATCH_TOOLS_PATH`, then `config/tools.toml`, then the
    /// built-in seed.
    pub fn load_default() -> Self {
        match std::env::var(ENV_TOOLS_PATH) {
            Ok(p) => Self::load_from_file(p),
            Err(_) => Self::load_from_file(DEFAULT_TOOLS_PATH),
        }
    }

    /// Canonical names of every tool whose alias appears in `text`.
    /// Only aliases match; short canonical names like "Make" would fire
    /// on ordinary prose if matched directly.
    pub fn extract(&self, text: &str) -> BTreeSet<String> {
        let haystack = text.to_lowercase();
        let mut out = BTreeSet::new();
        for (canonical, aliases) in &self.tools {
            if aliases.iter().any(|a| !a.is_empty() && haystack.contains(a.as_str())) {
                out.insert(canonical.clone());
            }
        }
        out
    }

    /// Built-in seed covering the tools makers most often build with.
    pub(crate) fn default_seed() -> Self {
        let mut tools = BTreeMap::new();
        for (canonical, aliases) in [
            ("ChatGPT", &["chatgpt", "gpt-4", "gpt-5", "openai"][..]),
            ("Claude", &["claude", "anthropic"][..]),
            ("Gemini", &["gemini"][..]),
            ("Llama", &["llama"][..]),
            ("Copilot", &["copilot"][..]),
            ("Cursor", &["cursor"][..]),
            ("Midjourney", &["midjourney"][..]),
            ("Stable Diffusion", &["stable diffusion", "sdxl"][..]),
            ("Whisper", &["whisper"][..]),
            ("v0", &["v0.dev"][..]),
            ("Replit", &["replit"][..]),
            ("Vercel", &["vercel"][..]),
            ("Supabase", &["supabase"][..]),
            ("Firebase", &["firebase"][..]),
            ("Stripe", &["stripe"][..]),
            ("Next.js", &["next.js", "nextjs"][..]),
            ("Tailwind", &["tailwind"][..]),
            ("Bubble", &["bubble.io"][..]),
            ("Webflow", &["webflow"][..]),
            ("Zapier", &["zapier"][..]),
        ] {
            tools.insert(
                canonical.to_string(),
                aliases.iter().map(|a| a.to_string()).collect(),
            );
        }
        Self { tools }
    }
}

static DEFAULT_VOCABULARY: Lazy<ToolVocabulary> = Lazy::new(ToolVocabulary::load_default);

/// Extract tool tags using the default vocabulary.
pub fn extract_tool_tags(text: &str) -> BTreeSet<String> {
    DEFAULT_VOCABULARY.extract(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vocab() -> ToolVocabulary {
        ToolVocabulary::default_seed()
    }

    #[test]
    fn matches_are_case_insensitive() {
        let tags = vocab().extract("Built the whole thing with CLAUDE and Stripe");
        assert!(tags.contains("Claude"));
        assert!(tags.contains("Stripe"));
    }

    #[test]
    fn aliases_map_to_canonical_names() {
        let tags = vocab().extract("gpt-4 under the hood, deployed on vercel");
        assert!(tags.contains("ChatGPT"));
        assert!(tags.contains("Vercel"));
        assert!(!tags.contains("gpt-4"));
    }

    #[test]
    fn repeated_mentions_dedupe() {
        let tags = vocab().extract("claude, Claude and CLAUDE again");
        assert_eq!(tags.iter().filter(|t| *t == "Claude").count(), 1);
    }

    #[test]
    fn no_mentions_no_tags() {
        assert!(vocab().extract("plain business update, nothing technical").is_empty());
    }

    #[test]
    fn substring_matching_catches_embedded_mentions() {
        let tags = vocab().extract("our nextjs+tailwind stack");
        assert!(tags.contains("Next.js"));
        assert!(tags.contains("Tailwind"));
    }

    #[test]
    fn custom_vocabulary_from_toml() {
        let v: ToolVocabulary = toml::from_str(
            r#"
            [tools]
            "Acme AI" = ["acme", "acme.ai"]
            "#,
        )
        .unwrap();
        let tags = v.extract("shipped with acme.ai last week");
        assert!(tags.contains("Acme AI"));
    }

    #[test]
    fn broken_file_falls_back_to_seed() {
        let v = ToolVocabulary::load_from_file("/nonexistent/tools.toml");
        assert!(!v.extract("using claude").is_empty());
    }

    #[test]
    fn default_vocabulary_function_resolves_tags() {
        let tags = extract_tool_tags("moved billing to stripe, claude drafts the emails");
        assert!(tags.contains("Claude"));
        assert!(tags.contains("Stripe"));
    }
}
