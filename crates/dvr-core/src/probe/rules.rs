//! Site signal rules: which responses to watch for and how to read the
//! target value out of them.
//!
//! A rule set has a primary signal and an optional secondary one. The
//! secondary stage exists for embed-player sites where the page first
//! reveals an embed URL and only the embed page's own requests reveal
//! the manifest.

use std::path::Path;

use anyhow::Context;
use regex::Regex;
use serde::Deserialize;
use url::Url;

/// Where the target value of a matched response comes from.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(try_from = "String")]
pub enum ValueSource {
    /// The response URL itself is the value.
    ResponseUrl,
    /// A field of the JSON response body, `.`-separated for nesting.
    Json { field: String },
}

impl Default for ValueSource {
    fn default() -> Self {
        ValueSource::ResponseUrl
    }
}

impl TryFrom<String> for ValueSource {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        if s == "response-url" {
            return Ok(ValueSource::ResponseUrl);
        }
        if let Some(field) = s.strip_prefix("json:") {
            if field.is_empty() {
                return Err("\"json:\" needs a field name".to_string());
            }
            return Ok(ValueSource::Json { field: field.to_string() });
        }
        Err(format!(
            "unknown value source {s:?}, expected \"response-url\" or \"json:<field>\""
        ))
    }
}

/// One observation stage: what a matching response URL looks like and
/// where to find the value.
#[derive(Debug, Clone, Deserialize)]
pub struct SignalRule {
    /// Substrings that must all appear in a response URL for it to match.
    #[serde(default)]
    pub url_contains: Vec<String>,
    #[serde(default)]
    pub value: ValueSource,
    /// Regex tried against raw HTML when the observer never fires. The
    /// first capture group is the value; with no groups, the whole match.
    #[serde(default)]
    pub html_fallback: Option<String>,
}

impl SignalRule {
    /// True when every configured substring appears in `url`. A rule
    /// with no substrings never matches; such rules rely on
    /// `html_fallback` alone.
    pub fn matches_url(&self, url: &str) -> bool {
        !self.url_contains.is_empty() && self.url_contains.iter().all(|s| url.contains(s))
    }
}

/// What the discovered URL points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetKind {
    /// A segment playlist; fetch, resolve, pool-download, remux.
    Manifest,
    /// The asset itself; single-stream download.
    Direct,
}

/// Full per-site rule set, loadable from a small TOML file.
#[derive(Debug, Clone, Deserialize)]
pub struct ProbeRules {
    pub primary: SignalRule,
    #[serde(default)]
    pub secondary: Option<SignalRule>,
    #[serde(default = "default_kind")]
    pub kind: AssetKind,
    /// Segments are served undisguised; skip carrier extraction.
    #[serde(default)]
    pub plain: bool,
}

fn default_kind() -> AssetKind {
    AssetKind::Manifest
}

impl ProbeRules {
    pub fn from_toml(text: &str) -> anyhow::Result<Self> {
        let rules: ProbeRules = toml::from_str(text)?;
        rules.validate()?;
        Ok(rules)
    }

    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading rules file {}", path.display()))?;
        Self::from_toml(&text).with_context(|| format!("parsing rules file {}", path.display()))
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        validate_rule("primary", &self.primary)?;
        if let Some(rule) = &self.secondary {
            validate_rule("secondary", rule)?;
        }
        Ok(())
    }
}

fn validate_rule(which: &str, rule: &SignalRule) -> anyhow::Result<()> {
    if rule.url_contains.is_empty() && rule.html_fallback.is_none() {
        anyhow::bail!("{which} rule needs url_contains entries or an html_fallback pattern");
    }
    if let Some(pattern) = &rule.html_fallback {
        Regex::new(pattern).map_err(|e| anyhow::anyhow!("{which} html_fallback: {e}"))?;
    }
    Ok(())
}

/// Cleans a value pulled out of page script or JSON before it is used as
/// a URL: unescapes backslashes and entities, trims stray quotes and
/// drops query/fragment noise.
pub fn normalize_discovered_url(raw: &str) -> String {
    let stripped = raw.trim().trim_matches(|c| c == '"' || c == '\'');
    let unescaped = unescape_entities(&stripped.replace("\\/", "/"));
    let clean = unescaped.trim().trim_matches(|c| c == '"' || c == '\'');
    match Url::parse(clean) {
        Ok(mut url) => {
            url.set_query(None);
            url.set_fragment(None);
            url.to_string()
        }
        Err(_) => clean.to_string(),
    }
}

fn unescape_entities(s: &str) -> String {
    // The handful of entities that actually show up in data-item blobs.
    s.replace("&quot;", "\"")
        .replace("&#34;", "\"")
        .replace("&#39;", "'")
        .replace("&apos;", "'")
        .replace("&#47;", "/")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
}

/// First capture group (or whole match) of `pattern` in `text`.
pub(crate) fn first_capture(pattern: &str, text: &str) -> Option<String> {
    let re = match Regex::new(pattern) {
        Ok(re) => re,
        Err(err) => {
            tracing::warn!(pattern, error = %err, "unusable fallback pattern");
            return None;
        }
    };
    let caps = re.captures(text)?;
    caps.get(1)
        .or_else(|| caps.get(0))
        .map(|m| m.as_str().to_string())
}
