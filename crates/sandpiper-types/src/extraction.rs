//! Extraction request/result types and per-strategy option structs.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// What kind of content an extraction request pulls out of a page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtractionKind {
    Html,
    Css,
    Json,
}

impl ExtractionKind {
    /// Canonical lowercase name, used in cache fingerprints and storage.
    pub fn as_str(&self) -> &'static str {
        match self {
            ExtractionKind::Html => "html",
            ExtractionKind::Css => "css",
            ExtractionKind::Json => "json",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "html" => Some(ExtractionKind::Html),
            "css" => Some(ExtractionKind::Css),
            "json" => Some(ExtractionKind::Json),
            _ => None,
        }
    }
}

impl fmt::Display for ExtractionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Condition under which a navigation is considered complete.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WaitPolicy {
    /// All resources loaded (window `load` event).
    #[default]
    Load,
    /// DOM parsed, subresources may still be in flight.
    #[serde(rename = "domcontentloaded")]
    DomContentLoaded,
    /// Network has gone quiet after load.
    #[serde(rename = "networkidle")]
    NetworkIdle,
}

impl WaitPolicy {
    /// Canonical lowercase name, used in cache fingerprints.
    pub fn as_str(&self) -> &'static str {
        match self {
            WaitPolicy::Load => "load",
            WaitPolicy::DomContentLoaded => "domcontentloaded",
            WaitPolicy::NetworkIdle => "networkidle",
        }
    }
}

impl fmt::Display for WaitPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Options recognized by the HTML extraction strategy.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase", deny_unknown_fields)]
pub struct HtmlOptions {
    /// Extract every match instead of only the first.
    pub multiple: bool,
    /// Return outer HTML (the element itself) rather than inner HTML.
    pub include_outer: bool,
    /// Collapse runs of whitespace between tags.
    pub clean_html: bool,
    /// Strip `<script>` elements from the result.
    pub remove_scripts: bool,
    /// Strip HTML comments from the result.
    pub remove_comments: bool,
    /// Normalize all whitespace to single spaces.
    pub normalize_whitespace: bool,
}

/// Rendering of the CSS strategy's collected rules.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CssFormat {
    #[default]
    Text,
    Json,
}

impl CssFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            CssFormat::Text => "text",
            CssFormat::Json => "json",
        }
    }
}

/// Options recognized by the CSS extraction strategy.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase", deny_unknown_fields)]
pub struct CssOptions {
    /// Collect styles for every match instead of only the first.
    pub multiple: bool,
    /// Output rendering: plain CSS text or a JSON rule list.
    pub format: CssFormat,
}

/// Options recognized by the JSON extraction strategy.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase", deny_unknown_fields)]
pub struct JsonOptions {
    /// Apply the schema to every match of the root selector, yielding an array.
    pub multiple: bool,
    /// Field-name to sub-selector mapping. A selector may end in `@attr` to
    /// read an attribute instead of text. Absent schema yields
    /// `{text, html, attributes}` for the root element.
    pub schema: Option<HashMap<String, String>>,
}

/// Per-kind option struct, tagged to match [`ExtractionKind`].
///
/// Each strategy enumerates its recognized keys; unknown keys in client
/// input are rejected at deserialization instead of silently ignored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ExtractionOptions {
    Html(HtmlOptions),
    Css(CssOptions),
    Json(JsonOptions),
}

impl ExtractionOptions {
    /// Parse client-supplied options for the given kind. Unknown keys are
    /// rejected rather than silently ignored; `None` yields the kind's
    /// defaults.
    pub fn from_value(
        kind: ExtractionKind,
        value: Option<serde_json::Value>,
    ) -> Result<Self, serde_json::Error> {
        let value = match value {
            Some(v) => v,
            None => return Ok(Self::default_for(kind)),
        };
        Ok(match kind {
            ExtractionKind::Html => ExtractionOptions::Html(serde_json::from_value(value)?),
            ExtractionKind::Css => ExtractionOptions::Css(serde_json::from_value(value)?),
            ExtractionKind::Json => ExtractionOptions::Json(serde_json::from_value(value)?),
        })
    }

    /// Default options for the given kind.
    pub fn default_for(kind: ExtractionKind) -> Self {
        match kind {
            ExtractionKind::Html => ExtractionOptions::Html(HtmlOptions::default()),
            ExtractionKind::Css => ExtractionOptions::Css(CssOptions::default()),
            ExtractionKind::Json => ExtractionOptions::Json(JsonOptions::default()),
        }
    }

    /// True when the variant matches the request kind.
    pub fn matches_kind(&self, kind: ExtractionKind) -> bool {
        matches!(
            (self, kind),
            (ExtractionOptions::Html(_), ExtractionKind::Html)
                | (ExtractionOptions::Css(_), ExtractionKind::Css)
                | (ExtractionOptions::Json(_), ExtractionKind::Json)
        )
    }

    /// Canonical `key=value` pairs, sorted by key.
    ///
    /// This is the option rendering that feeds the cache fingerprint, so the
    /// output must be deterministic: fields at their default value are
    /// omitted, remaining keys are sorted lexicographically.
    pub fn canonical_pairs(&self) -> Vec<(String, String)> {
        let mut pairs: Vec<(String, String)> = Vec::new();
        match self {
            ExtractionOptions::Html(o) => {
                push_flag(&mut pairs, "cleanHTML", o.clean_html);
                push_flag(&mut pairs, "includeOuter", o.include_outer);
                push_flag(&mut pairs, "multiple", o.multiple);
                push_flag(&mut pairs, "normalizeWhitespace", o.normalize_whitespace);
                push_flag(&mut pairs, "removeComments", o.remove_comments);
                push_flag(&mut pairs, "removeScripts", o.remove_scripts);
            }
            ExtractionOptions::Css(o) => {
                if o.format != CssFormat::default() {
                    pairs.push(("format".into(), o.format.as_str().into()));
                }
                push_flag(&mut pairs, "multiple", o.multiple);
            }
            ExtractionOptions::Json(o) => {
                push_flag(&mut pairs, "multiple", o.multiple);
                if let Some(schema) = &o.schema {
                    let mut fields: Vec<(&String, &String)> = schema.iter().collect();
                    fields.sort_by(|a, b| a.0.cmp(b.0));
                    let rendered = fields
                        .iter()
                        .map(|(k, v)| format!("{}:{}", k, v))
                        .collect::<Vec<_>>()
                        .join(";");
                    pairs.push(("schema".into(), rendered));
                }
            }
        }
        pairs.sort_by(|a, b| a.0.cmp(&b.0));
        pairs
    }
}

fn push_flag(pairs: &mut Vec<(String, String)>, key: &str, value: bool) {
    if value {
        pairs.push((key.to_string(), "true".to_string()));
    }
}

/// A validated extraction request. A request is a value: its cache
/// fingerprint is a deterministic digest of all fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionRequest {
    /// Target page URL.
    pub url: String,
    /// What to extract.
    pub kind: ExtractionKind,
    /// CSS selector addressing the element(s).
    pub selector: String,
    /// Navigation wait policy.
    #[serde(default)]
    pub wait: WaitPolicy,
    /// Strategy options; defaults to the kind's default option struct.
    pub options: ExtractionOptions,
}

impl ExtractionRequest {
    pub fn new(url: impl Into<String>, kind: ExtractionKind, selector: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            kind,
            selector: selector.into(),
            wait: WaitPolicy::default(),
            options: ExtractionOptions::default_for(kind),
        }
    }

    pub fn with_wait(mut self, wait: WaitPolicy) -> Self {
        self.wait = wait;
        self
    }

    pub fn with_options(mut self, options: ExtractionOptions) -> Self {
        self.options = options;
        self
    }

    /// The canonical string the cache fingerprint is computed over:
    /// `url|kind|selector|wait|opts` with `opts` a comma-joined, key-sorted
    /// `key=value` sequence.
    pub fn canonical_string(&self) -> String {
        let opts = self
            .options
            .canonical_pairs()
            .into_iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join(",");
        format!(
            "{}|{}|{}|{}|{}",
            self.url,
            self.kind.as_str(),
            self.selector,
            self.wait.as_str(),
            opts
        )
    }
}

/// Raw output of one extraction strategy, before the coordinator attaches
/// timing and cache information.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyOutput {
    /// Extracted payload: HTML/CSS text or serialized JSON.
    pub data: String,
    /// Number of elements the selector matched. Zero matches is a valid
    /// answer, not an error.
    pub element_count: usize,
    /// Strategy-specific metadata (element counts, payload sizes, ...).
    pub metadata: HashMap<String, serde_json::Value>,
}

impl StrategyOutput {
    /// Output for a selector that matched nothing.
    pub fn empty() -> Self {
        let mut metadata = HashMap::new();
        metadata.insert("elementCount".to_string(), serde_json::json!(0));
        metadata.insert("dataLength".to_string(), serde_json::json!(0));
        Self {
            data: String::new(),
            element_count: 0,
            metadata,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_roundtrips_through_canonical_name() {
        for kind in [ExtractionKind::Html, ExtractionKind::Css, ExtractionKind::Json] {
            assert_eq!(ExtractionKind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(ExtractionKind::parse("xml"), None);
    }

    #[test]
    fn wait_policy_defaults_to_load() {
        assert_eq!(WaitPolicy::default(), WaitPolicy::Load);
        let req = ExtractionRequest::new("https://ex.com/", ExtractionKind::Html, "h1");
        assert_eq!(req.wait, WaitPolicy::Load);
    }

    #[test]
    fn canonical_string_is_deterministic_across_option_field_order() {
        // Two requests built with the same logical options must canonicalize
        // identically regardless of construction order.
        let a = ExtractionRequest::new("https://ex.com/", ExtractionKind::Html, "h1")
            .with_options(ExtractionOptions::Html(HtmlOptions {
                multiple: true,
                remove_scripts: true,
                ..Default::default()
            }));
        let b = ExtractionRequest::new("https://ex.com/", ExtractionKind::Html, "h1")
            .with_options(ExtractionOptions::Html(HtmlOptions {
                remove_scripts: true,
                multiple: true,
                ..Default::default()
            }));
        assert_eq!(a.canonical_string(), b.canonical_string());
        assert_eq!(
            a.canonical_string(),
            "https://ex.com/|html|h1|load|multiple=true,removeScripts=true"
        );
    }

    #[test]
    fn default_options_canonicalize_to_empty_opts() {
        let req = ExtractionRequest::new("https://ex.com/", ExtractionKind::Html, "h1");
        assert_eq!(req.canonical_string(), "https://ex.com/|html|h1|load|");
    }

    #[test]
    fn json_schema_fields_are_key_sorted() {
        let mut schema = HashMap::new();
        schema.insert("title".to_string(), "h1".to_string());
        schema.insert("link".to_string(), "a@href".to_string());
        let opts = ExtractionOptions::Json(JsonOptions {
            multiple: false,
            schema: Some(schema),
        });
        let pairs = opts.canonical_pairs();
        assert_eq!(pairs.len(), 1);
        assert_eq!(pairs[0].1, "link:a@href;title:h1");
    }

    #[test]
    fn options_variant_must_match_kind() {
        let opts = ExtractionOptions::Css(CssOptions::default());
        assert!(opts.matches_kind(ExtractionKind::Css));
        assert!(!opts.matches_kind(ExtractionKind::Html));
    }
}
