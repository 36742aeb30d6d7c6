//! HTML markup extraction.

use crate::errors::{ExtractError, ExtractResult};
use crate::registry::ExtractionStrategy;
use crate::script::js_string;
use async_trait::async_trait;
use chromiumoxide::Page;
use regex::Regex;
use sandpiper_types::{ExtractionKind, ExtractionOptions, HtmlOptions, StrategyOutput};
use std::collections::HashMap;
use std::sync::OnceLock;
use tracing::debug;

pub struct HtmlStrategy;

impl HtmlStrategy {
    pub fn new() -> Self {
        Self
    }
}

impl Default for HtmlStrategy {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ExtractionStrategy for HtmlStrategy {
    fn kind(&self) -> ExtractionKind {
        ExtractionKind::Html
    }

    async fn extract(
        &self,
        page: &Page,
        selector: &str,
        options: &ExtractionOptions,
    ) -> ExtractResult<StrategyOutput> {
        let opts = match options {
            ExtractionOptions::Html(o) => o,
            _ => return Err(ExtractError::invalid_options("html", "expected HTML options")),
        };

        let script = build_script(selector, opts);
        let raw: Vec<String> = page
            .evaluate(script.as_str())
            .await
            .map_err(ExtractError::script)?
            .into_value()
            .map_err(ExtractError::unreadable)?;

        debug!(selector = %selector, matches = raw.len(), "HTML extraction");
        Ok(post_process(raw, opts))
    }
}

/// Collect inner or outer markup for the matched elements.
pub(crate) fn build_script(selector: &str, opts: &HtmlOptions) -> String {
    format!(
        r#"(() => {{
            const els = Array.from(document.querySelectorAll({selector}));
            const take = {take};
            const picked = take === null ? els : els.slice(0, take);
            return picked.map(el => {accessor});
        }})()"#,
        selector = js_string(selector),
        take = if opts.multiple { "null" } else { "1" },
        accessor = if opts.include_outer {
            "el.outerHTML"
        } else {
            "el.innerHTML"
        },
    )
}

/// Apply the markup cleanup options and assemble the output.
pub(crate) fn post_process(matches: Vec<String>, opts: &HtmlOptions) -> StrategyOutput {
    if matches.is_empty() {
        return StrategyOutput::empty();
    }

    let element_count = matches.len();
    let cleaned: Vec<String> = matches
        .into_iter()
        .map(|fragment| clean_fragment(fragment, opts))
        .collect();

    // Multiple matches join deterministically, in document order.
    let data = cleaned.join("\n");

    let mut metadata = HashMap::new();
    metadata.insert("elementCount".to_string(), serde_json::json!(element_count));
    metadata.insert("dataLength".to_string(), serde_json::json!(data.len()));

    StrategyOutput {
        data,
        element_count,
        metadata,
    }
}

fn clean_fragment(mut fragment: String, opts: &HtmlOptions) -> String {
    if opts.remove_scripts {
        fragment = script_re()
            .replace_all(&fragment, "")
            .into_owned();
    }
    if opts.remove_comments {
        fragment = comment_re().replace_all(&fragment, "").into_owned();
    }
    if opts.clean_html {
        fragment = intertag_ws_re().replace_all(&fragment, "><").into_owned();
        fragment = fragment.trim().to_string();
    }
    if opts.normalize_whitespace {
        fragment = ws_re().replace_all(&fragment, " ").into_owned();
        fragment = fragment.trim().to_string();
    }
    fragment
}

fn script_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?is)<script\b[^>]*>.*?</script>").expect("static regex"))
}

fn comment_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)<!--.*?-->").expect("static regex"))
}

fn intertag_ws_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r">\s+<").expect("static regex"))
}

fn ws_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\s+").expect("static regex"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_matches_yield_empty_output_not_error() {
        let out = post_process(vec![], &HtmlOptions::default());
        assert_eq!(out.element_count, 0);
        assert_eq!(out.data, "");
        assert_eq!(out.metadata["elementCount"], serde_json::json!(0));
    }

    #[test]
    fn multiple_matches_join_with_newline_in_order() {
        let out = post_process(
            vec!["<li>a</li>".into(), "<li>b</li>".into()],
            &HtmlOptions {
                multiple: true,
                ..Default::default()
            },
        );
        assert_eq!(out.data, "<li>a</li>\n<li>b</li>");
        assert_eq!(out.element_count, 2);
        assert_eq!(out.metadata["dataLength"], serde_json::json!(out.data.len()));
    }

    #[test]
    fn remove_scripts_strips_script_blocks() {
        let out = post_process(
            vec!["<p>keep</p><script>alert(1)</script><p>this</p>".into()],
            &HtmlOptions {
                remove_scripts: true,
                ..Default::default()
            },
        );
        assert_eq!(out.data, "<p>keep</p><p>this</p>");
    }

    #[test]
    fn remove_comments_strips_comments() {
        let out = post_process(
            vec!["<p>a</p><!-- note --><p>b</p>".into()],
            &HtmlOptions {
                remove_comments: true,
                ..Default::default()
            },
        );
        assert_eq!(out.data, "<p>a</p><p>b</p>");
    }

    #[test]
    fn clean_html_collapses_intertag_whitespace() {
        let out = post_process(
            vec!["<ul>\n  <li>a</li>\n  <li>b</li>\n</ul>".into()],
            &HtmlOptions {
                clean_html: true,
                ..Default::default()
            },
        );
        assert_eq!(out.data, "<ul><li>a</li><li>b</li></ul>");
    }

    #[test]
    fn normalize_whitespace_flattens_runs() {
        let out = post_process(
            vec!["<p>hello   \n   world</p>".into()],
            &HtmlOptions {
                normalize_whitespace: true,
                ..Default::default()
            },
        );
        assert_eq!(out.data, "<p>hello world</p>");
    }

    #[test]
    fn script_embeds_selector_as_escaped_literal() {
        let script = build_script(r#"a[name="q"]"#, &HtmlOptions::default());
        assert!(script.contains(r#""a[name=\"q\"]""#));
        assert!(script.contains("el.innerHTML"));
        assert!(script.contains("els.slice(0, 1)"));
    }

    #[test]
    fn script_honors_multiple_and_outer_options() {
        let script = build_script(
            "li",
            &HtmlOptions {
                multiple: true,
                include_outer: true,
                ..Default::default()
            },
        );
        assert!(script.contains("el.outerHTML"));
        assert!(script.contains("take === null ? els"));
    }
}
