//! Computed CSS extraction.
//!
//! For each matched element we collect its inline style, every stylesheet
//! rule whose selector matches it (walking into media queries and keeping
//! the `@media` condition), and the custom properties inherited from
//! `:root`. The rule list is de-duplicated by (selector, declarations,
//! media) before rendering.

use crate::errors::{ExtractError, ExtractResult};
use crate::registry::ExtractionStrategy;
use crate::script::js_string;
use async_trait::async_trait;
use chromiumoxide::Page;
use sandpiper_types::{CssFormat, CssOptions, ExtractionKind, ExtractionOptions, StrategyOutput};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use tracing::debug;

/// One collected style rule, as returned by the in-page script.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct CollectedRule {
    pub selector: String,
    pub declarations: String,
    #[serde(default)]
    pub media: Option<String>,
    /// `inline`, `stylesheet`, or `custom-properties`.
    pub source: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct CssCollection {
    pub element_count: usize,
    pub rules: Vec<CollectedRule>,
}

pub struct CssStrategy;

impl CssStrategy {
    pub fn new() -> Self {
        Self
    }
}

impl Default for CssStrategy {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ExtractionStrategy for CssStrategy {
    fn kind(&self) -> ExtractionKind {
        ExtractionKind::Css
    }

    async fn extract(
        &self,
        page: &Page,
        selector: &str,
        options: &ExtractionOptions,
    ) -> ExtractResult<StrategyOutput> {
        let opts = match options {
            ExtractionOptions::Css(o) => o,
            _ => return Err(ExtractError::invalid_options("css", "expected CSS options")),
        };

        let script = build_script(selector, opts);
        let collection: CssCollection = page
            .evaluate(script.as_str())
            .await
            .map_err(ExtractError::script)?
            .into_value()
            .map_err(ExtractError::unreadable)?;

        debug!(
            selector = %selector,
            elements = collection.element_count,
            rules = collection.rules.len(),
            "CSS extraction"
        );
        Ok(post_process(collection, opts))
    }
}

pub(crate) fn build_script(selector: &str, opts: &CssOptions) -> String {
    format!(
        r#"(() => {{
            const els = Array.from(document.querySelectorAll({selector}));
            const picked = {multiple} ? els : els.slice(0, 1);
            const rules = [];

            const walk = (el, list, media) => {{
                for (const rule of Array.from(list)) {{
                    if (rule instanceof CSSMediaRule) {{
                        walk(el, rule.cssRules, rule.conditionText || rule.media.mediaText);
                    }} else if (rule instanceof CSSStyleRule) {{
                        let matched = false;
                        try {{ matched = el.matches(rule.selectorText); }} catch (e) {{}}
                        if (matched) {{
                            rules.push({{
                                selector: rule.selectorText,
                                declarations: rule.style.cssText,
                                media: media,
                                source: 'stylesheet',
                            }});
                        }}
                    }}
                }}
            }};

            for (const el of picked) {{
                const inline = el.getAttribute('style');
                if (inline) {{
                    rules.push({{ selector: 'inline', declarations: inline, media: null, source: 'inline' }});
                }}
                for (const sheet of Array.from(document.styleSheets)) {{
                    let list;
                    try {{ list = sheet.cssRules; }} catch (e) {{ continue; }}
                    walk(el, list, null);
                }}
            }}

            if (picked.length > 0) {{
                const rootStyle = getComputedStyle(document.documentElement);
                const props = [];
                for (let i = 0; i < rootStyle.length; i++) {{
                    const name = rootStyle[i];
                    if (name.startsWith('--')) {{
                        props.push(name + ': ' + rootStyle.getPropertyValue(name).trim());
                    }}
                }}
                if (props.length > 0) {{
                    rules.push({{ selector: ':root', declarations: props.join('; '), media: null, source: 'custom-properties' }});
                }}
            }}

            return {{ element_count: picked.length, rules: rules }};
        }})()"#,
        selector = js_string(selector),
        multiple = opts.multiple,
    )
}

pub(crate) fn post_process(collection: CssCollection, opts: &CssOptions) -> StrategyOutput {
    if collection.element_count == 0 {
        return StrategyOutput::empty();
    }

    let rules = dedupe(collection.rules);
    let data = match opts.format {
        CssFormat::Text => render_text(&rules),
        CssFormat::Json => serde_json::to_string(&rules).unwrap_or_else(|_| "[]".to_string()),
    };

    let mut metadata = HashMap::new();
    metadata.insert(
        "elementCount".to_string(),
        serde_json::json!(collection.element_count),
    );
    metadata.insert("ruleCount".to_string(), serde_json::json!(rules.len()));
    metadata.insert("dataLength".to_string(), serde_json::json!(data.len()));

    StrategyOutput {
        data,
        element_count: collection.element_count,
        metadata,
    }
}

/// Keep the first occurrence of each (selector, declarations, media) tuple.
pub(crate) fn dedupe(rules: Vec<CollectedRule>) -> Vec<CollectedRule> {
    let mut seen = HashSet::new();
    rules
        .into_iter()
        .filter(|rule| {
            seen.insert((
                rule.selector.clone(),
                rule.declarations.clone(),
                rule.media.clone(),
            ))
        })
        .collect()
}

fn render_text(rules: &[CollectedRule]) -> String {
    rules
        .iter()
        .map(|rule| match &rule.media {
            Some(media) => format!(
                "@media {} {{\n  {} {{ {} }}\n}}",
                media, rule.selector, rule.declarations
            ),
            None => format!("{} {{ {} }}", rule.selector, rule.declarations),
        })
        .collect::<Vec<_>>()
        .join("\n")
}
