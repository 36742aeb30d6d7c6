//! Schema-mapped JSON extraction.
//!
//! A schema maps field names to sub-selectors evaluated under the root
//! selector; a `@attr` suffix reads an attribute instead of text content.
//! Missing fields become empty strings, never errors. Without a schema the
//! root element is summarized as `{text, html, attributes}`.

use crate::errors::{ExtractError, ExtractResult};
use crate::registry::ExtractionStrategy;
use crate::script::js_string;
use async_trait::async_trait;
use chromiumoxide::Page;
use sandpiper_types::{ExtractionKind, ExtractionOptions, JsonOptions, StrategyOutput};
use std::collections::HashMap;
use tracing::debug;

pub struct JsonStrategy;

impl JsonStrategy {
    pub fn new() -> Self {
        Self
    }
}

impl Default for JsonStrategy {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ExtractionStrategy for JsonStrategy {
    fn kind(&self) -> ExtractionKind {
        ExtractionKind::Json
    }

    async fn extract(
        &self,
        page: &Page,
        selector: &str,
        options: &ExtractionOptions,
    ) -> ExtractResult<StrategyOutput> {
        let opts = match options {
            ExtractionOptions::Json(o) => o,
            _ => return Err(ExtractError::invalid_options("json", "expected JSON options")),
        };

        let script = build_script(selector, opts);
        let value: serde_json::Value = page
            .evaluate(script.as_str())
            .await
            .map_err(ExtractError::script)?
            .into_value()
            .map_err(ExtractError::unreadable)?;

        let element_count = value
            .get("elementCount")
            .and_then(|v| v.as_u64())
            .unwrap_or(0) as usize;
        debug!(selector = %selector, elements = element_count, "JSON extraction");

        Ok(post_process(value, element_count))
    }
}

pub(crate) fn build_script(selector: &str, opts: &JsonOptions) -> String {
    let schema_literal = match &opts.schema {
        Some(schema) => {
            // Key-sorted so generated scripts are stable for equal schemas.
            let mut fields: Vec<(&String, &String)> = schema.iter().collect();
            fields.sort_by(|a, b| a.0.cmp(b.0));
            let body = fields
                .iter()
                .map(|(name, sel)| format!("{}: {}", js_string(name), js_string(sel)))
                .collect::<Vec<_>>()
                .join(", ");
            format!("{{ {} }}", body)
        }
        None => "null".to_string(),
    };

    format!(
        r#"(() => {{
            const schema = {schema};
            const els = Array.from(document.querySelectorAll({selector}));
            const picked = {multiple} ? els : els.slice(0, 1);

            const readField = (root, spec) => {{
                const at = spec.lastIndexOf('@');
                let sel = spec;
                let attr = null;
                if (at > 0) {{
                    sel = spec.slice(0, at);
                    attr = spec.slice(at + 1);
                }} else if (at === 0) {{
                    sel = '';
                    attr = spec.slice(1);
                }}
                const target = sel === '' ? root : root.querySelector(sel);
                if (!target) return '';
                if (attr) return target.getAttribute(attr) || '';
                return (target.textContent || '').trim();
            }};

            const describe = (el) => {{
                const attributes = {{}};
                for (const attr of Array.from(el.attributes)) {{
                    attributes[attr.name] = attr.value;
                }}
                return {{
                    text: (el.textContent || '').trim(),
                    html: el.innerHTML,
                    attributes: attributes,
                }};
            }};

            const mapped = picked.map(el => {{
                if (!schema) return describe(el);
                const record = {{}};
                for (const [field, spec] of Object.entries(schema)) {{
                    record[field] = readField(el, spec);
                }}
                return record;
            }});

            return {{
                elementCount: picked.length,
                value: {multiple} ? mapped : (mapped[0] ?? null),
            }};
        }})()"#,
        schema = schema_literal,
        selector = js_string(selector),
        multiple = opts.multiple,
    )
}

pub(crate) fn post_process(raw: serde_json::Value, element_count: usize) -> StrategyOutput {
    if element_count == 0 {
        return StrategyOutput::empty();
    }

    let value = raw.get("value").cloned().unwrap_or(serde_json::Value::Null);
    let data = serde_json::to_string(&value).unwrap_or_else(|_| "null".to_string());

    let mut metadata = HashMap::new();
    metadata.insert("elementCount".to_string(), serde_json::json!(element_count));
    metadata.insert("dataLength".to_string(), serde_json::json!(data.len()));

    StrategyOutput {
        data,
        element_count,
        metadata,
    }
}
