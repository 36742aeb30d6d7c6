//! `${name}` parameter substitution.

use regex::Regex;
use sandpiper_types::{Action, ActionKind};
use std::collections::HashMap;
use std::sync::OnceLock;
use tracing::warn;

fn placeholder_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("static regex"))
}

/// Replace each `${name}` with the parameter map's value. Placeholders with
/// no parameter stay intact and log a warning.
pub fn substitute_text(text: &str, params: &HashMap<String, String>) -> String {
    placeholder_re()
        .replace_all(text, |caps: &regex::Captures<'_>| {
            let name = &caps[1];
            match params.get(name) {
                Some(value) => value.clone(),
                None => {
                    warn!(parameter = %name, "No value for workflow parameter; leaving placeholder");
                    caps[0].to_string()
                }
            }
        })
        .into_owned()
}

/// Rewrite the text fields (selector, value, description) of every action.
pub fn substitute_actions(actions: &[Action], params: &HashMap<String, String>) -> Vec<Action> {
    actions
        .iter()
        .map(|action| {
            let mut out = action.clone();
            if let Some(selector) = &out.selector {
                out.selector = Some(substitute_text(selector, params));
            }
            if let Some(description) = &out.description {
                out.description = Some(substitute_text(description, params));
            }
            out.kind = match out.kind {
                ActionKind::Fill { value } => ActionKind::Fill {
                    value: substitute_text(&value, params),
                },
                ActionKind::Select { value } => ActionKind::Select {
                    value: substitute_text(&value, params),
                },
                other => other,
            };
            out
        })
        .collect()
}
