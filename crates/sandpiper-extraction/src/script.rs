//! Shared helpers for building in-page scripts.

/// Render a Rust string as a JavaScript string literal. Selectors and
/// schema values are user input; embedding them raw would let a quote break
/// the script.
pub(crate) fn js_string(value: &str) -> String {
    // serde_json string encoding is valid JS string literal syntax.
    serde_json::to_string(value).unwrap_or_else(|_| "\"\"".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quotes_and_backslashes_are_escaped() {
        assert_eq!(js_string(r#"a[name="q"]"#), r#""a[name=\"q\"]""#);
        assert_eq!(js_string(r"path\to"), r#""path\\to""#);
    }

    #[test]
    fn newlines_cannot_break_out_of_the_literal() {
        assert_eq!(js_string("a\nb"), r#""a\nb""#);
    }
}
