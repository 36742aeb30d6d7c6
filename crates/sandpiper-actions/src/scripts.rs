//! In-page scripts for action dispatch.
//!
//! Every builder is a pure function of the action's inputs so the generated
//! code is testable without a browser. User-supplied strings are embedded
//! through a JSON escape; nothing interpolates raw.

fn js_string(value: &str) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| "\"\"".to_string())
}

/// Readiness probe: returns `"ok"` or a reason string. The executor polls
/// this until ok or the element timeout lapses.
pub(crate) fn element_state(selector: &str) -> String {
    format!(
        r#"(() => {{
            const el = document.querySelector({sel});
            if (!el) return 'missing';
            const rect = el.getBoundingClientRect();
            if (rect.width <= 0 || rect.height <= 0) return 'zero-size';
            const style = getComputedStyle(el);
            if (style.display === 'none' || style.visibility === 'hidden') return 'hidden';
            if (parseFloat(style.opacity) <= 0) return 'transparent';
            return 'ok';
        }})()"#,
        sel = js_string(selector)
    )
}

/// Scroll into view; the executor applies the settle delay, then [`click`].
pub(crate) fn scroll_into_view(selector: &str) -> String {
    format!(
        r#"document.querySelector({sel}).scrollIntoView({{ block: 'center', inline: 'center' }})"#,
        sel = js_string(selector)
    )
}

pub(crate) fn click(selector: &str) -> String {
    format!(
        r#"document.querySelector({sel}).click()"#,
        sel = js_string(selector)
    )
}

/// Typing simulation: focus, clear, one `input` event per character, then a
/// terminal `change` and blur.
pub(crate) fn fill(selector: &str, value: &str) -> String {
    format!(
        r#"(() => {{
            const el = document.querySelector({sel});
            el.focus();
            el.value = '';
            el.dispatchEvent(new Event('input', {{ bubbles: true }}));
            for (const ch of {value}) {{
                el.value += ch;
                el.dispatchEvent(new Event('input', {{ bubbles: true }}));
            }}
            el.dispatchEvent(new Event('change', {{ bubbles: true }}));
            el.blur();
        }})()"#,
        sel = js_string(selector),
        value = js_string(value),
    )
}

pub(crate) fn select(selector: &str, value: &str) -> String {
    format!(
        r#"(() => {{
            const el = document.querySelector({sel});
            el.value = {value};
            el.dispatchEvent(new Event('change', {{ bubbles: true }}));
        }})()"#,
        sel = js_string(selector),
        value = js_string(value),
    )
}

/// Submit the element's form (or the element itself when it is a form).
pub(crate) fn submit(selector: &str) -> String {
    format!(
        r#"(() => {{
            const el = document.querySelector({sel});
            const form = el.tagName === 'FORM' ? el : el.closest('form');
            if (!form) throw new Error('no form for selector');
            if (form.requestSubmit) form.requestSubmit(); else form.submit();
        }})()"#,
        sel = js_string(selector)
    )
}

/// Toggle only when the current checked state differs.
pub(crate) fn check(selector: &str, checked: bool) -> String {
    format!(
        r#"(() => {{
            const el = document.querySelector({sel});
            if (el.checked !== {checked}) el.click();
        }})()"#,
        sel = js_string(selector),
        checked = checked,
    )
}

pub(crate) fn navigate(url: &str) -> String {
    format!("window.location.assign({})", js_string(url))
}

pub(crate) fn hover(selector: &str) -> String {
    format!(
        r#"(() => {{
            const el = document.querySelector({sel});
            el.dispatchEvent(new MouseEvent('mouseenter', {{ bubbles: true }}));
            el.dispatchEvent(new MouseEvent('mouseover', {{ bubbles: true }}));
        }})()"#,
        sel = js_string(selector)
    )
}

/// Scroll the target into view, or the window by one viewport without a
/// selector.
pub(crate) fn scroll(selector: Option<&str>) -> String {
    match selector {
        Some(sel) => scroll_into_view(sel),
        None => "window.scrollBy(0, window.innerHeight)".to_string(),
    }
}

pub(crate) fn press_key(selector: &str, key: &str) -> String {
    format!(
        r#"(() => {{
            const el = document.querySelector({sel});
            el.focus();
            const opts = {{ key: {key}, bubbles: true, cancelable: true }};
            el.dispatchEvent(new KeyboardEvent('keydown', opts));
            el.dispatchEvent(new KeyboardEvent('keyup', opts));
        }})()"#,
        sel = js_string(selector),
        key = js_string(key),
    )
}

pub(crate) fn clear(selector: &str) -> String {
    format!(
        r#"(() => {{
            const el = document.querySelector({sel});
            el.value = '';
            el.dispatchEvent(new Event('input', {{ bubbles: true }}));
            el.dispatchEvent(new Event('change', {{ bubbles: true }}));
        }})()"#,
        sel = js_string(selector)
    )
}

/// Inline extraction for the Extract action: text, markup, or an attribute.
pub(crate) fn extract(selector: &str, attr: Option<&str>) -> String {
    let read = match attr {
        Some(attr) => format!("el.getAttribute({}) || ''", js_string(attr)),
        None => "(el.textContent || '').trim()".to_string(),
    };
    format!(
        r#"(() => {{
            const el = document.querySelector({sel});
            if (!el) return null;
            return {{ value: {read}, html: el.innerHTML }};
        }})()"#,
        sel = js_string(selector),
        read = read,
    )
}

pub(crate) fn current_href() -> &'static str {
    "window.location.href"
}
