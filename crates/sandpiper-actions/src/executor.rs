//! Ordered action execution with per-action error capture.

use crate::params::substitute_actions;
use crate::scripts;
use base64::Engine;
use chromiumoxide::cdp::browser_protocol::page::{
    CaptureScreenshotFormat, CaptureScreenshotParams,
};
use chromiumoxide::Page;
use sandpiper_browser::SessionHandle;
use sandpiper_config::ActionConfig;
use sandpiper_types::{Action, ActionKind, ActionResult};
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::{sleep, timeout, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Payloads an action may produce beyond success/failure.
#[derive(Default)]
struct ActionExtras {
    screenshot: Option<String>,
    extracted: Option<serde_json::Value>,
}

/// Runs action sequences against a pooled session.
#[derive(Debug, Clone)]
pub struct ActionExecutor {
    config: ActionConfig,
}

impl ActionExecutor {
    pub fn new(config: ActionConfig) -> Self {
        Self { config }
    }

    /// Substitute parameters, then execute the sequence in order.
    pub async fn execute_with_params(
        &self,
        session: &SessionHandle,
        actions: &[Action],
        params: &HashMap<String, String>,
        cancel: &CancellationToken,
    ) -> Vec<ActionResult> {
        let substituted = substitute_actions(actions, params);
        self.execute_sequence(session, &substituted, cancel).await
    }

    /// Execute actions in order, one result per action. A failure is
    /// recorded and execution continues; cancellation returns the partial
    /// list accumulated so far.
    pub async fn execute_sequence(
        &self,
        session: &SessionHandle,
        actions: &[Action],
        cancel: &CancellationToken,
    ) -> Vec<ActionResult> {
        let mut results = Vec::with_capacity(actions.len());

        for action in actions {
            if cancel.is_cancelled() {
                debug!(
                    completed = results.len(),
                    total = actions.len(),
                    "Action sequence cancelled"
                );
                break;
            }

            let started = Instant::now();
            let outcome = tokio::select! {
                _ = cancel.cancelled() => None,
                run = timeout(self.config.action_timeout, self.run_action(session, action)) => {
                    Some(run.unwrap_or_else(|_| {
                        Err(format!(
                            "action timed out after {}ms",
                            self.config.action_timeout.as_millis()
                        ))
                    }))
                }
            };
            let Some(outcome) = outcome else {
                debug!(
                    completed = results.len(),
                    total = actions.len(),
                    "Action sequence cancelled mid-action"
                );
                break;
            };

            let elapsed_ms = started.elapsed().as_millis() as u64;
            let final_url = self.current_url(session).await;

            match outcome {
                Ok(extras) => {
                    let mut result = ActionResult::success(action.clone(), elapsed_ms, final_url);
                    result.screenshot = extras.screenshot;
                    result.extracted = extras.extracted;
                    results.push(result);
                }
                Err(error) => {
                    warn!(action = %action.label(), error = %error, "Action failed");
                    results.push(ActionResult::failure(
                        action.clone(),
                        error,
                        elapsed_ms,
                        final_url,
                    ));
                }
            }
        }

        results
    }

    async fn run_action(
        &self,
        session: &SessionHandle,
        action: &Action,
    ) -> Result<ActionExtras, String> {
        let page = session.page().await.map_err(|e| e.to_string())?;
        let selector = action.selector.as_deref();

        if needs_element(&action.kind, selector) {
            let selector = selector.ok_or_else(|| {
                format!("{} action requires a selector", action.kind.name())
            })?;
            self.wait_for_element(&page, selector).await?;
        }

        let mut extras = ActionExtras::default();
        match &action.kind {
            ActionKind::Click => {
                let selector = required(selector, "click")?;
                eval(&page, &scripts::scroll_into_view(selector)).await?;
                sleep(self.config.settle_delay).await;
                eval(&page, &scripts::click(selector)).await?;
            }
            ActionKind::Fill { value } => {
                eval(&page, &scripts::fill(required(selector, "fill")?, value)).await?;
            }
            ActionKind::Select { value } => {
                eval(&page, &scripts::select(required(selector, "select")?, value)).await?;
            }
            ActionKind::Submit => {
                eval(&page, &scripts::submit(required(selector, "submit")?)).await?;
                self.settle_navigation(&page).await;
            }
            ActionKind::Check { checked } => {
                eval(&page, &scripts::check(required(selector, "check")?, *checked)).await?;
            }
            ActionKind::Navigate { url } => {
                eval(&page, &scripts::navigate(url)).await?;
                self.settle_navigation(&page).await;
            }
            ActionKind::Scroll => {
                eval(&page, &scripts::scroll(selector)).await?;
            }
            ActionKind::Hover => {
                eval(&page, &scripts::hover(required(selector, "hover")?)).await?;
            }
            ActionKind::PressKey { key } => {
                eval(&page, &scripts::press_key(required(selector, "pressKey")?, key)).await?;
            }
            ActionKind::Clear => {
                eval(&page, &scripts::clear(required(selector, "clear")?)).await?;
            }
            ActionKind::Wait { ms } => {
                sleep(Duration::from_millis(*ms)).await;
            }
            ActionKind::WaitNavigation { ms } => {
                self.wait_for_url_change(&page, Duration::from_millis(*ms))
                    .await;
            }
            ActionKind::Screenshot => {
                let params = CaptureScreenshotParams {
                    format: Some(CaptureScreenshotFormat::Png),
                    ..Default::default()
                };
                let bytes = page
                    .screenshot(params)
                    .await
                    .map_err(|e| format!("screenshot failed: {}", e))?;
                extras.screenshot =
                    Some(base64::engine::general_purpose::STANDARD.encode(bytes));
            }
            ActionKind::Extract { attr, json_path, .. } => {
                let selector = required(selector, "extract")?;
                let raw: Option<serde_json::Value> =
                    eval_value(&page, &scripts::extract(selector, attr.as_deref())).await?;
                let raw = raw.ok_or_else(|| format!("no element matches {}", selector))?;
                extras.extracted = Some(apply_json_path(raw, json_path.as_deref())?);
            }
        }

        Ok(extras)
    }

    /// Poll until the element is present, visible, and hittable.
    async fn wait_for_element(&self, page: &Page, selector: &str) -> Result<(), String> {
        let script = scripts::element_state(selector);
        let deadline = Instant::now() + self.config.element_timeout;
        let mut last_state = String::from("missing");

        while Instant::now() < deadline {
            last_state = eval_value::<String>(page, &script)
                .await?
                .unwrap_or_else(|| "missing".to_string());
            if last_state == "ok" {
                return Ok(());
            }
            sleep(POLL_INTERVAL).await;
        }

        Err(format!(
            "element not ready within {}ms ({}): {}",
            self.config.element_timeout.as_millis(),
            last_state,
            selector
        ))
    }

    /// After Submit/Navigate: wait for the URL to move or the document to
    /// finish loading; resolves at the timeout either way.
    async fn settle_navigation(&self, page: &Page) {
        let before = read_href(page).await;
        let deadline = Instant::now() + self.config.navigation_timeout;

        while Instant::now() < deadline {
            if read_href(page).await != before {
                break;
            }
            sleep(POLL_INTERVAL).await;
        }

        while Instant::now() < deadline {
            let ready = eval_value::<String>(page, "document.readyState")
                .await
                .ok()
                .flatten();
            if ready.as_deref() == Some("complete") {
                return;
            }
            sleep(POLL_INTERVAL).await;
        }
    }

    /// Poll for a URL change; resolves successfully at the timeout even if
    /// nothing moved.
    async fn wait_for_url_change(&self, page: &Page, window: Duration) {
        let before = read_href(page).await;
        let deadline = Instant::now() + window;
        while Instant::now() < deadline {
            if read_href(page).await != before {
                return;
            }
            sleep(POLL_INTERVAL).await;
        }
    }

    async fn current_url(&self, session: &SessionHandle) -> String {
        match session.page().await {
            Ok(page) => read_href(&page).await.unwrap_or_default(),
            Err(_) => String::new(),
        }
    }
}

fn required<'a>(selector: Option<&'a str>, kind: &str) -> Result<&'a str, String> {
    selector.ok_or_else(|| format!("{} action requires a selector", kind))
}

/// Element-targeting kinds wait for their target before dispatch.
fn needs_element(kind: &ActionKind, selector: Option<&str>) -> bool {
    match kind {
        ActionKind::Click
        | ActionKind::Fill { .. }
        | ActionKind::Select { .. }
        | ActionKind::Submit
        | ActionKind::Check { .. }
        | ActionKind::Hover
        | ActionKind::PressKey { .. }
        | ActionKind::Clear
        | ActionKind::Extract { .. } => true,
        ActionKind::Scroll => selector.is_some(),
        ActionKind::Navigate { .. }
        | ActionKind::Wait { .. }
        | ActionKind::WaitNavigation { .. }
        | ActionKind::Screenshot => false,
    }
}

async fn eval(page: &Page, script: &str) -> Result<(), String> {
    page.evaluate(script)
        .await
        .map(|_| ())
        .map_err(|e| format!("script failed: {}", e))
}

async fn eval_value<T: serde::de::DeserializeOwned>(
    page: &Page,
    script: &str,
) -> Result<Option<T>, String> {
    page.evaluate(script)
        .await
        .map_err(|e| format!("script failed: {}", e))?
        .into_value()
        .map_err(|e| format!("script result unreadable: {}", e))
}

async fn read_href(page: &Page) -> Option<String> {
    eval_value::<String>(page, scripts::current_href())
        .await
        .ok()
        .flatten()
}

/// Walk a dot-separated path into a JSON value parsed from the extracted
/// text; without a path the raw extraction object passes through.
fn apply_json_path(
    raw: serde_json::Value,
    json_path: Option<&str>,
) -> Result<serde_json::Value, String> {
    let Some(path) = json_path else {
        return Ok(raw);
    };

    let text = raw
        .get("value")
        .and_then(|v| v.as_str())
        .ok_or_else(|| "extracted value is not text".to_string())?;
    let parsed: serde_json::Value = serde_json::from_str(text)
        .map_err(|e| format!("extracted text is not JSON: {}", e))?;

    let mut current = &parsed;
    for segment in path.split('.').filter(|s| !s.is_empty()) {
        current = match segment.parse::<usize>() {
            Ok(index) => current.get(index),
            Err(_) => current.get(segment),
        }
        .ok_or_else(|| format!("JSON path segment not found: {}", segment))?;
    }
    Ok(current.clone())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn element_wait_applies_to_targeting_kinds_only() {
        assert!(needs_element(&ActionKind::Click, Some("#a")));
        assert!(needs_element(&ActionKind::Fill { value: "x".into() }, Some("#a")));
        assert!(!needs_element(&ActionKind::Screenshot, None));
        assert!(!needs_element(&ActionKind::Wait { ms: 10 }, None));
        assert!(!needs_element(&ActionKind::Scroll, None));
        assert!(needs_element(&ActionKind::Scroll, Some("#list")));
    }

    #[test]
    fn json_path_walks_objects_and_arrays() {
        let raw = serde_json::json!({
            "value": r#"{"items": [{"id": 7}]}"#,
            "html": "",
        });
        let out = apply_json_path(raw, Some("items.0.id")).unwrap();
        assert_eq!(out, serde_json::json!(7));
    }

    #[test]
    fn missing_json_path_segment_is_an_error() {
        let raw = serde_json::json!({ "value": r#"{"a": 1}"#, "html": "" });
        let err = apply_json_path(raw, Some("b")).unwrap_err();
        assert!(err.contains("segment not found"));
    }

    #[test]
    fn no_json_path_passes_raw_extraction_through() {
        let raw = serde_json::json!({ "value": "plain", "html": "<b>plain</b>" });
        let out = apply_json_path(raw.clone(), None).unwrap();
        assert_eq!(out, raw);
    }

    #[tokio::test]
    #[ignore = "requires Chrome - run with: cargo test -- --ignored"]
    async fn failed_action_is_recorded_and_execution_continues() {
        use sandpiper_browser::BrowserPool;
        use sandpiper_config::{NavigationConfig, PoolConfig};
        use sandpiper_types::WaitPolicy;

        let pool = BrowserPool::new(PoolConfig::default(), NavigationConfig::default());
        let session = pool
            .acquire(
                "data:text/html,<button id='a'>a</button><button id='b'>b</button>",
                WaitPolicy::Load,
            )
            .await
            .unwrap();

        let executor = ActionExecutor::new(ActionConfig {
            element_timeout: Duration::from_millis(500),
            ..Default::default()
        });
        let actions = vec![
            Action::on(ActionKind::Click, "#a"),
            Action::on(ActionKind::Click, "#missing"),
            Action::on(ActionKind::Click, "#b"),
        ];

        let results = executor
            .execute_sequence(&session, &actions, &CancellationToken::new())
            .await;

        assert_eq!(results.len(), 3);
        assert!(results[0].success);
        assert!(!results[1].success);
        assert!(results[1].error.as_deref().unwrap_or("").contains("element"));
        assert!(results[2].success);
        for (result, action) in results.iter().zip(&actions) {
            assert_eq!(&result.action, action);
        }

        session.release().await.unwrap();
        pool.stop().await;
    }
}
