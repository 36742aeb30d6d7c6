//! Page actions and their per-action results.

use crate::extraction::ExtractionKind;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One atomic user-level operation against a page.
///
/// The operation itself is the tagged [`ActionKind`]; selector and
/// description are shared attributes every action may carry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    #[serde(flatten)]
    pub kind: ActionKind,
    /// CSS selector the action targets, when it targets an element.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selector: Option<String>,
    /// Human-readable description, carried through to results and logs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Action {
    pub fn new(kind: ActionKind) -> Self {
        Self {
            kind,
            selector: None,
            description: None,
        }
    }

    pub fn on(kind: ActionKind, selector: impl Into<String>) -> Self {
        Self {
            kind,
            selector: Some(selector.into()),
            description: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Short label for logging and result rendering.
    pub fn label(&self) -> String {
        match &self.selector {
            Some(sel) => format!("{} {}", self.kind.name(), sel),
            None => self.kind.name().to_string(),
        }
    }
}

/// The tagged action variants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ActionKind {
    /// Scroll into view, settle, dispatch a synthetic click.
    Click,
    /// Focus, clear, type `value` character by character, then change + blur.
    Fill { value: String },
    /// Set a `<select>` value and dispatch `change`.
    Select { value: String },
    /// Trigger form submit and wait for the resulting navigation.
    Submit,
    /// Toggle a checkbox only if its current state differs.
    Check { checked: bool },
    /// Assign `location` and wait for the resulting navigation.
    Navigate { url: String },
    /// Scroll the target (or window) into position.
    Scroll,
    /// Dispatch mouseover on the target.
    Hover,
    /// Dispatch a key press on the target.
    PressKey { key: String },
    /// Clear an input's value.
    Clear,
    /// Fixed sleep.
    Wait { ms: u64 },
    /// Poll for a URL change, resolving at the timeout either way.
    WaitNavigation { ms: u64 },
    /// Capture a screenshot of the current viewport.
    Screenshot,
    /// Inline extraction against the current page state.
    Extract {
        kind: ExtractionKind,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        attr: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        json_path: Option<String>,
    },
}

impl ActionKind {
    pub fn name(&self) -> &'static str {
        match self {
            ActionKind::Click => "click",
            ActionKind::Fill { .. } => "fill",
            ActionKind::Select { .. } => "select",
            ActionKind::Submit => "submit",
            ActionKind::Check { .. } => "check",
            ActionKind::Navigate { .. } => "navigate",
            ActionKind::Scroll => "scroll",
            ActionKind::Hover => "hover",
            ActionKind::PressKey { .. } => "pressKey",
            ActionKind::Clear => "clear",
            ActionKind::Wait { .. } => "wait",
            ActionKind::WaitNavigation { .. } => "waitNavigation",
            ActionKind::Screenshot => "screenshot",
            ActionKind::Extract { .. } => "extract",
        }
    }
}

/// Outcome of one executed action.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionResult {
    /// The action as executed (after parameter substitution).
    pub action: Action,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub elapsed_ms: u64,
    /// Base64 PNG, present for Screenshot actions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub screenshot: Option<String>,
    /// Data produced by Extract actions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extracted: Option<serde_json::Value>,
    /// Page URL after the action completed or failed.
    pub final_url: String,
    pub timestamp: DateTime<Utc>,
}

impl ActionResult {
    pub fn success(action: Action, elapsed_ms: u64, final_url: impl Into<String>) -> Self {
        Self {
            action,
            success: true,
            error: None,
            elapsed_ms,
            screenshot: None,
            extracted: None,
            final_url: final_url.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn failure(
        action: Action,
        error: impl Into<String>,
        elapsed_ms: u64,
        final_url: impl Into<String>,
    ) -> Self {
        Self {
            action,
            success: false,
            error: Some(error.into()),
            elapsed_ms,
            screenshot: None,
            extracted: None,
            final_url: final_url.into(),
            timestamp: Utc::now(),
        }
    }
}
