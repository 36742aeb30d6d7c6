//! Recorder session states, captured events, and DOM snapshots.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle of a recorder session.
///
/// `Created -> Recording -> Stopped -> Closed`; `close` is reachable from
/// any state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecorderState {
    Created,
    Recording,
    Stopped,
    Closed,
}

impl RecorderState {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecorderState::Created => "created",
            RecorderState::Recording => "recording",
            RecorderState::Stopped => "stopped",
            RecorderState::Closed => "closed",
        }
    }
}

/// One event posted by the in-page capture script.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapturedEvent {
    /// Raw DOM event type: `click`, `input`, `change`, `submit`, `keydown`.
    #[serde(rename = "type")]
    pub event_type: String,
    /// Best-effort stable selector for the event target.
    pub selector: String,
    /// Input value or key name, when the event carries one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    /// Milliseconds since the Unix epoch, stamped in the page.
    pub timestamp: f64,
}

/// Browser viewport dimensions at snapshot time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
    /// Device pixel ratio.
    pub dpr: f64,
}

/// Window scroll offsets at snapshot time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ScrollPosition {
    pub x: f64,
    pub y: f64,
}

/// A stylesheet referenced or inlined by a snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StylesheetRef {
    /// External stylesheet URL, when the sheet came from a link.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub href: Option<String>,
    /// Rule text, when the sheet was readable in-page.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

/// One frame of the recorder's DOM stream.
///
/// `html` is the serialized element tree in which every element carries a
/// `data-computed-style` attribute holding a base64-encoded JSON object of
/// the layout-critical computed properties.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomSnapshot {
    /// Monotonically increasing within a session.
    pub sequence: u64,
    pub timestamp: DateTime<Utc>,
    pub url: String,
    pub html: String,
    pub stylesheets: Vec<StylesheetRef>,
    pub viewport: Viewport,
    pub scroll: ScrollPosition,
    /// Approximate serialized size, for stream accounting.
    pub approx_bytes: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn captured_event_uses_wire_field_names() {
        let json = r##"{"type":"input","selector":"#q","value":"hi","timestamp":1700000000000.0}"##;
        let ev: CapturedEvent = serde_json::from_str(json).unwrap();
        assert_eq!(ev.event_type, "input");
        assert_eq!(ev.selector, "#q");
        assert_eq!(ev.value.as_deref(), Some("hi"));
    }

    #[test]
    fn captured_event_value_is_optional() {
        let json = r#"{"type":"click","selector":"button.go","timestamp":1.0}"#;
        let ev: CapturedEvent = serde_json::from_str(json).unwrap();
        assert_eq!(ev.value, None);
    }
}
