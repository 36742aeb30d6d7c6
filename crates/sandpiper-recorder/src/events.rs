//! Captured event to action conversion.

use sandpiper_types::{Action, ActionKind, CapturedEvent};

/// Map one in-page event onto an action. Unrecognized events drop.
///
/// `click -> Click`, `input -> Fill`, `change -> Select`,
/// `submit -> Submit`, `keydown Enter -> PressKey("Enter")`.
pub fn event_to_action(event: &CapturedEvent) -> Option<Action> {
    let kind = match event.event_type.as_str() {
        "click" => ActionKind::Click,
        "input" => ActionKind::Fill {
            value: event.value.clone().unwrap_or_default(),
        },
        "change" => ActionKind::Select {
            value: event.value.clone().unwrap_or_default(),
        },
        "submit" => ActionKind::Submit,
        "keydown" if event.value.as_deref() == Some("Enter") => ActionKind::PressKey {
            key: "Enter".to_string(),
        },
        _ => return None,
    };
    Some(Action::on(kind, event.selector.clone()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(event_type: &str, selector: &str, value: Option<&str>) -> CapturedEvent {
        CapturedEvent {
            event_type: event_type.to_string(),
            selector: selector.to_string(),
            value: value.map(|v| v.to_string()),
            timestamp: 1_700_000_000_000.0,
        }
    }

    #[test]
    fn typing_then_enter_becomes_fill_then_press_key() {
        // The debounced capture of typing "hi" into #q followed by Enter.
        let captured = [
            event("input", "#q", Some("hi")),
            event("keydown", "#q", Some("Enter")),
        ];
        let actions: Vec<Action> = captured.iter().filter_map(event_to_action).collect();

        assert_eq!(actions.len(), 2);
        assert_eq!(actions[0].selector.as_deref(), Some("#q"));
        assert_eq!(actions[0].kind, ActionKind::Fill { value: "hi".into() });
        assert_eq!(actions[1].selector.as_deref(), Some("#q"));
        assert_eq!(
            actions[1].kind,
            ActionKind::PressKey {
                key: "Enter".into()
            }
        );
    }

    #[test]
    fn click_and_submit_map_directly() {
        assert_eq!(
            event_to_action(&event("click", "button.go", None)).map(|a| a.kind),
            Some(ActionKind::Click)
        );
        assert_eq!(
            event_to_action(&event("submit", "form", None)).map(|a| a.kind),
            Some(ActionKind::Submit)
        );
    }

    #[test]
    fn change_maps_to_select_with_value() {
        let action = event_to_action(&event("change", "#plan", Some("pro"))).unwrap();
        assert_eq!(action.kind, ActionKind::Select { value: "pro".into() });
    }

    #[test]
    fn non_enter_keydown_and_unknown_events_drop() {
        assert!(event_to_action(&event("keydown", "#q", Some("a"))).is_none());
        assert!(event_to_action(&event("scroll", "body", None)).is_none());
        assert!(event_to_action(&event("mouseover", "#x", None)).is_none());
    }
}
