//! Text signals extracted from a rendered study page.
//!
//! A [`PageSnapshot`] is the minimal projection of the page a browser bridge
//! exports: alert texts, toast notifications and the buttons we care about.
//! Everything here is a pure function of that snapshot.

use serde::{Deserialize, Serialize};

use crate::core::types::ErrorClassification;

/// `data-testid` of the reserve button.
pub const ACTION_TEST_ID: &str = "start-now";

/// `data-testid` of the button shown once a place is held.
pub const COMPLETION_TEST_ID: &str = "finished-button";

const FULL_TEXT: &str = "study is full";
const RETURNED_TEXT: &str = "already returned this submission";
const HIGH_DEMAND_TEXT: &str = "high demand";
const PAUSED_TITLE: &str = "error";
const PAUSED_TEXT: &str = "researcher has paused the study";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PageSnapshot {
    /// Text of inline error and `role="alert"` elements.
    pub alerts: Vec<String>,
    pub notifications: Vec<Notification>,
    pub buttons: Vec<Button>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Notification {
    pub title: String,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Button {
    pub test_id: String,
    #[serde(default)]
    pub disabled: bool,
}

impl PageSnapshot {
    fn button(&self, test_id: &str) -> Option<&Button> {
        self.buttons.iter().find(|button| button.test_id == test_id)
    }

    fn any_alert_contains(&self, needle: &str) -> bool {
        self.alerts
            .iter()
            .any(|text| text.to_lowercase().contains(needle))
    }
}

/// Classify blocking errors, case-insensitively.
pub fn classify_snapshot(snapshot: &PageSnapshot) -> ErrorClassification {
    let paused = snapshot.notifications.iter().any(|note| {
        note.title.trim().to_lowercase() == PAUSED_TITLE
            && note.content.to_lowercase().contains(PAUSED_TEXT)
    });
    ErrorClassification::from_signals(
        snapshot.any_alert_contains(FULL_TEXT),
        snapshot.any_alert_contains(RETURNED_TEXT),
        paused,
        snapshot.any_alert_contains(HIGH_DEMAND_TEXT),
    )
}

/// The reserve button is present and enabled.
pub fn action_available(snapshot: &PageSnapshot) -> bool {
    snapshot
        .button(ACTION_TEST_ID)
        .is_some_and(|button| !button.disabled)
}

/// The reserve button is on the page, enabled or not.
pub fn action_present(snapshot: &PageSnapshot) -> bool {
    snapshot.button(ACTION_TEST_ID).is_some()
}

/// The explicit "finished" affordance is present.
pub fn completion_marker(snapshot: &PageSnapshot) -> bool {
    snapshot.button(COMPLETION_TEST_ID).is_some()
}
