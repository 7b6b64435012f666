//! Shared deterministic types for the reservation core.
//!
//! These types define stable contracts between the state machine, the page
//! inspector and the status reporter. They carry no I/O and serialize to a
//! stable shape for the UI stream.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Blocking condition read from the page after an attempt.
///
/// Variants are declared in precedence order: when several signals are visible
/// at once (transition renders), the earliest variant wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClassification {
    Full,
    AlreadyReturned,
    Paused,
    HighDemand,
    None,
}

/// How the machine treats a classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorTaxonomy {
    /// Contended target; recovered locally by retrying.
    TransientContention,
    /// No retry can succeed for this participant.
    TerminalUnavailable,
    /// Nothing recognized on the page.
    Unclassified,
}

impl ErrorClassification {
    pub fn taxonomy(self) -> ErrorTaxonomy {
        match self {
            ErrorClassification::HighDemand => ErrorTaxonomy::TransientContention,
            ErrorClassification::Full
            | ErrorClassification::AlreadyReturned
            | ErrorClassification::Paused => ErrorTaxonomy::TerminalUnavailable,
            ErrorClassification::None => ErrorTaxonomy::Unclassified,
        }
    }

    /// Pick the classification with the highest precedence from the observed signals.
    pub fn from_signals(
        full: bool,
        already_returned: bool,
        paused: bool,
        high_demand: bool,
    ) -> Self {
        if full {
            ErrorClassification::Full
        } else if already_returned {
            ErrorClassification::AlreadyReturned
        } else if paused {
            ErrorClassification::Paused
        } else if high_demand {
            ErrorClassification::HighDemand
        } else {
            ErrorClassification::None
        }
    }
}

impl fmt::Display for ErrorClassification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ErrorClassification::Full => "study full",
            ErrorClassification::AlreadyReturned => "already returned",
            ErrorClassification::Paused => "study paused",
            ErrorClassification::HighDemand => "high demand",
            ErrorClassification::None => "none",
        };
        f.write_str(label)
    }
}

/// Why a session halted without reserving.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum StopReason {
    /// Cancelled through the trigger interface.
    Operator(String),
    /// The page reported a terminal condition.
    Unavailable(ErrorClassification),
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StopReason::Operator(reason) => f.write_str(reason),
            StopReason::Unavailable(classification) => write!(f, "error - {classification}"),
        }
    }
}

/// Lifecycle of the reservation machine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum MachineState {
    Idle,
    Attempting,
    AwaitingSettle,
    Retrying,
    Stopped { reason: StopReason },
    Succeeded,
}

impl MachineState {
    /// `Stopped` and `Succeeded` schedule nothing until the next explicit start.
    pub fn is_terminal(&self) -> bool {
        matches!(self, MachineState::Stopped { .. } | MachineState::Succeeded)
    }

    /// True while a cycle is in flight or queued.
    pub fn is_running(&self) -> bool {
        matches!(
            self,
            MachineState::Attempting | MachineState::AwaitingSettle | MachineState::Retrying
        )
    }
}

/// Result of the action primitive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClickOutcome {
    /// False when the action affordance was missing or disabled.
    pub attempted: bool,
}

/// Rendering hint for a status message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusTone {
    Running,
    Halted,
    Info,
}

/// One status notification, emitted at most once per transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Status {
    pub message: String,
    pub running: bool,
    pub tone: StatusTone,
}

impl Status {
    pub fn new(message: impl Into<String>, running: bool) -> Self {
        let message = message.into();
        let tone = if running {
            StatusTone::Running
        } else {
            let lower = message.to_lowercase();
            if lower.contains("stopped") || lower.contains("error") {
                StatusTone::Halted
            } else {
                StatusTone::Info
            }
        };
        Self {
            message,
            running,
            tone,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_wins_over_every_other_signal() {
        assert_eq!(
            ErrorClassification::from_signals(true, true, true, true),
            ErrorClassification::Full
        );
    }

    #[test]
    fn precedence_follows_declaration_order() {
        assert_eq!(
            ErrorClassification::from_signals(false, true, true, true),
            ErrorClassification::AlreadyReturned
        );
        assert_eq!(
            ErrorClassification::from_signals(false, false, true, true),
            ErrorClassification::Paused
        );
        assert_eq!(
            ErrorClassification::from_signals(false, false, false, true),
            ErrorClassification::HighDemand
        );
        assert_eq!(
            ErrorClassification::from_signals(false, false, false, false),
            ErrorClassification::None
        );
    }

    #[test]
    fn only_high_demand_is_transient() {
        assert_eq!(
            ErrorClassification::HighDemand.taxonomy(),
            ErrorTaxonomy::TransientContention
        );
        for terminal in [
            ErrorClassification::Full,
            ErrorClassification::AlreadyReturned,
            ErrorClassification::Paused,
        ] {
            assert_eq!(terminal.taxonomy(), ErrorTaxonomy::TerminalUnavailable);
        }
        assert_eq!(
            ErrorClassification::None.taxonomy(),
            ErrorTaxonomy::Unclassified
        );
    }

    #[test]
    fn status_tone_follows_message_when_not_running() {
        assert_eq!(Status::new("Running... next try in 3.0s", true).tone, StatusTone::Running);
        assert_eq!(Status::new("Stopped: manual", false).tone, StatusTone::Halted);
        assert_eq!(Status::new("Network error", false).tone, StatusTone::Halted);
        assert_eq!(Status::new("Intervals saved (1-2s)", false).tone, StatusTone::Info);
    }

    #[test]
    fn machine_state_serializes_with_tag() {
        let state = MachineState::Stopped {
            reason: StopReason::Unavailable(ErrorClassification::Full),
        };
        let json = serde_json::to_string(&state).expect("serialize");
        assert_eq!(
            json,
            r#"{"state":"stopped","reason":{"kind":"unavailable","detail":"full"}}"#
        );
    }
}
