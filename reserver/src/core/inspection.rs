//! Facts read from the page at an inspection boundary.

use crate::core::types::ErrorClassification;

/// How success is decided once no blocking error is visible.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SuccessPolicy {
    /// Only the explicit completion affordance counts.
    CompletionMarkerOnly,
    /// Heuristic: an action affordance gone from the page is also read as
    /// success. A disabled one is still present.
    #[default]
    InferFromMissingAction,
}

impl SuccessPolicy {
    pub fn from_flag(infer_from_missing_action: bool) -> Self {
        if infer_from_missing_action {
            SuccessPolicy::InferFromMissingAction
        } else {
            SuccessPolicy::CompletionMarkerOnly
        }
    }
}

/// Result of inspecting the page once per cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Inspection {
    pub classification: ErrorClassification,
    pub success: bool,
}

impl Inspection {
    /// Inspection used when the page could not be read.
    pub fn unreadable() -> Self {
        Self {
            classification: ErrorClassification::None,
            success: false,
        }
    }
}

/// Decide success for a cycle whose classification was `None`.
///
/// Must not be called for any other classification: the missing-action
/// heuristic is only meaningful once no blocking error is on the page.
pub fn resolve_success(
    completion_marker: bool,
    action_present: bool,
    policy: SuccessPolicy,
) -> bool {
    if completion_marker {
        return true;
    }
    match policy {
        SuccessPolicy::InferFromMissingAction => !action_present,
        SuccessPolicy::CompletionMarkerOnly => false,
    }
}
