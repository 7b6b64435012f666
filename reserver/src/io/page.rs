//! Page collaborator: read-only inspection and the click primitive.
//!
//! The [`PageInspector`] and [`PageAction`] traits decouple the reservation
//! session from how the page is reached. [`FilePage`] talks to a browser
//! bridge through a snapshot file it re-reads on every query and an append-only
//! action file; tests use scripted pages instead.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use serde::Serialize;
use tracing::{debug, instrument, warn};

use crate::core::inspection::{Inspection, SuccessPolicy, resolve_success};
use crate::core::signals::{
    ACTION_TEST_ID, PageSnapshot, action_available, action_present, classify_snapshot,
    completion_marker,
};
use crate::core::types::{ClickOutcome, ErrorClassification};

/// Read-only probes over the current page. Implementations must not mutate the page.
pub trait PageInspector {
    fn classify_error(&self) -> Result<ErrorClassification>;
    /// The reserve button can be clicked: present and enabled.
    fn is_action_available(&self) -> Result<bool>;
    /// The reserve button is on the page at all, even if disabled.
    fn is_action_present(&self) -> Result<bool>;
    /// The explicit completion affordance is visible.
    fn has_completion_marker(&self) -> Result<bool>;
}

/// The single side-effecting primitive: press the reserve button.
pub trait PageAction {
    fn click(&self) -> Result<ClickOutcome>;
}

impl<T: PageInspector + ?Sized> PageInspector for Arc<T> {
    fn classify_error(&self) -> Result<ErrorClassification> {
        (**self).classify_error()
    }

    fn is_action_available(&self) -> Result<bool> {
        (**self).is_action_available()
    }

    fn is_action_present(&self) -> Result<bool> {
        (**self).is_action_present()
    }

    fn has_completion_marker(&self) -> Result<bool> {
        (**self).has_completion_marker()
    }
}

impl<T: PageAction + ?Sized> PageAction for Arc<T> {
    fn click(&self) -> Result<ClickOutcome> {
        (**self).click()
    }
}

/// Inspect the page for one cycle.
///
/// Success is only evaluated once classification returned `None`. A failed read
/// degrades to "no error, not reserved" so the session keeps retrying instead
/// of halting on a transient glitch.
pub fn inspect_page<P: PageInspector + ?Sized>(page: &P, policy: SuccessPolicy) -> Inspection {
    let classification = match page.classify_error() {
        Ok(classification) => classification,
        Err(err) => {
            warn!(error = %format!("{err:#}"), "page read failed during classification; will retry");
            return Inspection::unreadable();
        }
    };
    if classification != ErrorClassification::None {
        return Inspection {
            classification,
            success: false,
        };
    }
    let success = page.has_completion_marker().and_then(|marker| {
        let present = page.is_action_present()?;
        Ok(resolve_success(marker, present, policy))
    });
    match success {
        Ok(success) => Inspection {
            classification,
            success,
        },
        Err(err) => {
            warn!(error = %format!("{err:#}"), "page read failed during success check; will retry");
            Inspection::unreadable()
        }
    }
}

#[derive(Serialize)]
struct ActionRequest<'a> {
    action: &'a str,
    target: &'a str,
    at: String,
}

/// Page reached through files shared with a browser bridge.
#[derive(Debug, Clone)]
pub struct FilePage {
    snapshot_path: PathBuf,
    actions_path: PathBuf,
}

impl FilePage {
    pub fn new(snapshot_path: impl Into<PathBuf>, actions_path: impl Into<PathBuf>) -> Self {
        Self {
            snapshot_path: snapshot_path.into(),
            actions_path: actions_path.into(),
        }
    }

    pub fn snapshot_path(&self) -> &Path {
        &self.snapshot_path
    }

    /// Current snapshot, read fresh from disk.
    pub fn snapshot(&self) -> Result<PageSnapshot> {
        let contents = fs::read_to_string(&self.snapshot_path)
            .with_context(|| format!("read page snapshot {}", self.snapshot_path.display()))?;
        serde_json::from_str(&contents)
            .with_context(|| format!("parse page snapshot {}", self.snapshot_path.display()))
    }

    fn append_action(&self, request: &ActionRequest<'_>) -> Result<()> {
        if let Some(parent) = self.actions_path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("create directory {}", parent.display()))?;
        }
        let mut line = serde_json::to_string(request).context("serialize action request")?;
        line.push('\n');
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.actions_path)
            .with_context(|| format!("open {}", self.actions_path.display()))?;
        file.write_all(line.as_bytes())
            .with_context(|| format!("append {}", self.actions_path.display()))
    }
}

impl PageInspector for FilePage {
    fn classify_error(&self) -> Result<ErrorClassification> {
        Ok(classify_snapshot(&self.snapshot()?))
    }

    fn is_action_available(&self) -> Result<bool> {
        Ok(action_available(&self.snapshot()?))
    }

    fn is_action_present(&self) -> Result<bool> {
        Ok(action_present(&self.snapshot()?))
    }

    fn has_completion_marker(&self) -> Result<bool> {
        Ok(completion_marker(&self.snapshot()?))
    }
}

impl PageAction for FilePage {
    #[instrument(skip_all, fields(actions = %self.actions_path.display()))]
    fn click(&self) -> Result<ClickOutcome> {
        if !self.is_action_available()? {
            debug!("reserve button missing or disabled; not clicking");
            return Ok(ClickOutcome { attempted: false });
        }
        self.append_action(&ActionRequest {
            action: "click",
            target: ACTION_TEST_ID,
            at: Utc::now().to_rfc3339(),
        })?;
        debug!("click requested");
        Ok(ClickOutcome { attempted: true })
    }
}
