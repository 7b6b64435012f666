//! Test-only collaborators: a scripted page and a recording reporter.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use anyhow::{Result, anyhow};

use crate::core::types::{ClickOutcome, ErrorClassification, Status};
use crate::io::page::{PageAction, PageInspector};
use crate::io::reporter::StatusReporter;

/// What the page shows between two clicks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageFrame {
    pub classification: ErrorClassification,
    /// Reserve button shown (possibly disabled).
    pub action_present: bool,
    /// Reserve button shown and enabled.
    pub action_available: bool,
    pub completion_marker: bool,
}

impl PageFrame {
    /// Reserve button visible, nothing else.
    pub fn ready() -> Self {
        Self {
            classification: ErrorClassification::None,
            action_present: true,
            action_available: true,
            completion_marker: false,
        }
    }

    /// Reserve button shown but disabled, no error banner.
    pub fn disabled() -> Self {
        Self {
            action_available: false,
            ..Self::ready()
        }
    }

    /// An error banner next to a still-clickable button.
    pub fn error(classification: ErrorClassification) -> Self {
        Self {
            classification,
            ..Self::ready()
        }
    }

    /// The explicit "finished" affordance is shown.
    pub fn reserved() -> Self {
        Self {
            classification: ErrorClassification::None,
            action_present: false,
            action_available: false,
            completion_marker: true,
        }
    }
}

#[derive(Debug)]
struct Script {
    frames: VecDeque<PageFrame>,
    clicks: u32,
    inspections: u32,
    fail_reads: bool,
}

/// A page that advances to its next frame each time a click lands.
///
/// The last frame repeats forever.
#[derive(Debug)]
pub struct ScriptedPage {
    script: Mutex<Script>,
}

impl ScriptedPage {
    pub fn new(frames: Vec<PageFrame>) -> Arc<Self> {
        assert!(!frames.is_empty(), "scripted page needs at least one frame");
        Arc::new(Self {
            script: Mutex::new(Script {
                frames: frames.into(),
                clicks: 0,
                inspections: 0,
                fail_reads: false,
            }),
        })
    }

    /// Every read fails until turned off again.
    pub fn set_fail_reads(&self, fail: bool) {
        self.script.lock().expect("script lock").fail_reads = fail;
    }

    pub fn clicks(&self) -> u32 {
        self.script.lock().expect("script lock").clicks
    }

    pub fn inspections(&self) -> u32 {
        self.script.lock().expect("script lock").inspections
    }

    fn current(&self) -> Result<PageFrame> {
        let script = self.script.lock().expect("script lock");
        if script.fail_reads {
            return Err(anyhow!("scripted read failure"));
        }
        Ok(*script.frames.front().expect("frames never empty"))
    }
}

impl PageInspector for ScriptedPage {
    fn classify_error(&self) -> Result<ErrorClassification> {
        let frame = self.current()?;
        self.script.lock().expect("script lock").inspections += 1;
        Ok(frame.classification)
    }

    fn is_action_available(&self) -> Result<bool> {
        Ok(self.current()?.action_available)
    }

    fn is_action_present(&self) -> Result<bool> {
        Ok(self.current()?.action_present)
    }

    fn has_completion_marker(&self) -> Result<bool> {
        Ok(self.current()?.completion_marker)
    }
}

impl PageAction for ScriptedPage {
    fn click(&self) -> Result<ClickOutcome> {
        let mut script = self.script.lock().expect("script lock");
        let available = script.frames.front().is_some_and(|frame| frame.action_available);
        if !available {
            return Ok(ClickOutcome { attempted: false });
        }
        script.clicks += 1;
        if script.frames.len() > 1 {
            script.frames.pop_front();
        }
        Ok(ClickOutcome { attempted: true })
    }
}

/// Reporter that keeps every status for later assertions.
#[derive(Debug, Clone, Default)]
pub struct RecordingReporter {
    statuses: Arc<Mutex<Vec<Status>>>,
}

impl RecordingReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn statuses(&self) -> Vec<Status> {
        self.statuses.lock().expect("status lock").clone()
    }

    pub fn messages(&self) -> Vec<String> {
        self.statuses()
            .into_iter()
            .map(|status| status.message)
            .collect()
    }
}

impl StatusReporter for RecordingReporter {
    fn report(&self, status: &Status) {
        self.statuses.lock().expect("status lock").push(status.clone());
    }
}
