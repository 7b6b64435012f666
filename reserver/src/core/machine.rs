//! Reservation attempt state machine.
//!
//! The machine is pure: it never sleeps, clicks or reads the page. It decides
//! transitions and owns the single [`ScheduledTask`] slot; the session driver
//! arms a real timer for whatever task is pending and reports back through
//! [`Machine::fire`]. Because the slot holds at most one task and every
//! `start`/`stop`/terminal transition clears it, two cycles can never overlap.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::debug;

use crate::core::inspection::Inspection;
use crate::core::types::{
    ClickOutcome, ErrorClassification, ErrorTaxonomy, MachineState, Status, StopReason,
};

/// Wait after a click before page state is trusted.
pub const SETTLE_DELAY: Duration = Duration::from_millis(1_500);

/// Wait between `start` and the first attempt.
pub const INITIAL_DELAY: Duration = Duration::from_millis(500);

/// Identity of a scheduled task. A fire carrying a stale id is ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerId(u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TimerKind {
    /// Next click cycle.
    Attempt,
    /// Settle delay elapsed; read the page.
    Inspect,
}

/// The machine's one outstanding timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduledTask {
    pub id: TimerId,
    pub kind: TimerKind,
    pub delay: Duration,
}

/// One click cycle. Lives from `begin_attempt` until the cycle is concluded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReservationAttempt {
    pub number: u64,
    pub started_at: DateTime<Utc>,
    pub classification: Option<ErrorClassification>,
}

/// What the driver must do right after the action primitive ran.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AfterAction {
    /// Click landed; inspection is scheduled after [`SETTLE_DELAY`].
    AwaitSettle(Status),
    /// Nothing was clicked; inspect the page now.
    InspectNow,
}

#[derive(Debug)]
pub struct Machine {
    state: MachineState,
    pending: Option<ScheduledTask>,
    next_timer: u64,
    attempts: u64,
    current: Option<ReservationAttempt>,
}

impl Default for Machine {
    fn default() -> Self {
        Self::new()
    }
}

impl Machine {
    pub fn new() -> Self {
        Self {
            state: MachineState::Idle,
            pending: None,
            next_timer: 0,
            attempts: 0,
            current: None,
        }
    }

    pub fn state(&self) -> &MachineState {
        &self.state
    }

    pub fn pending(&self) -> Option<&ScheduledTask> {
        self.pending.as_ref()
    }

    /// Attempts begun since construction (across restarts).
    pub fn attempts(&self) -> u64 {
        self.attempts
    }

    pub fn current_attempt(&self) -> Option<&ReservationAttempt> {
        self.current.as_ref()
    }

    /// Begin (or restart) a session. Any pending timer is cancelled first.
    pub fn start(&mut self) -> Status {
        if let Some(cancelled) = self.cancel() {
            debug!(timer = ?cancelled.id, kind = ?cancelled.kind, "restart cancelled pending timer");
        }
        self.current = None;
        self.state = MachineState::Attempting;
        self.schedule(TimerKind::Attempt, INITIAL_DELAY);
        Status::new("Starting... first try soon", true)
    }

    /// Operator stop. A no-op (reported as "not running") when nothing is active.
    pub fn stop(&mut self, reason: impl Into<String>) -> Status {
        if self.state.is_terminal() || (self.state == MachineState::Idle && self.pending.is_none())
        {
            return Status::new("Not running", false);
        }
        self.cancel();
        self.current = None;
        let reason = StopReason::Operator(reason.into());
        let status = Status::new(format!("Stopped: {reason}"), false);
        self.state = MachineState::Stopped { reason };
        status
    }

    /// Consume the pending task if `id` matches it.
    ///
    /// Returns `None` for stale or cancelled timers; the driver must then do nothing.
    pub fn fire(&mut self, id: TimerId) -> Option<TimerKind> {
        match self.pending {
            Some(task) if task.id == id => {
                self.pending = None;
                Some(task.kind)
            }
            _ => None,
        }
    }

    /// Open a new click cycle. Returns the attempt number, or `None` when the
    /// machine is not running.
    pub fn begin_attempt(&mut self, now: DateTime<Utc>) -> Option<u64> {
        if !self.state.is_running() {
            return None;
        }
        self.attempts += 1;
        self.state = MachineState::Attempting;
        self.current = Some(ReservationAttempt {
            number: self.attempts,
            started_at: now,
            classification: None,
        });
        Some(self.attempts)
    }

    pub fn after_action(&mut self, outcome: ClickOutcome) -> AfterAction {
        if !outcome.attempted || self.state != MachineState::Attempting {
            return AfterAction::InspectNow;
        }
        self.state = MachineState::AwaitingSettle;
        self.schedule(TimerKind::Inspect, SETTLE_DELAY);
        AfterAction::AwaitSettle(Status::new("Clicked! Waiting...", true))
    }

    /// Branch on an inspection. `retry_delay` is only used when a retry is scheduled.
    ///
    /// Returns `None` if no cycle is in flight (e.g. stopped meanwhile).
    pub fn conclude(&mut self, inspection: Inspection, retry_delay: Duration) -> Option<Status> {
        if !matches!(
            self.state,
            MachineState::Attempting | MachineState::AwaitingSettle
        ) {
            return None;
        }
        if let Some(mut attempt) = self.current.take() {
            attempt.classification = Some(inspection.classification);
            debug!(
                attempt = attempt.number,
                started_at = %attempt.started_at,
                classification = ?inspection.classification,
                success = inspection.success,
                "attempt concluded"
            );
        }

        let status = match inspection.classification.taxonomy() {
            ErrorTaxonomy::TransientContention => {
                self.retry_after(retry_delay);
                Status::new(
                    format!(
                        "High demand. Retrying... next in {:.1}s",
                        retry_delay.as_secs_f64()
                    ),
                    true,
                )
            }
            ErrorTaxonomy::TerminalUnavailable => {
                self.cancel();
                let reason = StopReason::Unavailable(inspection.classification);
                let status = Status::new(format!("Stopped: {reason}"), false);
                self.state = MachineState::Stopped { reason };
                status
            }
            ErrorTaxonomy::Unclassified if inspection.success => {
                self.cancel();
                self.state = MachineState::Succeeded;
                Status::new("Study reserved!", false)
            }
            ErrorTaxonomy::Unclassified => {
                self.retry_after(retry_delay);
                Status::new(
                    format!("Running... next try in {:.1}s", retry_delay.as_secs_f64()),
                    true,
                )
            }
        };
        Some(status)
    }

    fn retry_after(&mut self, delay: Duration) {
        self.state = MachineState::Retrying;
        self.schedule(TimerKind::Attempt, delay);
    }

    fn schedule(&mut self, kind: TimerKind, delay: Duration) -> ScheduledTask {
        self.cancel();
        self.next_timer += 1;
        let task = ScheduledTask {
            id: TimerId(self.next_timer),
            kind,
            delay,
        };
        self.pending = Some(task);
        task
    }

    fn cancel(&mut self) -> Option<ScheduledTask> {
        self.pending.take()
    }
}
