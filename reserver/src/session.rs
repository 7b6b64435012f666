//! Async driver for the reservation machine.
//!
//! A session is one tokio task that owns the [`Machine`], the page, the
//! reporter and at most one armed timer. Triggers arrive over a channel and are
//! handled between timer fires, so a stop issued while a click is in flight
//! takes effect at the next boundary. After every event the armed timer is
//! re-synced to the machine's pending task: a replaced or cancelled task drops
//! its sleep, which is what cancellation means here.

use std::pin::Pin;

use anyhow::{Result, anyhow};
use chrono::Utc;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Sleep;
use tracing::{debug, info, warn};

use crate::core::inspection::SuccessPolicy;
use crate::core::interval::{RetryConfig, next_delay};
use crate::core::machine::{AfterAction, Machine, TimerId, TimerKind};
use crate::core::types::{ClickOutcome, MachineState, Status};
use crate::io::page::{PageAction, PageInspector, inspect_page};
use crate::io::reporter::StatusReporter;

/// Operator-facing triggers. Fire-and-forget.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Trigger {
    Start,
    Stop { reason: String },
    /// A new retry range was saved; applies from the next draw.
    Configure(RetryConfig),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionOptions {
    pub retry: RetryConfig,
    pub success_policy: SuccessPolicy,
}

/// Observable session state, republished after every event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionSnapshot {
    #[serde(flatten)]
    pub state: MachineState,
    pub pending: Option<TimerKind>,
    pub attempts: u64,
}

struct ArmedTimer {
    id: TimerId,
    sleep: Pin<Box<Sleep>>,
}

enum Event {
    Trigger(Trigger),
    Fired(TimerId),
}

struct Session<P, S, R> {
    machine: Machine,
    page: P,
    reporter: S,
    rng: R,
    retry: RetryConfig,
    policy: SuccessPolicy,
    armed: Option<ArmedTimer>,
    snapshots: watch::Sender<SessionSnapshot>,
}

/// Handle to a running session task.
pub struct SessionHandle {
    triggers: mpsc::UnboundedSender<Trigger>,
    snapshots: watch::Receiver<SessionSnapshot>,
    task: JoinHandle<MachineState>,
}

/// Spawn a session seeded from OS entropy.
pub fn spawn_session<P, S>(page: P, reporter: S, options: SessionOptions) -> SessionHandle
where
    P: PageInspector + PageAction + Send + 'static,
    S: StatusReporter + Send + 'static,
{
    spawn_session_with_rng(page, reporter, options, StdRng::from_entropy())
}

/// Spawn a session with an explicit interval RNG.
pub fn spawn_session_with_rng<P, S, R>(
    page: P,
    reporter: S,
    options: SessionOptions,
    rng: R,
) -> SessionHandle
where
    P: PageInspector + PageAction + Send + 'static,
    S: StatusReporter + Send + 'static,
    R: Rng + Send + 'static,
{
    let (trigger_tx, trigger_rx) = mpsc::unbounded_channel();
    let machine = Machine::new();
    let (snapshot_tx, snapshot_rx) = watch::channel(snapshot_of(&machine));
    let session = Session {
        machine,
        page,
        reporter,
        rng,
        retry: options.retry,
        policy: options.success_policy,
        armed: None,
        snapshots: snapshot_tx,
    };
    let task = tokio::spawn(session.run(trigger_rx));
    SessionHandle {
        triggers: trigger_tx,
        snapshots: snapshot_rx,
        task,
    }
}

fn snapshot_of(machine: &Machine) -> SessionSnapshot {
    SessionSnapshot {
        state: machine.state().clone(),
        pending: machine.pending().map(|task| task.kind),
        attempts: machine.attempts(),
    }
}

async fn next_fire(armed: &mut Option<ArmedTimer>) -> TimerId {
    match armed {
        Some(timer) => {
            timer.sleep.as_mut().await;
            timer.id
        }
        None => std::future::pending().await,
    }
}

impl<P, S, R> Session<P, S, R>
where
    P: PageInspector + PageAction,
    S: StatusReporter,
    R: Rng,
{
    async fn run(mut self, mut triggers: mpsc::UnboundedReceiver<Trigger>) -> MachineState {
        loop {
            let event = tokio::select! {
                biased;
                trigger = triggers.recv() => match trigger {
                    Some(trigger) => Event::Trigger(trigger),
                    None => break,
                },
                id = next_fire(&mut self.armed) => Event::Fired(id),
            };
            match event {
                Event::Trigger(trigger) => self.on_trigger(trigger),
                Event::Fired(id) => self.on_fire(id),
            }
            self.sync_timer();
            self.snapshots.send_replace(snapshot_of(&self.machine));
        }
        debug!(state = ?self.machine.state(), "session closed");
        self.machine.state().clone()
    }

    fn on_trigger(&mut self, trigger: Trigger) {
        match trigger {
            Trigger::Start => {
                info!(
                    min_secs = self.retry.min_secs,
                    max_secs = self.retry.max_secs,
                    "starting reservation session"
                );
                let status = self.machine.start();
                self.reporter.report(&status);
            }
            Trigger::Stop { reason } => {
                let status = self.machine.stop(reason);
                self.reporter.report(&status);
            }
            Trigger::Configure(retry) => {
                self.retry = retry;
                info!(
                    min_secs = retry.min_secs,
                    max_secs = retry.max_secs,
                    "retry range updated"
                );
                self.reporter.report(&Status::new(
                    format!("Intervals saved ({}-{}s)", retry.min_secs, retry.max_secs),
                    self.machine.state().is_running(),
                ));
            }
        }
    }

    fn on_fire(&mut self, id: TimerId) {
        match self.machine.fire(id) {
            Some(TimerKind::Attempt) => self.attempt(),
            Some(TimerKind::Inspect) => self.inspect(),
            None => debug!(timer = ?id, "stale timer ignored"),
        }
    }

    fn attempt(&mut self) {
        let Some(number) = self.machine.begin_attempt(Utc::now()) else {
            return;
        };
        debug!(attempt = number, "attempting reservation");
        let outcome = self.page.click().unwrap_or_else(|err| {
            warn!(error = %format!("{err:#}"), "click failed; inspecting page instead");
            ClickOutcome { attempted: false }
        });
        match self.machine.after_action(outcome) {
            AfterAction::AwaitSettle(status) => self.reporter.report(&status),
            AfterAction::InspectNow => {
                debug!(attempt = number, "reserve button unavailable; inspecting now");
                self.inspect();
            }
        }
    }

    fn inspect(&mut self) {
        let inspection = inspect_page(&self.page, self.policy);
        let delay = next_delay(&self.retry, &mut self.rng);
        if let Some(status) = self.machine.conclude(inspection, delay) {
            self.reporter.report(&status);
        }
    }

    fn sync_timer(&mut self) {
        match self.machine.pending() {
            Some(task) => {
                if self.armed.as_ref().map(|timer| timer.id) != Some(task.id) {
                    debug!(
                        timer = ?task.id,
                        kind = ?task.kind,
                        delay = ?task.delay,
                        "timer armed"
                    );
                    self.armed = Some(ArmedTimer {
                        id: task.id,
                        sleep: Box::pin(tokio::time::sleep(task.delay)),
                    });
                }
            }
            None => self.armed = None,
        }
    }
}

impl SessionHandle {
    fn send(&self, trigger: Trigger) {
        if self.triggers.send(trigger).is_err() {
            warn!("session has ended; trigger dropped");
        }
    }

    pub fn start(&self) {
        self.send(Trigger::Start);
    }

    pub fn stop(&self, reason: impl Into<String>) {
        self.send(Trigger::Stop {
            reason: reason.into(),
        });
    }

    pub fn configure(&self, retry: RetryConfig) {
        self.send(Trigger::Configure(retry));
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.snapshots.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.snapshots.clone()
    }

    /// Wait until the machine is `Stopped` or `Succeeded`.
    ///
    /// Returns immediately if it already is, so call after triggering a start
    /// only when the session has not been terminal before.
    pub async fn wait_for_terminal(&self) -> Result<MachineState> {
        let mut rx = self.snapshots.clone();
        let snapshot = rx
            .wait_for(|snapshot| snapshot.state.is_terminal())
            .await
            .map_err(|_| anyhow!("session ended before reaching a terminal state"))?;
        Ok(snapshot.state.clone())
    }

    /// Close the trigger channel and wait for the task to finish.
    pub async fn shutdown(self) -> Result<MachineState> {
        drop(self.triggers);
        self.task.await.map_err(|err| anyhow!("session task failed: {err}"))
    }
}
