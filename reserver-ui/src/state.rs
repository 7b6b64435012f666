//! Shared application state for the UI server.

use std::sync::{Arc, Mutex};

use reserver::core::types::Status;
use reserver::io::init::ReserverPaths;
use reserver::io::reporter::{StatusReporter, TracingReporter};
use reserver::session::{SessionHandle, SessionSnapshot};
use tokio::sync::broadcast;

/// Events pushed to SSE clients.
#[derive(Debug, Clone)]
pub enum StatusEvent {
    /// A status line from the session.
    Status(Status),
    /// The session state or pending timer changed.
    Snapshot(SessionSnapshot),
    /// The retry range was saved.
    ConfigChanged,
}

/// Reporter that logs each status, remembers the latest one and broadcasts it.
#[derive(Clone)]
pub struct BroadcastReporter {
    event_tx: Arc<broadcast::Sender<StatusEvent>>,
    last: Arc<Mutex<Option<Status>>>,
}

impl BroadcastReporter {
    pub fn latest(&self) -> Option<Status> {
        self.last.lock().ok().and_then(|last| last.clone())
    }
}

impl StatusReporter for BroadcastReporter {
    fn report(&self, status: &Status) {
        TracingReporter.report(status);
        if let Ok(mut last) = self.last.lock() {
            *last = Some(status.clone());
        }
        let _ = self.event_tx.send(StatusEvent::Status(status.clone()));
    }
}

/// Shared state accessible from all request handlers.
#[derive(Clone)]
pub struct AppState {
    /// Project paths (`.reserver/` layout).
    pub paths: ReserverPaths,
    /// The one reservation session this server drives.
    pub session: Arc<SessionHandle>,
    /// Broadcast sender for status events.
    pub event_tx: Arc<broadcast::Sender<StatusEvent>>,
    pub reporter: BroadcastReporter,
}

impl AppState {
    /// Build the broadcast side first; the session is spawned with the returned reporter.
    pub fn reporter() -> BroadcastReporter {
        let (event_tx, _) = broadcast::channel(64);
        BroadcastReporter {
            event_tx: Arc::new(event_tx),
            last: Arc::new(Mutex::new(None)),
        }
    }

    pub fn new(paths: ReserverPaths, session: SessionHandle, reporter: BroadcastReporter) -> Self {
        Self {
            paths,
            session: Arc::new(session),
            event_tx: reporter.event_tx.clone(),
            reporter,
        }
    }
}
