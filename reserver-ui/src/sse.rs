//! Server-Sent Events stream and session snapshot forwarding.

use std::convert::Infallible;
use std::time::Duration;

use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use futures::stream::Stream;
use reserver::core::types::Status;
use reserver::session::SessionSnapshot;
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::state::{AppState, StatusEvent};

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum SsePayload<'a> {
    Status(&'a Status),
    Snapshot(&'a SessionSnapshot),
    ConfigChanged,
}

impl<'a> From<&'a StatusEvent> for SsePayload<'a> {
    fn from(event: &'a StatusEvent) -> Self {
        match event {
            StatusEvent::Status(status) => SsePayload::Status(status),
            StatusEvent::Snapshot(snapshot) => SsePayload::Snapshot(snapshot),
            StatusEvent::ConfigChanged => SsePayload::ConfigChanged,
        }
    }
}

fn encode(event: &StatusEvent) -> Option<String> {
    serde_json::to_string(&SsePayload::from(event)).ok()
}

/// SSE endpoint handler.
pub async fn events_handler(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let mut rx = state.event_tx.subscribe();
    let initial = StatusEvent::Snapshot(state.session.snapshot());

    let stream = async_stream::stream! {
        yield Ok(Event::default().event("connected").data("{}"));
        if let Some(json) = encode(&initial) {
            yield Ok(Event::default().event("status").data(json));
        }

        loop {
            match rx.recv().await {
                Ok(event) => {
                    if let Some(json) = encode(&event) {
                        yield Ok(Event::default().event("status").data(json));
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(skipped = n, "SSE client lagged, some events dropped");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    break;
                }
            }
        }
    };

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("ping"),
    )
}

/// Republish every session snapshot change as a broadcast event.
pub fn start_snapshot_forwarder(state: AppState) {
    let mut snapshots = state.session.subscribe();
    tokio::spawn(async move {
        while snapshots.changed().await.is_ok() {
            let snapshot = snapshots.borrow_and_update().clone();
            debug!(state = ?snapshot.state, "broadcasting session snapshot");
            let _ = state.event_tx.send(StatusEvent::Snapshot(snapshot));
        }
        debug!("session snapshot channel closed");
    });
}
