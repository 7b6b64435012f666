//! Status reporting side channel.

use std::sync::Arc;

use tracing::info;

use crate::core::types::Status;

/// Receives one status per machine transition.
///
/// Implementations must return promptly; the session calls this inline.
pub trait StatusReporter {
    fn report(&self, status: &Status);
}

impl<T: StatusReporter + ?Sized> StatusReporter for Arc<T> {
    fn report(&self, status: &Status) {
        (**self).report(status);
    }
}

/// Reporter that only emits tracing events.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingReporter;

impl StatusReporter for TracingReporter {
    fn report(&self, status: &Status) {
        info!(running = status.running, tone = ?status.tone, "{}", status.message);
    }
}

/// Reporter that prints each status line to stdout.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConsoleReporter;

impl StatusReporter for ConsoleReporter {
    fn report(&self, status: &Status) {
        let marker = if status.running { "*" } else { "-" };
        println!("{marker} {}", status.message);
    }
}
