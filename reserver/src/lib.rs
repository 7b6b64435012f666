//! Automated study reservation with randomized retry.
//!
//! A session repeatedly presses the reserve button on a study page, waits for
//! the page to settle, classifies what it shows and either stops, succeeds or
//! schedules another try after a random delay. The layering follows:
//!
//! - **[`core`]**: Pure logic (state machine, retry intervals, page signal
//!   classification, study matching). No I/O.
//! - **[`io`]**: Side-effecting collaborators (config files, page snapshots,
//!   status reporters, the logged-study store, the spreadsheet web app).
//!
//! [`session`] drives the machine on a tokio task with a single armed timer,
//! and [`watch`] runs the study logger over a watched study list.

pub mod core;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod session;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
pub mod watch;
