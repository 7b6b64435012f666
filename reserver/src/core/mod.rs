//! Deterministic, pure logic shared by the reserver.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! data structures and return deterministic outputs suitable for tests; the
//! only nondeterminism (interval draws, timestamps) is passed in by callers.

pub mod inspection;
pub mod interval;
pub mod machine;
pub mod signals;
pub mod study_filter;
pub mod types;
